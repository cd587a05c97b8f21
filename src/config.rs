use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub scheduled_alert: ScheduledAlertConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Incident-creation endpoint the scheduler posts built payloads to.
    #[serde(default = "default_dispatch_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScheduledAlertConfig {
    #[serde(default)]
    pub enable: bool,
    /// Shared IANA time zone for all job schedules, e.g. "Asia/Ho_Chi_Minh".
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default)]
    pub enable: bool,
    /// Cron expression or "HH:MM" daily shorthand.
    #[serde(default)]
    pub schedule: String,
    pub alertmanager: AlertmanagerConfig,
    /// Label predicate: every key must be present with this exact value.
    #[serde(default)]
    pub match_labels: HashMap<String, String>,
    #[serde(default)]
    pub channels: ChannelOverrides,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertmanagerConfig {
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Per-job destination overrides passed through to the delivery pipeline.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChannelOverrides {
    #[serde(default)]
    pub slack_channel_id: String,
    #[serde(default)]
    pub telegram_chat_id: String,
    /// Key into the Lark other_webhook_urls table.
    #[serde(default)]
    pub lark_webhook_key: String,
    /// Key into the MS Teams other_power_urls table.
    #[serde(default)]
    pub msteams_power_url_key: String,
    #[serde(default)]
    pub email_to: String,
    /// Schedule-triggered incidents keep on-call off unless a job opts in.
    #[serde(default)]
    pub oncall_enable: Option<bool>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_dispatch_url() -> String {
    "http://localhost:3000/api/incidents".to_string()
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            url: default_dispatch_url(),
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config {}", path.as_ref().display()))?;
        let expanded = expand_env(&raw, |name| std::env::var(name).ok())?;
        serde_yaml::from_str(&expanded).context("failed to parse config")
    }
}

/// Replace `${VAR}` references with values from `lookup`. Unset variables
/// expand to the empty string.
fn expand_env(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")?;
    Ok(pattern
        .replace_all(raw, |caps: &regex::Captures| {
            lookup(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}
