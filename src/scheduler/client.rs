use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bound on a single backend request so one unhealthy Alertmanager cannot
/// stall its job's firing indefinitely.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// The only alert state forwarded downstream.
const ACTIVE_STATE: &str = "active";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("alert backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("alert backend returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed alert backend response: {0}")]
    Format(#[from] serde_json::Error),
}

/// One alert as returned by the Alertmanager v2 API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: AlertState,
    #[serde(default)]
    pub receivers: Vec<Receiver>,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(rename = "generatorURL", default)]
    pub generator_url: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertState {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub silenced_by: Vec<String>,
    #[serde(default)]
    pub inhibited_by: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Receiver {
    pub name: String,
}

/// Stateless client for one Alertmanager-compatible backend.
pub struct AlertSourceClient {
    base_url: String,
    username: String,
    password: String,
    http: reqwest::Client,
}

impl AlertSourceClient {
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            http,
        })
    }

    /// Fetch the currently firing alerts. The query already restricts the
    /// result server-side to active, non-silenced, non-inhibited alerts;
    /// the state check below re-filters in case of backend version drift.
    pub async fn fetch_firing(&self) -> Result<Vec<Alert>, FetchError> {
        let url = format!(
            "{}/api/v2/alerts?active=true&silenced=false&inhibited=false",
            self.base_url
        );

        let mut request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json");
        if !self.username.is_empty() && !self.password.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let body = response.text().await?;
        let alerts: Vec<Alert> = serde_json::from_str(&body)?;

        Ok(alerts
            .into_iter()
            .filter(|alert| alert.status.state == ACTIVE_STATE)
            .collect())
    }
}
