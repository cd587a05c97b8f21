use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::client::Alert;

/// Receiver tag stamped on every scheduled incident.
pub const RECEIVER_TAG: &str = "scheduled-alert";

const GROUP_KEY_PREFIX: &str = "scheduled";

/// One alert inside the canonical incident envelope, in the shape of an
/// Alertmanager webhook alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub status: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    #[serde(rename = "startsAt")]
    pub starts_at: String,
    #[serde(rename = "endsAt")]
    pub ends_at: String,
    pub fingerprint: String,
    #[serde(rename = "generatorURL")]
    pub generator_url: String,
}

/// Canonical incident envelope handed to the dispatch sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentPayload {
    pub receiver: String,
    pub status: String,
    pub alerts: Vec<AlertRecord>,
    #[serde(rename = "commonLabels")]
    pub common_labels: HashMap<String, String>,
    #[serde(rename = "commonAnnotations")]
    pub common_annotations: HashMap<String, String>,
    #[serde(rename = "externalURL")]
    pub external_url: String,
    #[serde(rename = "groupKey")]
    pub group_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_job: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,
}

/// Build the incident envelope for a filtered alert set, or `None` when
/// there is nothing to forward.
///
/// Common labels and annotations are copied from the first alert; the label
/// predicate is expected to have narrowed the set to one homogeneous group
/// already. The group key is advisory correlation metadata derived from the
/// trigger time, never a dedup key.
pub fn build_payload(alerts: &[Alert]) -> Option<IncidentPayload> {
    let first = alerts.first()?;

    let records = alerts
        .iter()
        .map(|alert| AlertRecord {
            status: alert.status.state.clone(),
            labels: alert.labels.clone(),
            annotations: alert.annotations.clone(),
            starts_at: alert.starts_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ends_at: alert.ends_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            fingerprint: alert.fingerprint.clone(),
            generator_url: alert.generator_url.clone(),
        })
        .collect();

    Some(IncidentPayload {
        receiver: RECEIVER_TAG.to_string(),
        status: "firing".to_string(),
        alerts: records,
        common_labels: first.labels.clone(),
        common_annotations: first.annotations.clone(),
        external_url: String::new(),
        group_key: format!("{}-{}", GROUP_KEY_PREFIX, Utc::now().timestamp()),
        scheduled_job: None,
        scheduled_time: None,
    })
}
