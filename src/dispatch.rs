use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use crate::scheduler::payload::IncidentPayload;

/// Entry point of the delivery pipeline. The scheduler hands every built
/// payload to a sink exactly once per firing; retries are left to the next
/// scheduled tick.
#[async_trait]
pub trait DispatchSink: Send + Sync {
    async fn deliver(
        &self,
        source: &str,
        payload: &IncidentPayload,
        params: &HashMap<String, String>,
    ) -> Result<()>;
}

/// Posts payloads to the incident-creation HTTP API, with the channel
/// override params as query string.
pub struct HttpDispatchSink {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpDispatchSink {
    pub fn new(endpoint: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build dispatch client")?;
        Ok(Self { endpoint, http })
    }
}

#[async_trait]
impl DispatchSink for HttpDispatchSink {
    async fn deliver(
        &self,
        source: &str,
        payload: &IncidentPayload,
        params: &HashMap<String, String>,
    ) -> Result<()> {
        let mut query: Vec<(&str, &str)> = vec![("source", source)];
        query.extend(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let response = self
            .http
            .post(&self.endpoint)
            .query(&query)
            .json(payload)
            .send()
            .await
            .context("incident API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("incident API returned status {status}: {body}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::client::test_support::alert_with_labels;
    use crate::scheduler::payload::build_payload;
    use axum::{Router, extract::Query, routing::post};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    async fn spawn_incident_api(
        status: axum::http::StatusCode,
        seen: Arc<Mutex<Vec<(HashMap<String, String>, serde_json::Value)>>>,
    ) -> String {
        let app = Router::new().route(
            "/api/incidents",
            post(
                move |Query(query): Query<HashMap<String, String>>,
                      axum::Json(body): axum::Json<serde_json::Value>| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().await.push((query, body));
                        status
                    }
                },
            ),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api/incidents")
    }

    #[tokio::test]
    async fn delivers_payload_with_source_and_params_as_query() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let endpoint = spawn_incident_api(axum::http::StatusCode::CREATED, seen.clone()).await;

        let sink = HttpDispatchSink::new(endpoint).unwrap();
        let payload = build_payload(&[alert_with_labels(&[("alertname", "HighCPU")])]).unwrap();
        let params = HashMap::from([
            ("oncall_enable".to_string(), "false".to_string()),
            ("slack_channel_id".to_string(), "C012345".to_string()),
        ]);

        sink.deliver("scheduled", &payload, &params).await.unwrap();

        let recorded = seen.lock().await;
        assert_eq!(recorded.len(), 1);
        let (query, body) = &recorded[0];
        assert_eq!(query["source"], "scheduled");
        assert_eq!(query["oncall_enable"], "false");
        assert_eq!(query["slack_channel_id"], "C012345");
        assert_eq!(body["status"], "firing");
        assert_eq!(body["receiver"], "scheduled-alert");
    }

    #[tokio::test]
    async fn rejection_surfaces_as_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let endpoint = spawn_incident_api(axum::http::StatusCode::BAD_REQUEST, seen).await;

        let sink = HttpDispatchSink::new(endpoint).unwrap();
        let payload = build_payload(&[alert_with_labels(&[("a", "b")])]).unwrap();
        let err = sink
            .deliver("scheduled", &payload, &HashMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400"));
    }
}
