use std::collections::HashMap;

use super::client::Alert;

/// Keep only alerts whose labels satisfy every entry of `predicate`
/// (conjunctive exact match). An empty predicate passes everything
/// through untouched. Input order is preserved.
pub fn filter_alerts(alerts: Vec<Alert>, predicate: &HashMap<String, String>) -> Vec<Alert> {
    if predicate.is_empty() {
        return alerts;
    }
    alerts
        .into_iter()
        .filter(|alert| matches_labels(&alert.labels, predicate))
        .collect()
}

fn matches_labels(labels: &HashMap<String, String>, predicate: &HashMap<String, String>) -> bool {
    predicate.iter().all(|(key, value)| labels.get(key) == Some(value))
}
