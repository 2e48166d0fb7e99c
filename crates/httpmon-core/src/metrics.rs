//! Outcome counters for every request attempt.

use dashmap::DashMap;

use crate::definition::MonitorKey;

/// Status reported when no response was received at all.
pub const TRANSPORT_FAILURE_STATUS: u16 = 599;

/// Value of the `type` label on per-request counters.
pub const RESOURCE_TYPE: &str = "HttpMonitor/v1alpha1";

/// One request attempt, primary or cleanup.
#[derive(Debug, Clone)]
pub struct ResponseRecord<'a> {
    pub monitor: &'a MonitorKey,
    pub request: &'a str,
    pub target_service: &'a str,
    /// URL as written in the definition, before substitution.
    pub url: &'a str,
    /// `None` when the request could not even be built.
    pub status: Option<u16>,
}

impl ResponseRecord<'_> {
    pub fn status_label(&self) -> String {
        status_label(self.status)
    }
}

pub fn status_label(status: Option<u16>) -> String {
    status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string())
}

/// Receives one record per request attempt. Must be safe to call from many
/// runners at once.
pub trait MetricsSink: Send + Sync {
    fn record(&self, record: &ResponseRecord<'_>);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UrlLabels {
    pub url: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestLabels {
    pub monitor: String,
    pub request: String,
    pub target_service: String,
    pub status: String,
}

/// In-process counter store, scraped by the `/metrics` endpoint.
#[derive(Debug, Default)]
pub struct ResponseCounters {
    by_url: DashMap<UrlLabels, u64>,
    by_request: DashMap<RequestLabels, u64>,
}

impl ResponseCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url_count(&self, url: &str, status: Option<u16>) -> u64 {
        let labels = UrlLabels {
            url: url.to_string(),
            status: status_label(status),
        };
        self.by_url.get(&labels).map(|c| *c).unwrap_or(0)
    }

    pub fn request_count(&self, monitor: &MonitorKey, request: &str, status: Option<u16>) -> u64 {
        let status = status_label(status);
        let monitor = monitor.to_string();
        self.by_request
            .iter()
            .filter(|e| e.key().monitor == monitor && e.key().request == request && e.key().status == status)
            .map(|e| *e.value())
            .sum()
    }

    /// Snapshot of the per-URL counters, sorted by labels.
    pub fn url_counters(&self) -> Vec<(UrlLabels, u64)> {
        let mut out: Vec<_> = self
            .by_url
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        out.sort();
        out
    }

    /// Snapshot of the per-request counters, sorted by labels.
    pub fn request_counters(&self) -> Vec<(RequestLabels, u64)> {
        let mut out: Vec<_> = self
            .by_request
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        out.sort();
        out
    }
}

impl MetricsSink for ResponseCounters {
    fn record(&self, record: &ResponseRecord<'_>) {
        let status = record.status_label();
        *self
            .by_url
            .entry(UrlLabels {
                url: record.url.to_string(),
                status: status.clone(),
            })
            .or_insert(0) += 1;
        *self
            .by_request
            .entry(RequestLabels {
                monitor: record.monitor.to_string(),
                request: record.request.to_string(),
                target_service: record.target_service.to_string(),
                status,
            })
            .or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_url_and_request() {
        let counters = ResponseCounters::new();
        let key = MonitorKey::new("ns", "m");
        let ok = ResponseRecord {
            monitor: &key,
            request: "login",
            target_service: "auth",
            url: "http://auth/login",
            status: Some(200),
        };
        counters.record(&ok);
        counters.record(&ok);
        counters.record(&ResponseRecord {
            status: Some(TRANSPORT_FAILURE_STATUS),
            ..ok.clone()
        });
        counters.record(&ResponseRecord { status: None, ..ok.clone() });

        assert_eq!(counters.url_count("http://auth/login", Some(200)), 2);
        assert_eq!(counters.url_count("http://auth/login", Some(599)), 1);
        assert_eq!(counters.url_count("http://auth/login", None), 1);
        assert_eq!(counters.request_count(&key, "login", Some(200)), 2);
        assert_eq!(counters.request_count(&key, "logout", Some(200)), 0);

        let snapshot = counters.url_counters();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].0.status, "200");
        assert_eq!(counters.request_counters()[0].0.monitor, "ns/m");
    }
}
