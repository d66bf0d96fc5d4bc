//! Append-only audit records.
//!
//! The Integration Log captures every outbound aggregator attempt; the
//! Callback History captures every callback delivery. Both are write-once
//! — entries are pushed and read, never mutated — and keep raw payloads
//! for reconciliation. They are never consulted for control flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregatorId, DealId};

/// One outbound attempt against an aggregator partner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationLogEntry {
    pub id: Uuid,
    pub aggregator_id: AggregatorId,
    pub deal_id: Option<DealId>,
    /// Partner endpoint path that was called.
    pub endpoint: String,
    /// Raw request body as sent.
    pub request_body: String,
    /// Raw response body, if any was received.
    pub response_body: Option<String>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl IntegrationLogEntry {
    /// Whether the partner accepted (2xx with no transport error).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status_code.is_some_and(|c| (200..300).contains(&c))
    }
}

/// Append-only log of aggregator attempts.
#[derive(Debug, Default)]
pub struct IntegrationLog {
    entries: Vec<IntegrationLogEntry>,
}

impl IntegrationLog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append an attempt record. Records are never updated afterwards.
    pub fn append(&mut self, entry: IntegrationLogEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[IntegrationLogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One callback delivery attempt to a merchant or external system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackHistoryEntry {
    pub id: Uuid,
    pub deal_id: DealId,
    pub url: String,
    /// Raw payload as sent.
    pub payload: String,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CallbackHistoryEntry {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status_code.is_some_and(|c| (200..300).contains(&c))
    }
}

/// Append-only history of callback deliveries.
#[derive(Debug, Default)]
pub struct CallbackHistory {
    entries: Vec<CallbackHistoryEntry>,
}

impl CallbackHistory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn append(&mut self, entry: CallbackHistoryEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[CallbackHistoryEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_attempt(status: Option<u16>, error: Option<&str>) -> IntegrationLogEntry {
        IntegrationLogEntry {
            id: Uuid::now_v7(),
            aggregator_id: AggregatorId::new(),
            deal_id: Some(DealId::new()),
            endpoint: "/api/deals".to_string(),
            request_body: r#"{"amount":"1000"}"#.to_string(),
            response_body: status.map(|_| r#"{"accepted":true}"#.to_string()),
            status_code: status,
            error: error.map(String::from),
            latency_ms: 42,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn success_requires_2xx_and_no_error() {
        assert!(make_attempt(Some(200), None).is_success());
        assert!(make_attempt(Some(201), None).is_success());
        assert!(!make_attempt(Some(500), None).is_success());
        assert!(!make_attempt(None, Some("timeout")).is_success());
        assert!(!make_attempt(Some(200), Some("body mismatch")).is_success());
    }

    #[test]
    fn integration_log_appends_in_order() {
        let mut log = IntegrationLog::new();
        assert!(log.is_empty());

        let a = make_attempt(None, Some("timeout"));
        let b = make_attempt(Some(200), None);
        log.append(a.clone());
        log.append(b.clone());

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].id, a.id);
        assert_eq!(log.entries()[1].id, b.id);
        assert!(!log.entries()[0].is_success());
        assert!(log.entries()[1].is_success());
    }

    #[test]
    fn callback_history_records_failures() {
        let mut history = CallbackHistory::new();
        history.append(CallbackHistoryEntry {
            id: Uuid::now_v7(),
            deal_id: DealId::new(),
            url: "https://merchant.example.com/cb".to_string(),
            payload: r#"{"status":"READY"}"#.to_string(),
            status_code: None,
            response_body: None,
            error: Some("connection refused".to_string()),
            created_at: Utc::now(),
        });
        assert_eq!(history.len(), 1);
        assert!(!history.entries()[0].is_success());
    }
}
