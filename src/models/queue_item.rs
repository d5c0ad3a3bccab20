use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Staged,
    Queued,
    Processing,
    Sent,
    Failed,
}

impl QueueItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueItemStatus::Staged => "staged",
            QueueItemStatus::Queued => "queued",
            QueueItemStatus::Processing => "processing",
            QueueItemStatus::Sent => "sent",
            QueueItemStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "staged" => Some(QueueItemStatus::Staged),
            "queued" => Some(QueueItemStatus::Queued),
            "processing" => Some(QueueItemStatus::Processing),
            "sent" => Some(QueueItemStatus::Sent),
            "failed" => Some(QueueItemStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The per-recipient metadata row used for subject/variable substitution and
/// handed to the content generator, verbatim.
///
/// A flat string->string map rather than `serde_json::Value` because every
/// consumer (variable substitution, AI prompt building) wants plain string
/// values — see `Campaign`'s staging step in `coordinator.rs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientMetadata(pub BTreeMap<String, String>);

impl RecipientMetadata {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.0.remove(key);
    }
}

/// The central queue entity: one row per recipient per campaign.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueueItem {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub to_email: String,
    pub from_email: Option<String>,
    pub subject: String,
    pub body: String,
    pub status: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub domain_index: Option<i32>,
    pub metadata: serde_json::Value,
    pub is_edited: bool,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn status(&self) -> QueueItemStatus {
        QueueItemStatus::from_str(&self.status).unwrap_or(QueueItemStatus::Staged)
    }

    pub fn metadata(&self) -> RecipientMetadata {
        serde_json::from_value(self.metadata.clone()).unwrap_or_default()
    }

    /// Invariant (spec §3): queued/processing/sent/failed rows always carry
    /// a schedule, domain and from-address; staged rows never do; `sent_at`
    /// is non-null iff `status = sent`.
    pub fn invariants_hold(&self) -> bool {
        let sent_at_ok = (self.status() == QueueItemStatus::Sent) == self.sent_at.is_some();
        sent_at_ok
            && match self.status() {
                QueueItemStatus::Staged => {
                    self.scheduled_for.is_none() && self.domain_index.is_none()
                }
                QueueItemStatus::Queued
                | QueueItemStatus::Processing
                | QueueItemStatus::Sent
                | QueueItemStatus::Failed => {
                    self.scheduled_for.is_some()
                        && self.domain_index.is_some()
                        && self.from_email.is_some()
                }
            }
    }
}

/// A freshly staged row, not yet assigned a schedule. Constructed by the
/// Launch Coordinator's Stage operation and handed to the store's
/// `insert_many`.
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub campaign_id: Uuid,
    pub to_email: String,
    pub subject: String,
    pub metadata: RecipientMetadata,
}

/// A planning-ready reference to an existing queue row: its id, and (for the
/// retry path) the domain it was previously pinned to.
#[derive(Debug, Clone, Copy)]
pub struct PlanInput {
    pub id: Uuid,
    pub existing_domain_index: Option<i32>,
}

/// The Planner's output for one queue item. `from_email` is derived by the
/// caller from `domain_index` and the campaign's sender — the Planner
/// itself only assigns domain and time.
#[derive(Debug, Clone, Copy)]
pub struct PlanAssignment {
    pub id: Uuid,
    pub domain_index: i32,
    pub scheduled_for: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: QueueItemStatus, scheduled: bool) -> QueueItem {
        QueueItem {
            id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            to_email: "a@example.com".into(),
            from_email: if scheduled { Some("b@example.com".into()) } else { None },
            subject: "hi".into(),
            body: String::new(),
            status: status.as_str().into(),
            scheduled_for: if scheduled { Some(Utc::now()) } else { None },
            domain_index: if scheduled { Some(0) } else { None },
            metadata: serde_json::json!({}),
            is_edited: false,
            error_message: None,
            sent_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn staged_invariant_requires_null_schedule() {
        assert!(item(QueueItemStatus::Staged, false).invariants_hold());
        assert!(!item(QueueItemStatus::Staged, true).invariants_hold());
    }

    #[test]
    fn queued_invariant_requires_schedule() {
        assert!(item(QueueItemStatus::Queued, true).invariants_hold());
        assert!(!item(QueueItemStatus::Queued, false).invariants_hold());
    }
}
