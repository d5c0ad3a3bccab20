use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Active,
    Bounced,
    Unsubscribed,
    SpamComplaint,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientStatus::Active => "active",
            RecipientStatus::Bounced => "bounced",
            RecipientStatus::Unsubscribed => "unsubscribed",
            RecipientStatus::SpamComplaint => "spam_complaint",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(RecipientStatus::Active),
            "bounced" => Some(RecipientStatus::Bounced),
            "unsubscribed" => Some(RecipientStatus::Unsubscribed),
            "spam_complaint" => Some(RecipientStatus::SpamComplaint),
            _ => None,
        }
    }

    /// Recipients in any of these states must never be staged into a
    /// campaign's queue.
    pub fn is_sendable(&self) -> bool {
        matches!(self, RecipientStatus::Active)
    }
}

impl std::fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A campaign-scoped binding of a contact to one of its email addresses.
///
/// A contact can have multiple email addresses on file; which one a given
/// campaign sends to is selected explicitly when the contact is attached,
/// not re-derived later.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipientAttachment {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub contact_id: Uuid,
    pub selected_email: String,
    pub status: String,
    pub bounced_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RecipientAttachment {
    pub fn status(&self) -> RecipientStatus {
        RecipientStatus::from_str(&self.status).unwrap_or(RecipientStatus::Active)
    }
}
