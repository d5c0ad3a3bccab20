use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The two out-of-band operations long enough to need a progress-pollable
/// job instead of a synchronous HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemKind {
    Stage,
    Launch,
}

impl WorkItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemKind::Stage => "stage",
            WorkItemKind::Launch => "launch",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stage" => Some(WorkItemKind::Stage),
            "launch" => Some(WorkItemKind::Launch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Running,
    Completed,
    Failed,
}

impl WorkItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemStatus::Running => "running",
            WorkItemStatus::Completed => "completed",
            WorkItemStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(WorkItemStatus::Running),
            "completed" => Some(WorkItemStatus::Completed),
            "failed" => Some(WorkItemStatus::Failed),
            _ => None,
        }
    }
}

/// Progress record for an async Stage or Launch operation, polled via
/// `GET /api/campaigns/{id}/work-items/{work_item_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkItem {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub kind: String,
    pub status: String,
    pub staged_count: i32,
    pub queued_count: i32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    pub fn kind(&self) -> WorkItemKind {
        WorkItemKind::from_str(&self.kind).unwrap_or(WorkItemKind::Stage)
    }

    pub fn status(&self) -> WorkItemStatus {
        WorkItemStatus::from_str(&self.status).unwrap_or(WorkItemStatus::Running)
    }
}
