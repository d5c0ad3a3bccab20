use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Campaign, NewQueueItem, QueueItem, QueueItemStatus};
use crate::planner::Commitments;

/// The atomic operations the Planner/Coordinator/Dispatcher/Reconciler need
/// from persistence. Every method returns `Result<_, String>` at this
/// boundary rather than `EngineError` — per-item store failures are recorded
/// inline and the batch continues, matching the propagation policy.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, String>;

    async fn insert_many(&self, items: &[NewQueueItem]) -> Result<usize, String>;

    async fn delete_staged(&self, campaign_id: Uuid) -> Result<u64, String>;

    /// `status: queued -> processing`. Returns whether it affected a row.
    async fn claim(&self, id: Uuid) -> Result<bool, String>;

    async fn finalize_sent(&self, id: Uuid) -> Result<(), String>;

    async fn finalize_failed(&self, id: Uuid, message: &str) -> Result<(), String>;

    async fn set_body(&self, id: Uuid, body: &str) -> Result<(), String>;

    async fn reschedule(
        &self,
        id: Uuid,
        scheduled_for: DateTime<Utc>,
        domain_index: i32,
        from_email: &str,
    ) -> Result<(), String>;

    async fn select_due(&self, limit: i64) -> Result<Vec<QueueItem>, String>;

    async fn staged_items(&self, campaign_id: Uuid) -> Result<Vec<QueueItem>, String>;

    async fn failed_items(&self, campaign_id: Uuid) -> Result<Vec<QueueItem>, String>;

    async fn snapshot_domain_commitments(&self) -> Result<Commitments, String>;

    async fn count_by_status(&self, campaign_id: Uuid, status: QueueItemStatus) -> Result<i64, String>;

    /// Any item in `{queued, processing}` with `scheduled_for > now`.
    async fn has_future_pending(&self, campaign_id: Uuid, now: DateTime<Utc>) -> Result<bool, String>;

    async fn update_campaign_status_if(
        &self,
        campaign_id: Uuid,
        expected: &str,
        new: &str,
    ) -> Result<bool, String>;

    async fn pause_campaign(&self, campaign_id: Uuid, reason: &str) -> Result<bool, String>;

    async fn set_total_recipients(&self, campaign_id: Uuid, total: i32) -> Result<(), String>;

    /// Operator-triggered recovery path for items stuck in `processing` past
    /// a worker crash. Disabled by default, never called from the
    /// Dispatcher's own loop (see DESIGN.md).
    async fn sweep_stuck_processing(&self, older_than: chrono::Duration) -> Result<u64, String>;
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, String> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| e.to_string())
    }

    async fn insert_many(&self, items: &[NewQueueItem]) -> Result<usize, String> {
        let mut inserted = 0usize;
        for chunk in items.chunks(100) {
            let mut tx = self.pool.begin().await.map_err(|e| e.to_string())?;
            for item in chunk {
                let metadata = serde_json::to_value(&item.metadata).map_err(|e| e.to_string())?;
                sqlx::query(
                    r#"
                    INSERT INTO queue_items
                        (id, campaign_id, to_email, from_email, subject, body, status,
                         scheduled_for, domain_index, metadata, is_edited, error_message,
                         sent_at, created_at, updated_at)
                    VALUES
                        ($1, $2, $3, NULL, $4, '', 'staged',
                         NULL, NULL, $5, false, NULL,
                         NULL, NOW(), NOW())
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(item.campaign_id)
                .bind(&item.to_email)
                .bind(&item.subject)
                .bind(metadata)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.to_string())?;
                inserted += 1;
            }
            tx.commit().await.map_err(|e| e.to_string())?;
        }
        Ok(inserted)
    }

    async fn delete_staged(&self, campaign_id: Uuid) -> Result<u64, String> {
        sqlx::query("DELETE FROM queue_items WHERE campaign_id = $1 AND status = 'staged'")
            .bind(campaign_id)
            .execute(&self.pool)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| e.to_string())
    }

    async fn claim(&self, id: Uuid) -> Result<bool, String> {
        sqlx::query(
            "UPDATE queue_items SET status = 'processing', updated_at = NOW() \
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map(|r| r.rows_affected() == 1)
        .map_err(|e| e.to_string())
    }

    async fn finalize_sent(&self, id: Uuid) -> Result<(), String> {
        sqlx::query(
            "UPDATE queue_items SET status = 'sent', sent_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
    }

    async fn finalize_failed(&self, id: Uuid, message: &str) -> Result<(), String> {
        sqlx::query(
            "UPDATE queue_items SET status = 'failed', error_message = $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
    }

    async fn set_body(&self, id: Uuid, body: &str) -> Result<(), String> {
        sqlx::query("UPDATE queue_items SET body = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(body)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        scheduled_for: DateTime<Utc>,
        domain_index: i32,
        from_email: &str,
    ) -> Result<(), String> {
        sqlx::query(
            r#"
            UPDATE queue_items
            SET status = 'queued', scheduled_for = $2, domain_index = $3,
                from_email = $4, error_message = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(scheduled_for)
        .bind(domain_index)
        .bind(from_email)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
    }

    async fn select_due(&self, limit: i64) -> Result<Vec<QueueItem>, String> {
        sqlx::query_as::<_, QueueItem>(
            r#"
            SELECT q.* FROM queue_items q
            JOIN campaigns c ON c.id = q.campaign_id
            WHERE q.status = 'queued' AND q.scheduled_for <= NOW() AND c.status != 'paused'
            ORDER BY q.created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.to_string())
    }

    async fn staged_items(&self, campaign_id: Uuid) -> Result<Vec<QueueItem>, String> {
        sqlx::query_as::<_, QueueItem>(
            "SELECT * FROM queue_items WHERE campaign_id = $1 AND status = 'staged' ORDER BY created_at ASC",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.to_string())
    }

    async fn failed_items(&self, campaign_id: Uuid) -> Result<Vec<QueueItem>, String> {
        sqlx::query_as::<_, QueueItem>(
            "SELECT * FROM queue_items WHERE campaign_id = $1 AND status = 'failed' ORDER BY created_at ASC",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.to_string())
    }

    async fn snapshot_domain_commitments(&self) -> Result<Commitments, String> {
        let rows: Vec<(i32, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT domain_index, MAX(scheduled_for) as scheduled_for
            FROM queue_items
            WHERE status IN ('queued', 'processing') AND domain_index IS NOT NULL
            GROUP BY domain_index
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.to_string())?;

        Ok(rows.into_iter().collect())
    }

    async fn count_by_status(&self, campaign_id: Uuid, status: QueueItemStatus) -> Result<i64, String> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_items WHERE campaign_id = $1 AND status = $2",
        )
        .bind(campaign_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.to_string())
    }

    async fn has_future_pending(&self, campaign_id: Uuid, now: DateTime<Utc>) -> Result<bool, String> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM queue_items
            WHERE campaign_id = $1 AND status IN ('queued', 'processing') AND scheduled_for > $2
            "#,
        )
        .bind(campaign_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.to_string())?;
        Ok(count > 0)
    }

    async fn update_campaign_status_if(
        &self,
        campaign_id: Uuid,
        expected: &str,
        new: &str,
    ) -> Result<bool, String> {
        sqlx::query(
            "UPDATE campaigns SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
        )
        .bind(campaign_id)
        .bind(expected)
        .bind(new)
        .execute(&self.pool)
        .await
        .map(|r| r.rows_affected() == 1)
        .map_err(|e| e.to_string())
    }

    async fn pause_campaign(&self, campaign_id: Uuid, reason: &str) -> Result<bool, String> {
        sqlx::query(
            r#"
            UPDATE campaigns SET status = 'paused', pause_reason = $2, updated_at = NOW()
            WHERE id = $1 AND status != 'paused'
            "#,
        )
        .bind(campaign_id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map(|r| r.rows_affected() == 1)
        .map_err(|e| e.to_string())
    }

    async fn set_total_recipients(&self, campaign_id: Uuid, total: i32) -> Result<(), String> {
        sqlx::query("UPDATE campaigns SET total_recipients = $2, updated_at = NOW() WHERE id = $1")
            .bind(campaign_id)
            .bind(total)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn sweep_stuck_processing(&self, older_than: chrono::Duration) -> Result<u64, String> {
        let cutoff = Utc::now() - older_than;
        sqlx::query(
            "UPDATE queue_items SET status = 'queued', updated_at = NOW() \
             WHERE status = 'processing' AND updated_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map(|r| r.rows_affected())
        .map_err(|e| e.to_string())
    }
}

/// In-process store used by tests that need the full Coordinator/Dispatcher/
/// Reconciler flow without a database.
#[derive(Default)]
pub struct InMemoryStore {
    pub campaigns: Arc<std::sync::Mutex<HashMap<Uuid, Campaign>>>,
    pub items: Arc<std::sync::Mutex<HashMap<Uuid, QueueItem>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_campaign(&self, campaign: Campaign) {
        self.campaigns.lock().unwrap().insert(campaign.id, campaign);
    }

    pub fn insert_item(&self, item: QueueItem) {
        self.items.lock().unwrap().insert(item.id, item);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, String> {
        Ok(self.campaigns.lock().unwrap().get(&id).cloned())
    }

    async fn insert_many(&self, items: &[NewQueueItem]) -> Result<usize, String> {
        let mut guard = self.items.lock().unwrap();
        for item in items {
            let id = Uuid::new_v4();
            let now = Utc::now();
            let metadata = serde_json::to_value(&item.metadata).map_err(|e| e.to_string())?;
            guard.insert(
                id,
                QueueItem {
                    id,
                    campaign_id: item.campaign_id,
                    to_email: item.to_email.clone(),
                    from_email: None,
                    subject: item.subject.clone(),
                    body: String::new(),
                    status: QueueItemStatus::Staged.as_str().into(),
                    scheduled_for: None,
                    domain_index: None,
                    metadata,
                    is_edited: false,
                    error_message: None,
                    sent_at: None,
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Ok(items.len())
    }

    async fn delete_staged(&self, campaign_id: Uuid) -> Result<u64, String> {
        let mut guard = self.items.lock().unwrap();
        let before = guard.len();
        guard.retain(|_, item| {
            !(item.campaign_id == campaign_id && item.status() == QueueItemStatus::Staged)
        });
        Ok((before - guard.len()) as u64)
    }

    async fn claim(&self, id: Uuid) -> Result<bool, String> {
        let mut guard = self.items.lock().unwrap();
        if let Some(item) = guard.get_mut(&id) {
            if item.status() == QueueItemStatus::Queued {
                item.status = QueueItemStatus::Processing.as_str().into();
                item.updated_at = Utc::now();
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn finalize_sent(&self, id: Uuid) -> Result<(), String> {
        if let Some(item) = self.items.lock().unwrap().get_mut(&id) {
            item.status = QueueItemStatus::Sent.as_str().into();
            item.sent_at = Some(Utc::now());
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn finalize_failed(&self, id: Uuid, message: &str) -> Result<(), String> {
        if let Some(item) = self.items.lock().unwrap().get_mut(&id) {
            item.status = QueueItemStatus::Failed.as_str().into();
            item.error_message = Some(message.to_string());
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_body(&self, id: Uuid, body: &str) -> Result<(), String> {
        if let Some(item) = self.items.lock().unwrap().get_mut(&id) {
            item.body = body.to_string();
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        scheduled_for: DateTime<Utc>,
        domain_index: i32,
        from_email: &str,
    ) -> Result<(), String> {
        if let Some(item) = self.items.lock().unwrap().get_mut(&id) {
            item.status = QueueItemStatus::Queued.as_str().into();
            item.scheduled_for = Some(scheduled_for);
            item.domain_index = Some(domain_index);
            item.from_email = Some(from_email.to_string());
            item.error_message = None;
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn select_due(&self, limit: i64) -> Result<Vec<QueueItem>, String> {
        let guard = self.items.lock().unwrap();
        let campaigns = self.campaigns.lock().unwrap();
        let now = Utc::now();
        let mut due: Vec<QueueItem> = guard
            .values()
            .filter(|item| {
                item.status() == QueueItemStatus::Queued
                    && item.scheduled_for.map(|t| t <= now).unwrap_or(false)
                    && campaigns
                        .get(&item.campaign_id)
                        .map(|c| c.status() != crate::models::CampaignStatus::Paused)
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        due.sort_by_key(|item| item.created_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn staged_items(&self, campaign_id: Uuid) -> Result<Vec<QueueItem>, String> {
        let guard = self.items.lock().unwrap();
        let mut items: Vec<QueueItem> = guard
            .values()
            .filter(|i| i.campaign_id == campaign_id && i.status() == QueueItemStatus::Staged)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }

    async fn failed_items(&self, campaign_id: Uuid) -> Result<Vec<QueueItem>, String> {
        let guard = self.items.lock().unwrap();
        let mut items: Vec<QueueItem> = guard
            .values()
            .filter(|i| i.campaign_id == campaign_id && i.status() == QueueItemStatus::Failed)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }

    async fn snapshot_domain_commitments(&self) -> Result<Commitments, String> {
        let guard = self.items.lock().unwrap();
        let mut commitments = Commitments::new();
        for item in guard.values() {
            if matches!(item.status(), QueueItemStatus::Queued | QueueItemStatus::Processing) {
                if let (Some(domain_index), Some(scheduled_for)) =
                    (item.domain_index, item.scheduled_for)
                {
                    let entry = commitments.entry(domain_index).or_insert(scheduled_for);
                    if scheduled_for > *entry {
                        *entry = scheduled_for;
                    }
                }
            }
        }
        Ok(commitments)
    }

    async fn count_by_status(&self, campaign_id: Uuid, status: QueueItemStatus) -> Result<i64, String> {
        let guard = self.items.lock().unwrap();
        Ok(guard
            .values()
            .filter(|i| i.campaign_id == campaign_id && i.status() == status)
            .count() as i64)
    }

    async fn has_future_pending(&self, campaign_id: Uuid, now: DateTime<Utc>) -> Result<bool, String> {
        let guard = self.items.lock().unwrap();
        Ok(guard.values().any(|i| {
            i.campaign_id == campaign_id
                && matches!(i.status(), QueueItemStatus::Queued | QueueItemStatus::Processing)
                && i.scheduled_for.map(|t| t > now).unwrap_or(false)
        }))
    }

    async fn update_campaign_status_if(
        &self,
        campaign_id: Uuid,
        expected: &str,
        new: &str,
    ) -> Result<bool, String> {
        let mut guard = self.campaigns.lock().unwrap();
        if let Some(campaign) = guard.get_mut(&campaign_id) {
            if campaign.status == expected {
                campaign.status = new.to_string();
                campaign.updated_at = Utc::now();
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn pause_campaign(&self, campaign_id: Uuid, reason: &str) -> Result<bool, String> {
        let mut guard = self.campaigns.lock().unwrap();
        if let Some(campaign) = guard.get_mut(&campaign_id) {
            if campaign.status != "paused" {
                campaign.status = "paused".to_string();
                campaign.pause_reason = Some(reason.to_string());
                campaign.updated_at = Utc::now();
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn set_total_recipients(&self, campaign_id: Uuid, total: i32) -> Result<(), String> {
        if let Some(campaign) = self.campaigns.lock().unwrap().get_mut(&campaign_id) {
            campaign.total_recipients = total;
            campaign.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn sweep_stuck_processing(&self, older_than: chrono::Duration) -> Result<u64, String> {
        let cutoff = Utc::now() - older_than;
        let mut guard = self.items.lock().unwrap();
        let mut swept = 0u64;
        for item in guard.values_mut() {
            if item.status() == QueueItemStatus::Processing && item.updated_at < cutoff {
                item.status = QueueItemStatus::Queued.as_str().into();
                item.updated_at = Utc::now();
                swept += 1;
            }
        }
        Ok(swept)
    }
}
