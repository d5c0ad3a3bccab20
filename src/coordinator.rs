//! Launch Coordinator: Stage, Launch, Retry Failed.
//!
//! Grounded in `tasks/generate.py` (metadata-row construction) and
//! `tasks/launch.py` (planning + persistence), reimplemented against the
//! [`Store`] trait instead of direct Supabase calls.

use std::sync::Arc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain_pool;
use crate::models::{CampaignStatus, NewQueueItem, PlanInput, QueueItem, RecipientMetadata};
use crate::planner::{self, Commitments};
use crate::render::replace_variables;
use crate::scheduling::PlannerConfig;
use crate::store::Store;

const INSERT_CHUNK: usize = 100;

/// Sets `staged_count`/`queued_count` (whichever `column` names) on a work
/// item to the running total processed so far. Best-effort: a failure here
/// only degrades the progress endpoint, not the Stage/Launch job itself.
async fn bump_progress(pool: &PgPool, work_item_id: Uuid, column: &str, count: i32) {
    let sql = format!("UPDATE work_items SET {column} = $2 WHERE id = $1");
    if let Err(err) = sqlx::query(&sql)
        .bind(work_item_id)
        .bind(count)
        .execute(pool)
        .await
    {
        tracing::warn!(error = %err, %work_item_id, "failed to update work item progress");
    }
}

/// One contact's raw detail fields plus the campaign-scoped email selected
/// for this send. Supplied by whatever recipient source the caller is
/// iterating (a CSV import, a CRM sync) — the coordinator only needs the
/// flattened shape below.
#[derive(Debug, Clone)]
pub struct ContactRecord {
    pub contact_name: String,
    pub company: String,
    pub role: String,
    pub location: String,
    pub details: std::collections::BTreeMap<String, String>,
    pub selected_email: String,
}

/// Builds the per-recipient metadata mapping: every `details` key, the
/// canonical `Name/Email/Company/Role/Location` keys, a `FirstName`/
/// `LastName` split of `Name`, with lowercase duplicates of the canonical
/// keys removed. Mirrors `generate.py`'s `row` construction exactly.
pub fn build_metadata(contact: &ContactRecord) -> RecipientMetadata {
    let mut row = contact.details.clone();

    for key in ["name", "email", "company", "role", "location"] {
        row.remove(key);
    }

    row.insert("Name".into(), contact.contact_name.clone());
    row.insert("Email".into(), contact.selected_email.clone());
    row.insert("Company".into(), contact.company.clone());
    row.insert("Role".into(), contact.role.clone());
    row.insert("Location".into(), contact.location.clone());

    let trimmed = contact.contact_name.trim();
    let (first, last) = if trimmed.is_empty() {
        (String::new(), String::new())
    } else {
        match trimmed.split_once(' ') {
            Some((f, l)) => (f.to_string(), l.to_string()),
            None => (trimmed.to_string(), String::new()),
        }
    };
    row.insert("FirstName".into(), first);
    row.insert("LastName".into(), last);

    RecipientMetadata(row)
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("campaign not found")]
    NotFound,
    #[error("campaign {0} is not in draft or staged status")]
    InvalidPrecondition(Uuid),
    #[error("store error: {0}")]
    Store(String),
}

/// Stage ("Generate"): rebuild a campaign's staged queue items from scratch.
/// On any failure, best-effort reverts the campaign to `draft`.
pub async fn stage(
    store: &Arc<dyn Store>,
    campaign_id: Uuid,
    subject_content: &str,
    contacts: &[ContactRecord],
    work_item_id: Uuid,
    pool: &PgPool,
) -> Result<usize, CoordinatorError> {
    let campaign = store
        .get_campaign(campaign_id)
        .await
        .map_err(CoordinatorError::Store)?
        .ok_or(CoordinatorError::NotFound)?;

    if !matches!(
        campaign.status(),
        CampaignStatus::Draft | CampaignStatus::Staged
    ) {
        return Err(CoordinatorError::InvalidPrecondition(campaign_id));
    }

    let result = stage_inner(store, campaign_id, subject_content, contacts, work_item_id, pool).await;

    if result.is_err() {
        let _ = store
            .update_campaign_status_if(campaign_id, campaign.status().as_str(), CampaignStatus::Draft.as_str())
            .await;
    }

    result
}

async fn stage_inner(
    store: &Arc<dyn Store>,
    campaign_id: Uuid,
    subject_content: &str,
    contacts: &[ContactRecord],
    work_item_id: Uuid,
    pool: &PgPool,
) -> Result<usize, CoordinatorError> {
    store
        .delete_staged(campaign_id)
        .await
        .map_err(CoordinatorError::Store)?;

    let mut new_items = Vec::with_capacity(contacts.len());
    for contact in contacts {
        if contact.selected_email.trim().is_empty() {
            continue;
        }
        let metadata = build_metadata(contact);
        let subject = replace_variables(subject_content, &metadata);
        new_items.push(NewQueueItem {
            campaign_id,
            to_email: contact.selected_email.clone(),
            subject,
            metadata,
        });
    }

    let total = new_items.len();
    let mut staged_so_far = 0i32;
    for chunk in new_items.chunks(INSERT_CHUNK) {
        store
            .insert_many(chunk)
            .await
            .map_err(CoordinatorError::Store)?;
        staged_so_far += chunk.len() as i32;
        bump_progress(pool, work_item_id, "staged_count", staged_so_far).await;
    }

    store
        .set_total_recipients(campaign_id, total as i32)
        .await
        .map_err(CoordinatorError::Store)?;

    store
        .update_campaign_status_if(
            campaign_id,
            CampaignStatus::Draft.as_str(),
            CampaignStatus::Staged.as_str(),
        )
        .await
        .map_err(CoordinatorError::Store)?;
    // If the campaign was already `staged` (re-running Stage), the above
    // conditional update is a no-op; that's fine, the status is already
    // where we want it.

    Ok(total)
}

/// Launch: plan schedules for staged items and transition the campaign to
/// `scheduled`.
pub async fn launch(
    store: &Arc<dyn Store>,
    campaign_id: Uuid,
    planner_cfg: &PlannerConfig,
    work_item_id: Uuid,
    pool: &PgPool,
) -> Result<usize, CoordinatorError> {
    let campaign = store
        .get_campaign(campaign_id)
        .await
        .map_err(CoordinatorError::Store)?
        .ok_or(CoordinatorError::NotFound)?;

    if !matches!(
        campaign.status(),
        CampaignStatus::Draft | CampaignStatus::Staged
    ) {
        return Err(CoordinatorError::InvalidPrecondition(campaign_id));
    }

    let staged = store
        .staged_items(campaign_id)
        .await
        .map_err(CoordinatorError::Store)?;

    let queued = plan_and_persist(
        store,
        &campaign,
        staged,
        planner_cfg,
        Some((work_item_id, pool)),
    )
    .await?;

    store
        .update_campaign_status_if(
            campaign_id,
            campaign.status().as_str(),
            CampaignStatus::Scheduled.as_str(),
        )
        .await
        .map_err(CoordinatorError::Store)?;

    Ok(queued)
}

/// Retry Failed: identical to Launch but over `failed` items, additionally
/// clearing `error_message` (handled by `Store::reschedule`).
pub async fn retry_failed(
    store: &Arc<dyn Store>,
    campaign_id: Uuid,
    planner_cfg: &PlannerConfig,
) -> Result<usize, CoordinatorError> {
    let campaign = store
        .get_campaign(campaign_id)
        .await
        .map_err(CoordinatorError::Store)?
        .ok_or(CoordinatorError::NotFound)?;

    let failed = store
        .failed_items(campaign_id)
        .await
        .map_err(CoordinatorError::Store)?;

    // Retry Failed has no work item of its own (it runs synchronously from
    // the API handler), so there is no progress counter to bump here.
    plan_and_persist(store, &campaign, failed, planner_cfg, None).await
}

async fn plan_and_persist(
    store: &Arc<dyn Store>,
    campaign: &crate::models::Campaign,
    items: Vec<QueueItem>,
    planner_cfg: &PlannerConfig,
    progress: Option<(Uuid, &PgPool)>,
) -> Result<usize, CoordinatorError> {
    if items.is_empty() {
        return Ok(0);
    }

    let plan_inputs: Vec<PlanInput> = items
        .iter()
        .map(|item| planner::input(item.id, item.domain_index))
        .collect();

    let mut commitments: Commitments = store
        .snapshot_domain_commitments()
        .await
        .map_err(CoordinatorError::Store)?;

    let assignments = planner::plan(
        &plan_inputs,
        domain_pool::pool_size(),
        &mut commitments,
        planner_cfg,
    );

    let mut queued_so_far = 0i32;
    for chunk in assignments.chunks(INSERT_CHUNK) {
        for assignment in chunk {
            let from_email = domain_pool::from_email(campaign.sender(), assignment.domain_index as usize)
                .ok_or_else(|| {
                    CoordinatorError::Store(format!(
                        "domain_index {} out of range of the pool",
                        assignment.domain_index
                    ))
                })?;

            store
                .reschedule(
                    assignment.id,
                    assignment.scheduled_for,
                    assignment.domain_index,
                    &from_email,
                )
                .await
                .map_err(CoordinatorError::Store)?;
        }
        queued_so_far += chunk.len() as i32;
        if let Some((work_item_id, pool)) = progress {
            bump_progress(pool, work_item_id, "queued_count", queued_so_far).await;
        }
    }

    Ok(assignments.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn metadata_splits_first_and_last_name() {
        let contact = ContactRecord {
            contact_name: "Ada Lovelace".into(),
            company: "Analytical Engines".into(),
            role: "Engineer".into(),
            location: "London".into(),
            details: BTreeMap::new(),
            selected_email: "ada@example.com".into(),
        };
        let row = build_metadata(&contact);
        assert_eq!(row.get("FirstName"), Some("Ada"));
        assert_eq!(row.get("LastName"), Some("Lovelace"));
        assert_eq!(row.get("Email"), Some("ada@example.com"));
    }

    #[test]
    fn metadata_single_word_name_has_empty_last_name() {
        let contact = ContactRecord {
            contact_name: "Plato".into(),
            company: String::new(),
            role: String::new(),
            location: String::new(),
            details: BTreeMap::new(),
            selected_email: "plato@example.com".into(),
        };
        let row = build_metadata(&contact);
        assert_eq!(row.get("FirstName"), Some("Plato"));
        assert_eq!(row.get("LastName"), Some(""));
    }

    #[test]
    fn metadata_removes_lowercase_duplicates() {
        let mut details = BTreeMap::new();
        details.insert("name".into(), "stale".into());
        details.insert("custom_field".into(), "kept".into());
        let contact = ContactRecord {
            contact_name: "Grace Hopper".into(),
            company: "Navy".into(),
            role: "Admiral".into(),
            location: "DC".into(),
            details,
            selected_email: "grace@example.com".into(),
        };
        let row = build_metadata(&contact);
        assert_eq!(row.get("name"), None);
        assert_eq!(row.get("custom_field"), Some("kept"));
        assert_eq!(row.get("Name"), Some("Grace Hopper"));
    }
}
