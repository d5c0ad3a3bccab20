//! Completion Reconciler: lazy, read-time, optimistic-locked. Grounded in
//! `routers/campaigns.py`'s `check_and_update_completed_campaign`.

use std::sync::Arc;

use uuid::Uuid;

use crate::models::{Campaign, CampaignStatus, QueueItemStatus};
use crate::store::Store;

/// Invoked whenever a campaign is read (list or detail). Returns the
/// possibly-updated campaign status as observed after reconciliation; never
/// regresses `paused` or `cancelled`.
pub async fn reconcile(store: &Arc<dyn Store>, campaign: &Campaign) -> Result<CampaignStatus, String> {
    let status = campaign.status();

    if !matches!(status, CampaignStatus::Scheduled | CampaignStatus::Sending) {
        return Ok(status);
    }

    let queued = store.count_by_status(campaign.id, QueueItemStatus::Queued).await?;
    let processing = store.count_by_status(campaign.id, QueueItemStatus::Processing).await?;
    if queued + processing > 0 {
        return Ok(status);
    }

    let sent = store.count_by_status(campaign.id, QueueItemStatus::Sent).await?;
    let failed = store.count_by_status(campaign.id, QueueItemStatus::Failed).await?;
    if sent + failed == 0 {
        return Ok(status);
    }

    if store.has_future_pending(campaign.id, chrono::Utc::now()).await? {
        return Ok(status);
    }

    let transitioned = store
        .update_campaign_status_if(campaign.id, status.as_str(), CampaignStatus::Completed.as_str())
        .await?;

    Ok(if transitioned {
        CampaignStatus::Completed
    } else {
        // Someone else moved the status between our read and this write
        // (e.g. paused it); a stale reconciliation is a silent no-op.
        status
    })
}

pub async fn reconcile_by_id(store: &Arc<dyn Store>, campaign_id: Uuid) -> Result<Option<CampaignStatus>, String> {
    match store.get_campaign(campaign_id).await? {
        Some(campaign) => Ok(Some(reconcile(store, &campaign).await?)),
        None => Ok(None),
    }
}
