//! Dispatcher Worker: poll loop, batch claim/render/send, per-campaign
//! circuit breaker. Grounded in `campaign-runner/main.py`'s batch loop and
//! the teacher's `JobWorker::run` polling shape
//! (`services/job_queue.rs`).

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::Config;
use crate::generator::ContentGenerator;
use crate::models::{Campaign, CampaignStatus, EmailFormat, QueueItem};
use crate::render::{generate_email_html, generate_email_text, unsubscribe_url};
use crate::store::Store;
use crate::transmission::TransmissionClient;

pub struct Dispatcher {
    store: Arc<dyn Store>,
    generator: Arc<dyn ContentGenerator>,
    transmitter: Arc<dyn TransmissionClient>,
    config: Config,
}

/// Outcome of one batch, surfaced for logging and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchSummary {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped_claims: usize,
    pub paused_campaigns: usize,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn ContentGenerator>,
        transmitter: Arc<dyn TransmissionClient>,
        config: Config,
    ) -> Self {
        Self {
            store,
            generator,
            transmitter,
            config,
        }
    }

    /// Runs one batch: select due items, claim/render/send each in order.
    /// A fresh, batch-scoped failure counter backs the circuit breaker —
    /// it is never carried across batches (spec §4.3.2).
    pub async fn run_batch(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let mut errs: HashMap<Uuid, u32> = HashMap::new();
        let mut paused_this_batch: std::collections::HashSet<Uuid> = std::collections::HashSet::new();

        let due = match self.store.select_due(self.config.batch_size).await {
            Ok(items) => items,
            Err(err) => {
                tracing::error!(error = %err, "failed to select due items; aborting batch");
                return summary;
            }
        };

        for item in due {
            if paused_this_batch.contains(&item.campaign_id) {
                continue;
            }

            match self.store.claim(item.id).await {
                Ok(true) => {}
                Ok(false) => {
                    summary.skipped_claims += 1;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(error = %err, item_id = %item.id, "claim failed; skipping item");
                    continue;
                }
            }
            summary.claimed += 1;

            self.process_claimed_item(item, &mut errs, &mut paused_this_batch, &mut summary)
                .await;
        }

        summary.paused_campaigns = paused_this_batch.len();
        summary
    }

    async fn process_claimed_item(
        &self,
        item: QueueItem,
        errs: &mut HashMap<Uuid, u32>,
        paused_this_batch: &mut std::collections::HashSet<Uuid>,
        summary: &mut BatchSummary,
    ) {
        let campaign = match self.store.get_campaign(item.campaign_id).await {
            Ok(Some(c)) => c,
            Ok(None) | Err(_) => {
                let _ = self
                    .store
                    .finalize_failed(item.id, "owning campaign not found")
                    .await;
                summary.failed += 1;
                return;
            }
        };

        let body = if item.body.is_empty() {
            match self.render_body(&campaign, &item).await {
                Ok(rendered) => {
                    *errs.entry(campaign.id).or_insert(0) = 0;
                    rendered
                }
                Err(message) => {
                    let count = errs.entry(campaign.id).or_insert(0);
                    *count += 1;
                    let _ = self.store.finalize_failed(item.id, &message).await;
                    summary.failed += 1;

                    if *count >= self.config.circuit_threshold {
                        self.trip_circuit_breaker(campaign.id, paused_this_batch).await;
                    }
                    return;
                }
            }
        } else {
            item.body.clone()
        };

        if let Err(err) = self.store.set_body(item.id, &body).await {
            tracing::warn!(error = %err, item_id = %item.id, "failed to persist rendered body");
        }

        let campaign_tag = campaign.campaign_tag();
        let metadata = item.metadata();
        let success = self
            .transmitter
            .send(
                &item.to_email,
                item.from_email.as_deref().unwrap_or_default(),
                &item.subject,
                &body,
                &campaign_tag,
                &metadata.0,
            )
            .await;

        if success {
            let _ = self.store.finalize_sent(item.id).await;
            summary.sent += 1;
        } else {
            let _ = self
                .store
                .finalize_failed(item.id, "transmission API reported failure")
                .await;
            summary.failed += 1;
            // Transmission failures do not increment the generation circuit
            // breaker counter (spec §7: "counter does not increment").
        }
    }

    async fn trip_circuit_breaker(
        &self,
        campaign_id: Uuid,
        paused_this_batch: &mut std::collections::HashSet<Uuid>,
    ) {
        let reason = format!(
            "auto-paused: {} consecutive generation failures in one batch",
            self.config.circuit_threshold
        );
        match self.store.pause_campaign(campaign_id, &reason).await {
            Ok(true) => {
                tracing::warn!(%campaign_id, "circuit breaker tripped; campaign paused");
            }
            Ok(false) => {}
            Err(err) => {
                tracing::error!(error = %err, %campaign_id, "failed to pause campaign after circuit breaker trip");
            }
        }
        paused_this_batch.insert(campaign_id);
    }

    /// JIT rendering (spec §4.3.1): generate personalized sections, render
    /// html/text, return the body. Any generation failure is surfaced as a
    /// plain error string for the caller to record.
    async fn render_body(&self, campaign: &Campaign, item: &QueueItem) -> Result<String, String> {
        let sections = campaign.sections();
        let metadata = item.metadata();

        let needs_generation = sections
            .iter()
            .any(|s| s.mode == crate::models::SectionMode::Personalized);

        let generated = if needs_generation {
            self.generator
                .generate(&sections, &metadata)
                .await
                .map_err(|e| e.to_string())?
        } else {
            HashMap::new()
        };

        // The subject was already variable-substituted at stage time
        // (spec §4.2.1); only the body is rendered just-in-time here.
        let unsub = unsubscribe_url(
            &self.config.app_url,
            &self.config.unsubscribe_secret,
            metadata.get("Email").unwrap_or(&item.to_email),
        );

        let body = match campaign.email_format() {
            EmailFormat::Html => {
                generate_email_html(&sections, &item.subject, &metadata, &generated, &unsub)
            }
            EmailFormat::Text => {
                generate_email_text(&sections, &metadata, &generated, &unsub)
            }
        };

        Ok(body)
    }
}

/// `true` when the dispatcher should run a batch right now: either working
/// hours are disabled entirely, or the current instant falls in the
/// campaign-agnostic [`PlannerConfig`] working window in its configured zone.
pub fn in_working_window(cfg: &crate::scheduling::PlannerConfig) -> bool {
    if cfg.disable_working_hours {
        return true;
    }
    use chrono::{Datelike, Timelike};
    let now = chrono::Utc::now().with_timezone(&cfg.timezone);
    let weekday_ok = !cfg.skip_weekends
        || !matches!(now.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun);
    weekday_ok && now.hour() >= cfg.work_start && now.hour() < cfg.work_end
}

pub fn campaign_is_live(status: CampaignStatus) -> bool {
    status.is_dispatchable()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_working_hours_always_live() {
        let cfg = crate::scheduling::PlannerConfig {
            timezone: chrono_tz::America::Los_Angeles,
            work_start: 9,
            work_end: 17,
            interval_minutes: 3.5,
            jitter_max_secs: 30,
            skip_weekends: true,
            disable_working_hours: true,
        };
        assert!(in_working_window(&cfg));
    }
}
