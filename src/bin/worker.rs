use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use campaign_engine::config::Config;
use campaign_engine::dispatcher::{in_working_window, Dispatcher};
use campaign_engine::generator::{ContentGenerator, GeminiGenerator, StubGenerator};
use campaign_engine::store::{PgStore, Store};
use campaign_engine::transmission::{SparkPostClient, TransmissionClient};
use sqlx::postgres::PgPoolOptions;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to create pool");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let generator: Arc<dyn ContentGenerator> = match &config.gemini_api_key {
        Some(key) => Arc::new(GeminiGenerator::new(
            key.clone(),
            Duration::from_secs(config.generation_timeout_secs),
        )),
        None => {
            tracing::warn!("GEMINI_API_KEY not set; falling back to stub content generator");
            Arc::new(StubGenerator)
        }
    };

    let transmitter: Arc<dyn TransmissionClient> = Arc::new(SparkPostClient::new(
        config.sparkpost_api_key.clone(),
        Duration::from_secs(config.transmission_timeout_secs),
    ));

    let planner_cfg = config.planner.clone();
    let poll_interval = Duration::from_secs(config.poll_interval_secs);
    let dispatcher = Dispatcher::new(store, generator, transmitter, config);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received; will stop at next loop boundary");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    tracing::info!("campaign-engine worker started, polling every {:?}", poll_interval);

    let mut iteration: u64 = 0;
    while !shutdown.load(Ordering::SeqCst) {
        iteration += 1;

        if !in_working_window(&planner_cfg) {
            sleep(poll_interval).await;
            continue;
        }

        let summary = dispatcher.run_batch().await;
        if summary.claimed > 0 {
            tracing::info!(
                iteration,
                claimed = summary.claimed,
                sent = summary.sent,
                failed = summary.failed,
                skipped_claims = summary.skipped_claims,
                paused_campaigns = summary.paused_campaigns,
                "batch complete"
            );
        }

        sleep(poll_interval).await;
    }

    tracing::info!("worker stopped");
    Ok(())
}
