use std::env;
use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware as actix_middleware, web, App, HttpServer};
use campaign_engine::app_state::AppState;
use campaign_engine::config::Config;
use campaign_engine::generator::{ContentGenerator, GeminiGenerator, StubGenerator};
use campaign_engine::store::{PgStore, Store};
use campaign_engine::transmission::{SparkPostClient, TransmissionClient};
use sqlx::postgres::PgPoolOptions;

mod api;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));

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

    let state = AppState {
        pool,
        store,
        generator,
        transmitter,
        config,
    };

    tracing::info!("campaign-engine API starting on http://0.0.0.0:8080");

    HttpServer::new(move || {
        let frontend_url = env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let cors = Cors::default()
            .allowed_origin(&frontend_url)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "PATCH"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors)
            .wrap(actix_middleware::Logger::default())
            .service(
                web::scope("/api")
                    .configure(api::campaigns::configure)
                    .configure(api::work_items::configure),
            )
            .route("/health", web::get().to(|| async { "OK" }))
    })
    .bind(("0.0.0.0", 8080))?
    .run()
    .await
}
