use actix_web::{web, HttpResponse};
use campaign_engine::coordinator::{self, ContactRecord};
use campaign_engine::models::Campaign;
use campaign_engine::reconciler;
use campaign_engine::app_state::AppState;
use serde::Deserialize;
use uuid::Uuid;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/campaigns")
            .route("", web::get().to(list_campaigns))
            .route("/{id}", web::get().to(get_campaign))
            .route("/{id}/stage", web::post().to(stage_campaign))
            .route("/{id}/launch", web::post().to(launch_campaign))
            .route("/{id}/retry-failed", web::post().to(retry_failed))
            .route("/{id}/pause", web::post().to(pause_campaign)),
    );
}

async fn list_campaigns(state: web::Data<AppState>) -> Result<HttpResponse, actix_web::Error> {
    let campaigns = sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns ORDER BY created_at DESC")
        .fetch_all(&state.pool)
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    for campaign in &campaigns {
        reconciler::reconcile(&state.store, campaign)
            .await
            .map_err(actix_web::error::ErrorInternalServerError)?;
    }

    // Re-read after reconciliation so the response reflects any transitions.
    let campaigns = sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns ORDER BY created_at DESC")
        .fetch_all(&state.pool)
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(campaigns))
}

async fn get_campaign(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, actix_web::Error> {
    let id = path.into_inner();
    reconciler::reconcile_by_id(&state.store, id)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    match state
        .store
        .get_campaign(id)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?
    {
        Some(campaign) => Ok(HttpResponse::Ok().json(campaign)),
        None => Ok(HttpResponse::NotFound().finish()),
    }
}

#[derive(Deserialize)]
pub struct StageRequest {
    pub subject_content: String,
    pub contacts: Vec<ContactRequest>,
}

#[derive(Deserialize)]
pub struct ContactRequest {
    pub contact_name: String,
    pub company: String,
    pub role: String,
    pub location: String,
    pub details: std::collections::BTreeMap<String, String>,
    pub selected_email: String,
}

impl From<ContactRequest> for ContactRecord {
    fn from(r: ContactRequest) -> Self {
        ContactRecord {
            contact_name: r.contact_name,
            company: r.company,
            role: r.role,
            location: r.location,
            details: r.details,
            selected_email: r.selected_email,
        }
    }
}

/// Returns `202 Accepted` with a work-item id; staging runs out of band and
/// is polled through `GET /campaigns/{id}/work-items/{work_item_id}`.
async fn stage_campaign(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    payload: web::Json<StageRequest>,
) -> Result<HttpResponse, actix_web::Error> {
    let campaign_id = path.into_inner();
    let work_item_id = crate::api::work_items::create(&state.pool, campaign_id, "stage")
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let store = state.store.clone();
    let pool = state.pool.clone();
    let StageRequest { subject_content, contacts } = payload.into_inner();
    let contacts: Vec<ContactRecord> = contacts.into_iter().map(Into::into).collect();

    tokio::spawn(async move {
        let result = coordinator::stage(&store, campaign_id, &subject_content, &contacts, work_item_id, &pool).await;
        crate::api::work_items::finish(&pool, work_item_id, "stage", result.map(|n| n as i32).map_err(|e| e.to_string())).await;
    });

    Ok(HttpResponse::Accepted().json(serde_json::json!({ "work_item_id": work_item_id })))
}

async fn launch_campaign(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, actix_web::Error> {
    let campaign_id = path.into_inner();
    let work_item_id = crate::api::work_items::create(&state.pool, campaign_id, "launch")
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let store = state.store.clone();
    let pool = state.pool.clone();
    let planner_cfg = state.config.planner.clone();

    tokio::spawn(async move {
        let result = coordinator::launch(&store, campaign_id, &planner_cfg, work_item_id, &pool).await;
        crate::api::work_items::finish(&pool, work_item_id, "launch", result.map(|n| n as i32).map_err(|e| e.to_string())).await;
    });

    Ok(HttpResponse::Accepted().json(serde_json::json!({ "work_item_id": work_item_id })))
}

async fn retry_failed(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, actix_web::Error> {
    let campaign_id = path.into_inner();
    let planner_cfg = state.config.planner.clone();
    let requeued = coordinator::retry_failed(&state.store, campaign_id, &planner_cfg)
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "requeued": requeued })))
}

async fn pause_campaign(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, actix_web::Error> {
    let campaign_id = path.into_inner();
    let paused = state
        .store
        .pause_campaign(campaign_id, "operator requested pause")
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "paused": paused })))
}
