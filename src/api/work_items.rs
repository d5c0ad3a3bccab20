use actix_web::{web, HttpResponse};
use campaign_engine::app_state::AppState;
use campaign_engine::models::WorkItem;
use sqlx::PgPool;
use uuid::Uuid;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/campaigns/{campaign_id}/work-items")
            .route("/{work_item_id}", web::get().to(get_work_item)),
    );
}

async fn get_work_item(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, actix_web::Error> {
    let (_campaign_id, work_item_id) = path.into_inner();

    let item = sqlx::query_as::<_, WorkItem>("SELECT * FROM work_items WHERE id = $1")
        .bind(work_item_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    match item {
        Some(item) => Ok(HttpResponse::Ok().json(item)),
        None => Ok(HttpResponse::NotFound().finish()),
    }
}

/// Inserts a `running` work item and returns its id. Called by the campaign
/// handlers before spawning the out-of-band stage/launch task.
pub async fn create(pool: &PgPool, campaign_id: Uuid, kind: &str) -> Result<Uuid, String> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO work_items (id, campaign_id, kind, status, staged_count, queued_count, error, created_at, finished_at)
        VALUES ($1, $2, $3, 'running', 0, 0, NULL, NOW(), NULL)
        "#,
    )
    .bind(id)
    .bind(campaign_id)
    .bind(kind)
    .execute(pool)
    .await
    .map_err(|e| e.to_string())?;
    Ok(id)
}

/// The progress column a job `kind` reports through: `stage` fills in
/// `staged_count`, everything else (`launch`, `retry-failed`) fills in
/// `queued_count`.
fn progress_column(kind: &str) -> &'static str {
    match kind {
        "stage" => "staged_count",
        _ => "queued_count",
    }
}

/// Marks a work item `completed` or `failed` once its background task ends,
/// writing the final count into the column matching `kind`.
pub async fn finish(pool: &PgPool, work_item_id: Uuid, kind: &str, result: Result<i32, String>) {
    let outcome = match &result {
        Ok(count) => {
            let column = progress_column(kind);
            let sql = format!(
                "UPDATE work_items SET status = 'completed', {column} = $2, finished_at = NOW() WHERE id = $1"
            );
            sqlx::query(&sql)
                .bind(work_item_id)
                .bind(count)
                .execute(pool)
                .await
        }
        Err(message) => {
            sqlx::query(
                "UPDATE work_items SET status = 'failed', error = $2, finished_at = NOW() WHERE id = $1",
            )
            .bind(work_item_id)
            .bind(message)
            .execute(pool)
            .await
        }
    };

    if let Err(err) = outcome {
        tracing::error!(error = %err, %work_item_id, "failed to finalize work item");
    }
}
