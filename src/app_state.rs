use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::generator::ContentGenerator;
use crate::store::Store;
use crate::transmission::TransmissionClient;

/// Shared handles wired up once at binary startup and cloned into every
/// actix-web worker thread, mirroring the teacher's `web::Data<PgPool>`
/// pattern but carrying the trait objects the core depends on alongside it.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub store: Arc<dyn Store>,
    pub generator: Arc<dyn ContentGenerator>,
    pub transmitter: Arc<dyn TransmissionClient>,
    pub config: Config,
}
