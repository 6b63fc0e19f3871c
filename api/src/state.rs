use std::sync::Arc;

use metacoach_engine::Engine;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub engine: Arc<Engine>,
}
