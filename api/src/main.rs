use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod error;
mod routes;
mod state;
mod store;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Metacoach Decision API",
        version = "0.1.0",
        description = "Real-time classification of AI-usage patterns and intervention \
                       decisions. Sits between conversation scoring upstream and the \
                       coaching presentation layer downstream."
    ),
    paths(
        routes::health::health_check,
        routes::turns::classify_turn,
        routes::events::record_event,
        routes::sessions::end_session,
        routes::baseline::get_baseline,
        routes::baseline::delete_baseline,
    ),
    components(schemas(
        HealthResponse,
        routes::turns::TurnRequest,
        routes::turns::TurnContextRequest,
        routes::turns::TurnResponse,
        routes::events::InterventionEventRequest,
        routes::events::InterventionEventResponse,
        routes::sessions::EndSessionResponse,
        routes::baseline::BaselineDeletedResponse,
        metacoach_core::error::ApiError,
        metacoach_core::pattern::Pattern,
        metacoach_core::pattern::PatternEstimate,
        metacoach_core::pattern::EstimateProvenance,
        metacoach_core::decision::EscalationTier,
        metacoach_core::decision::TrendDirection,
        metacoach_core::decision::StabilityMetrics,
        metacoach_core::decision::FatigueSnapshot,
        metacoach_core::decision::InterventionDecision,
        metacoach_core::decision::InterventionAction,
        metacoach_core::baseline::BaselineStatus,
        metacoach_core::baseline::DriftKind,
        metacoach_core::baseline::UserBaseline,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "metacoach_api=debug,metacoach_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Database connection
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let app_state = state::AppState {
        db: pool,
        engine: Arc::new(metacoach_engine::Engine::from_env()),
    };

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::turns::router())
        .merge(routes::events::router())
        .merge(routes::sessions::router())
        .merge(routes::baseline::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metacoach API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");
    axum::serve(listener, app)
        .await
        .expect("Server error");
}
