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

mod auth;
mod config;
mod error;
mod middleware;
mod oracle;
mod push;
mod queue;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod testing;

use oracle::GeminiOracle;
use push::FcmPush;
use queue::HttpTaskQueue;
use store::PgStore;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tempo API",
        version = "0.1.0",
        description = "Backend for the Tempo productivity app: smart scheduling, analytics, voice-input parsing, and reminder delivery."
    ),
    paths(
        routes::health::health_check,
        routes::schedule::smart_schedule,
        routes::analytics::weekly_analytics,
        routes::voice::parse_voice,
        routes::notifications::test_notification,
        routes::notifications::deliver_reminder,
    ),
    components(schemas(
        HealthResponse,
        routes::schedule::SmartScheduleRequest,
        routes::schedule::SmartScheduleResponse,
        routes::analytics::WeeklyAnalyticsResponse,
        routes::analytics::CategoryCompletion,
        routes::analytics::EisenhowerMatrix,
        routes::voice::ParseVoiceRequest,
        routes::voice::ParseVoiceResponse,
        routes::notifications::TestNotificationRequest,
        routes::notifications::NotificationSentResponse,
        routes::notifications::ReminderPayload,
        tempo_core::error::ApiError,
        tempo_core::model::Task,
        tempo_core::model::ScheduleBlock,
        tempo_core::model::UserPreference,
        tempo_core::model::Category,
        tempo_core::model::TaskDraft,
        tempo_core::model::Plan,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

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
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tempo_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = config::Config::from_env().expect("incomplete configuration");

    // Database connection
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let oracle = GeminiOracle::new(config.gemini()).expect("Failed to build oracle client");
    let queue = HttpTaskQueue::new(config.queue_url.clone());
    let push = FcmPush::new(config.fcm_endpoint.clone(), config.fcm_server_key.clone());
    let port = config.port;

    let app_state = state::AppState {
        store: Arc::new(PgStore::new(pool)),
        oracle: Arc::new(oracle),
        queue: Arc::new(queue),
        push: Arc::new(push),
        config: Arc::new(config),
    };

    // CORS
    let cors_layer = middleware::cors::build_cors_layer();

    // Router with per-endpoint rate limiting on model-backed routes
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::schedule::router().layer(middleware::rate_limit::model_layer()))
        .merge(routes::voice::router().layer(middleware::rate_limit::model_layer()))
        .merge(routes::analytics::router().layer(middleware::rate_limit::read_layer()))
        .merge(routes::notifications::router())
        .merge(routes::notifications::internal_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Tempo API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
