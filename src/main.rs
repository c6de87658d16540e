use std::sync::Arc;

use axum::{routing::get, routing::post, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use reachly_api::database::DatabaseManager;
use reachly_api::handlers::{usage, AppState};
use reachly_api::usage::enforcement::LimitEnforcer;
use reachly_api::usage::store::{MemoryUsageStore, PgUsageStore, UsageStore};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Initialize configuration (this loads the config singleton)
    let config = reachly_api::config::config();
    tracing::info!("Starting Reachly usage API in {:?} mode", config.environment);

    // USAGE_STORE=memory runs without Postgres (local development)
    let (db, store): (Option<Arc<DatabaseManager>>, Arc<dyn UsageStore>) =
        if std::env::var("USAGE_STORE").as_deref() == Ok("memory") {
            tracing::warn!("using in-memory usage store; counters reset on restart");
            (None, Arc::new(MemoryUsageStore::new()))
        } else {
            let db = Arc::new(
                DatabaseManager::connect()
                    .await
                    .expect("failed to connect to database"),
            );
            let store = Arc::new(PgUsageStore::new(db.pool()));
            (Some(db), store)
        };

    let db_for_shutdown = db.clone();
    let state = AppState {
        db,
        enforcer: LimitEnforcer::new(store),
    };

    let app = app(state);

    // Allow tests or deployments to override port via env
    let port = std::env::var("REACHLY_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Reachly usage API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server");

    if let Some(db) = db_for_shutdown {
        db.close().await;
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("shutdown signal received, draining connections");
}

fn app(state: AppState) -> Router {
    let config = reachly_api::config::config();

    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(usage_routes())
        .with_state(state);

    if config.api.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }
    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

fn usage_routes() -> Router<AppState> {
    Router::new()
        .route("/api/usage/:tenant", get(usage::usage_get))
        .route("/api/usage/:tenant/check", post(usage::usage_check))
        .route("/api/usage/:tenant/track", post(usage::usage_track))
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Reachly Usage API",
            "version": version,
            "description": "Plan and usage-limit enforcement for the Reachly marketing platform",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "usage": "GET /api/usage/:tenant?plan=<plan>",
                "check": "POST /api/usage/:tenant/check",
                "track": "POST /api/usage/:tenant/track",
            }
        }
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    let db_status = match &state.db {
        None => Ok("memory".to_string()),
        Some(db) => db.health_check().await.map(|_| "ok".to_string()),
    };

    match db_status {
        Ok(status) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": status
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
