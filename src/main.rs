use axum::extract::State;
use axum::{http::Method, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod config;
mod engine;
mod errors;
mod handlers;
mod migrate;
mod models;
mod providers;
mod routes;
mod state;
mod store;

use config::{AirtelConfig, AppConfig, MpesaConfig};
use engine::dispatcher::Dispatcher;
use engine::ConversionEngine;
use providers::airtel::AirtelGateway;
use providers::mpesa::MpesaGateway;
use state::AppState;
use store::mongo::MongoStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Failed to load app config: {}", e);
            std::process::exit(1);
        }
    };

    let db = get_db_client(&config).await;

    if let Err(e) = migrate::ensure_indexes(&db).await {
        tracing::error!("❌ Failed to create indexes: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = migrate::seed_default_settings(&db).await {
        tracing::warn!("Failed to seed default settings: {}", e);
    }

    let engine = initialize_engine(&db).await;
    let app_state = AppState::new(db, engine, config.admin_token.clone());

    let app = build_router(app_state);
    start_server(app, &config).await;
}

async fn get_db_client(config: &AppConfig) -> mongodb::Database {
    let client = match mongodb::Client::with_uri_str(&config.database_url).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("❌ Failed to connect to MongoDB: {}", e);
            std::process::exit(1);
        }
    };

    let db = client.database(&config.database_name);
    match db.list_collection_names().await {
        Ok(collections) => {
            tracing::info!("✅ Connected to database: {}", config.database_name);
            tracing::info!("📂 Collections found: {:?}", collections);
        }
        Err(e) => {
            tracing::warn!("Database '{}' may not exist yet: {}", config.database_name, e);
        }
    }

    db
}

async fn initialize_engine(db: &mongodb::Database) -> Arc<ConversionEngine> {
    let store = Arc::new(MongoStore::new(db.clone()));
    let mut dispatcher = Dispatcher::new();

    tracing::info!("🔧 Initializing M-Pesa payout gateway...");
    match MpesaConfig::from_env().and_then(MpesaGateway::new) {
        Ok(gateway) => {
            dispatcher = dispatcher.register(Arc::new(gateway));
            tracing::info!("✅ M-Pesa payout gateway ready");
        }
        Err(e) => {
            tracing::error!("❌ M-Pesa gateway not configured: {}", e);
            tracing::warn!("Safaricom payouts will fail until credentials are set");
        }
    }

    tracing::info!("🔧 Initializing Airtel Money payout gateway...");
    match AirtelConfig::from_env().and_then(AirtelGateway::new) {
        Ok(gateway) => {
            dispatcher = dispatcher.register(Arc::new(gateway));
            tracing::info!("✅ Airtel Money payout gateway ready");
        }
        Err(e) => {
            tracing::error!("❌ Airtel gateway not configured: {}", e);
            tracing::warn!("Airtel payouts will fail until credentials are set");
        }
    }

    Arc::new(ConversionEngine::new(store, dispatcher))
}

fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/api/health", get(api_health_check))
        .nest("/api/conversion", routes::conversion::routes())
        .nest("/api/mpesa", routes::mpesa::routes())
        .nest("/api/airtel", routes::airtel::routes())
        .nest("/api/admin", routes::admin::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

async fn start_server(app: Router, config: &AppConfig) {
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid host/port {}:{}: {}", config.host, config.port, e);
            std::process::exit(1);
        }
    };

    tracing::info!("🚀 Server starting on {}", addr);

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    }
}

async fn root_handler() -> &'static str {
    "🚀 AirCash Airtime Conversion API"
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn api_health_check(State(state): State<AppState>) -> Json<Value> {
    use mongodb::bson::doc;

    let db_status = match state.db.run_command(doc! {"ping": 1}).await {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    Json(json!({
        "status": "healthy",
        "database": db_status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
