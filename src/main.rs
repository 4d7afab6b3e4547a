mod api;
mod auth;
mod billing;
mod config;
mod errors;
mod generation;
mod openapi;
mod storage;
mod types;

#[cfg(test)]
mod test_utils;

use crate::{
    billing::offers::OfferTable,
    generation::{sessions::ChatSessions, GenerationBackend, HttpGenerator, UnconfiguredGenerator},
    openapi::ApiDoc,
    storage::{postgres::PgStore, CreditLedger, NewUser, UserStore},
};
use auth::password;
use axum::{
    http::{Request, Response},
    routing::{get, post},
    Router,
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use clap::Parser;
use config::{Args, Config};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn, Span};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

pub use types::UserId;

#[derive(Clone, Builder)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub ledger: Arc<dyn CreditLedger>,
    pub generator: Arc<dyn GenerationBackend>,
    pub sessions: Arc<ChatSessions>,
    pub offers: OfferTable,
    pub config: Config,
}

/// Create the initial admin account if configured and missing. An existing
/// account gets its password updated so the configured credentials always
/// work.
pub async fn create_initial_admin_user(config: &Config, users: &dyn UserStore) -> anyhow::Result<()> {
    let (Some(email), Some(admin_password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };

    let password_hash = password::hash_string(admin_password).map_err(|e| anyhow::anyhow!("{e}"))?;
    match users.get_user_by_email(email).await? {
        Some(existing) => {
            users.update_password(existing.id, &password_hash).await?;
            debug!(%email, "admin account already exists, password refreshed");
        }
        None => {
            users
                .create_user(&NewUser {
                    email: email.clone(),
                    password_hash,
                    display_name: Some("Admin".to_string()),
                })
                .await?;
            info!(%email, "created initial admin account");
        }
    }
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Accounts
        .route("/auth/register", post(api::handlers::auth::register))
        .route("/auth/login", post(api::handlers::auth::login))
        .route("/auth/check-access", get(api::handlers::auth::check_access))
        .route("/auth/update-profile", post(api::handlers::auth::update_profile))
        .route("/auth/update-avatar", post(api::handlers::auth::update_avatar))
        .route("/auth/change-password", post(api::handlers::auth::change_password))
        // Vendor webhooks
        .route("/webhook/purchase", post(api::handlers::webhooks::purchase))
        // Credits
        .route("/credits/balance", get(api::handlers::credits::balance))
        .route("/credits/use", post(api::handlers::credits::use_credits))
        .route("/credits/transactions", get(api::handlers::credits::list_transactions))
        // Generation (each charges its credit cost before calling upstream)
        .route("/chat", post(api::handlers::generation::chat))
        .route("/prompt", post(api::handlers::generation::prompt))
        .route("/image", post(api::handlers::generation::image))
        .route("/video", post(api::handlers::generation::video))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(|response: &Response<_>, latency: Duration, _span: &Span| {
                    tracing::info!(
                        status = %response.status(),
                        latency = ?latency,
                        "request completed"
                    );
                }),
        )
        .with_state(state.clone());

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api", api_routes)
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/api/docs"))
        .layer(CorsLayer::permissive());

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    router
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with environment filter
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args)?;
    debug!("Starting with configuration: {:#?}", config);

    let pool = PgPool::connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    create_initial_admin_user(&config, store.as_ref()).await?;

    let generator: Arc<dyn GenerationBackend> = match &config.generator_url {
        Some(url) => Arc::new(HttpGenerator::new(url.clone(), config.generator_api_key.clone())),
        None => {
            warn!("no generator_url configured; generation endpoints will return 502");
            Arc::new(UnconfiguredGenerator)
        }
    };

    if config.webhook_secret.is_none() {
        warn!("no webhook_secret configured; webhook signatures will NOT be verified");
    }

    let state = AppState::builder()
        .users(store.clone() as Arc<dyn UserStore>)
        .ledger(store as Arc<dyn CreditLedger>)
        .generator(generator)
        .sessions(Arc::new(ChatSessions::new(config.session_ttl)))
        .offers(OfferTable::new(config.offers.clone()))
        .config(config.clone())
        .build();

    let router = build_router(state);

    let bind_addr = config.bind_address();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("aigate listening on http://{bind_addr}");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
