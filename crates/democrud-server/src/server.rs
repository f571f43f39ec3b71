use std::net::SocketAddr;

use axum::{
    Router, middleware,
    routing::get,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::users::{UserService, UserServiceOptions};
use crate::{config::AppConfig, handlers, middleware as app_middleware};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
}

pub struct DemoCrudServer {
    addr: SocketAddr,
    app: Router,
}

pub fn build_app(cfg: &AppConfig, state: AppState) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        // Users
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/error", get(handlers::forced_error))
        .with_state(state)
        // Middleware stack (order: request id -> cors/trace -> body limit)
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    config: AppConfig,
    state: Option<AppState>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            state: None,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Use prebuilt state instead of connecting the stores named in the config.
    pub fn with_state(mut self, state: AppState) -> Self {
        self.state = Some(state);
        self
    }

    pub async fn build(self) -> anyhow::Result<DemoCrudServer> {
        let addr = self.config.addr()?;
        let state = match self.state {
            Some(state) => state,
            None => build_state(&self.config).await?,
        };
        let app = build_app(&self.config, state);

        Ok(DemoCrudServer { addr, app })
    }
}

/// Connects the cache and the record store and wires the coordinator.
pub async fn build_state(cfg: &AppConfig) -> anyhow::Result<AppState> {
    let cache = crate::create_cache_backend(&cfg.redis).await;
    let store = crate::create_record_store(&cfg.storage).await?;

    tracing::info!(
        store = store.backend_name(),
        cache = %cache.stats().mode,
        users_ttl_secs = cfg.cache.users_ttl_secs,
        degrade_on_error = cfg.cache.degrade_on_error,
        "user service ready"
    );

    let users = UserService::new(
        store,
        cache,
        UserServiceOptions {
            users_ttl: cfg.users_ttl(),
            store_timeout: cfg.store_timeout(),
            degrade_on_error: cfg.cache.degrade_on_error,
        },
    );
    Ok(AppState { users })
}

impl DemoCrudServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
