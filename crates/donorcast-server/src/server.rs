use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router, middleware,
    routing::{get, post},
};
use donorcast_api::ApiError;
use donorcast_notifications::{NotificationContext, NotificationError, NotificationService};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    bootstrap::{BootstrapError, build_context},
    config::AppConfig,
    handlers, middleware as app_middleware,
};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NotificationService>,
    pub expose_upstream_errors: bool,
}

impl AppState {
    pub fn new(ctx: NotificationContext, cfg: &AppConfig) -> Self {
        let service = NotificationService::new(ctx)
            .with_history_limits(cfg.history.default_limit, cfg.history.max_limit);
        Self {
            service: Arc::new(service),
            expose_upstream_errors: cfg.server.expose_upstream_errors,
        }
    }

    /// Log a domain error and turn it into the response error.
    pub(crate) fn fail(&self, err: NotificationError) -> ApiError {
        if err.is_upstream() {
            tracing::error!(error = %err, "Upstream call failed");
        } else {
            tracing::debug!(error = %err, "Request rejected");
        }
        ApiError::from_notification(err, self.expose_upstream_errors)
    }
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        .route("/health", get(handlers::health))
        // Tokens and sends
        .route("/save-fcm-token", post(handlers::save_fcm_token))
        .route("/send-notification", post(handlers::send_notification))
        .route(
            "/send-notification-to-multiple",
            post(handlers::send_notification_to_multiple),
        )
        .route(
            "/send-notification-by-topic",
            post(handlers::send_notification_by_topic),
        )
        .route(
            "/blood-request-notification",
            post(handlers::blood_request_notification),
        )
        // Topic subscriptions
        .route("/subscribe-to-topic", post(handlers::subscribe_to_topic))
        .route(
            "/unsubscribe-from-topic",
            post(handlers::unsubscribe_from_topic),
        )
        .route(
            "/get-user-notifications",
            get(handlers::get_user_notifications),
        )
        .fallback(handlers::not_found)
        .with_state(state)
        // Layers run outermost last: body limit -> request id -> trace -> cors
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
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct DonorcastServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    context: Option<NotificationContext>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            context: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Use these collaborators instead of the ones the config names
    pub fn with_context(mut self, ctx: NotificationContext) -> Self {
        self.context = Some(ctx);
        self
    }

    pub async fn build(self) -> Result<DonorcastServer, BootstrapError> {
        let ctx = match self.context {
            Some(ctx) => ctx,
            None => build_context(&self.config).await?,
        };
        let app = build_app(AppState::new(ctx, &self.config), &self.config);

        Ok(DonorcastServer {
            addr: self.addr,
            app,
        })
    }
}

impl DonorcastServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

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
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
