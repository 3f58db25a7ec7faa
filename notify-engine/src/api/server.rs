//! API server setup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::database::repositories::NotificationRepository;
use crate::error::{Error, Result};
use crate::notification::NotificationQueueManager;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<NotificationQueueManager>,
    pub repository: Arc<dyn NotificationRepository>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        manager: Arc<NotificationQueueManager>,
        repository: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            manager,
            repository,
            start_time: Instant::now(),
        }
    }
}

pub struct ApiServer {
    bind_address: String,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(bind_address: impl Into<String>, state: AppState) -> Self {
        Self {
            bind_address: bind_address.into(),
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with tracing middleware.
    pub fn build_router(&self) -> Router {
        routes::create_router(self.state.clone()).layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if req.uri().path().starts_with("/api/health") {
                        Span::none()
                    } else {
                        let mut make_span =
                            tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                        use tower_http::trace::MakeSpan;
                        make_span.make_span(req)
                    }
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let on_response =
                            tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO);
                        use tower_http::trace::OnResponse;
                        on_response.on_response(res, latency, span);
                    },
                ),
        )
    }

    /// Serve until the cancellation token fires.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = self
            .bind_address
            .parse()
            .map_err(|e| Error::config(format!("Invalid bind address: {}", e)))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await?;

        Ok(())
    }
}
