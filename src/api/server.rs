//! API server setup.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware, RateLimiter},
    routes::create_router,
};
use crate::config::EngineConfig;
use crate::engine::WagerEngine;
use crate::feed::BetFeed;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

pub struct ApiServer {
    config: EngineConfig,
    engine: Arc<WagerEngine>,
    feed: Arc<BetFeed>,
}

impl ApiServer {
    pub fn new(config: EngineConfig, engine: Arc<WagerEngine>, feed: Arc<BetFeed>) -> Self {
        Self {
            config,
            engine,
            feed,
        }
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.create_app();
        let addr = self.socket_addr()?;

        info!("starting fairline API server");
        info!("listen: http://{}", addr);
        info!(
            "house edge: {}bps, stakes [{}, {}] minor, rate window {}ms",
            self.config.wager.house_edge_bps,
            self.config.wager.min_stake_minor,
            self.config.wager.max_stake_minor,
            self.config.wager.rate_limit_window_ms,
        );
        if !self.config.wager.disabled_modes.is_empty() {
            info!(disabled = ?self.config.wager.disabled_modes, "game modes disabled");
        }

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped gracefully");
        Ok(())
    }

    fn create_app(&self) -> axum::Router {
        let state = Arc::new(AppState {
            engine: self.engine.clone(),
            feed: self.feed.clone(),
            limiter: RateLimiter::new(self.config.wager.rate_limit_window_ms),
        });

        create_router(state)
            // Request id first so everything downstream can tag with it.
            .layer(axum::middleware::from_fn(request_id_middleware))
            // CORS before timeout to handle preflight.
            .layer(create_cors_layer(&self.config.server.cors_origins))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.server.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.server.listen_address.parse::<std::net::IpAddr>()?,
            self.config.server.port,
        )))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C signal"),
        _ = terminate => info!("received terminate signal"),
    }
}
