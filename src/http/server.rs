//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap an application router with the security middleware
//! - Wire up tower layers (request ID, tracing, timeout)
//! - Run the idle-bucket sweeper and apply threat policy reloads
//! - Serve with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::HeaderName, middleware, Router};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::audit::AuditSink;
use crate::config::{ConfigError, ShieldConfig};
use crate::http::middleware::{shield_middleware, ShieldState};
use crate::http::request::X_REQUEST_ID;
use crate::security::interceptor::SecurityInterceptor;
use crate::security::rate_limit::spawn_sweeper;

/// An application router guarded by the security interceptor.
pub struct ShieldServer {
    router: Router,
    config: ShieldConfig,
    interceptor: Arc<SecurityInterceptor>,
}

impl ShieldServer {
    /// Wrap `app` with the interceptor built from `config`.
    pub fn new(
        config: ShieldConfig,
        app: Router,
        sink: Arc<dyn AuditSink>,
    ) -> Result<Self, ConfigError> {
        let interceptor = Arc::new(SecurityInterceptor::from_config(&config, sink)?);
        let router = Self::build_router(&config, app, interceptor.clone());
        Ok(Self {
            router,
            config,
            interceptor,
        })
    }

    /// Layer the middleware stack over `app`.
    ///
    /// Outermost first: request ID, trace, propagate ID, timeout, shield.
    #[allow(deprecated)]
    pub fn build_router(
        config: &ShieldConfig,
        app: Router,
        interceptor: Arc<SecurityInterceptor>,
    ) -> Router {
        let state = ShieldState {
            interceptor,
            max_form_bytes: config.interceptor.max_form_bytes,
        };
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        app.layer(middleware::from_fn_with_state(state, shield_middleware))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(request_id))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// The guarded router, for embedding or testing without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn interceptor(&self) -> Arc<SecurityInterceptor> {
        self.interceptor.clone()
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires.
    ///
    /// Configs arriving on `config_updates` replace the threat policy; the
    /// rate limiter keeps its state.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ShieldConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Shield server starting");

        let sweeper = spawn_sweeper(
            self.interceptor.limiter().clone(),
            Duration::from_secs(self.config.rate_limit.sweep_interval_secs),
            shutdown.resubscribe(),
        );

        let interceptor = self.interceptor.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                if let Err(e) = interceptor.reload_policy(&new_config) {
                    tracing::error!(error = %e, "Rejected threat policy update");
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        let _ = sweeper.await;
        tracing::info!("Shield server stopped");
        Ok(())
    }
}
