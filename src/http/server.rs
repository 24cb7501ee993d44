//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared stores and the hot-swappable edge policy
//! - Create the Axum router: edge filter in front of every route
//! - Wire up tower-http layers (tracing, request id, timeout, body limit)
//! - Spawn the sweeper, the admin listener and the policy reload loop
//! - Serve plain TCP or TLS with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    extract::{FromRef, Request, State},
    http::{uri::InvalidUri, HeaderName},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::{OtpConfig, PerimeterConfig};
use crate::http::middleware::edge_filter;
use crate::http::response::ApiError;
use crate::http::upstream::Upstream;
use crate::http::{auth, product_request};
use crate::lifecycle::shutdown;
use crate::lifecycle::sweeper::Sweeper;
use crate::observability::audit::AuditLog;
use crate::security::gate::InputGate;
use crate::security::intrusion::SuspiciousActivityTracker;
use crate::security::otp::{BackupCodeVault, LogDelivery, OtpDelivery, OtpService};
use crate::security::policy::{EdgePolicy, PolicyError};
use crate::security::rate_limit::RateLimiter;
use crate::security::scanner::ThreatScanner;

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Grace period for in-flight TLS connections after shutdown fires.
const TLS_DRAIN: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("edge policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("threat signature: {0}")]
    Signature(#[from] regex::Error),

    #[error("upstream address: {0}")]
    Upstream(#[from] InvalidUri),
}

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<ArcSwap<EdgePolicy>>,
    pub limiter: Arc<RateLimiter>,
    pub tracker: Arc<SuspiciousActivityTracker>,
    pub otp: Arc<OtpService>,
    pub otp_delivery: Arc<dyn OtpDelivery>,
    pub backup_codes: Arc<BackupCodeVault>,
    pub gate: Arc<InputGate>,
    pub audit: Arc<AuditLog>,
    pub upstream: Option<Upstream>,
    pub otp_config: OtpConfig,
    pub admin_key: Arc<str>,
}

impl FromRef<AppState> for Arc<InputGate> {
    fn from_ref(state: &AppState) -> Self {
        state.gate.clone()
    }
}

impl FromRef<AppState> for Arc<AuditLog> {
    fn from_ref(state: &AppState) -> Self {
        state.audit.clone()
    }
}

impl AppState {
    pub fn from_config(config: &PerimeterConfig) -> Result<Self, ServerError> {
        let scanner = ThreatScanner::with_extra(&config.scanner.extra_signatures)?;
        let upstream = if config.upstream.enabled {
            Some(Upstream::new(
                &config.upstream.address,
                Duration::from_secs(config.timeouts.connect_secs),
            )?)
        } else {
            None
        };

        Ok(Self {
            policy: Arc::new(ArcSwap::from_pointee(EdgePolicy::from_config(config)?)),
            limiter: Arc::new(RateLimiter::new()),
            tracker: Arc::new(SuspiciousActivityTracker::new(&config.intrusion)),
            otp: Arc::new(OtpService::new(&config.otp)),
            otp_delivery: Arc::new(LogDelivery),
            backup_codes: Arc::new(BackupCodeVault::new()),
            gate: Arc::new(InputGate::new(Arc::new(scanner), config.scanner.reject_at)),
            audit: Arc::new(AuditLog::from_config(&config.audit)),
            upstream,
            otp_config: config.otp.clone(),
            admin_key: Arc::from(config.admin.api_key.as_str()),
        })
    }

    /// Swap in the edge policy from a reloaded config. The stores are kept.
    pub fn reload_policy(&self, config: &PerimeterConfig) -> Result<(), PolicyError> {
        let policy = EdgePolicy::from_config(config)?;
        self.policy.store(Arc::new(policy));
        Ok(())
    }
}

/// HTTP server for the perimeter.
pub struct HttpServer {
    state: AppState,
    config: PerimeterConfig,
}

impl HttpServer {
    pub fn new(config: PerimeterConfig) -> Result<Self, ServerError> {
        let state = AppState::from_config(&config)?;
        Ok(Self { state, config })
    }

    /// Replace the channel issued OTP codes are delivered through.
    pub fn with_otp_delivery(mut self, delivery: Arc<dyn OtpDelivery>) -> Self {
        self.state.otp_delivery = delivery;
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &PerimeterConfig {
        &self.config
    }

    /// Build the public router with all middleware layers.
    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/api/auth/validate", post(auth::validate_login))
            .route("/api/auth/otp", post(auth::issue_otp))
            .route("/api/auth/otp/verify", post(auth::verify_otp))
            .route("/api/auth/backup-codes", post(auth::generate_backup_codes))
            .route("/api/auth/backup-codes/redeem", post(auth::redeem_backup_code))
            .route("/api/request", post(product_request::submit_product_request));

        #[allow(deprecated)]
        let timeout = TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs));

        api.fallback(pass_through)
            .layer(middleware::from_fn_with_state(self.state.clone(), edge_filter))
            .layer(RequestBodyLimitLayer::new(self.config.limits.max_body_size))
            .layer(timeout)
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
            .with_state(self.state.clone())
    }

    /// Run on a plain TCP listener until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<PerimeterConfig>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        self.spawn_background(config_updates, &shutdown_rx).await?;

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run with TLS termination until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        config_updates: mpsc::UnboundedReceiver<PerimeterConfig>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!(address = %addr, "HTTPS server starting");

        self.spawn_background(config_updates, &shutdown_rx).await?;

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            shutdown::wait(shutdown_rx).await;
            drain.graceful_shutdown(Some(TLS_DRAIN));
        });

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    async fn spawn_background(
        &self,
        mut config_updates: mpsc::UnboundedReceiver<PerimeterConfig>,
        shutdown_rx: &broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let sweeper = Sweeper {
            limiter: self.state.limiter.clone(),
            tracker: self.state.tracker.clone(),
            otp: self.state.otp.clone(),
            sweep_interval: Duration::from_secs(self.config.rate_limit.sweep_interval_secs),
            amnesty_interval: Duration::from_secs(self.config.intrusion.amnesty_interval_secs),
        };
        tokio::spawn(sweeper.run(shutdown_rx.resubscribe()));

        if self.config.admin.enabled {
            let listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Admin API listening");
            let app = admin::admin_router(self.state.clone())
                .into_make_service_with_connect_info::<SocketAddr>();
            let admin_shutdown = shutdown_rx.resubscribe();
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown::wait(admin_shutdown))
                    .await
                {
                    tracing::error!(error = %e, "Admin API stopped");
                }
            });
        }

        let state = self.state.clone();
        let mut reload_shutdown = shutdown_rx.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => {
                        let Some(config) = update else { break };
                        apply_update(&state, &config);
                    }
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        Ok(())
    }
}

fn apply_update(state: &AppState, config: &PerimeterConfig) {
    if let Err(errors) = crate::config::validation::validate_config(config) {
        for e in &errors {
            tracing::error!(error = %e, "Rejected config reload");
        }
        return;
    }
    match state.reload_policy(config) {
        Ok(()) => tracing::info!("Edge policy reloaded"),
        Err(e) => tracing::error!(error = %e, "Failed to rebuild edge policy, keeping current"),
    }
}

/// Unmatched routes go to the storefront origin when one is configured.
async fn pass_through(State(state): State<AppState>, request: Request) -> Response {
    match &state.upstream {
        Some(upstream) => upstream.forward(request).await.into_response(),
        None => ApiError::NotFound.into_response(),
    }
}
