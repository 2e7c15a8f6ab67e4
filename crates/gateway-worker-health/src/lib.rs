//! Operational HTTP surface for the gateway worker
//!
//! - `GET /health` and `GET /ready`
//! - `GET /certificates/{domain}` certificate status
//! - `POST /jobs` job submission
//! - `GET /.well-known/acme-challenge/{token}` HTTP-01 responses

pub mod handlers;
pub mod models;

use axum::{
    routing::{get, post},
    Router,
};
use gateway_worker_cert::{CertificateManager, Http01ChallengeStore};
use gateway_worker_queue::JobQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared readiness flag, flipped by the binary as it starts and stops
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Application state shared by handlers
pub struct AppState {
    pub queue: JobQueue,
    pub manager: Arc<CertificateManager>,
    pub challenges: Http01ChallengeStore,
    pub readiness: Readiness,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        queue: JobQueue,
        manager: Arc<CertificateManager>,
        challenges: Http01ChallengeStore,
        readiness: Readiness,
    ) -> Self {
        Self {
            queue,
            manager,
            challenges,
            readiness,
            started_at: Instant::now(),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness))
        .route("/certificates/{domain}", get(handlers::certificate_status))
        .route("/jobs", post(handlers::submit_job))
        .route(
            "/.well-known/acme-challenge/{token}",
            get(handlers::acme_challenge),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve `router` until `cancel` fires
pub async fn serve(
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP surface listening on http://{}", addr);
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("HTTP surface stopped");
    Ok(())
}
