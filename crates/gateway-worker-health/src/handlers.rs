use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use gateway_worker_cert::CertificateStatus;
use gateway_worker_queue::{Job, JobType, QueueError};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::models::*;
use crate::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Liveness
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        time: Utc::now(),
        queue_depth: state.queue.len(),
    })
}

/// Readiness: workers and the sweep are running and shutdown has not begun
pub async fn readiness(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    if state.readiness.is_ready() && !state.queue.is_closed() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

pub async fn certificate_status(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
) -> Result<Json<CertificateStatus>, ApiError> {
    debug!("Getting certificate status for {}", domain);

    match state.manager.get_certificate_status(&domain).await {
        Ok(status) => Ok(Json(status)),
        Err(e) if e.is_not_found() => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                format!("No certificate stored for {}", domain),
                "NOT_FOUND",
            )),
        )),
        Err(e) => {
            error!(domain = %domain, error = %e, "Failed to read certificate status");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string(), "STORE_ERROR")),
            ))
        }
    }
}

/// Accept a job for asynchronous processing
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    let job_type: JobType = req.job_type.parse().map_err(|e: String| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(e, "UNKNOWN_JOB_TYPE")),
        )
    })?;

    let mut job = Job::new(job_type, req.payload);
    if let Some(priority) = req.priority {
        job = job.with_priority(priority);
    }
    if let Some(max_retries) = req.max_retries {
        job = job.with_max_retries(max_retries);
    }
    let id = job.id;

    match state.queue.submit(job) {
        Ok(()) => {
            info!(job_id = %id, job_type = %job_type, "Accepted job");
            Ok((StatusCode::ACCEPTED, Json(SubmitJobResponse { id })))
        }
        Err(e) => {
            warn!(job_type = %job_type, error = %e, "Rejected job");
            let code = match e {
                QueueError::QueueFull { .. } => "QUEUE_FULL",
                QueueError::Closed => "QUEUE_CLOSED",
            };
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new(e.to_string(), code)),
            ))
        }
    }
}

/// HTTP-01 key authorization for a pending ACME order
pub async fn acme_challenge(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<String, StatusCode> {
    match state.challenges.get(&token) {
        Some(key_authorization) => {
            debug!(token = %token, "Serving ACME HTTP-01 challenge");
            Ok(key_authorization)
        }
        None => Err(StatusCode::NOT_FOUND),
    }
}
