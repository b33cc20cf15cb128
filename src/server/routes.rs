use super::AppState;
use crate::error::SourceError;
use crate::models::VoteOption;
use crate::report::{AnalyticsResponse, ResultsResponse};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid vote option: {0}")]
    InvalidOption(String),

    #[error("No local vote source on this instance")]
    NoLocalSource,

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidOption(_) => StatusCode::BAD_REQUEST,
            AppError::NoLocalSource => StatusCode::NOT_FOUND,
            AppError::Source(SourceError::ReadOnly(_)) => StatusCode::FORBIDDEN,
            AppError::Source(SourceError::Unreachable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Source(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        warn!("Request failed with {}: {}", status, self);
        (status, Json(json!({"status": "error", "error": self.to_string()}))).into_response()
    }
}

#[derive(Deserialize)]
pub struct VoteRequest {
    vote: String,
}

/// Combined results across every source. Always 200.
pub async fn analytics_handler(State(state): State<Arc<AppState>>) -> Json<AnalyticsResponse> {
    let summary = state.aggregator.aggregate().await;
    Json(AnalyticsResponse::from(&summary))
}

/// This instance's own tally, in the shape peers consume.
pub async fn results_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ResultsResponse>, AppError> {
    let source = state
        .aggregator
        .source(&state.instance)
        .or_else(|| state.aggregator.writable_source())
        .ok_or(AppError::NoLocalSource)?;

    let snapshot = source.fetch_snapshot().await?;
    Ok(Json(ResultsResponse::new(&state.instance, &snapshot)))
}

pub async fn vote_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let option = VoteOption::parse(&payload.vote)
        .ok_or_else(|| AppError::InvalidOption(payload.vote.clone()))?;

    let stored_in = state.aggregator.record_vote(option).await?;

    Ok(Json(json!({
        "status": "success",
        "vote": option.as_str(),
        "source": stored_in,
    })))
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "healthy", "service": "crossvote"}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::InvalidOption("fish".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NoLocalSource.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::from(SourceError::ReadOnly("mirror".to_string())).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(SourceError::timeout(Duration::from_secs(5))).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(SourceError::Unreachable {
                detail: "connection refused".to_string(),
                timed_out: false,
            })
            .status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(SourceError::QueryFailed("no such table".to_string())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(SourceError::protocol(Some(502), "", "bad gateway")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
