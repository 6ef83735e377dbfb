use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::error;

use super::state::AppState;
use crate::stream::ManagerCommand;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /status
/// Snapshot of active meetings and pending authorization flows
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let (respond_to, response) = oneshot::channel();

    if state
        .commands
        .send(ManagerCommand::Status { respond_to })
        .await
        .is_err()
    {
        error!("Status request failed: stream manager is not running");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Stream manager is not running".to_string(),
            }),
        )
            .into_response();
    }

    match response.await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(_) => {
            error!("Stream manager dropped the status request");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "Stream manager dropped the status request".to_string(),
                }),
            )
                .into_response()
        }
    }
}
