use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::state::AppState;
use crate::tasks::StartTaskResponse;

/// POST /api/v1/match
///
/// Scores every posting not yet matched against the current CV.
/// 400 when no CV has been uploaded, 409 while another match run is active.
pub async fn handle_start_match(
    State(state): State<AppState>,
) -> Result<Json<StartTaskResponse>, AppError> {
    let task_id = state.pipeline.start_match().await?;
    Ok(Json(StartTaskResponse::started(task_id)))
}
