use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::state::AppState;
use crate::tasks::StartTaskResponse;

/// POST /api/v1/scrape
///
/// Starts a scrape of every active source. 409 while another scrape is running.
pub async fn handle_start_scrape(
    State(state): State<AppState>,
) -> Result<Json<StartTaskResponse>, AppError> {
    let task_id = state.pipeline.start_scrape().await?;
    Ok(Json(StartTaskResponse::started(task_id)))
}
