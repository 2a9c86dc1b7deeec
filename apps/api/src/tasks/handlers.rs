use axum::{
    extract::{Path, State},
    Json,
};

use crate::errors::AppError;
use crate::state::AppState;
use crate::tasks::{Task, TaskId};

/// GET /api/v1/tasks/:task_id
///
/// Snapshot of one background task. Clients poll this until `status` is terminal.
pub async fn handle_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, AppError> {
    let id = TaskId::parse(&task_id)?;
    let task = state.tasks.poll(&id).await?;
    Ok(Json(task))
}
