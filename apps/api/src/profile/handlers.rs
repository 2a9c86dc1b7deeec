use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::errors::AppError;
use crate::state::AppState;
use crate::tasks::{StartTaskResponse, TaskKind};

const CV_FIELD: &str = "cv_file";
const STATUS_SKILLS: usize = 5;

/// POST /api/v1/cv
///
/// Multipart upload with a `cv_file` field. Text extraction happens before the
/// response so format and parse errors are reported directly; profile analysis
/// then runs as a `cv_analysis` task.
pub async fn handle_upload_cv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StartTaskResponse>, AppError> {
    let (filename, data) = read_cv_field(&mut multipart).await?;

    if data.len() > state.config.max_upload_bytes {
        return Err(AppError::Validation(format!(
            "File too large: {} bytes (limit {})",
            data.len(),
            state.config.max_upload_bytes
        )));
    }

    let upload = state.profiles.extract_text(&filename, data).await?;
    let chars_extracted = upload.text.chars().count();
    info!(filename = %filename, chars_extracted, "CV text extracted");

    let extractor = state.profiles.clone();
    let store = state.store.clone();
    let archive = state.archive.clone();
    let task_id = state
        .tasks
        .spawn(TaskKind::CvAnalysis, move |handle| async move {
            extractor.analyze(handle, upload, store, archive).await
        })
        .await?;

    Ok(Json(StartTaskResponse {
        chars_extracted: Some(chars_extracted),
        ..StartTaskResponse::started(task_id)
    }))
}

async fn read_cv_field(multipart: &mut Multipart) -> Result<(String, Bytes), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some(CV_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation("No file selected".to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Could not read upload: {e}")))?;
        return Ok((filename, data));
    }
    Err(AppError::Validation(format!(
        "No file uploaded (expected multipart field `{CV_FIELD}`)"
    )))
}

#[derive(Debug, Serialize)]
pub struct CvStatus {
    pub has_cv: bool,
    pub filename: Option<String>,
    pub skills: Vec<String>,
    pub experience: Option<f64>,
    pub education: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// GET /api/v1/cv/status
pub async fn handle_cv_status(State(state): State<AppState>) -> Result<Json<CvStatus>, AppError> {
    let status = match state.store.current_profile().await? {
        Some(profile) => CvStatus {
            has_cv: true,
            filename: Some(profile.filename),
            skills: profile.skills.into_iter().take(STATUS_SKILLS).collect(),
            experience: Some(profile.years_experience),
            education: profile.education,
            uploaded_at: Some(profile.extracted_at),
        },
        None => CvStatus {
            has_cv: false,
            filename: None,
            skills: Vec::new(),
            experience: None,
            education: None,
            uploaded_at: None,
        },
    };
    Ok(Json(status))
}
