pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::matching::handlers::handle_start_match;
use crate::postings::handlers::{handle_companies, handle_list_postings, handle_stats};
use crate::profile::handlers::{handle_cv_status, handle_upload_cv};
use crate::scrape::handlers::handle_start_scrape;
use crate::state::AppState;
use crate::tasks::handlers::handle_task_status;

/// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(health::health_handler))
        // Background tasks
        .route("/api/v1/scrape", post(handle_start_scrape))
        .route("/api/v1/match", post(handle_start_match))
        .route("/api/v1/tasks/:task_id", get(handle_task_status))
        // CV
        .route(
            "/api/v1/cv",
            post(handle_upload_cv).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/v1/cv/status", get(handle_cv_status))
        // Dashboard
        .route("/api/v1/postings", get(handle_list_postings))
        .route("/api/v1/stats", get(handle_stats))
        .route("/api/v1/companies", get(handle_companies))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::inference::DisabledInference;
    use crate::notify::DisabledNotifier;
    use crate::scrape::tests::FakeConnector;
    use crate::store::MemoryJobStore;
    use crate::tasks::manager::tests::wait_for_terminal;
    use crate::tasks::{TaskId, TaskStatus};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "jobscout-test-boundary";

    fn test_state() -> AppState {
        AppState::new(
            Config::default(),
            Arc::new(MemoryJobStore::new()),
            Vec::new(),
            Arc::new(DisabledInference),
            Arc::new(DisabledNotifier),
            None,
        )
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_req(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn upload_req(filename: &str, content: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"cv_file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/v1/cv")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn task_id(body: &Value) -> TaskId {
        TaskId::parse(body["task_id"].as_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_backends() {
        let app = build_router(test_state());
        let (status, body) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "memory");
        assert_eq!(body["inference"], "disabled");
        assert_eq!(body["alerts"], "disabled");
    }

    #[tokio::test]
    async fn test_scrape_starts_and_is_pollable() {
        let state = test_state();
        let app = build_router(state.clone());

        let (status, body) = send(&app, post_req("/api/v1/scrape")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let id = task_id(&body);
        wait_for_terminal(&state.tasks, &id).await;

        let (status, task) = send(&app, get_req(&format!("/api/v1/tasks/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["status"], "complete");
        assert_eq!(task["kind"], "scrape");
        assert_eq!(task["sources_total"], 0);
        assert_eq!(task["new_postings"], 0);
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let app = build_router(test_state());
        let (status, body) = send(&app, get_req("/api/v1/tasks/not-a-task")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, _) = send(
            &app,
            get_req("/api/v1/tasks/6f1c1d1e-7a43-4a59-9f5e-4c1f2f0d8a11"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_match_without_cv_is_bad_request() {
        let app = build_router(test_state());
        let (status, body) = send(&app, post_req("/api/v1/match")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "NO_PROFILE");
    }

    #[tokio::test]
    async fn test_upload_cv_then_status_and_match() {
        let state = test_state();
        let app = build_router(state.clone());

        let (status, body) = send(
            &app,
            upload_req("cv.txt", b"Analyst, 4 years of experience\nPython, SQL, Keras"),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["chars_extracted"], 49);

        let task = wait_for_terminal(&state.tasks, &task_id(&body)).await;
        assert_eq!(task.status, TaskStatus::Complete);

        let (status, cv) = send(&app, get_req("/api/v1/cv/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cv["has_cv"], true);
        assert_eq!(cv["filename"], "cv.txt");
        assert_eq!(cv["experience"], 4.0);
        assert_eq!(cv["skills"].as_array().map(Vec::len), Some(3));

        let (status, body) = send(&app, post_req("/api/v1/match")).await;
        assert_eq!(status, StatusCode::OK);
        let matched = wait_for_terminal(&state.tasks, &task_id(&body)).await;
        assert_eq!(matched.status, TaskStatus::Complete);
    }

    #[tokio::test]
    async fn test_upload_rejects_unsupported_and_empty_documents() {
        let app = build_router(test_state());

        let (status, body) = send(&app, upload_req("photo.png", b"\x89PNG")).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["code"], "UNSUPPORTED_FORMAT");

        let (status, body) = send(&app, upload_req("blank.txt", b"   \n\n ")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "EXTRACTION_FAILED");
    }

    #[tokio::test]
    async fn test_cv_status_without_upload() {
        let app = build_router(test_state());
        let (status, body) = send(&app, get_req("/api/v1/cv/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_cv"], false);
        assert_eq!(body["skills"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_postings_validation_and_stats() {
        let app = build_router(test_state());

        let (status, body) = send(&app, get_req("/api/v1/postings?min_score=150")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, body) = send(&app, get_req("/api/v1/postings?per_page=500")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["per_page"], 100);
        assert_eq!(body["total"], 0);

        let (status, body) = send(&app, get_req("/api/v1/postings?page=4294967295")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"], 4294967295u64);
        assert_eq!(body["items"], serde_json::json!([]));

        let (status, body) = send(&app, get_req("/api/v1/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_postings"], 0);
        assert_eq!(body["high_match_threshold"], 70);
    }

    #[tokio::test]
    async fn test_companies_lists_configured_sources_with_counts() {
        let state = AppState::new(
            Config::default(),
            Arc::new(MemoryJobStore::new()),
            vec![
                Arc::new(FakeConnector::ok("acme-lever", &["Data Analyst", "Quant Analyst"])),
                Arc::new(FakeConnector::ok("beta-greenhouse", &[])),
            ],
            Arc::new(DisabledInference),
            Arc::new(DisabledNotifier),
            None,
        );
        let app = build_router(state.clone());

        let (_, body) = send(&app, post_req("/api/v1/scrape")).await;
        wait_for_terminal(&state.tasks, &task_id(&body)).await;

        let (status, body) = send(&app, get_req("/api/v1/companies")).await;
        assert_eq!(status, StatusCode::OK);
        let companies = body["companies"].as_array().unwrap();
        assert_eq!(companies.len(), 2);
        assert_eq!(companies[0]["source_id"], "acme-lever");
        assert_eq!(companies[0]["postings"], 2);
        assert_eq!(companies[0]["configured"], true);
        assert_eq!(companies[1]["source_id"], "beta-greenhouse");
        assert_eq!(companies[1]["postings"], 0);
        assert_eq!(companies[1]["last_seen_at"], Value::Null);
    }
}
