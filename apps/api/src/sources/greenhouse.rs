use futures::{stream, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::Value;

use super::{json_text, HttpFetcher, PostingStream, RawPosting, SourceConfig, SourceConnector, SourceError};

/// Greenhouse job board API: one GET returns the whole board.
pub struct GreenhouseConnector {
    source_id: String,
    company: String,
    url: String,
    http: HttpFetcher,
}

#[derive(Deserialize)]
struct Board {
    #[serde(default)]
    jobs: Vec<Value>,
}

impl GreenhouseConnector {
    pub fn new(source: &SourceConfig, http: HttpFetcher) -> Self {
        Self {
            source_id: source.source_id(),
            company: source.company.clone(),
            url: source.endpoint_url.clone(),
            http,
        }
    }

    async fn fetch_board(&self) -> Result<Vec<RawPosting>, SourceError> {
        let board: Board = self.http.get_json(&self.url).await?;
        Ok(board.jobs.into_iter().filter_map(to_raw).collect())
    }
}

fn to_raw(job: Value) -> Option<RawPosting> {
    let title = json_text(job.get("title"))?;
    Some(RawPosting {
        requisition_id: json_text(job.get("requisition_id")).or_else(|| json_text(job.get("id"))),
        title,
        location: json_text(job.pointer("/location/name")),
        // HTML, entity-escaped when requested with ?content=true.
        description: json_text(job.get("content")),
        posted: json_text(job.get("updated_at")),
        url: json_text(job.get("absolute_url")),
        raw: job,
    })
}

impl SourceConnector for GreenhouseConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn name(&self) -> &str {
        &self.company
    }

    fn fetch(&self) -> PostingStream<'_> {
        stream::once(self.fetch_board())
            .map_ok(|jobs| stream::iter(jobs.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceKind;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector(url: String) -> GreenhouseConnector {
        let source = SourceConfig {
            company: "Databricks".into(),
            kind: SourceKind::Greenhouse,
            endpoint_url: url,
            active: true,
            search_text: None,
        };
        let http = HttpFetcher::new()
            .unwrap()
            .with_retry_base(Duration::from_millis(1));
        GreenhouseConnector::new(&source, http)
    }

    #[tokio::test]
    async fn test_fetch_maps_board_jobs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/boards/databricks/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobs": [
                    {
                        "id": 7001,
                        "title": "Data Analyst",
                        "location": {"name": "Bengaluru, India"},
                        "absolute_url": "https://boards.greenhouse.io/databricks/jobs/7001",
                        "updated_at": "2024-06-01T10:00:00-04:00",
                        "content": "&lt;p&gt;SQL and Python&lt;/p&gt;"
                    },
                    {"id": 7002, "title": "   "}
                ]
            })))
            .mount(&server)
            .await;

        let connector = connector(format!("{}/v1/boards/databricks/jobs", server.uri()));
        let postings: Vec<RawPosting> = connector.fetch().try_collect().await.unwrap();

        assert_eq!(postings.len(), 1);
        let job = &postings[0];
        assert_eq!(job.requisition_id.as_deref(), Some("7001"));
        assert_eq!(job.title, "Data Analyst");
        assert_eq!(job.location.as_deref(), Some("Bengaluru, India"));
        assert_eq!(job.posted.as_deref(), Some("2024-06-01T10:00:00-04:00"));
        assert_eq!(job.raw["id"], 7001);
        assert_eq!(connector.source_id(), "databricks-greenhouse");
    }

    #[tokio::test]
    async fn test_fetch_propagates_block() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let result: Result<Vec<RawPosting>, _> =
            connector(format!("{}/jobs", server.uri())).fetch().try_collect().await;
        assert!(matches!(result, Err(SourceError::Blocked { .. })));
    }
}
