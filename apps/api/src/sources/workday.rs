use futures::{stream, StreamExt, TryStreamExt};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{json_text, HttpFetcher, PostingStream, RawPosting, SourceConfig, SourceConnector, SourceError};

const PAGE_SIZE: usize = 20;
const MAX_PAGES: usize = 5;

/// Workday CXS search endpoint (`.../wday/cxs/<tenant>/<site>/jobs`).
/// Pages are requested one at a time as the stream is polled.
pub struct WorkdayConnector {
    source_id: String,
    company: String,
    url: String,
    search_text: String,
    http: HttpFetcher,
    page_size: usize,
    max_pages: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    applied_facets: Value,
    limit: usize,
    offset: usize,
    search_text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    job_postings: Vec<Value>,
}

/// Position of the next page request. The unfold state is `None` once exhausted.
struct Cursor {
    page: usize,
    offset: usize,
}

impl WorkdayConnector {
    pub fn new(source: &SourceConfig, http: HttpFetcher) -> Self {
        Self {
            source_id: source.source_id(),
            company: source.company.clone(),
            url: source.endpoint_url.clone(),
            search_text: source.search_text.clone().unwrap_or_default(),
            http,
            page_size: PAGE_SIZE,
            max_pages: MAX_PAGES,
        }
    }

    #[cfg(test)]
    fn with_paging(mut self, page_size: usize, max_pages: usize) -> Self {
        self.page_size = page_size;
        self.max_pages = max_pages;
        self
    }

    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
    ) -> Result<Option<(Vec<RawPosting>, Option<Cursor>)>, SourceError> {
        let Some(cursor) = cursor else {
            return Ok(None);
        };

        let request = SearchRequest {
            applied_facets: Value::Object(Default::default()),
            limit: self.page_size,
            offset: cursor.offset,
            search_text: &self.search_text,
        };
        let page: SearchPage = self.http.post_json(&self.url, &request).await?;
        let received = page.job_postings.len();
        debug!(
            source = %self.source_id,
            offset = cursor.offset,
            received,
            "Fetched Workday page"
        );

        let postings = page
            .job_postings
            .into_iter()
            .filter_map(|job| self.to_raw(job))
            .collect();

        let next = (received == self.page_size && cursor.page + 1 < self.max_pages).then(|| Cursor {
            page: cursor.page + 1,
            offset: cursor.offset + received,
        });
        Ok(Some((postings, next)))
    }

    fn to_raw(&self, job: Value) -> Option<RawPosting> {
        let title = json_text(job.get("title"))?;
        let url = json_text(job.get("externalPath"))
            .or_else(|| json_text(job.get("applyUrl")))
            .and_then(|path| self.absolute_url(&path));
        Some(RawPosting {
            requisition_id: json_text(job.get("id"))
                .or_else(|| json_text(job.pointer("/bulletFields/0"))),
            title,
            location: json_text(job.get("locationsText")),
            // The search listing carries no description.
            description: None,
            posted: json_text(job.get("postedOn")),
            url,
            raw: job,
        })
    }

    fn absolute_url(&self, path: &str) -> Option<String> {
        Url::parse(&self.url)
            .and_then(|base| base.join(path))
            .map(String::from)
            .ok()
    }
}

impl SourceConnector for WorkdayConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn name(&self) -> &str {
        &self.company
    }

    fn fetch(&self) -> PostingStream<'_> {
        let first = Some(Cursor { page: 0, offset: 0 });
        stream::try_unfold(first, move |cursor| self.fetch_page(cursor))
            .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
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
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector(url: String) -> WorkdayConnector {
        let source = SourceConfig {
            company: "Morgan Stanley".into(),
            kind: SourceKind::Workday,
            endpoint_url: url,
            active: true,
            search_text: Some("India".into()),
        };
        let http = HttpFetcher::new()
            .unwrap()
            .with_retry_base(Duration::from_millis(1));
        WorkdayConnector::new(&source, http).with_paging(2, 5)
    }

    fn job(n: u32) -> Value {
        json!({
            "title": format!("Analyst {n}"),
            "locationsText": "Mumbai, India",
            "externalPath": format!("/job/Mumbai/Analyst_R{n}"),
            "postedOn": "Posted 3 Days Ago",
            "bulletFields": [format!("R{n}")]
        })
    }

    #[tokio::test]
    async fn test_paginates_until_short_page() {
        let server = MockServer::start().await;
        let endpoint = "/wday/cxs/ms/External/jobs";
        Mock::given(method("POST"))
            .and(path(endpoint))
            .and(body_partial_json(json!({"offset": 0, "limit": 2, "searchText": "India"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobPostings": [job(1), job(2)]})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(endpoint))
            .and(body_partial_json(json!({"offset": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobPostings": [job(3)]})))
            .expect(1)
            .mount(&server)
            .await;

        let connector = connector(format!("{}{endpoint}", server.uri()));
        let postings: Vec<RawPosting> = connector.fetch().try_collect().await.unwrap();

        assert_eq!(postings.len(), 3);
        assert_eq!(postings[0].requisition_id.as_deref(), Some("R1"));
        assert_eq!(
            postings[2].url,
            Some(format!("{}/job/Mumbai/Analyst_R3", server.uri()))
        );
        assert_eq!(postings[0].posted.as_deref(), Some("Posted 3 Days Ago"));
        assert_eq!(postings[0].description, None);
    }

    #[tokio::test]
    async fn test_stops_at_max_pages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobPostings": [job(1), job(2)]})))
            .expect(5)
            .mount(&server)
            .await;

        let postings: Vec<RawPosting> = connector(format!("{}/jobs", server.uri()))
            .fetch()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(postings.len(), 10);
    }

    #[tokio::test]
    async fn test_nothing_is_requested_until_polled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobPostings": []})))
            .expect(0)
            .mount(&server)
            .await;

        let connector = connector(format!("{}/jobs", server.uri()));
        let stream = connector.fetch();
        drop(stream);
    }

    #[tokio::test]
    async fn test_failure_on_later_page_surfaces_after_earlier_items() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"offset": 0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobPostings": [job(1), job(2)]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"offset": 2})))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let connector = connector(format!("{}/jobs", server.uri()));
        let items: Vec<Result<RawPosting, SourceError>> = connector.fetch().collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok() && items[1].is_ok());
        assert!(matches!(items[2], Err(SourceError::Blocked { .. })));
    }
}
