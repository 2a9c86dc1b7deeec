use futures::{stream, StreamExt, TryStreamExt};
use serde_json::Value;

use super::{json_text, HttpFetcher, PostingStream, RawPosting, SourceConfig, SourceConnector, SourceError};

/// Lever postings API (`?mode=json`): a bare JSON array of postings.
pub struct LeverConnector {
    source_id: String,
    company: String,
    url: String,
    http: HttpFetcher,
}

impl LeverConnector {
    pub fn new(source: &SourceConfig, http: HttpFetcher) -> Self {
        Self {
            source_id: source.source_id(),
            company: source.company.clone(),
            url: source.endpoint_url.clone(),
            http,
        }
    }

    async fn fetch_postings(&self) -> Result<Vec<RawPosting>, SourceError> {
        let postings: Vec<Value> = self.http.get_json(&self.url).await?;
        Ok(postings.into_iter().filter_map(to_raw).collect())
    }
}

fn to_raw(posting: Value) -> Option<RawPosting> {
    let title = json_text(posting.get("text"))?;
    Some(RawPosting {
        requisition_id: json_text(posting.get("id")),
        title,
        location: json_text(posting.pointer("/categories/location")),
        description: json_text(posting.get("descriptionPlain"))
            .or_else(|| json_text(posting.get("description"))),
        // Epoch milliseconds.
        posted: json_text(posting.get("createdAt")),
        url: json_text(posting.get("hostedUrl")).or_else(|| json_text(posting.get("applyUrl"))),
        raw: posting,
    })
}

impl SourceConnector for LeverConnector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn name(&self) -> &str {
        &self.company
    }

    fn fetch(&self) -> PostingStream<'_> {
        stream::once(self.fetch_postings())
            .map_ok(|postings| stream::iter(postings.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }
}
