use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::Utc;
use tracing::info;

use super::extract::DocumentFormat;
use crate::config::S3Settings;

/// Copies uploaded CVs to S3-compatible storage (MinIO locally, AWS in production).
#[derive(Clone)]
pub struct UploadArchive {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl UploadArchive {
    pub async fn from_settings(settings: &S3Settings) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new("us-east-1"));

        if let (Some(key_id), Some(secret)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                key_id,
                secret,
                None,
                None,
                "jobscout-static",
            ));
        }
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        // MinIO serves buckets by path, not by virtual host.
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.endpoint.is_some())
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: settings.bucket.clone(),
        }
    }

    /// Stores the document and returns its object key.
    pub async fn store(
        &self,
        filename: &str,
        format: DocumentFormat,
        body: Bytes,
    ) -> Result<String> {
        let key = object_key(filename, Utc::now().format("%Y%m%dT%H%M%S").to_string());
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type(format.content_type())
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("S3 upload failed: {e}"))?;

        info!("Archived CV to s3://{}/{}", self.bucket, key);
        Ok(key)
    }
}

/// `cv/<stamp>-<filename>` with anything outside `[A-Za-z0-9._-]` replaced.
fn object_key(filename: &str, stamp: String) -> String {
    let safe: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("cv/{stamp}-{safe}")
}
