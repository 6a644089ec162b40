//! Internet Archive client
//!
//! Metadata comes from the public metadata API; uploads go through the S3-like
//! endpoint, one PUT per file, with item metadata carried in
//! `x-archive-meta-*` headers on every request.

use crate::config::ArchiveConfig;
use crate::error::ApiError;
use crate::sync::client::{ArchiveClient, ContentProvider, UploadReceipt};
use crate::sync::metadata::RemoteMetadata;
use async_trait::async_trait;
use reqwest::{Body, Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

pub struct InternetArchiveClient {
    client: Client,
    metadata_endpoint: String,
    upload_endpoint: String,
    access_key: Option<String>,
    secret_key: Option<String>,
}

impl InternetArchiveClient {
    pub fn from_config(config: &ArchiveConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("diskmuster/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            metadata_endpoint: config.metadata_endpoint.trim_end_matches('/').to_string(),
            upload_endpoint: config.upload_endpoint.trim_end_matches('/').to_string(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn metadata_url(&self, identifier: &str) -> String {
        format!("{}/metadata/{}", self.metadata_endpoint, identifier)
    }

    fn upload_url(&self, identifier: &str, file: &str) -> String {
        format!(
            "{}/{}/{}",
            self.upload_endpoint,
            identifier,
            urlencoding::encode(file)
        )
    }

    fn authorization(&self) -> Result<String, ApiError> {
        match (&self.access_key, &self.secret_key) {
            (Some(access), Some(secret)) => Ok(format!("LOW {}:{}", access, secret)),
            _ => Err(ApiError::ConfigError(
                "archive.access_key and archive.secret_key are required to upload".to_string(),
            )),
        }
    }
}

/// Map a transport failure. Timeouts and connection problems are transient.
fn transport_error(identifier: &str, err: reqwest::Error) -> ApiError {
    ApiError::RemoteUnavailable(format!("{}: {}", identifier, err))
}

fn status_error(identifier: &str, status: StatusCode) -> ApiError {
    if status == StatusCode::NOT_FOUND {
        ApiError::RemoteNotFound(identifier.to_string())
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ApiError::RemoteUnavailable(format!("{}: HTTP {}", identifier, status))
    } else {
        ApiError::ConfigError(format!(
            "Archive rejected request for {}: HTTP {}",
            identifier, status
        ))
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .find_map(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode a metadata API response. The API answers `{}` for unknown items.
pub(crate) fn parse_metadata(identifier: &str, body: &Value) -> Result<RemoteMetadata, ApiError> {
    let meta = body
        .get("metadata")
        .and_then(Value::as_object)
        .ok_or_else(|| ApiError::RemoteNotFound(identifier.to_string()))?;

    Ok(RemoteMetadata {
        title: text(meta.get("title")),
        description: text(meta.get("description")),
        mediatype: text(meta.get("mediatype")),
        date: text(meta.get("date")),
        creators: list(meta.get("creator")),
        subjects: list(meta.get("subject")),
        collections: list(meta.get("collection")),
        languages: list(meta.get("language")),
    })
}

/// Header-safe form of a metadata value; non-ASCII text uses `uri(...)`.
fn header_value(value: &str) -> String {
    if value.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        value.to_string()
    } else {
        format!("uri({})", urlencoding::encode(value))
    }
}

/// `x-archive-meta-*` headers for `metadata`. Repeated fields are numbered.
pub(crate) fn metadata_headers(metadata: &RemoteMetadata) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    let single = [
        ("title", &metadata.title),
        ("description", &metadata.description),
        ("mediatype", &metadata.mediatype),
        ("date", &metadata.date),
    ];
    for (name, value) in single {
        if !value.is_empty() {
            headers.push((format!("x-archive-meta-{}", name), header_value(value)));
        }
    }
    let repeated = [
        ("creator", &metadata.creators),
        ("subject", &metadata.subjects),
        ("collection", &metadata.collections),
        ("language", &metadata.languages),
    ];
    for (name, values) in repeated {
        for (i, value) in values.iter().enumerate() {
            headers.push((
                format!("x-archive-meta{:02}-{}", i + 1, name),
                header_value(value),
            ));
        }
    }
    headers
}

#[async_trait]
impl ArchiveClient for InternetArchiveClient {
    async fn fetch_metadata(&self, identifier: &str) -> Result<RemoteMetadata, ApiError> {
        let url = self.metadata_url(identifier);
        debug!(url = %url, "Fetching archive metadata");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(identifier, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(identifier, status));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| transport_error(identifier, e))?;
        parse_metadata(identifier, &body)
    }

    async fn upload(
        &self,
        identifier: &str,
        content: &dyn ContentProvider,
        metadata: &RemoteMetadata,
    ) -> Result<UploadReceipt, ApiError> {
        let authorization = self.authorization()?;
        let headers = metadata_headers(metadata);
        let mut receipt = UploadReceipt {
            identifier: identifier.to_string(),
            files: Vec::new(),
            bytes: 0,
        };

        for file in content.files() {
            let stream = content.open(&file).await?;
            let size = stream.len;

            let mut request = self
                .client
                .put(self.upload_url(identifier, &file.name))
                .header("authorization", &authorization)
                .header("x-archive-auto-make-bucket", "1")
                .header("x-archive-keep-old-version", "0");
            for (name, value) in &headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let response = request
                .header("content-length", size)
                .body(Body::wrap_stream(ReaderStream::new(stream.reader)))
                .send()
                .await
                .map_err(|e| transport_error(identifier, e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(status_error(identifier, status));
            }

            debug!(disk = identifier, file = %file.name, size, "Uploaded file");
            receipt.bytes += size;
            receipt.files.push(file.name);
        }

        info!(
            disk = identifier,
            files = receipt.files.len(),
            bytes = receipt.bytes,
            "Upload accepted"
        );
        Ok(receipt)
    }
}
