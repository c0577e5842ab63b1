//! Google Cloud Storage client over the JSON API.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use tokio::fs::File;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::debug;

use super::api::{BlobStore, ObjectAttrs, ObjectPage, ObjectReader};
use crate::config::GcsConfig;
use crate::utils::errors::{Error, ErrorCode, RemoteError, Result};

/// Object resource as returned by the JSON API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObject {
    name: String,
    /// Decimal string.
    size: String,
    #[serde(default)]
    md5_hash: Option<String>,
    time_created: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObjectList {
    #[serde(default)]
    items: Vec<GcsObject>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl TryFrom<GcsObject> for ObjectAttrs {
    type Error = RemoteError;

    fn try_from(object: GcsObject) -> std::result::Result<Self, Self::Error> {
        let size = object
            .size
            .parse()
            .map_err(|_| RemoteError::message(format!("invalid object size \"{}\"", object.size)))?;
        let md5 = object
            .md5_hash
            .map(|hash| base64::engine::general_purpose::STANDARD.decode(hash))
            .transpose()
            .map_err(|e| RemoteError::message(format!("invalid MD5 hash: {}", e)))?;

        Ok(ObjectAttrs {
            name: object.name,
            size,
            md5,
            created: object.time_created,
        })
    }
}

pub struct GcsClient {
    http: Client,
    endpoint: Url,
    bucket: String,
    auth_token: String,
}

impl GcsClient {
    pub fn new(config: &GcsConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| Error::new("", ErrorCode::InitializingSession).with_cause(e))?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::new("", ErrorCode::InitializingSession)
                .with_cause(format!("endpoint {} cannot hold a path", config.endpoint))
                .into());
        }

        let http = Client::builder()
            .user_agent(concat!("coldvault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::new("", ErrorCode::InitializingSession).with_cause(e))?;

        Ok(Self {
            http,
            endpoint,
            bucket: config.bucket.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    /// Endpoint URL extended with percent-encoded path segments.
    fn url(&self, segments: &[&str]) -> std::result::Result<Url, RemoteError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::message("endpoint cannot hold a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, name: &str) -> std::result::Result<Url, RemoteError> {
        self.url(&["storage", "v1", "b", &self.bucket, "o", name])
    }
}

async fn check(response: Response) -> std::result::Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl BlobStore for GcsClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, name: &str, file: File, size: u64) -> std::result::Result<(), RemoteError> {
        let mut url = self.url(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", name);

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.auth_token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await?;
        check(response).await?;

        debug!("Object {} written to bucket {}", name, self.bucket);
        Ok(())
    }

    async fn object_attrs(&self, name: &str) -> std::result::Result<ObjectAttrs, RemoteError> {
        let response = self
            .http
            .get(self.object_url(name)?)
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        let object: GcsObject = serde_json::from_slice(&check(response).await?.bytes().await?)?;
        object.try_into()
    }

    async fn list_objects(&self, page_token: Option<&str>) -> std::result::Result<ObjectPage, RemoteError> {
        let mut url = self.url(&["storage", "v1", "b", &self.bucket, "o"])?;
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }

        let response = self.http.get(url).bearer_auth(&self.auth_token).send().await?;
        let list: GcsObjectList = serde_json::from_slice(&check(response).await?.bytes().await?)?;

        Ok(ObjectPage {
            items: list
                .items
                .into_iter()
                .map(ObjectAttrs::try_from)
                .collect::<std::result::Result<_, _>>()?,
            next_page_token: list.next_page_token,
        })
    }

    async fn open_object(&self, name: &str) -> std::result::Result<ObjectReader, RemoteError> {
        let mut url = self.object_url(name)?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self.http.get(url).bearer_auth(&self.auth_token).send().await?;
        let stream = check(response)
            .await?
            .bytes_stream()
            .map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }

    async fn delete_object(&self, name: &str) -> std::result::Result<(), RemoteError> {
        let response = self
            .http
            .delete(self.object_url(name)?)
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn close(&self) -> std::result::Result<(), RemoteError> {
        // Pooled connections are released when the client is dropped.
        Ok(())
    }
}
