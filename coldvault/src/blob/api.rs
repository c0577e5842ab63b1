//! Object-store API consumed by the blob backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::pin::Pin;
use tokio::fs::File;
use tokio::io::AsyncRead;

use crate::utils::errors::RemoteError;

/// Byte stream of a stored object.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Attributes the store keeps for every object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAttrs {
    pub name: String,
    pub size: u64,
    /// Raw MD5 digest of the content, when the store computed one.
    pub md5: Option<Vec<u8>>,
    pub created: DateTime<Utc>,
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub items: Vec<ObjectAttrs>,
    /// Token of the next page, `None` on the last one.
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Bucket every call operates on.
    fn bucket(&self) -> &str;

    /// Stream `file` (`size` bytes) into a new object called `name`.
    async fn put_object(&self, name: &str, file: File, size: u64) -> Result<(), RemoteError>;

    async fn object_attrs(&self, name: &str) -> Result<ObjectAttrs, RemoteError>;

    /// Fetch one listing page. `None` asks for the first page.
    async fn list_objects(&self, page_token: Option<&str>) -> Result<ObjectPage, RemoteError>;

    async fn open_object(&self, name: &str) -> Result<ObjectReader, RemoteError>;

    async fn delete_object(&self, name: &str) -> Result<(), RemoteError>;

    /// Release connections held by the client.
    async fn close(&self) -> Result<(), RemoteError>;
}
