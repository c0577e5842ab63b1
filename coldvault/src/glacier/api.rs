//! Job-oriented vault API consumed by the Glacier backend.
//!
//! Implementations own transport and request signing. Every method maps to
//! one remote request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio::io::AsyncRead;

use crate::utils::errors::RemoteError;

/// Byte stream of a job output.
pub type JobOutput = Pin<Box<dyn AsyncRead + Send>>;

/// Vault addressed by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultRef {
    pub account_id: String,
    pub vault_name: String,
}

/// Single-request archive upload.
#[derive(Debug)]
pub struct UploadArchive<'a> {
    pub description: String,
    pub body: &'a [u8],
    /// Tree hash of `body`.
    pub checksum: String,
    /// Linear hash of `body`.
    pub content_sha256: String,
}

/// Archive created by an upload or a completed multipart session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveCreation {
    pub archive_id: String,
    pub checksum: String,
    pub location: String,
}

impl ArchiveCreation {
    /// Archive id: last segment of the location, or the explicit id field
    /// when no location was returned.
    pub fn id(&self) -> &str {
        match self.location.rsplit('/').next() {
            Some(last) if !last.is_empty() => last,
            _ => &self.archive_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateMultipart {
    pub description: String,
    pub part_size: usize,
}

/// One part of a multipart session.
#[derive(Debug)]
pub struct UploadPart<'a> {
    pub upload_id: &'a str,
    /// `bytes <start>-<end>/<total>`, end inclusive.
    pub range: String,
    pub body: &'a [u8],
    /// Tree hash of `body`.
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteMultipart {
    pub upload_id: String,
    pub archive_size: u64,
    /// Tree hash of the whole archive.
    pub checksum: String,
}

/// Parameters of a retrieval job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum JobParameters {
    #[serde(rename = "inventory-retrieval")]
    InventoryRetrieval {
        #[serde(rename = "Format")]
        format: String,
    },
    #[serde(rename = "archive-retrieval")]
    ArchiveRetrieval {
        #[serde(rename = "ArchiveId")]
        archive_id: String,
    },
}

impl JobParameters {
    /// Catalog of the vault in JSON.
    pub fn inventory() -> Self {
        JobParameters::InventoryRetrieval {
            format: "JSON".to_string(),
        }
    }

    pub fn archive(id: impl Into<String>) -> Self {
        JobParameters::ArchiveRetrieval { archive_id: id.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatusCode {
    InProgress,
    Succeeded,
    Failed,
}

/// Entry of the vault's job listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescription {
    #[serde(rename = "JobId")]
    pub job_id: String,
    #[serde(rename = "Completed")]
    pub completed: bool,
    #[serde(rename = "StatusCode")]
    pub status_code: JobStatusCode,
    #[serde(rename = "StatusMessage", default)]
    pub status_message: Option<String>,
}

#[async_trait]
pub trait GlacierApi: Send + Sync + 'static {
    async fn upload_archive(&self, vault: &VaultRef, request: UploadArchive<'_>) -> Result<ArchiveCreation, RemoteError>;

    /// Open a multipart session and return its upload id.
    async fn initiate_multipart_upload(
        &self,
        vault: &VaultRef,
        request: InitiateMultipart,
    ) -> Result<String, RemoteError>;

    /// Send one part and return the tree hash computed by the vault.
    async fn upload_multipart_part(&self, vault: &VaultRef, request: UploadPart<'_>) -> Result<String, RemoteError>;

    async fn complete_multipart_upload(
        &self,
        vault: &VaultRef,
        request: CompleteMultipart,
    ) -> Result<ArchiveCreation, RemoteError>;

    async fn abort_multipart_upload(&self, vault: &VaultRef, upload_id: &str) -> Result<(), RemoteError>;

    /// Submit a job and return its id.
    async fn initiate_job(&self, vault: &VaultRef, parameters: JobParameters) -> Result<String, RemoteError>;

    async fn list_jobs(&self, vault: &VaultRef) -> Result<Vec<JobDescription>, RemoteError>;

    async fn get_job_output(&self, vault: &VaultRef, job_id: &str) -> Result<JobOutput, RemoteError>;

    async fn delete_archive(&self, vault: &VaultRef, archive_id: &str) -> Result<(), RemoteError>;
}
