//! Scripted in-memory vault used by the Glacier backend tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::api::*;
use crate::checksum::tree_hash;
use crate::utils::errors::RemoteError;

/// Requests observed by the fake.
#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub uploads: usize,
    pub initiates: Vec<InitiateMultipart>,
    /// Range descriptor and body length of every part received.
    pub parts: Vec<(String, usize)>,
    pub completes: Vec<CompleteMultipart>,
    pub aborts: Vec<String>,
    pub jobs: Vec<JobParameters>,
    pub list_jobs: usize,
    pub outputs: Vec<String>,
    pub deletes: Vec<String>,
}

#[derive(Default)]
pub struct FakeGlacier {
    /// Checksum reported for single-request uploads instead of the real one.
    pub upload_checksum: Option<String>,
    pub upload_error: Option<String>,
    pub initiate_error: Option<String>,
    /// Truncate this file to the given length once the session is initiated.
    pub shrink_on_initiate: Option<(PathBuf, u64)>,
    /// Fail the part starting at this offset.
    pub part_error_at: Option<u64>,
    /// Report a wrong checksum for the part starting at this offset.
    pub corrupt_part_at: Option<u64>,
    /// Cancel the token and never answer when the part at this offset arrives.
    pub cancel_part_at: Option<(u64, CancellationToken)>,
    pub complete_error: Option<String>,
    /// Checksum reported on completion instead of the requested one.
    pub complete_checksum: Option<String>,
    pub abort_error: Option<String>,
    pub delete_error: Option<String>,
    pub job_error: Option<String>,
    pub list_jobs_error: Option<String>,
    /// Successive list-jobs answers; the last one repeats.
    pub job_listings: Mutex<VecDeque<Vec<JobDescription>>>,
    /// Output of each job id.
    pub outputs: HashMap<String, Vec<u8>>,
    pub output_error: Option<String>,
    pub calls: Mutex<Calls>,
}

impl FakeGlacier {
    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    pub fn script_listings(&self, listings: Vec<Vec<JobDescription>>) {
        *self.job_listings.lock().unwrap() = listings.into();
    }
}

pub fn vault() -> VaultRef {
    VaultRef {
        account_id: "account".into(),
        vault_name: "vault".into(),
    }
}

pub fn job(id: &str, completed: bool, status: JobStatusCode) -> JobDescription {
    JobDescription {
        job_id: id.into(),
        completed,
        status_code: status,
        status_message: None,
    }
}

fn fail(msg: &Option<String>) -> Result<(), RemoteError> {
    match msg {
        Some(msg) => Err(RemoteError::message(msg.clone())),
        None => Ok(()),
    }
}

fn offset_of(range: &str) -> u64 {
    range
        .trim_start_matches("bytes ")
        .split('-')
        .next()
        .and_then(|start| start.parse().ok())
        .unwrap_or(u64::MAX)
}

#[async_trait]
impl GlacierApi for FakeGlacier {
    async fn upload_archive(&self, _vault: &VaultRef, request: UploadArchive<'_>) -> Result<ArchiveCreation, RemoteError> {
        self.calls.lock().unwrap().uploads += 1;
        fail(&self.upload_error)?;
        Ok(ArchiveCreation {
            archive_id: "AWSID123".into(),
            checksum: self.upload_checksum.clone().unwrap_or_else(|| tree_hash(request.body)),
            location: "/account/vaults/vault/archives/AWSID123".into(),
        })
    }

    async fn initiate_multipart_upload(
        &self,
        _vault: &VaultRef,
        request: InitiateMultipart,
    ) -> Result<String, RemoteError> {
        self.calls.lock().unwrap().initiates.push(request);
        fail(&self.initiate_error)?;
        if let Some((path, len)) = &self.shrink_on_initiate {
            std::fs::OpenOptions::new().write(true).open(path)?.set_len(*len)?;
        }
        Ok("UPLOAD123".into())
    }

    async fn upload_multipart_part(&self, _vault: &VaultRef, request: UploadPart<'_>) -> Result<String, RemoteError> {
        let offset = offset_of(&request.range);
        self.calls
            .lock()
            .unwrap()
            .parts
            .push((request.range.clone(), request.body.len()));

        if let Some((at, token)) = &self.cancel_part_at {
            if *at == offset {
                token.cancel();
                std::future::pending::<()>().await;
            }
        }
        if self.part_error_at == Some(offset) {
            return Err(RemoteError::message("connection reset"));
        }
        if self.corrupt_part_at == Some(offset) {
            return Ok("corrupted".into());
        }
        Ok(tree_hash(request.body))
    }

    async fn complete_multipart_upload(
        &self,
        _vault: &VaultRef,
        request: CompleteMultipart,
    ) -> Result<ArchiveCreation, RemoteError> {
        self.calls.lock().unwrap().completes.push(request.clone());
        fail(&self.complete_error)?;
        Ok(ArchiveCreation {
            archive_id: "AWSID789".into(),
            checksum: self.complete_checksum.clone().unwrap_or(request.checksum),
            location: "/account/vaults/vault/archives/AWSID789".into(),
        })
    }

    async fn abort_multipart_upload(&self, _vault: &VaultRef, upload_id: &str) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().aborts.push(upload_id.to_string());
        fail(&self.abort_error)
    }

    async fn initiate_job(&self, _vault: &VaultRef, parameters: JobParameters) -> Result<String, RemoteError> {
        let mut calls = self.calls.lock().unwrap();
        calls.jobs.push(parameters);
        fail(&self.job_error)?;
        Ok(format!("JOB{}", calls.jobs.len()))
    }

    async fn list_jobs(&self, _vault: &VaultRef) -> Result<Vec<JobDescription>, RemoteError> {
        self.calls.lock().unwrap().list_jobs += 1;
        fail(&self.list_jobs_error)?;

        let mut listings = self.job_listings.lock().unwrap();
        let listing = if listings.len() > 1 {
            listings.pop_front().unwrap_or_default()
        } else {
            listings.front().cloned().unwrap_or_default()
        };
        Ok(listing)
    }

    async fn get_job_output(&self, _vault: &VaultRef, job_id: &str) -> Result<JobOutput, RemoteError> {
        self.calls.lock().unwrap().outputs.push(job_id.to_string());
        fail(&self.output_error)?;
        let data = self
            .outputs
            .get(job_id)
            .cloned()
            .ok_or_else(|| RemoteError::message(format!("no output for {}", job_id)))?;
        Ok(Box::pin(std::io::Cursor::new(data)))
    }

    async fn delete_archive(&self, _vault: &VaultRef, archive_id: &str) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().deletes.push(archive_id.to_string());
        fail(&self.delete_error)
    }
}
