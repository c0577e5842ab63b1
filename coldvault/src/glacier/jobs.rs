//! Submission and polling of vault retrieval jobs.

use std::collections::BTreeSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::api::{GlacierApi, JobParameters, JobStatusCode, VaultRef};
use crate::utils::cancel::or_cancel;
use crate::utils::errors::{Cancelled, CloudError, Error, ErrorCode, JobsError, JobsErrorCode, Result};

/// Polls the vault job listing until every watched job reaches a terminal
/// state. No bound on the number of checks; only cancellation stops it early.
#[derive(Debug, Clone)]
pub struct JobWaiter {
    poll_interval: Duration,
}

impl JobWaiter {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Submit a job and return its id. `subject` identifies the failure
    /// (archive id, or empty for inventories).
    pub async fn submit<A: GlacierApi>(
        &self,
        api: &A,
        vault: &VaultRef,
        cancel: &CancellationToken,
        subject: &str,
        parameters: JobParameters,
    ) -> Result<String> {
        match or_cancel(cancel, api.initiate_job(vault, parameters)).await {
            None => Err(Error::new(subject, ErrorCode::Cancelled).with_cause(Cancelled).into()),
            Some(Err(e)) => Err(Error::new(subject, ErrorCode::InitJob).with_cause(e).into()),
            Some(Ok(job_id)) => {
                debug!("Job {} submitted for vault {}", job_id, vault.vault_name);
                Ok(job_id)
            }
        }
    }

    /// Wait until every job in `job_ids` has succeeded.
    pub async fn wait<A: GlacierApi>(
        &self,
        api: &A,
        vault: &VaultRef,
        cancel: &CancellationToken,
        job_ids: &[String],
    ) -> Result<()> {
        let mut pending: BTreeSet<String> = job_ids.iter().cloned().collect();
        if pending.is_empty() {
            return Ok(());
        }

        loop {
            let listing = match or_cancel(cancel, api.list_jobs(vault)).await {
                None => return Err(cancelled(&pending)),
                Some(Err(e)) => {
                    return Err(JobsError::new(pending.into_iter().collect(), JobsErrorCode::RetrievingJob)
                        .with_cause(e)
                        .into())
                }
                Some(Ok(listing)) => listing,
            };

            let missing: Vec<String> = pending
                .iter()
                .filter(|id| !listing.iter().any(|job| &job.job_id == *id))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(JobsError::new(missing, JobsErrorCode::JobNotFound).into());
            }

            for job in listing.iter().filter(|job| job.completed) {
                if !pending.contains(&job.job_id) {
                    continue;
                }
                match job.status_code {
                    JobStatusCode::Succeeded => {
                        info!("Job {} completed", job.job_id);
                        pending.remove(&job.job_id);
                    }
                    JobStatusCode::Failed => {
                        let message = job.status_message.clone().unwrap_or_else(|| "job failed".to_string());
                        return Err(Error::new(job.job_id.as_str(), ErrorCode::JobFailed)
                            .with_cause(message)
                            .into());
                    }
                    JobStatusCode::InProgress => {}
                }
            }

            if pending.is_empty() {
                return Ok(());
            }

            debug!("{} job(s) still running, next check in {:?}", pending.len(), self.poll_interval);
            if or_cancel(cancel, tokio::time::sleep(self.poll_interval)).await.is_none() {
                return Err(cancelled(&pending));
            }
        }
    }
}

fn cancelled(pending: &BTreeSet<String>) -> CloudError {
    JobsError::new(pending.iter().cloned().collect(), JobsErrorCode::Cancelled)
        .with_cause(Cancelled)
        .into()
}
