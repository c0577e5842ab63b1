//! Job-oriented vault backend.
//!
//! Uploads go through [`upload::Uploader`]. Listing and retrieval submit
//! vault jobs, wait for them with [`jobs::JobWaiter`] and then read the job
//! output.

pub mod api;
pub mod inventory;
pub mod jobs;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use self::api::{GlacierApi, JobParameters, VaultRef};
use self::inventory::Inventory;
use self::jobs::JobWaiter;
use self::upload::Uploader;
use crate::backup::{BackendKind, Backup};
use crate::clock::{Clock, SystemClock};
use crate::config::{GlacierConfig, TransferConfig};
use crate::storage::{distinct_ids, fetch_all, save_archive, ColdStorage};
use crate::utils::cancel::or_cancel;
use crate::utils::errors::{Cancelled, Error, ErrorCode, RemoteError, Result};

pub struct GlacierBackend<A> {
    api: Arc<A>,
    vault: VaultRef,
    uploader: Uploader<A>,
    waiter: JobWaiter,
    temp_dir: PathBuf,
}

impl<A: GlacierApi> GlacierBackend<A> {
    pub fn new(api: A, config: &GlacierConfig, transfer: &TransferConfig) -> Result<Self> {
        Self::with_clock(api, config, transfer, Arc::new(SystemClock))
    }

    /// Rejects transfer settings with a zero part size or poll interval.
    pub fn with_clock(
        api: A,
        config: &GlacierConfig,
        transfer: &TransferConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let api = Arc::new(api);
        let vault = VaultRef {
            account_id: config.account_id.clone(),
            vault_name: config.vault_name.clone(),
        };

        Ok(Self {
            uploader: Uploader::new(Arc::clone(&api), vault.clone(), transfer, clock)?,
            waiter: JobWaiter::new(transfer.poll_interval()),
            api,
            vault,
            temp_dir: std::env::temp_dir(),
        })
    }

    /// Directory receiving retrieved archives. Defaults to the OS temporary
    /// directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn vault(&self) -> &VaultRef {
        &self.vault
    }
}

/// Delete one archive from the vault.
pub(crate) async fn delete_archive<A: GlacierApi + ?Sized>(
    api: &A,
    vault: &VaultRef,
    cancel: &CancellationToken,
    id: &str,
) -> Result<()> {
    match or_cancel(cancel, api.delete_archive(vault, id)).await {
        None => Err(Error::new(id, ErrorCode::Cancelled).with_cause(Cancelled).into()),
        Some(Err(e)) => Err(Error::new(id, ErrorCode::RemovingArchive).with_cause(e).into()),
        Some(Ok(())) => {
            info!("Archive {} removed from vault {}", id, vault.vault_name);
            Ok(())
        }
    }
}

/// Copy the output of a finished archive-retrieval job into `dir`.
async fn download<A: GlacierApi>(
    api: Arc<A>,
    vault: VaultRef,
    dir: PathBuf,
    cancel: CancellationToken,
    id: String,
    job_id: String,
) -> Result<PathBuf> {
    let output = match or_cancel(&cancel, api.get_job_output(&vault, &job_id)).await {
        None => return Err(Error::new(id, ErrorCode::Cancelled).with_cause(Cancelled).into()),
        Some(result) => result.map_err(|e| Error::new(id.as_str(), ErrorCode::JobComplete).with_cause(e))?,
    };
    save_archive(&cancel, &dir, &id, output).await
}

#[async_trait]
impl<A: GlacierApi> ColdStorage for GlacierBackend<A> {
    fn backend(&self) -> BackendKind {
        BackendKind::Glacier
    }

    async fn send(&self, cancel: &CancellationToken, path: &Path) -> Result<Backup> {
        self.uploader.send(cancel, path).await
    }

    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<Backup>> {
        debug!("Listing archives of vault {}", self.vault.vault_name);

        let job_id = self
            .waiter
            .submit(self.api.as_ref(), &self.vault, cancel, "", JobParameters::inventory())
            .await?;
        self.waiter
            .wait(self.api.as_ref(), &self.vault, cancel, std::slice::from_ref(&job_id))
            .await?;

        let output = async {
            let mut reader = self.api.get_job_output(&self.vault, &job_id).await?;
            let mut document = Vec::new();
            reader.read_to_end(&mut document).await?;
            Ok::<_, RemoteError>(document)
        };
        let document = match or_cancel(cancel, output).await {
            None => return Err(Error::new(job_id.as_str(), ErrorCode::Cancelled).with_cause(Cancelled).into()),
            Some(result) => result.map_err(|e| Error::new(job_id.as_str(), ErrorCode::JobComplete).with_cause(e))?,
        };

        let inventory = Inventory::decode(&document)
            .map_err(|e| Error::new(job_id.as_str(), ErrorCode::DecodingData).with_cause(e))?;
        let backups = inventory.into_backups(&self.vault.vault_name);

        info!("{} archive(s) listed in vault {}", backups.len(), self.vault.vault_name);
        Ok(backups)
    }

    async fn get_many(&self, cancel: &CancellationToken, ids: &[String]) -> Result<HashMap<String, PathBuf>> {
        debug!("Retrieving archives {:?} from vault {}", ids, self.vault.vault_name);

        let ids = distinct_ids(ids);
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let job_id = self
                .waiter
                .submit(self.api.as_ref(), &self.vault, cancel, &id, JobParameters::archive(id.as_str()))
                .await?;
            jobs.push((id, job_id));
        }

        let job_ids: Vec<String> = jobs.iter().map(|(_, job_id)| job_id.clone()).collect();
        self.waiter.wait(self.api.as_ref(), &self.vault, cancel, &job_ids).await?;

        fetch_all(cancel, jobs, |cancel, id, job_id| {
            download(
                Arc::clone(&self.api),
                self.vault.clone(),
                self.temp_dir.clone(),
                cancel,
                id,
                job_id,
            )
        })
        .await
    }

    async fn remove(&self, cancel: &CancellationToken, id: &str) -> Result<()> {
        debug!("Removing archive {} from vault {}", id, self.vault.vault_name);
        delete_archive(self.api.as_ref(), &self.vault, cancel, id).await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
