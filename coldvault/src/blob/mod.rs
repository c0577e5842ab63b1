//! Streaming object-store backend.
//!
//! Objects are written in one streamed request and read back in one
//! streamed download. No jobs and no chunking are involved.

pub mod api;
pub mod gcs;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use self::api::BlobStore;
use self::gcs::GcsClient;
use crate::backup::{BackendKind, Backup};
use crate::clock::{Clock, SystemClock};
use crate::config::GcsConfig;
use crate::storage::{distinct_ids, fetch_all, save_archive, ColdStorage};
use crate::utils::cancel::or_cancel;
use crate::utils::errors::{Cancelled, Error, ErrorCode, Result};

pub struct BlobBackend<S> {
    /// Taken out on close.
    store: RwLock<Option<Arc<S>>>,
    clock: Arc<dyn Clock>,
    temp_dir: PathBuf,
}

impl BlobBackend<GcsClient> {
    /// Backend over Google Cloud Storage.
    pub fn connect(config: &GcsConfig) -> Result<Self> {
        Ok(Self::new(GcsClient::new(config)?))
    }
}

impl<S: BlobStore> BlobBackend<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: RwLock::new(Some(Arc::new(store))),
            clock,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Directory receiving downloaded archives. Defaults to the OS temporary
    /// directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    async fn store(&self) -> Result<Arc<S>> {
        self.store.read().await.clone().ok_or_else(|| {
            Error::new("", ErrorCode::InitializingSession)
                .with_cause("backend already closed")
                .into()
        })
    }

    /// Name of a new object: hex SHA-256 of the source path followed by the
    /// current time in nanoseconds.
    fn object_name(&self, path: &Path) -> String {
        let digest = Sha256::digest(path.to_string_lossy().as_bytes());
        let nanos = self.clock.now().timestamp_nanos_opt().unwrap_or_default();
        format!("{}{}", hex::encode(digest), nanos)
    }
}

async fn download<S: BlobStore>(store: Arc<S>, dir: PathBuf, cancel: CancellationToken, id: String) -> Result<PathBuf> {
    let reader = match or_cancel(&cancel, store.open_object(&id)).await {
        None => return Err(Error::new(id, ErrorCode::Cancelled).with_cause(Cancelled).into()),
        Some(result) => result.map_err(|e| Error::new(id.as_str(), ErrorCode::DownloadingArchive).with_cause(e))?,
    };
    save_archive(&cancel, &dir, &id, reader).await
}

#[async_trait]
impl<S: BlobStore> ColdStorage for BlobBackend<S> {
    fn backend(&self) -> BackendKind {
        BackendKind::Gcs
    }

    async fn send(&self, cancel: &CancellationToken, path: &Path) -> Result<Backup> {
        let store = self.store().await?;
        debug!("Sending {} to bucket {}", path.display(), store.bucket());

        let file = File::open(path)
            .await
            .map_err(|e| Error::new("", ErrorCode::OpeningArchive).with_cause(e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| Error::new("", ErrorCode::ArchiveInfo).with_cause(e))?
            .len();

        let name = self.object_name(path);
        match or_cancel(cancel, store.put_object(&name, file, size)).await {
            None => return Err(Error::new(name, ErrorCode::Cancelled).with_cause(Cancelled).into()),
            Some(result) => result.map_err(|e| Error::new(name.as_str(), ErrorCode::SendingArchive).with_cause(e))?,
        }

        let attrs = match or_cancel(cancel, store.object_attrs(&name)).await {
            None => return Err(Error::new(name, ErrorCode::Cancelled).with_cause(Cancelled).into()),
            Some(result) => result.map_err(|e| Error::new(name.as_str(), ErrorCode::ArchiveInfo).with_cause(e))?,
        };

        info!("Object {} stored in bucket {} ({} bytes)", attrs.name, store.bucket(), attrs.size);
        Ok(Backup {
            id: attrs.name,
            created_at: attrs.created,
            checksum: attrs.md5.map(hex::encode).unwrap_or_default(),
            container: store.bucket().to_string(),
            size_bytes: attrs.size,
            backend: BackendKind::Gcs,
        })
    }

    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<Backup>> {
        let store = self.store().await?;
        debug!("Listing objects of bucket {}", store.bucket());

        let mut backups = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = match or_cancel(cancel, store.list_objects(page_token.as_deref())).await {
                None => return Err(Error::new("", ErrorCode::Cancelled).with_cause(Cancelled).into()),
                Some(result) => result.map_err(|e| Error::new("", ErrorCode::Iterating).with_cause(e))?,
            };

            backups.extend(page.items.into_iter().map(|attrs| Backup {
                id: attrs.name,
                created_at: attrs.created,
                checksum: attrs.md5.map(hex::encode).unwrap_or_default(),
                container: store.bucket().to_string(),
                size_bytes: attrs.size,
                backend: BackendKind::Gcs,
            }));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        backups.sort_by_key(|backup| backup.created_at);
        info!("{} object(s) listed in bucket {}", backups.len(), store.bucket());
        Ok(backups)
    }

    async fn get_many(&self, cancel: &CancellationToken, ids: &[String]) -> Result<HashMap<String, PathBuf>> {
        let store = self.store().await?;
        debug!("Retrieving objects {:?} from bucket {}", ids, store.bucket());

        let items = distinct_ids(ids).into_iter().map(|id| (id, ())).collect();
        fetch_all(cancel, items, |cancel, id, ()| {
            download(Arc::clone(&store), self.temp_dir.clone(), cancel, id)
        })
        .await
    }

    async fn remove(&self, cancel: &CancellationToken, id: &str) -> Result<()> {
        let store = self.store().await?;
        debug!("Removing object {} from bucket {}", id, store.bucket());

        match or_cancel(cancel, store.delete_object(id)).await {
            None => Err(Error::new(id, ErrorCode::Cancelled).with_cause(Cancelled).into()),
            Some(Err(e)) => Err(Error::new(id, ErrorCode::RemovingArchive).with_cause(e).into()),
            Some(Ok(())) => {
                info!("Object {} removed from bucket {}", id, store.bucket());
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<()> {
        let Some(store) = self.store.write().await.take() else {
            return Ok(());
        };
        store
            .close()
            .await
            .map_err(|e| Error::new("", ErrorCode::ClosingConnection).with_cause(e).into())
    }
}
