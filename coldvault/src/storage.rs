//! Transfer contract shared by every cold-storage backend.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backup::{BackendKind, Backup};
use crate::utils::cancel::or_cancel;
use crate::utils::errors::{Cancelled, Error, ErrorCode, Result};

/// Operations every backend offers to the rest of the system.
///
/// Every operation observes `cancel`: a cancelled token stops the pending
/// network call, wait or copy and yields an error with a cancelled code.
#[async_trait]
pub trait ColdStorage: Send + Sync {
    /// Backend tag written into returned [`Backup`] values.
    fn backend(&self) -> BackendKind;

    /// Upload the archive at `path`.
    async fn send(&self, cancel: &CancellationToken, path: &Path) -> Result<Backup>;

    /// All archives held by the backend, oldest first.
    async fn list(&self, cancel: &CancellationToken) -> Result<Vec<Backup>>;

    /// Retrieve archives into local temporary files, keyed by archive id.
    /// The first failure aborts the remaining downloads.
    async fn get_many(&self, cancel: &CancellationToken, ids: &[String]) -> Result<HashMap<String, PathBuf>>;

    /// Retrieve a single archive and return the local file holding it.
    async fn get(&self, cancel: &CancellationToken, id: &str) -> Result<PathBuf> {
        let mut files = self.get_many(cancel, &[id.to_string()]).await?;
        files
            .remove(id)
            .ok_or_else(|| Error::new(id, ErrorCode::CopyingData).into())
    }

    /// Erase an archive from the backend.
    async fn remove(&self, cancel: &CancellationToken, id: &str) -> Result<()>;

    /// Release the underlying client. Closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Local file receiving a retrieved archive: `backup-<id>.tar` in `dir`.
pub fn retrieved_archive_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("backup-{}.tar", id))
}

/// Copy a retrieved archive stream into `backup-<id>.tar` under `dir`.
/// A partially written file is removed when the copy fails.
pub(crate) async fn save_archive<R>(cancel: &CancellationToken, dir: &Path, id: &str, mut reader: R) -> Result<PathBuf>
where
    R: AsyncRead + Unpin + Send,
{
    let path = retrieved_archive_path(dir, id);
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| Error::new(id, ErrorCode::CreatingArchive).with_cause(e))?;

    let copied = match or_cancel(cancel, tokio::io::copy(&mut reader, &mut file)).await {
        None => Err(Error::new(id, ErrorCode::Cancelled).with_cause(Cancelled)),
        Some(Err(e)) => Err(Error::new(id, ErrorCode::CopyingData).with_cause(e)),
        Some(Ok(_)) => file
            .flush()
            .await
            .map_err(|e| Error::new(id, ErrorCode::CopyingData).with_cause(e)),
    };

    if let Err(err) = copied {
        drop(file);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove partial archive {}: {}", path.display(), e);
        }
        return Err(err.into());
    }

    info!("Backup {} retrieved and saved in {}", id, path.display());
    Ok(path)
}

/// `ids` without repeats, first occurrence order kept. Two downloads of the
/// same id would share one `backup-<id>.tar`.
pub(crate) fn distinct_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect()
}

/// Run one download task per archive id. The first failure cancels the
/// siblings and waits for them to stop before it is returned.
///
/// Siblings are never aborted: each one must observe the cancelled token and
/// run its own cleanup, so a partial archive never outlives the call.
pub(crate) async fn fetch_all<T, F, Fut>(
    cancel: &CancellationToken,
    items: Vec<(String, T)>,
    fetch: F,
) -> Result<HashMap<String, PathBuf>>
where
    T: Send + 'static,
    F: Fn(CancellationToken, String, T) -> Fut,
    Fut: Future<Output = Result<PathBuf>> + Send + 'static,
{
    let siblings = cancel.child_token();
    let mut tasks = JoinSet::new();

    for (id, item) in items {
        let download = fetch(siblings.clone(), id.clone(), item);
        tasks.spawn(async move { (id, download.await) });
    }

    let mut files = HashMap::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok((id, Ok(path))) => {
                files.insert(id, path);
                continue;
            }
            Ok((_, Err(err))) => err,
            Err(e) => Error::new("", ErrorCode::CopyingData).with_cause(e).into(),
        };

        siblings.cancel();
        while tasks.join_next().await.is_some() {}
        return Err(failure);
    }

    Ok(files)
}
