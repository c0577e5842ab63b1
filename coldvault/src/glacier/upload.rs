//! Chunked upload into a vault.
//!
//! Archives up to the configured threshold go out in a single request.
//! Larger ones are streamed through a multipart session, one part at a time,
//! reusing a single part-sized buffer.

use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::api::{CompleteMultipart, GlacierApi, InitiateMultipart, UploadArchive, UploadPart, VaultRef};
use crate::backup::{BackendKind, Backup};
use crate::checksum::{linear_hash, tree_hash, TreeHasher};
use crate::clock::Clock;
use crate::config::TransferConfig;
use crate::utils::cancel::or_cancel;
use crate::utils::errors::{Cancelled, Error, ErrorCode, MultipartError, MultipartErrorCode, Result};

/// Open multipart session. Lives from initiation until completion or abort.
struct MultipartSession {
    upload_id: String,
    part_size: usize,
    total_size: u64,
    /// Bytes acknowledged by the vault so far.
    offset: u64,
}

impl MultipartSession {
    fn part_error(&self, code: MultipartErrorCode) -> MultipartError {
        MultipartError::new(self.offset, self.total_size, code)
    }

    /// `bytes <start>-<end>/<total>`, end inclusive.
    fn range(&self, len: usize) -> String {
        format!(
            "bytes {}-{}/{}",
            self.offset,
            self.offset + len as u64 - 1,
            self.total_size
        )
    }
}

pub struct Uploader<A> {
    api: Arc<A>,
    vault: VaultRef,
    multipart_threshold: u64,
    part_size: usize,
    clock: Arc<dyn Clock>,
}

impl<A: GlacierApi> Uploader<A> {
    /// Fails with an initializing-session error when `transfer` holds a
    /// zero part size or poll interval.
    pub fn new(api: Arc<A>, vault: VaultRef, transfer: &TransferConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        transfer
            .validate()
            .map_err(|e| Error::new("", ErrorCode::InitializingSession).with_cause(e))?;

        Ok(Self {
            api,
            vault,
            multipart_threshold: transfer.multipart_threshold,
            part_size: transfer.part_size,
            clock,
        })
    }

    /// Upload the archive at `path` and return its vault record.
    pub async fn send(&self, cancel: &CancellationToken, path: &Path) -> Result<Backup> {
        let mut file = File::open(path)
            .await
            .map_err(|e| Error::new("", ErrorCode::OpeningArchive).with_cause(e))?;

        let metadata = file
            .metadata()
            .await
            .map_err(|e| Error::new("", ErrorCode::ArchiveInfo).with_cause(e))?;
        if !metadata.is_file() {
            return Err(Error::new("", ErrorCode::OpeningArchive)
                .with_cause(format!("{} is not a regular file", path.display()))
                .into());
        }

        let size = metadata.len();
        let created_at = self.clock.now();
        let description = format!("backup file from {}", created_at.to_rfc3339());

        let (archive_id, checksum) = if size <= self.multipart_threshold {
            debug!("Sending {} ({} bytes) in a single request", path.display(), size);
            self.send_single(cancel, &mut file, size, description).await?
        } else {
            debug!(
                "Sending {} ({} bytes) in parts of {} bytes",
                path.display(),
                size,
                self.part_size
            );
            self.send_multipart(cancel, &mut file, size, description).await?
        };

        info!("Archive {} stored in vault {} ({} bytes)", archive_id, self.vault.vault_name, size);

        Ok(Backup {
            id: archive_id,
            created_at,
            checksum,
            container: self.vault.vault_name.clone(),
            size_bytes: size,
            backend: BackendKind::Glacier,
        })
    }

    async fn send_single(
        &self,
        cancel: &CancellationToken,
        file: &mut File,
        size: u64,
        description: String,
    ) -> Result<(String, String)> {
        let mut body = Vec::with_capacity(size as usize);
        file.read_to_end(&mut body)
            .await
            .map_err(|e| Error::new("", ErrorCode::OpeningArchive).with_cause(e))?;

        let checksum = tree_hash(&body);
        let request = UploadArchive {
            description,
            body: &body,
            checksum: checksum.clone(),
            content_sha256: linear_hash(&body),
        };

        let creation = match or_cancel(cancel, self.api.upload_archive(&self.vault, request)).await {
            None => return Err(Error::new("", ErrorCode::Cancelled).with_cause(Cancelled).into()),
            Some(result) => result.map_err(|e| Error::new("", ErrorCode::SendingArchive).with_cause(e))?,
        };

        // A rejected single upload leaves nothing behind in the vault.
        if creation.checksum != checksum {
            return Err(Error::new("", ErrorCode::ComparingChecksums)
                .with_cause(format!(
                    "expected checksum {} but vault reported {}",
                    checksum, creation.checksum
                ))
                .into());
        }

        Ok((creation.id().to_string(), checksum))
    }

    async fn send_multipart(
        &self,
        cancel: &CancellationToken,
        file: &mut File,
        size: u64,
        description: String,
    ) -> Result<(String, String)> {
        let request = InitiateMultipart {
            description,
            part_size: self.part_size,
        };
        let upload_id = match or_cancel(cancel, self.api.initiate_multipart_upload(&self.vault, request)).await {
            None => return Err(Error::new("", ErrorCode::Cancelled).with_cause(Cancelled).into()),
            Some(result) => result.map_err(|e| Error::new("", ErrorCode::InitMultipart).with_cause(e))?,
        };

        let mut session = MultipartSession {
            upload_id,
            part_size: self.part_size,
            total_size: size,
            offset: 0,
        };

        let mut whole = TreeHasher::new();
        let mut part = vec![0u8; session.part_size];

        while session.offset < session.total_size {
            let want = (session.total_size - session.offset).min(session.part_size as u64) as usize;
            let body = &mut part[..want];

            if let Err(e) = file.read_exact(body).await {
                return Err(session.part_error(MultipartErrorCode::ReadingArchive).with_cause(e).into());
            }

            let checksum = tree_hash(body);
            let request = UploadPart {
                upload_id: &session.upload_id,
                range: session.range(want),
                body,
                checksum: checksum.clone(),
            };

            let reported = match or_cancel(cancel, self.api.upload_multipart_part(&self.vault, request)).await {
                None => {
                    self.abort(&session).await;
                    return Err(session.part_error(MultipartErrorCode::Cancelled).with_cause(Cancelled).into());
                }
                Some(Err(e)) => {
                    self.abort(&session).await;
                    return Err(session.part_error(MultipartErrorCode::SendingArchive).with_cause(e).into());
                }
                Some(Ok(reported)) => reported,
            };

            if reported != checksum {
                self.abort(&session).await;
                return Err(session
                    .part_error(MultipartErrorCode::ComparingChecksums)
                    .with_cause(format!("expected checksum {} but vault reported {}", checksum, reported))
                    .into());
            }

            whole.update(&part[..want]);
            session.offset += want as u64;
            debug!("Part acknowledged, {}/{} bytes sent", session.offset, session.total_size);
        }

        let checksum = whole.finalize_hex();
        let request = CompleteMultipart {
            upload_id: session.upload_id.clone(),
            archive_size: session.total_size,
            checksum: checksum.clone(),
        };

        let creation = match or_cancel(cancel, self.api.complete_multipart_upload(&self.vault, request)).await {
            None => {
                self.abort(&session).await;
                return Err(Error::new(session.upload_id.as_str(), ErrorCode::Cancelled)
                    .with_cause(Cancelled)
                    .into());
            }
            Some(Err(e)) => {
                self.abort(&session).await;
                return Err(Error::new(session.upload_id.as_str(), ErrorCode::CompleteMultipart)
                    .with_cause(e)
                    .into());
            }
            Some(Ok(creation)) => creation,
        };

        let archive_id = creation.id().to_string();
        if creation.checksum != checksum {
            warn!(
                "Archive {} is corrupted (expected {}, vault reported {}), removing it",
                archive_id, checksum, creation.checksum
            );
            let corrupted = Error::new(archive_id.as_str(), ErrorCode::ComparingChecksums);
            return match super::delete_archive(self.api.as_ref(), &self.vault, cancel, &archive_id).await {
                Ok(()) => Err(corrupted.into()),
                Err(removal) => Err(corrupted.with_cause(removal).into()),
            };
        }

        Ok((archive_id, checksum))
    }

    /// Best-effort abort; a failure only gets logged so the part error wins.
    async fn abort(&self, session: &MultipartSession) {
        if let Err(e) = self.api.abort_multipart_upload(&self.vault, &session.upload_id).await {
            warn!("Failed to abort multipart upload {}: {}", session.upload_id, e);
        }
    }
}
