//! Error taxonomy for cold-storage transfers.
//!
//! Three shapes share the same layout: a stable code, the identifying fields
//! of the failed step and an optional low-level cause. [`CloudError`] is the
//! type returned by every public operation.

use std::error::Error as StdError;
use std::fmt;

/// Boxed low-level cause carried by every error shape.
pub type Cause = Box<dyn StdError + Send + Sync>;

/// Transport or API failure reported by a remote store client.
#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decoding error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Message(String),
}

impl RemoteError {
    pub fn message(msg: impl Into<String>) -> Self {
        RemoteError::Message(msg.into())
    }
}

/// Cause attached to errors produced by a cancelled token.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Codes for general per-operation failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InitializingSession,
    OpeningArchive,
    ArchiveInfo,
    SendingArchive,
    ComparingChecksums,
    InitMultipart,
    CompleteMultipart,
    InitJob,
    JobComplete,
    JobFailed,
    DecodingData,
    CreatingArchive,
    CopyingData,
    RemovingArchive,
    Iterating,
    DownloadingArchive,
    ClosingConnection,
    Cancelled,
    /// Code not known to this build, kept verbatim.
    Unknown(String),
}

impl ErrorCode {
    /// Parse a stable code identifier. Unrecognized identifiers are kept in
    /// [`ErrorCode::Unknown`].
    pub fn from_code(code: &str) -> Self {
        match code {
            "initializing-session" => ErrorCode::InitializingSession,
            "opening-archive" => ErrorCode::OpeningArchive,
            "archive-info" => ErrorCode::ArchiveInfo,
            "sending-archive" => ErrorCode::SendingArchive,
            "comparing-checksums" => ErrorCode::ComparingChecksums,
            "init-multipart" => ErrorCode::InitMultipart,
            "complete-multipart" => ErrorCode::CompleteMultipart,
            "init-job" => ErrorCode::InitJob,
            "job-complete" => ErrorCode::JobComplete,
            "job-failed" => ErrorCode::JobFailed,
            "decoding-data" => ErrorCode::DecodingData,
            "creating-archive" => ErrorCode::CreatingArchive,
            "copying-data" => ErrorCode::CopyingData,
            "removing-archive" => ErrorCode::RemovingArchive,
            "iterating" => ErrorCode::Iterating,
            "downloading-archive" => ErrorCode::DownloadingArchive,
            "closing-connection" => ErrorCode::ClosingConnection,
            "cancelled" => ErrorCode::Cancelled,
            other => ErrorCode::Unknown(other.to_string()),
        }
    }

    /// Stable identifier of the code.
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::InitializingSession => "initializing-session",
            ErrorCode::OpeningArchive => "opening-archive",
            ErrorCode::ArchiveInfo => "archive-info",
            ErrorCode::SendingArchive => "sending-archive",
            ErrorCode::ComparingChecksums => "comparing-checksums",
            ErrorCode::InitMultipart => "init-multipart",
            ErrorCode::CompleteMultipart => "complete-multipart",
            ErrorCode::InitJob => "init-job",
            ErrorCode::JobComplete => "job-complete",
            ErrorCode::JobFailed => "job-failed",
            ErrorCode::DecodingData => "decoding-data",
            ErrorCode::CreatingArchive => "creating-archive",
            ErrorCode::CopyingData => "copying-data",
            ErrorCode::RemovingArchive => "removing-archive",
            ErrorCode::Iterating => "iterating",
            ErrorCode::DownloadingArchive => "downloading-archive",
            ErrorCode::ClosingConnection => "closing-connection",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Unknown(raw) => raw,
        }
    }

    /// Human readable text of the code.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::InitializingSession => "error initializing cloud session",
            ErrorCode::OpeningArchive => "error opening archive",
            ErrorCode::ArchiveInfo => "error retrieving archive information",
            ErrorCode::SendingArchive => "error sending archive to the cloud",
            ErrorCode::ComparingChecksums => "error comparing checksums",
            ErrorCode::InitMultipart => "error initializing multipart upload",
            ErrorCode::CompleteMultipart => "error completing multipart upload",
            ErrorCode::InitJob => "error initiating the job",
            ErrorCode::JobComplete => "error retrieving the complete job data",
            ErrorCode::JobFailed => "job failed to complete in the cloud",
            ErrorCode::DecodingData => "error decoding the inventory",
            ErrorCode::CreatingArchive => "error creating backup file",
            ErrorCode::CopyingData => "error copying data to the backup file",
            ErrorCode::RemovingArchive => "error removing backup",
            ErrorCode::Iterating => "error iterating over the remote objects",
            ErrorCode::DownloadingArchive => "error downloading backup",
            ErrorCode::ClosingConnection => "error closing cloud connection",
            ErrorCode::Cancelled => "action cancelled by the user",
            ErrorCode::Unknown(_) => "unknown error code",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Codes for failures on a single part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MultipartErrorCode {
    ReadingArchive,
    SendingArchive,
    ComparingChecksums,
    Cancelled,
    Unknown(String),
}

impl MultipartErrorCode {
    pub fn from_code(code: &str) -> Self {
        match code {
            "reading-archive" => MultipartErrorCode::ReadingArchive,
            "sending-archive" => MultipartErrorCode::SendingArchive,
            "comparing-checksums" => MultipartErrorCode::ComparingChecksums,
            "cancelled" => MultipartErrorCode::Cancelled,
            other => MultipartErrorCode::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MultipartErrorCode::ReadingArchive => "reading-archive",
            MultipartErrorCode::SendingArchive => "sending-archive",
            MultipartErrorCode::ComparingChecksums => "comparing-checksums",
            MultipartErrorCode::Cancelled => "cancelled",
            MultipartErrorCode::Unknown(raw) => raw,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            MultipartErrorCode::ReadingArchive => "error reading an archive part",
            MultipartErrorCode::SendingArchive => "error sending an archive part",
            MultipartErrorCode::ComparingChecksums => "error comparing checksums on archive part",
            MultipartErrorCode::Cancelled => "action cancelled by the user",
            MultipartErrorCode::Unknown(_) => "unknown error code",
        }
    }
}

impl fmt::Display for MultipartErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Codes for failures of the job waiter itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobsErrorCode {
    RetrievingJob,
    JobNotFound,
    Cancelled,
    Unknown(String),
}

impl JobsErrorCode {
    pub fn from_code(code: &str) -> Self {
        match code {
            "retrieving-job" => JobsErrorCode::RetrievingJob,
            "job-not-found" => JobsErrorCode::JobNotFound,
            "cancelled" => JobsErrorCode::Cancelled,
            other => JobsErrorCode::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobsErrorCode::RetrievingJob => "retrieving-job",
            JobsErrorCode::JobNotFound => "job-not-found",
            JobsErrorCode::Cancelled => "cancelled",
            JobsErrorCode::Unknown(raw) => raw,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            JobsErrorCode::RetrievingJob => "error retrieving the job status",
            JobsErrorCode::JobNotFound => "job not found",
            JobsErrorCode::Cancelled => "action cancelled by the user",
            JobsErrorCode::Unknown(_) => "unknown error code",
        }
    }
}

impl fmt::Display for JobsErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// General per-operation failure. `id` is the archive or job identifier when
/// known, empty otherwise.
#[derive(Debug)]
pub struct Error {
    pub id: String,
    pub code: ErrorCode,
    pub cause: Option<Cause>,
}

impl Error {
    pub fn new(id: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            id: id.into(),
            code,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Compares code, id and the message of the deepest cause.
    pub fn equivalent(&self, other: &Error) -> bool {
        self.id == other.id
            && self.code == other.code
            && deepest_message(self.cause.as_deref()) == deepest_message(other.cause.as_deref())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cloud: ")?;
        if !self.id.is_empty() {
            write!(f, "id \"{}\", ", self.id)?;
        }
        write!(f, "{}", self.code)?;
        write_details(f, self.cause.as_deref())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        as_source(self.cause.as_deref())
    }
}

/// Failure on one part of a multipart upload. `offset` is the first byte of
/// the part, `size` the total archive size.
#[derive(Debug)]
pub struct MultipartError {
    pub offset: u64,
    pub size: u64,
    pub code: MultipartErrorCode,
    pub cause: Option<Cause>,
}

impl MultipartError {
    pub fn new(offset: u64, size: u64, code: MultipartErrorCode) -> Self {
        Self {
            offset,
            size,
            code,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn equivalent(&self, other: &MultipartError) -> bool {
        self.offset == other.offset
            && self.size == other.size
            && self.code == other.code
            && deepest_message(self.cause.as_deref()) == deepest_message(other.cause.as_deref())
    }
}

impl fmt::Display for MultipartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cloud: offset {}/{}, {}", self.offset, self.size, self.code)?;
        write_details(f, self.cause.as_deref())
    }
}

impl StdError for MultipartError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        as_source(self.cause.as_deref())
    }
}

/// Failure of the job waiter (as opposed to a job failing remotely, which is
/// an [`Error`] with [`ErrorCode::JobFailed`]).
#[derive(Debug)]
pub struct JobsError {
    pub job_ids: Vec<String>,
    pub code: JobsErrorCode,
    pub cause: Option<Cause>,
}

impl JobsError {
    pub fn new(job_ids: Vec<String>, code: JobsErrorCode) -> Self {
        Self {
            job_ids,
            code,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn equivalent(&self, other: &JobsError) -> bool {
        self.job_ids == other.job_ids
            && self.code == other.code
            && deepest_message(self.cause.as_deref()) == deepest_message(other.cause.as_deref())
    }
}

impl fmt::Display for JobsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cloud: ")?;
        if !self.job_ids.is_empty() {
            write!(f, "jobs [{}], ", self.job_ids.join(", "))?;
        }
        write!(f, "{}", self.code)?;
        write_details(f, self.cause.as_deref())
    }
}

impl StdError for JobsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        as_source(self.cause.as_deref())
    }
}

/// Error returned by every transfer operation.
#[derive(thiserror::Error, Debug)]
pub enum CloudError {
    #[error(transparent)]
    General(#[from] Error),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Jobs(#[from] JobsError),
}

impl CloudError {
    /// Compares two errors down to the message of their deepest cause.
    pub fn equivalent(&self, other: &CloudError) -> bool {
        match (self, other) {
            (CloudError::General(a), CloudError::General(b)) => a.equivalent(b),
            (CloudError::Multipart(a), CloudError::Multipart(b)) => a.equivalent(b),
            (CloudError::Jobs(a), CloudError::Jobs(b)) => a.equivalent(b),
            _ => false,
        }
    }

    /// True when the operation stopped because its token was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match self {
            CloudError::General(e) => e.code == ErrorCode::Cancelled,
            CloudError::Multipart(e) => e.code == MultipartErrorCode::Cancelled,
            CloudError::Jobs(e) => e.code == JobsErrorCode::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

fn write_details(f: &mut fmt::Formatter<'_>, cause: Option<&(dyn StdError + Send + Sync)>) -> fmt::Result {
    match cause {
        Some(cause) => write!(f, ". details: {}", cause),
        None => Ok(()),
    }
}

fn as_source<'a>(cause: Option<&'a (dyn StdError + Send + Sync + 'static)>) -> Option<&'a (dyn StdError + 'static)> {
    cause.map(|c| c as &(dyn StdError + 'static))
}

/// Message of the last error in the `source()` chain starting at `cause`.
fn deepest_message(cause: Option<&(dyn StdError + Send + Sync + 'static)>) -> Option<String> {
    let mut current: &(dyn StdError + 'static) = cause?;
    while let Some(next) = current.source() {
        current = next;
    }
    Some(current.to_string())
}
