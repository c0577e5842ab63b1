//! Coldvault
//!
//! Transfer engine moving backup archives to and from cold-storage backends:
//! a job-oriented vault (chunked uploads, retrieval jobs) and a streaming
//! object store. Every stored archive is verified against the checksum the
//! backend reports.

pub mod backup;
pub mod blob;
pub mod checksum;
pub mod clock;
pub mod config;
pub mod glacier;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use backup::{BackendKind, Backup};
pub use blob::BlobBackend;
pub use config::Config;
pub use glacier::GlacierBackend;
pub use storage::ColdStorage;
pub use utils::errors::CloudError;
pub type Result<T> = std::result::Result<T, CloudError>;
