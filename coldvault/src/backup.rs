//! Record of an archive held by a cold-storage backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cold-storage system holding an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackendKind {
    /// Job-oriented vault storage (chunked uploads, retrieval jobs).
    Glacier,
    /// Streaming object storage (Google Cloud Storage).
    Gcs,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Glacier => "glacier",
            BackendKind::Gcs => "gcs",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a backend name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid backend \"{0}\"")]
pub struct InvalidBackend(pub String);

impl FromStr for BackendKind {
    type Err = InvalidBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "glacier" | "aws" => Ok(BackendKind::Glacier),
            "gcs" | "google" => Ok(BackendKind::Gcs),
            _ => Err(InvalidBackend(s.to_string())),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = InvalidBackend;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackendKind> for String {
    fn from(kind: BackendKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Information about an archive already transferred to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    /// Backend-assigned identifier, unique within the container.
    pub id: String,

    /// Creation time declared by the backend, or taken from the clock at
    /// upload time.
    pub created_at: DateTime<Utc>,

    /// Hex-encoded content hash. Tree hash for Glacier, MD5 for GCS.
    pub checksum: String,

    /// Vault or bucket name.
    pub container: String,

    /// Archive size in bytes.
    pub size_bytes: u64,

    pub backend: BackendKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("glacier".parse::<BackendKind>(), Ok(BackendKind::Glacier));
        assert_eq!("AWS".parse::<BackendKind>(), Ok(BackendKind::Glacier));
        assert_eq!(" gcs ".parse::<BackendKind>(), Ok(BackendKind::Gcs));
        assert_eq!(
            "s3".parse::<BackendKind>(),
            Err(InvalidBackend("s3".to_string()))
        );
        assert!("".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_backend_kind_serde_rejects_unknown() {
        let kind: BackendKind = serde_json::from_str("\"gcs\"").unwrap();
        assert_eq!(kind, BackendKind::Gcs);
        assert_eq!(serde_json::to_string(&BackendKind::Glacier).unwrap(), "\"glacier\"");
        assert!(serde_json::from_str::<BackendKind>("\"tape\"").is_err());
    }
}
