//! Vault inventory document returned by an inventory-retrieval job.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::backup::{BackendKind, Backup};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Inventory {
    #[serde(rename = "VaultARN", default)]
    pub vault_arn: String,
    #[serde(default)]
    pub inventory_date: String,
    #[serde(default)]
    pub archive_list: Vec<InventoryArchive>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InventoryArchive {
    pub archive_id: String,
    #[serde(default)]
    pub archive_description: String,
    pub creation_date: DateTime<Utc>,
    pub size: u64,
    #[serde(rename = "SHA256TreeHash")]
    pub sha256_tree_hash: String,
}

impl Inventory {
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Archives of `container`, oldest first. Archives sharing a creation
    /// date keep the order of the document.
    pub fn into_backups(self, container: &str) -> Vec<Backup> {
        let mut archives = self.archive_list;
        archives.sort_by_key(|archive| archive.creation_date);

        archives
            .into_iter()
            .map(|archive| Backup {
                id: archive.archive_id,
                created_at: archive.creation_date,
                checksum: archive.sha256_tree_hash,
                container: container.to_string(),
                size_bytes: archive.size,
                backend: BackendKind::Glacier,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DOCUMENT: &str = r#"{
        "VaultARN": "arn:aws:glacier:us-east-1:111122223333:vaults/backups",
        "InventoryDate": "2016-12-28T00:00:00Z",
        "ArchiveList": [
            {
                "ArchiveId": "AWSID123",
                "ArchiveDescription": "backup file from 2016-12-27T08:14:53Z",
                "CreationDate": "2016-12-27T08:14:53Z",
                "Size": 120,
                "SHA256TreeHash": "a6d392677577af12fb1f4ceb510940374c3378455a1485b0226a35ef5ad65242"
            },
            {
                "ArchiveId": "AWSID122",
                "CreationDate": "2016-11-07T12:00:00Z",
                "Size": 4000,
                "SHA256TreeHash": "cb63324d2c35cdfcb4521e15ca4518bd0ed9dc2364a9f47de75151b3f9b4b705"
            },
            {
                "ArchiveId": "AWSID121",
                "CreationDate": "2016-12-27T08:14:53Z",
                "Size": 50,
                "SHA256TreeHash": "beef"
            }
        ]
    }"#;

    #[test]
    fn test_decode() {
        let inventory = Inventory::decode(DOCUMENT.as_bytes()).unwrap();
        assert_eq!(inventory.vault_arn, "arn:aws:glacier:us-east-1:111122223333:vaults/backups");
        assert_eq!(inventory.archive_list.len(), 3);
        assert_eq!(inventory.archive_list[1].archive_description, "");
        assert_eq!(inventory.archive_list[1].size, 4000);
    }

    #[test]
    fn test_backups_sorted_by_creation_date() {
        let backups = Inventory::decode(DOCUMENT.as_bytes()).unwrap().into_backups("backups");

        let ids: Vec<&str> = backups.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["AWSID122", "AWSID123", "AWSID121"]);

        assert_eq!(backups[0].created_at, Utc.with_ymd_and_hms(2016, 11, 7, 12, 0, 0).unwrap());
        assert_eq!(backups[0].container, "backups");
        assert_eq!(backups[0].size_bytes, 4000);
        assert_eq!(
            backups[0].checksum,
            "cb63324d2c35cdfcb4521e15ca4518bd0ed9dc2364a9f47de75151b3f9b4b705"
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Inventory::decode(b"{\"ArchiveList\": 42}").is_err());
        assert!(Inventory::decode(b"not json").is_err());
    }

    #[test]
    fn test_empty_vault() {
        let backups = Inventory::decode(b"{}").unwrap().into_backups("backups");
        assert!(backups.is_empty());
    }
}
