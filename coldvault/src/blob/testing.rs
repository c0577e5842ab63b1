//! In-memory bucket used by the blob backend tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::api::{BlobStore, ObjectAttrs, ObjectPage, ObjectReader};
use crate::utils::errors::RemoteError;

#[derive(Debug, Default, Clone)]
pub struct BlobCalls {
    pub puts: Vec<String>,
    pub list_pages: Vec<Option<String>>,
    pub opens: Vec<String>,
    pub deletes: Vec<String>,
    pub closes: usize,
}

pub struct FakeBlobStore {
    /// Objects by name: content and creation time.
    pub objects: Mutex<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
    pub page_size: usize,
    pub put_error: Option<String>,
    pub attrs_error: Option<String>,
    /// Fail when this page (0-based) is requested.
    pub list_error_at: Option<usize>,
    /// Object names whose download fails.
    pub open_errors: Vec<String>,
    pub delete_error: Option<String>,
    pub close_error: Option<String>,
    pub calls: Mutex<BlobCalls>,
}

impl Default for FakeBlobStore {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: 2,
            put_error: None,
            attrs_error: None,
            list_error_at: None,
            open_errors: Vec::new(),
            delete_error: None,
            close_error: None,
            calls: Mutex::new(BlobCalls::default()),
        }
    }
}

impl FakeBlobStore {
    pub fn calls(&self) -> BlobCalls {
        self.calls.lock().unwrap().clone()
    }

    /// Store an object created `minutes` after a fixed origin.
    pub fn insert(&self, name: &str, content: &[u8], minutes: i64) {
        let created = origin() + Duration::minutes(minutes);
        self.objects
            .lock()
            .unwrap()
            .insert(name.to_string(), (content.to_vec(), created));
    }

    fn attrs(name: &str, content: &[u8], created: DateTime<Utc>) -> ObjectAttrs {
        ObjectAttrs {
            name: name.to_string(),
            size: content.len() as u64,
            md5: Some(digest(content)),
            created,
        }
    }
}

pub fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 3, 1, 10, 0, 0).unwrap()
}

/// Content digest reported by the fake in place of a real MD5.
pub fn digest(content: &[u8]) -> Vec<u8> {
    Sha256::digest(content)[..16].to_vec()
}

fn fail(msg: &Option<String>) -> Result<(), RemoteError> {
    match msg {
        Some(msg) => Err(RemoteError::message(msg.clone())),
        None => Ok(()),
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    fn bucket(&self) -> &str {
        "backups"
    }

    async fn put_object(&self, name: &str, mut file: File, size: u64) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().puts.push(name.to_string());
        fail(&self.put_error)?;

        let mut content = Vec::with_capacity(size as usize);
        file.read_to_end(&mut content).await?;
        let created = origin() + Duration::days(1);
        self.objects
            .lock()
            .unwrap()
            .insert(name.to_string(), (content, created));
        Ok(())
    }

    async fn object_attrs(&self, name: &str) -> Result<ObjectAttrs, RemoteError> {
        fail(&self.attrs_error)?;
        let objects = self.objects.lock().unwrap();
        let (content, created) = objects
            .get(name)
            .ok_or_else(|| RemoteError::message(format!("object {} not found", name)))?;
        Ok(Self::attrs(name, content, *created))
    }

    async fn list_objects(&self, page_token: Option<&str>) -> Result<ObjectPage, RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .list_pages
            .push(page_token.map(str::to_string));

        let page: usize = page_token.and_then(|token| token.parse().ok()).unwrap_or(0);
        if self.list_error_at == Some(page) {
            return Err(RemoteError::message("listing interrupted"));
        }

        let objects = self.objects.lock().unwrap();
        let start = page * self.page_size;
        let items: Vec<ObjectAttrs> = objects
            .iter()
            .skip(start)
            .take(self.page_size)
            .map(|(name, (content, created))| Self::attrs(name, content, *created))
            .collect();
        let next_page_token = (start + self.page_size < objects.len()).then(|| (page + 1).to_string());

        Ok(ObjectPage { items, next_page_token })
    }

    async fn open_object(&self, name: &str) -> Result<ObjectReader, RemoteError> {
        self.calls.lock().unwrap().opens.push(name.to_string());
        if self.open_errors.iter().any(|failing| failing == name) {
            return Err(RemoteError::message("object unavailable"));
        }
        let content = self
            .objects
            .lock()
            .unwrap()
            .get(name)
            .map(|(content, _)| content.clone())
            .ok_or_else(|| RemoteError::message(format!("object {} not found", name)))?;
        Ok(Box::pin(std::io::Cursor::new(content)))
    }

    async fn delete_object(&self, name: &str) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().deletes.push(name.to_string());
        fail(&self.delete_error)?;
        self.objects.lock().unwrap().remove(name);
        Ok(())
    }

    async fn close(&self) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().closes += 1;
        fail(&self.close_error)
    }
}
