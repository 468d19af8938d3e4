//! JSON file store: the whole record set lives in one pretty-printed array,
//! the same `tokens.json` layout the legacy file-backed service wrote.
//!
//! Every mutation is a full read-modify-write under one async mutex, and the
//! new contents are written to a sibling temp file and renamed over the
//! existing one. A failed write therefore leaves the previous file intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{InsertOutcome, RecordStore, StoreResult};
use crate::models::{TokenPatch, TokenRecord};

pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (and create with `[]` if missing) the JSON file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if tokio::fs::metadata(&path).await.is_err() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, b"[]").await?;
            tracing::info!(path = %path.display(), "created empty token file");
        }
        let store = Self {
            path,
            write_lock: Mutex::new(()),
        };
        // fail fast on a file we cannot parse
        store.load().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StoreResult<Vec<TokenRecord>> {
        let bytes = tokio::fs::read(&self.path).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, records: &[TokenRecord]) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(records)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn find_by_token(&self, token: &str) -> StoreResult<Option<TokenRecord>> {
        let records = self.load().await?;
        Ok(records.into_iter().find(|r| r.token == token))
    }

    async fn insert_if_absent(
        &self,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        if let Some(existing) = records.iter().find(|r| r.token == token) {
            return Ok(InsertOutcome {
                record: existing.clone(),
                created: false,
            });
        }

        let record = TokenRecord::new(token, created_at);
        records.push(record.clone());
        self.save(&records).await?;
        Ok(InsertOutcome {
            record,
            created: true,
        })
    }

    async fn update_fields(
        &self,
        token: &str,
        patch: &TokenPatch,
    ) -> StoreResult<Option<TokenRecord>> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;
        let Some(record) = records.iter_mut().find(|r| r.token == token) else {
            return Ok(None);
        };
        patch.apply(record);
        let updated = record.clone();
        self.save(&records).await?;
        Ok(Some(updated))
    }

    async fn list_all(&self, order_by_created_desc: bool) -> StoreResult<Vec<TokenRecord>> {
        let mut records = self.load().await?;
        if order_by_created_desc {
            super::sort_newest_first(&mut records);
        }
        Ok(records)
    }

    async fn ping(&self) -> StoreResult<()> {
        tokio::fs::metadata(&self.path).await?;
        Ok(())
    }
}
