//! Process-local store backed by a DashMap. Used for development and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{InsertOutcome, RecordStore, StoreResult};
use crate::models::{TokenPatch, TokenRecord};

#[derive(Clone)]
struct Slot {
    seq: u64,
    record: TokenRecord,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<String, Slot>>,
    next_seq: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record as-is, bypassing registration. Lets tests and imports
    /// load legacy data (including corrupt expiries).
    pub fn insert_raw(&self, record: TokenRecord) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.records
            .insert(record.token.clone(), Slot { seq, record });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_by_token(&self, token: &str) -> StoreResult<Option<TokenRecord>> {
        Ok(self.records.get(token).map(|slot| slot.record.clone()))
    }

    async fn insert_if_absent(
        &self,
        token: &str,
        created_at: DateTime<Utc>,
    ) -> StoreResult<InsertOutcome> {
        // the entry guard holds the shard lock, so check-and-insert is atomic
        match self.records.entry(token.to_string()) {
            Entry::Occupied(existing) => Ok(InsertOutcome {
                record: existing.get().record.clone(),
                created: false,
            }),
            Entry::Vacant(vacant) => {
                let record = TokenRecord::new(token, created_at);
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                vacant.insert(Slot {
                    seq,
                    record: record.clone(),
                });
                Ok(InsertOutcome {
                    record,
                    created: true,
                })
            }
        }
    }

    async fn update_fields(
        &self,
        token: &str,
        patch: &TokenPatch,
    ) -> StoreResult<Option<TokenRecord>> {
        Ok(self.records.get_mut(token).map(|mut slot| {
            patch.apply(&mut slot.record);
            slot.record.clone()
        }))
    }

    async fn list_all(&self, order_by_created_desc: bool) -> StoreResult<Vec<TokenRecord>> {
        let mut slots: Vec<Slot> = self.records.iter().map(|e| e.value().clone()).collect();
        slots.sort_by_key(|slot| slot.seq);
        let mut records: Vec<TokenRecord> = slots.into_iter().map(|slot| slot.record).collect();
        if order_by_created_desc {
            super::sort_newest_first(&mut records);
        }
        Ok(records)
    }
}
