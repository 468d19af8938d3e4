//! Token registry: the token state machine.
//!
//! ```text
//!   register ──► inactive ──activate──► active(permanent | until T)
//!                   ▲                        │
//!                   └──────deactivate────────┘
//! ```
//!
//! Expiry is lazy. `check_validity` compares the stored expiry with the
//! clock and reports `expired`, but never flips the stored flag.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::errors::{RegistryError, RegistryResult};
use crate::expiry::{self, MonthOverflow};
use crate::models::{
    Activation, ActivationMode, Deactivation, Registration, TokenPatch, TokenRecord, Validity,
};
use crate::store::{RecordStore, StoreError, StoreResult};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TokenRegistry {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    month_overflow: MonthOverflow,
    store_timeout: Duration,
    /// One mutex per token with a mutation in flight.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TokenRegistry {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            month_overflow: MonthOverflow::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            locks: DashMap::new(),
        }
    }

    pub fn from_config(store: Arc<dyn RecordStore>, cfg: &Config) -> Self {
        Self::new(store)
            .with_month_overflow(cfg.month_overflow)
            .with_store_timeout(cfg.store_timeout)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_month_overflow(mut self, policy: MonthOverflow) -> Self {
        self.month_overflow = policy;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Number of per-token locks currently held or awaited.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Register `token` as inactive. Registering a known token changes
    /// nothing and reports its current `active` flag.
    pub async fn register(&self, token: &str) -> RegistryResult<Registration> {
        require_token(token)?;
        self.with_token_lock(token, move || async move {
            let outcome = self
                .bounded(self.store.insert_if_absent(token, self.clock.now()))
                .await?;
            if outcome.created {
                tracing::info!(token = %token, "token registered");
            } else {
                tracing::debug!(token = %token, active = outcome.record.active, "token already registered");
            }
            Ok(Registration {
                created: outcome.created,
                active: outcome.record.active,
            })
        })
        .await
    }

    /// Activate `token` permanently, or for `duration_months` calendar months
    /// from now. Re-activation overwrites any previous expiry.
    pub async fn activate(
        &self,
        token: &str,
        duration_months: Option<i64>,
        permanent: bool,
    ) -> RegistryResult<Activation> {
        require_token(token)?;
        self.with_token_lock(token, move || async move {
            let record = self
                .bounded(self.store.find_by_token(token))
                .await?
                .ok_or(RegistryError::NotFound)?;

            let (mode, expire_at) = if permanent {
                (ActivationMode::Permanent, None)
            } else {
                let months = require_duration(duration_months)?;
                let now = self.clock.now();
                let at = expiry::add_months(now, months, self.month_overflow).ok_or_else(|| {
                    RegistryError::InvalidInput("durationMonths is out of range".into())
                })?;
                if at <= record.created_at {
                    return Err(RegistryError::InvalidInput(
                        "computed expiry is not after the token's creation time".into(),
                    ));
                }
                (ActivationMode::Timed, Some(at))
            };

            let updated = self
                .bounded(self.store.update_fields(token, &TokenPatch::activate(expire_at)))
                .await?
                .ok_or(RegistryError::NotFound)?;

            tracing::info!(
                token = %token,
                mode = ?mode,
                expire_at = ?updated.expire_at.as_ref().map(ToString::to_string),
                "token activated"
            );

            Ok(Activation {
                token: updated.token,
                expire_at: updated.expire_at,
                mode,
            })
        })
        .await
    }

    /// Clear the active flag. The stored expiry is left as it was.
    pub async fn deactivate(&self, token: &str) -> RegistryResult<Deactivation> {
        require_token(token)?;
        self.with_token_lock(token, move || async move {
            let updated = self
                .bounded(self.store.update_fields(token, &TokenPatch::deactivate()))
                .await?
                .ok_or(RegistryError::NotFound)?;
            tracing::info!(token = %token, "token deactivated");
            Ok(Deactivation {
                token: updated.token,
                deactivated: !updated.active,
            })
        })
        .await
    }

    /// Read-only validity check against the current clock.
    pub async fn check_validity(&self, token: &str) -> RegistryResult<Validity> {
        require_token(token)?;
        let validity = match self.bounded(self.store.find_by_token(token)).await? {
            None => Validity::NotFound,
            Some(record) => record.validity_at(self.clock.now()),
        };
        tracing::debug!(token = %token, valid = validity.is_valid(), reason = ?validity.reason(), "token checked");
        Ok(validity)
    }

    /// Every record, newest first. Token strings are returned unmasked.
    pub async fn list_all(&self) -> RegistryResult<Vec<TokenRecord>> {
        self.bounded(self.store.list_all(true)).await
    }

    async fn bounded<T, F>(&self, fut: F) -> RegistryResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!(timeout = ?self.store_timeout, "store call timed out");
                Err(StoreError::Timeout(self.store_timeout).into())
            }
        }
    }

    /// Run `f` while holding the mutex for `token`. Mutations of distinct
    /// tokens never wait on each other.
    async fn with_token_lock<T, F, Fut>(&self, token: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // Declared first so it drops last, after `lock` and `_guard`, even
        // when this future is cancelled mid-await.
        let _release = LockRelease {
            locks: &self.locks,
            token,
        };
        let lock = self
            .locks
            .entry(token.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        let _guard = lock.lock().await;
        f().await
    }
}

/// Drops the map entry for `token` once no caller holds or awaits its mutex.
struct LockRelease<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    token: &'a str,
}

impl Drop for LockRelease<'_> {
    fn drop(&mut self) {
        // Only the map still references the mutex: nobody is waiting on it.
        self.locks
            .remove_if(self.token, |_, m| Arc::strong_count(m) == 1);
    }
}

fn require_token(token: &str) -> RegistryResult<()> {
    if token.is_empty() {
        return Err(RegistryError::InvalidInput("token required".into()));
    }
    Ok(())
}

fn require_duration(duration_months: Option<i64>) -> RegistryResult<u32> {
    match duration_months {
        None => Err(RegistryError::InvalidInput(
            "durationMonths required unless permanent".into(),
        )),
        Some(m) if m <= 0 => Err(RegistryError::InvalidInput(
            "durationMonths must be a positive integer".into(),
        )),
        Some(m) => u32::try_from(m)
            .map_err(|_| RegistryError::InvalidInput("durationMonths is out of range".into())),
    }
}
