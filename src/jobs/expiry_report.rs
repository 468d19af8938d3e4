//! Background job: report expiry drift.
//!
//! Expiry is lazy, so a token past its `expireAt` keeps `active = true` in
//! storage until someone deactivates or re-activates it. This job counts such
//! tokens and logs the totals. It never writes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time;

use crate::models::{TokenRecord, Validity};
use crate::registry::TokenRegistry;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExpiryReport {
    pub total: usize,
    pub inactive: usize,
    pub permanent: usize,
    pub valid_timed: usize,
    /// Still flagged active in storage but past expiry (or unparseable).
    pub expired_active: usize,
}

/// Classify every record as of `now`.
pub fn summarize(records: &[TokenRecord], now: DateTime<Utc>) -> ExpiryReport {
    let mut report = ExpiryReport {
        total: records.len(),
        ..Default::default()
    };
    for record in records {
        match record.validity_at(now) {
            Validity::Inactive | Validity::NotFound => report.inactive += 1,
            Validity::Permanent => report.permanent += 1,
            Validity::Valid { .. } => report.valid_timed += 1,
            Validity::Expired { .. } => report.expired_active += 1,
        }
    }
    report
}

/// Run the report once.
pub async fn run_once(registry: &TokenRegistry) -> anyhow::Result<ExpiryReport> {
    let records = registry.list_all().await?;
    let report = summarize(&records, registry.now());

    if report.expired_active > 0 {
        tracing::warn!(
            expired_active = report.expired_active,
            total = report.total,
            "tokens past expiry are still flagged active"
        );
    }
    tracing::info!(
        total = report.total,
        inactive = report.inactive,
        permanent = report.permanent,
        valid_timed = report.valid_timed,
        expired_active = report.expired_active,
        "expiry report"
    );
    Ok(report)
}

/// Spawn the periodic report. Call this once at startup.
pub fn spawn(registry: Arc<TokenRegistry>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = run_once(&registry).await {
                tracing::error!("expiry report failed: {}", e);
            }
        }
    });
}
