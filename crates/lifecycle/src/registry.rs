// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::primitives::Address;
use cbx_evm::{ContributionRecord, LedgerError, RecordId, RegistryRead};
use futures::future::join_all;
use std::{
    collections::HashMap,
    str::FromStr,
    sync::{Arc, Mutex as StdMutex, RwLock},
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// A record that could not be read during a reload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub id: RecordId,
    pub reason: String,
}

/// Result of a reload. Skipped records are non-fatal.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub records: Arc<Vec<ContributionRecord>>,
    pub skipped: Vec<SkippedRecord>,
    /// True when this call joined a reload that was already running
    pub coalesced: bool,
}

impl LoadReport {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Aggregates over disclosed amounts only. Unverified records count towards
/// `total_records` but never contribute an amount.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DonationStats {
    pub total_records: usize,
    pub verified_records: usize,
    pub total_disclosed: u64,
    pub average_disclosed: f64,
}

/// Percentage of the target reached, only known once the amount is disclosed
pub fn funding_progress(record: &ContributionRecord) -> Option<f64> {
    let amount = record.decrypted_amount()?;
    if record.target_amount == 0 {
        return Some(100.0);
    }
    Some((amount as f64 / record.target_amount as f64 * 100.0).min(100.0))
}

/// Parse a user supplied address. Hex case does not matter.
pub fn parse_address(value: &str) -> Option<Address> {
    Address::from_str(&value.trim().to_lowercase()).ok()
}

/// Cached view of every record on the registry contract.
///
/// The cache is only ever swapped as a whole and always reflects a confirmed
/// chain read.
pub struct ContributionRegistry {
    reader: Arc<dyn RegistryRead>,
    cache: RwLock<Arc<Vec<ContributionRecord>>>,
    reload_lock: Mutex<()>,
    last_outcome: StdMutex<Option<Result<LoadReport, LedgerError>>>,
}

impl ContributionRegistry {
    pub fn new(reader: Arc<dyn RegistryRead>) -> Self {
        Self {
            reader,
            cache: RwLock::new(Arc::new(Vec::new())),
            reload_lock: Mutex::new(()),
            last_outcome: StdMutex::new(None),
        }
    }

    /// Reload from the chain. A call made while another reload is running
    /// does not fetch; it waits and gets that reload's outcome, errors and
    /// skipped records included.
    pub async fn reload(&self) -> Result<LoadReport, LedgerError> {
        match self.reload_lock.try_lock() {
            Ok(_guard) => self.fetch_and_publish().await,
            Err(_) => {
                debug!("Reload already in flight, joining it");
                let _guard = self.reload_lock.lock().await;
                let outcome = self
                    .last_outcome
                    .lock()
                    .expect("Poisoned lock in ContributionRegistry")
                    .clone();
                match outcome {
                    Some(Ok(report)) => Ok(LoadReport {
                        coalesced: true,
                        ..report
                    }),
                    Some(Err(e)) => Err(e),
                    None => Ok(LoadReport {
                        records: self.records(),
                        skipped: vec![],
                        coalesced: true,
                    }),
                }
            }
        }
    }

    /// Reload after a committed transaction. Waits for any running reload and
    /// then always fetches, so the result includes the commit.
    pub async fn reload_after_mutation(&self) -> Result<LoadReport, LedgerError> {
        let _guard = self.reload_lock.lock().await;
        self.fetch_and_publish().await
    }

    /// Caller holds `reload_lock`
    async fn fetch_and_publish(&self) -> Result<LoadReport, LedgerError> {
        let outcome = self.fetch_and_swap().await;
        *self
            .last_outcome
            .lock()
            .expect("Poisoned lock in ContributionRegistry") = Some(outcome.clone());
        outcome
    }

    async fn fetch_and_swap(&self) -> Result<LoadReport, LedgerError> {
        let ids = self.reader.list_record_ids().await?;
        let fetched = join_all(ids.iter().map(|id| self.reader.get_record(id))).await;

        let snapshot = self.records();
        let previous: HashMap<&RecordId, &ContributionRecord> =
            snapshot.iter().map(|r| (&r.id, r)).collect();

        let mut records = Vec::with_capacity(ids.len());
        let mut skipped = Vec::new();
        for (id, result) in ids.iter().zip(fetched) {
            match result {
                Ok(record) => records.push(keep_verified(previous.get(id).copied(), record)),
                Err(e) => {
                    warn!(id = %id, error = %e, "Skipping unreadable record");
                    skipped.push(SkippedRecord {
                        id: id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let records = Arc::new(records);
        *self.cache.write().expect("Poisoned write in ContributionRegistry") = records.clone();
        info!(
            loaded = records.len(),
            skipped = skipped.len(),
            "Registry reloaded"
        );

        Ok(LoadReport {
            records,
            skipped,
            coalesced: false,
        })
    }

    /// Snapshot of the cached records
    pub fn records(&self) -> Arc<Vec<ContributionRecord>> {
        self.cache
            .read()
            .expect("Poisoned read in ContributionRegistry")
            .clone()
    }

    pub fn get(&self, id: &RecordId) -> Option<ContributionRecord> {
        self.records().iter().find(|r| &r.id == id).cloned()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.records().iter().any(|r| &r.id == id)
    }

    /// Records created by `creator`
    pub fn history_for(&self, creator: Address) -> Vec<ContributionRecord> {
        self.records()
            .iter()
            .filter(|r| r.creator == creator)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> DonationStats {
        let records = self.records();
        let total_records = records.len();
        let disclosed: Vec<u64> = records.iter().filter_map(|r| r.decrypted_amount()).collect();
        let total_disclosed: u64 = disclosed.iter().sum();
        let average_disclosed = if total_records > 0 {
            total_disclosed as f64 / total_records as f64
        } else {
            0.0
        };
        DonationStats {
            total_records,
            verified_records: disclosed.len(),
            total_disclosed,
            average_disclosed,
        }
    }
}

/// A verified record never goes back to unverified in the cache
fn keep_verified(
    previous: Option<&ContributionRecord>,
    fresh: ContributionRecord,
) -> ContributionRecord {
    match previous {
        Some(prev) if prev.is_verified() && !fresh.is_verified() => {
            error!(id = %fresh.id, "Chain reported a verified record as unverified, keeping verified state");
            prev.clone()
        }
        _ => fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(target: u64, verified: Option<u64>) -> ContributionRecord {
        let record = ContributionRecord::unverified(
            "charity-1".into(),
            "Wells",
            "",
            target,
            Address::ZERO,
            0,
        );
        match verified {
            Some(v) => record.with_verified_amount(v),
            None => record,
        }
    }

    #[test]
    fn test_funding_progress() {
        assert_eq!(funding_progress(&record(1000, None)), None);
        assert_eq!(funding_progress(&record(1000, Some(250))), Some(25.0));
        assert_eq!(funding_progress(&record(100, Some(250))), Some(100.0));
    }

    #[test]
    fn test_keep_verified() {
        let kept = keep_verified(Some(&record(10, Some(5))), record(10, None));
        assert_eq!(kept.decrypted_amount(), Some(5));

        let fresh = keep_verified(Some(&record(10, None)), record(10, Some(9)));
        assert_eq!(fresh.decrypted_amount(), Some(9));
    }

    #[test]
    fn test_parse_address_ignores_case() {
        let lower = parse_address("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        let mixed = parse_address("0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let upper = parse_address("0XF39FD6E51AAD88F6F4CE6AB8827279CFFFB92266");
        assert!(lower.is_some());
        assert_eq!(lower, mixed);
        assert_eq!(lower, upper);
        assert_eq!(parse_address("nope"), None);
    }
}
