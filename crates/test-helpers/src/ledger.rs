// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::primitives::{keccak256, Address, Bytes, TxHash, B256, U256};
use async_trait::async_trait;
use cbx_evm::{
    CiphertextHandle, Confirmation, ContributionRecord, LedgerError, PendingTx, RecordId,
    RecordSubmission, RegistryRead, RegistryWrite, SubmitError,
};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};
use tokio::time::sleep;
use tracing::debug;

struct LedgerEntry {
    record: ContributionRecord,
    handle: CiphertextHandle,
}

#[derive(Default)]
struct LedgerState {
    entries: Vec<LedgerEntry>,
    malformed: HashSet<RecordId>,
    unavailable: bool,
    reject_signing: bool,
    revert: bool,
    rival_verification: Option<u64>,
    nonce: u64,
}

impl LedgerState {
    fn entry_mut(&mut self, id: &RecordId) -> Option<&mut LedgerEntry> {
        self.entries.iter_mut().find(|e| &e.record.id == id)
    }

    fn next_tx_hash(&mut self) -> TxHash {
        self.nonce += 1;
        keccak256(self.nonce.to_be_bytes())
    }
}

/// Call counters, one per registry method
#[derive(Default)]
pub struct LedgerCalls {
    pub list_record_ids: AtomicUsize,
    pub get_record: AtomicUsize,
    pub get_ciphertext_handle: AtomicUsize,
    pub submit_record: AtomicUsize,
    pub submit_verification: AtomicUsize,
}

impl LedgerCalls {
    pub fn writes(&self) -> usize {
        self.submit_record.load(Ordering::SeqCst) + self.submit_verification.load(Ordering::SeqCst)
    }
}

/// In-memory registry contract. Submissions only land once their pending
/// transaction is confirmed.
#[derive(Clone)]
pub struct MockLedger {
    address: Address,
    read_delay: Duration,
    state: Arc<Mutex<LedgerState>>,
    calls: Arc<LedgerCalls>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self::with_address(Address::repeat_byte(0xcb))
    }

    pub fn with_address(address: Address) -> Self {
        Self {
            address,
            read_delay: Duration::ZERO,
            state: Arc::new(Mutex::new(LedgerState::default())),
            calls: Arc::new(LedgerCalls::default()),
        }
    }

    /// Listing record ids takes this long
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().expect("Poisoned lock in MockLedger")
    }

    pub fn calls(&self) -> &LedgerCalls {
        &self.calls
    }

    /// Signer-bound view for `address`
    pub fn signer(&self, address: Address) -> MockSigner {
        MockSigner {
            ledger: self.clone(),
            address,
        }
    }

    /// Store a record directly, as if mined earlier
    pub fn insert(&self, record: ContributionRecord) -> CiphertextHandle {
        let handle = CiphertextHandle(keccak256(record.id.as_str()));
        self.lock().entries.push(LedgerEntry { record, handle });
        handle
    }

    /// Record that can be listed but not read
    pub fn mark_malformed(&self, id: impl Into<RecordId>) {
        self.lock().malformed.insert(id.into());
    }

    /// Every read fails with a call error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// The signer declines every request
    pub fn reject_signing(&self, reject: bool) {
        self.lock().reject_signing = reject;
    }

    /// Transactions are accepted but revert when mined
    pub fn revert_transactions(&self, revert: bool) {
        self.lock().revert = revert;
    }

    /// A competing verification of `amount` gets mined ahead of the next
    /// pending verification, which then reverts
    pub fn mine_rival_verification_first(&self, amount: u64) {
        self.lock().rival_verification = Some(amount);
    }

    /// Commit a verification on behalf of another party
    pub fn force_verify(&self, id: &RecordId, amount: u64) {
        if let Some(entry) = self.lock().entry_mut(id) {
            entry.record = entry.record.clone().with_verified_amount(amount);
        }
    }

    pub fn record(&self, id: &RecordId) -> Option<ContributionRecord> {
        self.lock()
            .entries
            .iter()
            .find(|e| &e.record.id == id)
            .map(|e| e.record.clone())
    }

    pub fn records(&self) -> Vec<ContributionRecord> {
        self.lock().entries.iter().map(|e| e.record.clone()).collect()
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if self.lock().unavailable {
            return Err(LedgerError::Call("connection refused".to_string()));
        }
        Ok(())
    }

    fn check_signing(&self) -> Result<TxHash, SubmitError> {
        let mut state = self.lock();
        if state.reject_signing {
            return Err(SubmitError::classify("User denied transaction signature"));
        }
        Ok(state.next_tx_hash())
    }
}

#[async_trait]
impl RegistryRead for MockLedger {
    fn contract_address(&self) -> Address {
        self.address
    }

    async fn list_record_ids(&self) -> Result<Vec<RecordId>, LedgerError> {
        self.calls.list_record_ids.fetch_add(1, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            sleep(self.read_delay).await;
        }
        self.check_available()?;
        Ok(self
            .lock()
            .entries
            .iter()
            .map(|e| e.record.id.clone())
            .collect())
    }

    async fn get_record(&self, id: &RecordId) -> Result<ContributionRecord, LedgerError> {
        self.calls.get_record.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let state = self.lock();
        if state.malformed.contains(id) {
            return Err(LedgerError::Malformed {
                id: id.clone(),
                reason: "undecodable row".to_string(),
            });
        }
        state
            .entries
            .iter()
            .find(|e| &e.record.id == id)
            .map(|e| e.record.clone())
            .ok_or_else(|| LedgerError::NotFound(id.clone()))
    }

    async fn get_ciphertext_handle(&self, id: &RecordId) -> Result<CiphertextHandle, LedgerError> {
        self.calls.get_ciphertext_handle.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.lock()
            .entries
            .iter()
            .find(|e| &e.record.id == id)
            .map(|e| e.handle)
            .ok_or_else(|| LedgerError::NotFound(id.clone()))
    }

    async fn probe_availability(&self) -> Result<bool, LedgerError> {
        self.check_available()?;
        Ok(true)
    }
}

/// Signer handle onto a [`MockLedger`]
#[derive(Clone)]
pub struct MockSigner {
    ledger: MockLedger,
    address: Address,
}

enum PendingAction {
    Record(ContributionRecord, CiphertextHandle),
    Verify(RecordId, u64),
}

struct MockPendingTx {
    ledger: MockLedger,
    tx_hash: TxHash,
    action: PendingAction,
}

#[async_trait]
impl PendingTx for MockPendingTx {
    fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    async fn confirm(self: Box<Self>) -> Result<Confirmation, SubmitError> {
        let MockPendingTx {
            ledger,
            tx_hash,
            action,
        } = *self;
        let mut state = ledger.lock();
        if state.revert {
            return Err(SubmitError::Reverted(tx_hash));
        }
        match action {
            PendingAction::Record(record, handle) => {
                if state.entries.iter().any(|e| e.record.id == record.id) {
                    return Err(SubmitError::Reverted(tx_hash));
                }
                debug!(id = %record.id, "MockLedger: record mined");
                state.entries.push(LedgerEntry { record, handle });
            }
            PendingAction::Verify(id, amount) => {
                let rival = state.rival_verification.take();
                let Some(entry) = state.entry_mut(&id) else {
                    return Err(SubmitError::Reverted(tx_hash));
                };
                if let Some(rival) = rival {
                    debug!(id = %id, rival, "MockLedger: rival verification mined first");
                    entry.record = entry.record.clone().with_verified_amount(rival);
                }
                // Receipts carry no revert reason
                if entry.record.is_verified() {
                    return Err(SubmitError::Reverted(tx_hash));
                }
                debug!(id = %id, "MockLedger: verification mined");
                entry.record = entry.record.clone().with_verified_amount(amount);
            }
        }
        Ok(Confirmation {
            tx_hash,
            block_number: Some(state.nonce),
        })
    }
}

#[async_trait]
impl RegistryWrite for MockSigner {
    fn signer_address(&self) -> Address {
        self.address
    }

    async fn submit_record(
        &self,
        submission: RecordSubmission,
    ) -> Result<Box<dyn PendingTx>, SubmitError> {
        self.ledger
            .calls
            .submit_record
            .fetch_add(1, Ordering::SeqCst);
        if submission.ciphertext.len() != 32 {
            return Err(SubmitError::Failed(format!(
                "ciphertext must be 32 bytes, got {}",
                submission.ciphertext.len()
            )));
        }
        let tx_hash = self.ledger.check_signing()?;
        let timestamp = self.ledger.lock().nonce;
        let record = ContributionRecord::unverified(
            submission.id,
            submission.name,
            submission.description,
            submission.target_amount,
            self.address,
            timestamp,
        );
        let handle = CiphertextHandle(B256::from_slice(&submission.ciphertext));
        Ok(Box::new(MockPendingTx {
            ledger: self.ledger.clone(),
            tx_hash,
            action: PendingAction::Record(record, handle),
        }))
    }

    async fn submit_verification(
        &self,
        id: &RecordId,
        encoded_clear_values: Bytes,
        decryption_proof: Bytes,
    ) -> Result<Box<dyn PendingTx>, SubmitError> {
        self.ledger
            .calls
            .submit_verification
            .fetch_add(1, Ordering::SeqCst);
        if decryption_proof.is_empty() {
            return Err(SubmitError::Failed("execution reverted: invalid proof".to_string()));
        }
        if encoded_clear_values.len() != 32 {
            return Err(SubmitError::Failed(
                "execution reverted: bad clear values".to_string(),
            ));
        }
        if self.ledger.record(id).is_some_and(|r| r.is_verified()) {
            return Err(SubmitError::classify("execution reverted: Data already verified"));
        }
        let amount: u64 = U256::from_be_slice(&encoded_clear_values)
            .try_into()
            .map_err(|_| SubmitError::Failed("clear value out of range".to_string()))?;
        let tx_hash = self.ledger.check_signing()?;
        Ok(Box::new(MockPendingTx {
            ledger: self.ledger.clone(),
            tx_hash,
            action: PendingAction::Verify(id.clone(), amount),
        }))
    }
}
