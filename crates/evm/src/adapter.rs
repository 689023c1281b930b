// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::records::{CiphertextHandle, ContributionRecord, RecordId, RecordSubmission};
use alloy::primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use thiserror::Error;

/// Signer messages that mean the wallet declined to sign
const USER_REJECTED_PATTERNS: &[&str] = &[
    "user rejected",
    "user denied",
    "rejected by user",
    "action_rejected",
];

const ALREADY_VERIFIED_PATTERN: &str = "already verified";

#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("Record not found: {0}")]
    NotFound(RecordId),
    #[error("Record {id} is malformed: {reason}")]
    Malformed { id: RecordId, reason: String },
    #[error("Contract call failed: {0}")]
    Call(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Transaction rejected by signer")]
    UserRejected,
    #[error("Data already verified")]
    AlreadyVerified,
    #[error("Transaction {0} reverted")]
    Reverted(TxHash),
    #[error("Transaction failed: {0}")]
    Failed(String),
}

impl SubmitError {
    /// Map a transport or wallet error message onto the submission taxonomy
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if USER_REJECTED_PATTERNS.iter().any(|p| lower.contains(p)) {
            return SubmitError::UserRejected;
        }
        if lower.contains(ALREADY_VERIFIED_PATTERN) {
            return SubmitError::AlreadyVerified;
        }
        SubmitError::Failed(message)
    }
}

/// Outcome of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

/// A submitted transaction. The record is only durable once `confirm` succeeds.
#[async_trait]
pub trait PendingTx: Send {
    fn tx_hash(&self) -> TxHash;

    /// Wait for the transaction to be mined
    async fn confirm(self: Box<Self>) -> Result<Confirmation, SubmitError>;
}

/// Read-only view of the contribution registry
#[async_trait]
pub trait RegistryRead: Send + Sync {
    /// Address of the registry contract
    fn contract_address(&self) -> Address;

    /// All record ids known to the registry
    async fn list_record_ids(&self) -> Result<Vec<RecordId>, LedgerError>;

    /// A single record without its ciphertext handle
    async fn get_record(&self, id: &RecordId) -> Result<ContributionRecord, LedgerError>;

    /// Resolve the encrypted amount of a record
    async fn get_ciphertext_handle(&self, id: &RecordId) -> Result<CiphertextHandle, LedgerError>;

    /// Whether the contract answers calls
    async fn probe_availability(&self) -> Result<bool, LedgerError>;
}

/// Signer-bound view of the contribution registry
#[async_trait]
pub trait RegistryWrite: Send + Sync {
    /// The identity that signs submissions
    fn signer_address(&self) -> Address;

    /// Register a new encrypted contribution
    async fn submit_record(
        &self,
        submission: RecordSubmission,
    ) -> Result<Box<dyn PendingTx>, SubmitError>;

    /// Publish clear values and the decryption proof for a record
    async fn submit_verification(
        &self,
        id: &RecordId,
        encoded_clear_values: Bytes,
        decryption_proof: Bytes,
    ) -> Result<Box<dyn PendingTx>, SubmitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            SubmitError::classify("MetaMask Tx Signature: User denied transaction signature."),
            SubmitError::UserRejected
        );
        assert_eq!(
            SubmitError::classify("user rejected transaction"),
            SubmitError::UserRejected
        );
        assert_eq!(
            SubmitError::classify("server returned an error response: execution reverted: Data already verified"),
            SubmitError::AlreadyVerified
        );
        assert_eq!(
            SubmitError::classify("nonce too low"),
            SubmitError::Failed("nonce too low".to_string())
        );
    }
}
