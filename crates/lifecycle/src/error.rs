// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use cbx_evm::{LedgerError, RecordId, SubmitError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    /// Network or availability problem, the same request may succeed later
    #[error("Encryption service unavailable: {0}")]
    Transient(String),
    /// The request itself was refused
    #[error("Encryption rejected: {0}")]
    Permanent(String),
    #[error("FHE initialization failed: {0}")]
    InitializationFailed(String),
}

impl EncryptionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EncryptionError::Transient(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// Another party already committed a proof for this ciphertext
    #[error("Data already verified")]
    AlreadyVerified,
    #[error("Verification failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Please connect wallet first")]
    NotConnected,
    #[error("No signer available for the connected identity")]
    SignerUnavailable,
    #[error("An encryption is already in progress")]
    EncryptionInFlight,
    #[error("Encryption failed: {0}")]
    EncryptionFailed(#[from] EncryptionError),
    #[error("Transaction rejected")]
    UserRejected,
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),
    #[error("Verification failed: {0}")]
    VerificationFailed(String),
    #[error("Unknown project: {0}")]
    UnknownProject(RecordId),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl LifecycleError {
    pub(crate) fn from_submission(error: SubmitError) -> Self {
        match error {
            SubmitError::UserRejected => LifecycleError::UserRejected,
            other => LifecycleError::SubmissionFailed(other.to_string()),
        }
    }
}
