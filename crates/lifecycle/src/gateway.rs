// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::error::{EncryptionError, VerificationError};
use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use cbx_evm::CiphertextHandle;
use std::collections::HashMap;

/// Ciphertext plus the proof that it was produced for this contract and submitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInput {
    pub ciphertext: Bytes,
    pub proof: Bytes,
}

/// Produces encrypted inputs bound to a contract and a submitter.
///
/// Implementations keep per-call state and must not be called concurrently;
/// the lifecycle guarantees a single outstanding `encrypt` per session.
#[async_trait]
pub trait EncryptionGateway: Send + Sync {
    /// Prepare the encryption context. Called once per session before use.
    async fn initialize(&self) -> Result<(), EncryptionError> {
        Ok(())
    }

    async fn encrypt(
        &self,
        contract_address: Address,
        submitter: Address,
        plaintext: u64,
    ) -> Result<EncryptedInput, EncryptionError>;
}

/// Clear values revealed by the threshold decryption, not yet committed on-chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionResult {
    pub clear_values: HashMap<CiphertextHandle, u64>,
    /// ABI encoding of the clear values, in handle order
    pub encoded_clear_values: Bytes,
    pub proof: Bytes,
}

impl DecryptionResult {
    pub fn clear_value(&self, handle: &CiphertextHandle) -> Option<u64> {
        self.clear_values.get(handle).copied()
    }
}

/// Threshold decryption: first half of the two-phase disclosure protocol.
/// The caller commits the returned proof itself.
#[async_trait]
pub trait VerificationService: Send + Sync {
    async fn request_decryption(
        &self,
        handles: &[CiphertextHandle],
        contract_address: Address,
    ) -> Result<DecryptionResult, VerificationError>;
}
