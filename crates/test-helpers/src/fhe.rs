// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::primitives::{keccak256, Address, Bytes, U256};
use async_trait::async_trait;
use cbx_evm::CiphertextHandle;
use cbx_lifecycle::{
    DecryptionResult, EncryptedInput, EncryptionError, EncryptionGateway, VerificationError,
    VerificationService,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::time::sleep;

/// Plaintexts behind every handle the mock gateway produced. Shared between
/// the gateway and the verifier so decryption returns what was encrypted.
#[derive(Clone, Default)]
pub struct PlaintextVault {
    inner: Arc<Mutex<HashMap<CiphertextHandle, u64>>>,
}

impl PlaintextVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: CiphertextHandle, plaintext: u64) {
        self.inner
            .lock()
            .expect("Poisoned lock in PlaintextVault")
            .insert(handle, plaintext);
    }

    pub fn get(&self, handle: &CiphertextHandle) -> Option<u64> {
        self.inner
            .lock()
            .expect("Poisoned lock in PlaintextVault")
            .get(handle)
            .copied()
    }
}

/// Encryption gateway that hands out unique 32 byte ciphertexts
#[derive(Clone, Default)]
pub struct MockGateway {
    vault: PlaintextVault,
    delay: Duration,
    counter: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    encrypt_calls: Arc<AtomicUsize>,
    initialize_calls: Arc<AtomicUsize>,
    next_failure: Arc<Mutex<Option<EncryptionError>>>,
    fail_initialize: bool,
}

impl MockGateway {
    pub fn new(vault: PlaintextVault) -> Self {
        Self {
            vault,
            ..Self::default()
        }
    }

    /// Every `encrypt` call takes this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// The next `encrypt` call fails with `error`
    pub fn fail_next(&self, error: EncryptionError) {
        *self
            .next_failure
            .lock()
            .expect("Poisoned lock in MockGateway") = Some(error);
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    /// Highest number of `encrypt` calls observed running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EncryptionGateway for MockGateway {
    async fn initialize(&self) -> Result<(), EncryptionError> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize {
            return Err(EncryptionError::InitializationFailed(
                "public key unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn encrypt(
        &self,
        contract_address: Address,
        submitter: Address,
        plaintext: u64,
    ) -> Result<EncryptedInput, EncryptionError> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        let failure = self
            .next_failure
            .lock()
            .expect("Poisoned lock in MockGateway")
            .take();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(error) = failure {
            return Err(error);
        }

        let nonce = self.counter.fetch_add(1, Ordering::SeqCst);
        let mut seed = Vec::with_capacity(48);
        seed.extend_from_slice(contract_address.as_slice());
        seed.extend_from_slice(submitter.as_slice());
        seed.extend_from_slice(&nonce.to_be_bytes());
        let handle = keccak256(&seed);
        self.vault.insert(CiphertextHandle(handle), plaintext);

        Ok(EncryptedInput {
            ciphertext: Bytes::copy_from_slice(handle.as_slice()),
            proof: Bytes::from(submitter.to_vec()),
        })
    }
}

type RequestHook = Arc<dyn Fn(&[CiphertextHandle]) + Send + Sync>;

/// Threshold decryption that answers from the shared vault
#[derive(Clone, Default)]
pub struct MockVerifier {
    vault: PlaintextVault,
    calls: Arc<AtomicUsize>,
    already_verified: bool,
    before_respond: Option<RequestHook>,
}

impl MockVerifier {
    pub fn new(vault: PlaintextVault) -> Self {
        Self {
            vault,
            ..Self::default()
        }
    }

    /// Answer every request as if the proof was already committed elsewhere
    pub fn reporting_already_verified(mut self) -> Self {
        self.already_verified = true;
        self
    }

    /// Run `hook` after the request arrives and before the answer is returned
    pub fn before_respond(
        mut self,
        hook: impl Fn(&[CiphertextHandle]) + Send + Sync + 'static,
    ) -> Self {
        self.before_respond = Some(Arc::new(hook));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerificationService for MockVerifier {
    async fn request_decryption(
        &self,
        handles: &[CiphertextHandle],
        _contract_address: Address,
    ) -> Result<DecryptionResult, VerificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.before_respond {
            hook(handles);
        }
        if self.already_verified {
            return Err(VerificationError::AlreadyVerified);
        }

        let mut clear_values = HashMap::new();
        let mut encoded = Vec::with_capacity(handles.len() * 32);
        for handle in handles {
            let value = self.vault.get(handle).ok_or_else(|| {
                VerificationError::Failed(format!("unknown handle {handle}"))
            })?;
            clear_values.insert(*handle, value);
            encoded.extend_from_slice(&U256::from(value).to_be_bytes::<32>());
        }

        Ok(DecryptionResult {
            clear_values,
            encoded_clear_values: Bytes::from(encoded),
            proof: Bytes::from_static(b"threshold-signature"),
        })
    }
}
