// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::adapter::{
    Confirmation, LedgerError, PendingTx, RegistryRead, RegistryWrite, SubmitError,
};
use crate::provider::ProviderConfig;
use crate::records::{
    CiphertextHandle, ContributionRecord, RecordId, RecordSubmission, DEFAULT_TARGET_AMOUNT,
};
use alloy::{
    network::Ethereum,
    primitives::{Address, Bytes, TxHash, B256, U256},
    providers::{DynProvider, PendingTransactionBuilder},
    signers::local::PrivateKeySigner,
    sol,
};
use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::marker::PhantomData;
use tokio::sync::Mutex;
use tracing::{debug, info};

// Nonces are managed by the provider cache, sends must not interleave
static SEND_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

sol! {
    #[derive(Debug)]
    #[sol(rpc)]
    contract CharityRegistry {
        function getAllBusinessIds() external view returns (string[] memory);
        function getBusinessData(string calldata businessId) external view returns (
            string memory name,
            uint256 publicValue1,
            uint256 publicValue2,
            string memory description,
            address creator,
            uint256 timestamp,
            bool isVerified,
            uint32 decryptedValue
        );
        function getEncryptedValue(string calldata businessId) external view returns (bytes32);
        function createBusinessData(
            string calldata businessId,
            string calldata name,
            bytes32 encryptedValue,
            bytes calldata inputProof,
            uint256 publicValue1,
            uint256 publicValue2,
            string calldata description
        ) external;
        function verifyDecryption(
            string calldata businessId,
            bytes memory abiEncodedClearValue,
            bytes memory decryptionProof
        ) external;
        function isAvailable() external view returns (bool);
    }
}

/// Capability marker for the registry contract
pub trait ProviderType: Send + Sync + 'static {}

/// Marker type for the read-only view
#[derive(Clone)]
pub struct ReadOnly;
impl ProviderType for ReadOnly {}

/// Marker type for the signer-bound view
#[derive(Clone)]
pub struct ReadWrite;
impl ProviderType for ReadWrite {}

/// The registry contract behind one of the two capability markers
#[derive(Clone)]
pub struct RegistryContract<T: ProviderType> {
    provider: DynProvider,
    contract_address: Address,
    signer: Address,
    fallback_target: u64,
    _marker: PhantomData<T>,
}

pub type RegistryReadContract = RegistryContract<ReadOnly>;
pub type RegistryWriteContract = RegistryContract<ReadWrite>;

impl<T: ProviderType> RegistryContract<T> {
    /// Override the target reported for records without a usable public target
    pub fn with_fallback_target(mut self, fallback_target: u64) -> Self {
        self.fallback_target = fallback_target;
        self
    }

    fn instance(&self) -> CharityRegistry::CharityRegistryInstance<DynProvider> {
        CharityRegistry::new(self.contract_address, self.provider.clone())
    }
}

pub struct RegistryContractFactory;

impl RegistryContractFactory {
    pub async fn create_read(
        config: &ProviderConfig,
        contract_address: Address,
    ) -> Result<RegistryContract<ReadOnly>> {
        let provider = config.connect_read().await?;
        Ok(RegistryContract {
            provider,
            contract_address,
            signer: Address::ZERO,
            fallback_target: DEFAULT_TARGET_AMOUNT,
            _marker: PhantomData,
        })
    }

    pub async fn create_write(
        config: &ProviderConfig,
        contract_address: Address,
        signer: PrivateKeySigner,
    ) -> Result<RegistryContract<ReadWrite>> {
        let signer_address = signer.address();
        let provider = config.connect_signer(signer).await?;
        Ok(RegistryContract {
            provider,
            contract_address,
            signer: signer_address,
            fallback_target: DEFAULT_TARGET_AMOUNT,
            _marker: PhantomData,
        })
    }
}

fn call_error(e: impl ToString) -> LedgerError {
    LedgerError::Call(e.to_string())
}

/// Convert the raw contract tuple into a record
pub fn into_record(
    id: &RecordId,
    data: CharityRegistry::getBusinessDataReturn,
    fallback_target: u64,
) -> Result<ContributionRecord, LedgerError> {
    // Unset mapping entries come back zeroed
    if data.creator == Address::ZERO {
        return Err(LedgerError::NotFound(id.clone()));
    }
    let timestamp = u64::try_from(data.timestamp).map_err(|_| LedgerError::Malformed {
        id: id.clone(),
        reason: format!("timestamp {} out of range", data.timestamp),
    })?;
    let target_amount = u64::try_from(data.publicValue1)
        .ok()
        .filter(|target| *target > 0)
        .unwrap_or(fallback_target);

    let record = ContributionRecord::unverified(
        id.clone(),
        data.name,
        data.description,
        target_amount,
        data.creator,
        timestamp,
    );

    if data.isVerified {
        Ok(record.with_verified_amount(u64::from(data.decryptedValue)))
    } else {
        Ok(record)
    }
}

#[async_trait]
impl<T: ProviderType> RegistryRead for RegistryContract<T> {
    fn contract_address(&self) -> Address {
        self.contract_address
    }

    async fn list_record_ids(&self) -> Result<Vec<RecordId>, LedgerError> {
        let ids = self
            .instance()
            .getAllBusinessIds()
            .call()
            .await
            .map_err(call_error)?;
        Ok(ids.into_iter().map(RecordId::from).collect())
    }

    async fn get_record(&self, id: &RecordId) -> Result<ContributionRecord, LedgerError> {
        let data = self
            .instance()
            .getBusinessData(id.to_string())
            .call()
            .await
            .map_err(call_error)?;
        into_record(id, data, self.fallback_target)
    }

    async fn get_ciphertext_handle(&self, id: &RecordId) -> Result<CiphertextHandle, LedgerError> {
        let handle = self
            .instance()
            .getEncryptedValue(id.to_string())
            .call()
            .await
            .map_err(call_error)?;
        if handle == B256::ZERO {
            return Err(LedgerError::NotFound(id.clone()));
        }
        Ok(CiphertextHandle(handle))
    }

    async fn probe_availability(&self) -> Result<bool, LedgerError> {
        self.instance()
            .isAvailable()
            .call()
            .await
            .map_err(call_error)
    }
}

#[async_trait]
impl RegistryWrite for RegistryContract<ReadWrite> {
    fn signer_address(&self) -> Address {
        self.signer
    }

    async fn submit_record(
        &self,
        submission: RecordSubmission,
    ) -> Result<Box<dyn PendingTx>, SubmitError> {
        let handle = B256::try_from(submission.ciphertext.as_ref()).map_err(|_| {
            SubmitError::Failed(format!(
                "ciphertext handle must be 32 bytes, got {}",
                submission.ciphertext.len()
            ))
        })?;

        let _guard = SEND_LOCK.lock().await;
        let pending = self
            .instance()
            .createBusinessData(
                submission.id.to_string(),
                submission.name,
                handle,
                submission.proof,
                U256::from(submission.target_amount),
                U256::from(submission.aux_flag),
                submission.description,
            )
            .send()
            .await
            .map_err(|e| SubmitError::classify(e.to_string()))?;

        info!(id = %submission.id, tx = %pending.tx_hash(), "createBusinessData sent");
        Ok(Box::new(AlloyPendingTx { inner: pending }))
    }

    async fn submit_verification(
        &self,
        id: &RecordId,
        encoded_clear_values: Bytes,
        decryption_proof: Bytes,
    ) -> Result<Box<dyn PendingTx>, SubmitError> {
        let _guard = SEND_LOCK.lock().await;
        let pending = self
            .instance()
            .verifyDecryption(id.to_string(), encoded_clear_values, decryption_proof)
            .send()
            .await
            .map_err(|e| SubmitError::classify(e.to_string()))?;

        info!(id = %id, tx = %pending.tx_hash(), "verifyDecryption sent");
        Ok(Box::new(AlloyPendingTx { inner: pending }))
    }
}

pub struct AlloyPendingTx {
    inner: PendingTransactionBuilder<Ethereum>,
}

#[async_trait]
impl PendingTx for AlloyPendingTx {
    fn tx_hash(&self) -> TxHash {
        *self.inner.tx_hash()
    }

    async fn confirm(self: Box<Self>) -> Result<Confirmation, SubmitError> {
        let receipt = self
            .inner
            .get_receipt()
            .await
            .map_err(|e| SubmitError::classify(e.to_string()))?;

        if !receipt.status() {
            return Err(SubmitError::Reverted(receipt.transaction_hash));
        }

        debug!(tx = %receipt.transaction_hash, block = ?receipt.block_number, "confirmed");
        Ok(Confirmation {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
        })
    }
}
