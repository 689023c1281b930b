// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::wire::{
    decryption_status_error, encryptable_value, encryption_status_error, into_decryption_result,
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse,
};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use cbx_evm::CiphertextHandle;
use cbx_lifecycle::{
    DecryptionResult, EncryptedInput, EncryptionError, EncryptionGateway, VerificationError,
    VerificationService,
};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

fn transport_error(e: reqwest::Error) -> EncryptionError {
    if e.is_connect() || e.is_timeout() {
        EncryptionError::Transient(e.to_string())
    } else {
        EncryptionError::Permanent(e.to_string())
    }
}

/// Client for the relayer that fronts the FHE key material and the
/// threshold decryption network
#[derive(Debug, Clone)]
pub struct RelayerClient {
    base: Url,
    http: reqwest::Client,
}

impl RelayerClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base =
            Url::parse(base_url).with_context(|| format!("Invalid relayer url '{base_url}'"))?;
        // Keep any path prefix when joining endpoints
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build relayer http client")?;
        Ok(Self { base, http })
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, url::ParseError> {
        self.base.join(path)
    }
}

#[async_trait]
impl EncryptionGateway for RelayerClient {
    async fn initialize(&self) -> std::result::Result<(), EncryptionError> {
        let url = self
            .endpoint("v1/keyurl")
            .map_err(|e| EncryptionError::InitializationFailed(e.to_string()))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| EncryptionError::InitializationFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EncryptionError::InitializationFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }
        info!(relayer = %self.base, "FHE public key material available");
        Ok(())
    }

    async fn encrypt(
        &self,
        contract_address: Address,
        submitter: Address,
        plaintext: u64,
    ) -> std::result::Result<EncryptedInput, EncryptionError> {
        let request = EncryptRequest {
            contract_address,
            user_address: submitter,
            value: encryptable_value(plaintext)?,
        };
        let url = self
            .endpoint("v1/encrypt")
            .map_err(|e| EncryptionError::Permanent(e.to_string()))?;

        debug!(contract = %contract_address, "Requesting encrypted input");
        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(encryption_status_error(status, &body));
        }
        let body: EncryptResponse = response.json().await.map_err(transport_error)?;
        Ok(body.into())
    }
}

#[async_trait]
impl VerificationService for RelayerClient {
    async fn request_decryption(
        &self,
        handles: &[CiphertextHandle],
        contract_address: Address,
    ) -> std::result::Result<DecryptionResult, VerificationError> {
        let request = DecryptRequest {
            handles: handles.iter().map(|h| h.0).collect(),
            contract_address,
        };
        let url = self
            .endpoint("v1/public-decrypt")
            .map_err(|e| VerificationError::Failed(e.to_string()))?;

        debug!(handles = handles.len(), "Requesting public decryption");
        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| VerificationError::Failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(decryption_status_error(status, &body));
        }
        let body: DecryptResponse = response
            .json()
            .await
            .map_err(|e| VerificationError::Failed(e.to_string()))?;
        into_decryption_result(body, handles)
    }
}
