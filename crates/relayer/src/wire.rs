// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::primitives::{Address, Bytes, B256};
use cbx_evm::CiphertextHandle;
use cbx_lifecycle::{
    DecryptionResult, EncryptedInput, EncryptionError, VerificationError,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const ALREADY_VERIFIED_PATTERN: &str = "already verified";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EncryptRequest {
    pub contract_address: Address,
    pub user_address: Address,
    pub value: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EncryptResponse {
    pub handle: B256,
    pub input_proof: Bytes,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DecryptRequest {
    pub handles: Vec<B256>,
    pub contract_address: Address,
}

/// Clear values come back as JSON numbers or as decimal strings for big ints
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ClearValue {
    Number(u64),
    Text(String),
}

impl ClearValue {
    fn to_u64(&self) -> Option<u64> {
        match self {
            ClearValue::Number(n) => Some(*n),
            ClearValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DecryptResponse {
    pub clear_values: HashMap<B256, ClearValue>,
    pub abi_encoded_clear_values: Bytes,
    pub decryption_proof: Bytes,
}

/// The registry stores amounts as 32 bit ciphertexts
pub(crate) fn encryptable_value(plaintext: u64) -> Result<u32, EncryptionError> {
    u32::try_from(plaintext).map_err(|_| {
        EncryptionError::Permanent(format!("{plaintext} does not fit an encrypted u32"))
    })
}

pub(crate) fn encryption_status_error(status: StatusCode, body: &str) -> EncryptionError {
    let message = format!("HTTP {status}: {}", body.trim());
    if status.is_server_error() {
        EncryptionError::Transient(message)
    } else {
        EncryptionError::Permanent(message)
    }
}

pub(crate) fn decryption_status_error(status: StatusCode, body: &str) -> VerificationError {
    if status == StatusCode::CONFLICT || body.to_lowercase().contains(ALREADY_VERIFIED_PATTERN) {
        return VerificationError::AlreadyVerified;
    }
    VerificationError::Failed(format!("HTTP {status}: {}", body.trim()))
}

impl From<EncryptResponse> for EncryptedInput {
    fn from(response: EncryptResponse) -> Self {
        EncryptedInput {
            ciphertext: Bytes::copy_from_slice(response.handle.as_slice()),
            proof: response.input_proof,
        }
    }
}

/// Every requested handle must come back with a value that parses
pub(crate) fn into_decryption_result(
    response: DecryptResponse,
    handles: &[CiphertextHandle],
) -> Result<DecryptionResult, VerificationError> {
    let mut clear_values = HashMap::with_capacity(handles.len());
    for handle in handles {
        let raw = response
            .clear_values
            .get(&handle.0)
            .ok_or_else(|| VerificationError::Failed(format!("No clear value for {handle}")))?;
        let value = raw.to_u64().ok_or_else(|| {
            VerificationError::Failed(format!("Clear value for {handle} is not a u64"))
        })?;
        clear_values.insert(*handle, value);
    }
    Ok(DecryptionResult {
        clear_values,
        encoded_clear_values: response.abi_encoded_clear_values,
        proof: response.decryption_proof,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::b256;

    const HANDLE: B256 =
        b256!("0x1111111111111111111111111111111111111111111111111111111111111111");

    #[test]
    fn test_status_classification() {
        assert!(encryption_status_error(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(!encryption_status_error(StatusCode::BAD_REQUEST, "bad value").is_transient());

        assert_eq!(
            decryption_status_error(StatusCode::CONFLICT, ""),
            VerificationError::AlreadyVerified
        );
        assert_eq!(
            decryption_status_error(StatusCode::BAD_REQUEST, "Data Already Verified"),
            VerificationError::AlreadyVerified
        );
        assert!(matches!(
            decryption_status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            VerificationError::Failed(_)
        ));
    }

    #[test]
    fn test_encryptable_value() {
        assert_eq!(encryptable_value(250).ok(), Some(250));
        assert!(encryptable_value(u64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn test_encrypt_response() -> anyhow::Result<()> {
        let json = format!(r#"{{"handle":"{HANDLE}","inputProof":"0xdeadbeef"}}"#);
        let input: EncryptedInput = serde_json::from_str::<EncryptResponse>(&json)?.into();
        assert_eq!(input.ciphertext.as_ref(), HANDLE.as_slice());
        assert_eq!(input.proof.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
        Ok(())
    }

    #[test]
    fn test_decrypt_response_number_and_string() -> anyhow::Result<()> {
        let other = B256::repeat_byte(0x22);
        let json = format!(
            r#"{{
                "clearValues": {{"{HANDLE}": 100, "{other}": "250"}},
                "abiEncodedClearValues": "0x01",
                "decryptionProof": "0x02"
            }}"#
        );
        let response: DecryptResponse = serde_json::from_str(&json)?;
        let handles = [CiphertextHandle(HANDLE), CiphertextHandle(other)];
        let result = into_decryption_result(response, &handles)?;
        assert_eq!(result.clear_value(&handles[0]), Some(100));
        assert_eq!(result.clear_value(&handles[1]), Some(250));
        Ok(())
    }

    #[test]
    fn test_decrypt_response_missing_handle() -> anyhow::Result<()> {
        let json = r#"{"clearValues":{},"abiEncodedClearValues":"0x","decryptionProof":"0x"}"#;
        let response: DecryptResponse = serde_json::from_str(json)?;
        let result = into_decryption_result(response, &[CiphertextHandle(HANDLE)]);
        assert!(matches!(result, Err(VerificationError::Failed(_))));
        Ok(())
    }
}
