// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Target amount used when the chain reports no usable public target
pub const DEFAULT_TARGET_AMOUNT: u64 = 1000;

const PROJECT_PREFIX: &str = "charity-";
const DONATION_PREFIX: &str = "donation-";

/// Opaque identifier of a registry entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the kind of record from the id namespace
    pub fn kind(&self) -> Option<RecordKind> {
        if self.0.starts_with(PROJECT_PREFIX) {
            return Some(RecordKind::Project);
        }
        // donation-<project id>-<stamp>
        let rest = self.0.strip_prefix(DONATION_PREFIX)?;
        let (project, stamp) = rest.rsplit_once('-')?;
        if project.is_empty() || stamp.parse::<u64>().is_err() {
            return None;
        }
        Some(RecordKind::Donation {
            project: RecordId::new(project),
        })
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Projects and donations live in separate id namespaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    Project,
    Donation { project: RecordId },
}

impl RecordKind {
    /// Prefix every id of this kind starts with. The caller appends a stamp.
    pub fn id_prefix(&self) -> String {
        match self {
            RecordKind::Project => PROJECT_PREFIX.to_string(),
            RecordKind::Donation { project } => format!("{DONATION_PREFIX}{project}-"),
        }
    }

    pub fn id_with_stamp(&self, stamp: u64) -> RecordId {
        RecordId(format!("{}{}", self.id_prefix(), stamp))
    }
}

/// Reference to an encrypted value held by the registry contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CiphertextHandle(pub B256);

impl Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single registry entry as reported by the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRecord {
    pub id: RecordId,
    pub name: String,
    pub description: String,
    pub target_amount: u64,
    pub creator: Address,
    /// Seconds since epoch, set by the ledger
    pub timestamp: u64,
    verified_amount: Option<u64>,
}

impl ContributionRecord {
    pub fn unverified(
        id: RecordId,
        name: impl Into<String>,
        description: impl Into<String>,
        target_amount: u64,
        creator: Address,
        timestamp: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            target_amount,
            creator,
            timestamp,
            verified_amount: None,
        }
    }

    /// Mark the record as carrying an accepted decryption proof
    pub fn with_verified_amount(mut self, amount: u64) -> Self {
        self.verified_amount = Some(amount);
        self
    }

    pub fn is_verified(&self) -> bool {
        self.verified_amount.is_some()
    }

    /// The disclosed amount. Only present once the proof is on-chain.
    pub fn decrypted_amount(&self) -> Option<u64> {
        self.verified_amount
    }

    pub fn kind(&self) -> Option<RecordKind> {
        self.id.kind()
    }
}

/// Everything the signer view needs to register a new encrypted contribution
#[derive(Debug, Clone)]
pub struct RecordSubmission {
    pub id: RecordId,
    pub name: String,
    pub ciphertext: Bytes,
    pub proof: Bytes,
    pub target_amount: u64,
    pub aux_flag: u64,
    pub description: String,
}
