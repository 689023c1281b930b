// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::error::LifecycleError;
use crate::notifier::StatusNotifier;
use crate::registry::ContributionRegistry;
use alloy::primitives::Address;
use cbx_evm::{ContributionRecord, RegistryWrite};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OnceCell};

/// Everything one connected user carries between operations: identity, signer,
/// the record cache, the notification queue and the in-flight guards.
pub struct Session {
    identity: Option<Address>,
    signer: Option<Arc<dyn RegistryWrite>>,
    registry: ContributionRegistry,
    notifier: StatusNotifier,
    encryption: Mutex<()>,
    fhe_ready: OnceCell<()>,
}

impl Session {
    pub fn new(registry: ContributionRegistry, notifier: StatusNotifier) -> Self {
        Self {
            identity: None,
            signer: None,
            registry,
            notifier,
            encryption: Mutex::new(()),
            fhe_ready: OnceCell::new(),
        }
    }

    /// Attach an identity. Without a signer the session can read and decrypt
    /// already verified records but cannot submit.
    pub fn connect(&mut self, identity: Address, signer: Option<Arc<dyn RegistryWrite>>) {
        self.identity = Some(identity);
        self.signer = signer;
    }

    /// Attach a signer and use its address as the identity
    pub fn connect_signer(&mut self, signer: Arc<dyn RegistryWrite>) {
        let identity = signer.signer_address();
        self.connect(identity, Some(signer));
    }

    pub fn disconnect(&mut self) {
        self.identity = None;
        self.signer = None;
        self.fhe_ready = OnceCell::new();
    }

    pub fn identity(&self) -> Option<Address> {
        self.identity
    }

    pub fn is_connected(&self) -> bool {
        self.identity.is_some()
    }

    pub fn registry(&self) -> &ContributionRegistry {
        &self.registry
    }

    pub fn notifier(&self) -> &StatusNotifier {
        &self.notifier
    }

    /// Cached records created by the connected identity
    pub fn own_history(&self) -> Vec<ContributionRecord> {
        match self.identity {
            Some(identity) => self.registry.history_for(identity),
            None => vec![],
        }
    }

    pub(crate) fn require_identity(&self) -> Result<Address, LifecycleError> {
        self.identity.ok_or(LifecycleError::NotConnected)
    }

    pub(crate) fn require_signer(&self) -> Result<Arc<dyn RegistryWrite>, LifecycleError> {
        self.signer.clone().ok_or(LifecycleError::SignerUnavailable)
    }

    /// Claim the single encryption slot, failing if it is taken
    pub(crate) fn try_begin_encryption(&self) -> Result<MutexGuard<'_, ()>, LifecycleError> {
        self.encryption
            .try_lock()
            .map_err(|_| LifecycleError::EncryptionInFlight)
    }

    pub(crate) fn fhe_ready(&self) -> &OnceCell<()> {
        &self.fhe_ready
    }
}
