// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::primitives::Address;
use cbx_config::NotificationConfig;
use cbx_evm::{ContributionRecord, RecordId};
use cbx_lifecycle::{
    ContributionLifecycle, ContributionRegistry, LifecycleSettings, NewProject, Session,
    StatusNotifier,
};
use cbx_test_helpers::{MockGateway, MockLedger, MockVerifier, PlaintextVault};
use std::sync::Arc;

pub fn alice() -> Address {
    Address::repeat_byte(0x11)
}

pub fn bob() -> Address {
    Address::repeat_byte(0x22)
}

pub fn wells(target: Option<u64>) -> NewProject {
    NewProject {
        name: "Wells".to_string(),
        target_amount: target,
        description: "Clean water for the valley".to_string(),
    }
}

pub fn seeded_project(id: &str, creator: Address) -> ContributionRecord {
    ContributionRecord::unverified(
        RecordId::from(id),
        "School roof",
        "Fix the roof before winter",
        800,
        creator,
        1,
    )
}

pub struct Harness {
    pub ledger: MockLedger,
    pub vault: PlaintextVault,
    pub gateway: MockGateway,
    pub verifier: MockVerifier,
    pub lifecycle: ContributionLifecycle,
    pub session: Session,
}

impl Harness {
    /// Fresh ledger with default mocks and no connected identity
    pub fn new() -> Self {
        let vault = PlaintextVault::new();
        Self::build(
            MockLedger::new(),
            vault.clone(),
            MockGateway::new(vault.clone()),
            MockVerifier::new(vault),
        )
    }

    pub fn build(
        ledger: MockLedger,
        vault: PlaintextVault,
        gateway: MockGateway,
        verifier: MockVerifier,
    ) -> Self {
        let lifecycle = ContributionLifecycle::new(
            Arc::new(ledger.clone()),
            Arc::new(gateway.clone()),
            Arc::new(verifier.clone()),
            LifecycleSettings::default(),
        );
        let session = Session::new(
            ContributionRegistry::new(Arc::new(ledger.clone())),
            StatusNotifier::new(NotificationConfig::default()),
        );
        Self {
            ledger,
            vault,
            gateway,
            verifier,
            lifecycle,
            session,
        }
    }

    /// Connect `identity` with a signer onto the mock ledger
    pub fn connected(mut self, identity: Address) -> Self {
        self.session
            .connect_signer(Arc::new(self.ledger.signer(identity)));
        self
    }

    pub fn last_message(&self) -> Option<String> {
        self.session.notifier().current().map(|n| n.message)
    }
}
