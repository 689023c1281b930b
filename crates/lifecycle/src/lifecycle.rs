// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::error::{LifecycleError, VerificationError};
use crate::gateway::{DecryptionResult, EncryptionGateway, VerificationService};
use crate::ids::IdGenerator;
use crate::notifier::{OperationStatus, StatusPhase};
use crate::registry::LoadReport;
use crate::session::Session;
use alloy::primitives::Address;
use cbx_config::AppConfig;
use cbx_evm::{
    Confirmation, ContributionRecord, LedgerError, RecordId, RecordKind, RecordSubmission,
    RegistryRead, RegistryWrite, SubmitError,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePhase {
    Idle,
    Encrypting,
    Submitting,
    Confirming,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptPhase {
    Idle,
    CheckingCache,
    RequestingDecryption,
    SubmittingProof,
    Confirming,
    Done,
    AlreadyVerified,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptOutcome {
    /// This call committed the proof
    Decrypted(u64),
    /// The proof was already on-chain, either before the call or by a party
    /// that won the race
    AlreadyVerified(u64),
}

impl DecryptOutcome {
    pub fn value(&self) -> u64 {
        match self {
            DecryptOutcome::Decrypted(v) | DecryptOutcome::AlreadyVerified(v) => *v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Encrypted amount submitted with every new project
    pub initial_contribution: u64,
    /// Public target used when a project is created without one
    pub fallback_target_amount: u64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            initial_contribution: 100,
            fallback_target_amount: 1000,
        }
    }
}

impl From<&AppConfig> for LifecycleSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            initial_contribution: config.initial_contribution(),
            fallback_target_amount: config.fallback_target_amount(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    pub target_amount: Option<u64>,
    pub description: String,
}

struct Contribution {
    kind: RecordKind,
    name: String,
    description: String,
    amount: u64,
    target_amount: u64,
}

/// Drives the create and decrypt workflows against the registry, the
/// encryption gateway and the threshold decryption service.
pub struct ContributionLifecycle {
    reader: Arc<dyn RegistryRead>,
    gateway: Arc<dyn EncryptionGateway>,
    verifier: Arc<dyn VerificationService>,
    ids: IdGenerator,
    settings: LifecycleSettings,
    create_phase: watch::Sender<CreatePhase>,
    decrypt_phase: watch::Sender<DecryptPhase>,
}

impl ContributionLifecycle {
    pub fn new(
        reader: Arc<dyn RegistryRead>,
        gateway: Arc<dyn EncryptionGateway>,
        verifier: Arc<dyn VerificationService>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            reader,
            gateway,
            verifier,
            ids: IdGenerator::default(),
            settings,
            create_phase: watch::Sender::new(CreatePhase::Idle),
            decrypt_phase: watch::Sender::new(DecryptPhase::Idle),
        }
    }

    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    pub fn subscribe_create(&self) -> watch::Receiver<CreatePhase> {
        self.create_phase.subscribe()
    }

    pub fn subscribe_decrypt(&self) -> watch::Receiver<DecryptPhase> {
        self.decrypt_phase.subscribe()
    }

    fn set_create(&self, phase: CreatePhase) {
        debug!(?phase, "create workflow");
        self.create_phase.send_replace(phase);
    }

    fn set_decrypt(&self, phase: DecryptPhase) {
        debug!(?phase, "decrypt workflow");
        self.decrypt_phase.send_replace(phase);
    }

    fn contract_address(&self) -> Result<Address, LifecycleError> {
        let address = self.reader.contract_address();
        if address == Address::ZERO {
            return Err(LifecycleError::NotConnected);
        }
        Ok(address)
    }

    /// Prepare the encryption context once for this session, then load the registry
    #[instrument(skip_all)]
    pub async fn connect(&self, session: &Session) -> Result<LoadReport, LifecycleError> {
        if let Err(e) = session.require_identity() {
            session.notifier().notify(StatusPhase::Error, e.to_string());
            return Err(e);
        }

        let ready = session
            .fhe_ready()
            .get_or_try_init(|| self.gateway.initialize())
            .await;
        if let Err(e) = ready {
            error!(error = %e, "Encryption gateway initialization failed");
            session
                .notifier()
                .notify(StatusPhase::Error, "FHE initialization failed");
            return Err(e.into());
        }

        Ok(self.refresh(session).await?)
    }

    /// User requested reload of the registry
    pub async fn refresh(&self, session: &Session) -> Result<LoadReport, LedgerError> {
        session.registry().reload().await.inspect_err(|e| {
            error!(error = %e, "Failed to load registry");
            session
                .notifier()
                .notify(StatusPhase::Error, "Failed to load data");
        })
    }

    pub async fn probe_availability(&self, session: &Session) -> bool {
        match self.reader.probe_availability().await {
            Ok(true) => {
                session
                    .notifier()
                    .notify(StatusPhase::Success, "Contract is available!");
                true
            }
            Ok(false) => {
                session
                    .notifier()
                    .notify(StatusPhase::Error, "Contract reported unavailable");
                false
            }
            Err(e) => {
                warn!(error = %e, "Availability probe failed");
                session
                    .notifier()
                    .notify(StatusPhase::Error, "Contract call failed");
                false
            }
        }
    }

    /// Register a project together with the fixed initial encrypted contribution
    #[instrument(skip_all, fields(name = %project.name))]
    pub async fn create_project(
        &self,
        session: &Session,
        project: NewProject,
    ) -> Result<RecordId, LifecycleError> {
        let mut status = session
            .notifier()
            .begin("Creating project with FHE encryption...");
        let contribution = Contribution {
            kind: RecordKind::Project,
            amount: self.settings.initial_contribution,
            target_amount: project
                .target_amount
                .filter(|target| *target > 0)
                .unwrap_or(self.settings.fallback_target_amount),
            name: project.name,
            description: project.description,
        };

        match self
            .submit_contribution(session, contribution, &mut status)
            .await
        {
            Ok(id) => {
                status.succeed("Project created successfully!");
                Ok(id)
            }
            Err(e) => {
                error!(error = %e, "Project creation failed");
                status.fail(match &e {
                    LifecycleError::UserRejected | LifecycleError::NotConnected => e.to_string(),
                    other => format!("Creation failed: {other}"),
                });
                Err(e)
            }
        }
    }

    /// Submit an encrypted donation towards an existing project
    #[instrument(skip_all, fields(project = %project_id))]
    pub async fn donate(
        &self,
        session: &Session,
        project_id: &RecordId,
        amount: u64,
    ) -> Result<RecordId, LifecycleError> {
        let mut status = session
            .notifier()
            .begin("Processing encrypted donation...");

        let result: Result<RecordId, LifecycleError> = async {
            session.require_identity()?;
            let project = self.find_project(session, project_id).await?;
            let contribution = Contribution {
                kind: RecordKind::Donation {
                    project: project_id.clone(),
                },
                name: format!("Donation to {}", project.name),
                description: format!("Encrypted donation of {amount}"),
                amount,
                target_amount: amount,
            };
            self.submit_contribution(session, contribution, &mut status)
                .await
        }
        .await;

        match result {
            Ok(id) => {
                status.succeed("Donation completed with FHE protection!");
                Ok(id)
            }
            Err(e) => {
                error!(error = %e, "Donation failed");
                status.fail(match &e {
                    LifecycleError::UserRejected | LifecycleError::NotConnected => e.to_string(),
                    _ => "Donation failed".to_string(),
                });
                Err(e)
            }
        }
    }

    async fn find_project(
        &self,
        session: &Session,
        project_id: &RecordId,
    ) -> Result<ContributionRecord, LifecycleError> {
        if let Some(project) = session.registry().get(project_id) {
            return Ok(project);
        }
        match self.reader.get_record(project_id).await {
            Ok(project) => Ok(project),
            Err(LedgerError::NotFound(_)) => {
                Err(LifecycleError::UnknownProject(project_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn submit_contribution(
        &self,
        session: &Session,
        contribution: Contribution,
        status: &mut OperationStatus,
    ) -> Result<RecordId, LifecycleError> {
        let identity = session.require_identity()?;
        let contract = self.contract_address()?;
        let signer = session.require_signer()?;

        self.set_create(CreatePhase::Encrypting);
        self.encrypt_and_submit(
            session,
            signer.as_ref(),
            contract,
            identity,
            contribution,
            status,
        )
        .await
        .inspect_err(|_| self.set_create(CreatePhase::Failed))
    }

    async fn encrypt_and_submit(
        &self,
        session: &Session,
        signer: &dyn RegistryWrite,
        contract: Address,
        identity: Address,
        contribution: Contribution,
        status: &mut OperationStatus,
    ) -> Result<RecordId, LifecycleError> {
        let encrypted = {
            let _slot = session.try_begin_encryption()?;
            self.gateway
                .encrypt(contract, identity, contribution.amount)
                .await?
        };

        let registry = session.registry();
        let id = self
            .ids
            .next(&contribution.kind, |candidate| registry.contains(candidate));

        self.set_create(CreatePhase::Submitting);
        let pending = signer
            .submit_record(RecordSubmission {
                id: id.clone(),
                name: contribution.name,
                ciphertext: encrypted.ciphertext,
                proof: encrypted.proof,
                target_amount: contribution.target_amount,
                aux_flag: 0,
                description: contribution.description,
            })
            .await
            .map_err(LifecycleError::from_submission)?;

        self.set_create(CreatePhase::Confirming);
        status.update("Waiting for transaction confirmation...");
        let confirmation = pending
            .confirm()
            .await
            .map_err(LifecycleError::from_submission)?;
        info!(id = %id, tx = %confirmation.tx_hash, "Contribution confirmed");

        self.set_create(CreatePhase::Done);
        self.reload_after_commit(session).await;
        Ok(id)
    }

    /// Disclose the amount of a record through threshold decryption.
    ///
    /// Records that already carry a proof are answered from the chain without
    /// touching the decryption service or the signer.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn decrypt(
        &self,
        session: &Session,
        id: &RecordId,
    ) -> Result<DecryptOutcome, LifecycleError> {
        let mut status = session
            .notifier()
            .begin("Checking verification state...");

        match self.run_decrypt(session, id, &mut status).await {
            Ok(outcome @ DecryptOutcome::AlreadyVerified(_)) => {
                status.succeed("Data already verified");
                Ok(outcome)
            }
            Ok(outcome) => {
                status.succeed("Amount decrypted successfully!");
                Ok(outcome)
            }
            Err(e) => {
                self.set_decrypt(DecryptPhase::Failed);
                error!(error = %e, "Decryption failed");
                status.fail(match &e {
                    LifecycleError::NotConnected => e.to_string(),
                    _ => "Decryption failed".to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_decrypt(
        &self,
        session: &Session,
        id: &RecordId,
        status: &mut OperationStatus,
    ) -> Result<DecryptOutcome, LifecycleError> {
        session.require_identity()?;

        self.set_decrypt(DecryptPhase::CheckingCache);
        let record = self
            .reader
            .get_record(id)
            .await
            .map_err(|e| LifecycleError::VerificationFailed(e.to_string()))?;
        if let Some(value) = record.decrypted_amount() {
            info!(value, "Record already verified, nothing to decrypt");
            self.set_decrypt(DecryptPhase::AlreadyVerified);
            return Ok(DecryptOutcome::AlreadyVerified(value));
        }

        let signer = session.require_signer()?;
        let contract = self.contract_address()?;
        let handle = self
            .reader
            .get_ciphertext_handle(id)
            .await
            .map_err(|e| LifecycleError::VerificationFailed(e.to_string()))?;

        self.set_decrypt(DecryptPhase::RequestingDecryption);
        status.update("Requesting threshold decryption...");
        let result = match self.verifier.request_decryption(&[handle], contract).await {
            Ok(result) => result,
            Err(VerificationError::AlreadyVerified) => {
                return self.settle_lost_race(session, id).await
            }
            Err(VerificationError::Failed(reason)) => {
                return Err(LifecycleError::VerificationFailed(reason))
            }
        };
        let value = result.clear_value(&handle).ok_or_else(|| {
            LifecycleError::VerificationFailed(format!("No clear value returned for {handle}"))
        })?;

        status.update("Verifying decryption...");
        match self.commit_verification(signer.as_ref(), id, result).await {
            Ok(confirmation) => {
                info!(value, tx = %confirmation.tx_hash, "Decryption proof committed")
            }
            Err(SubmitError::AlreadyVerified) => return self.settle_lost_race(session, id).await,
            Err(e) => {
                // A rival proof mined ahead of ours only surfaces as a revert
                if self.verified_on_chain(id).await {
                    warn!(error = %e, "Commit failed but the record is verified");
                    return self.settle_lost_race(session, id).await;
                }
                return Err(LifecycleError::VerificationFailed(e.to_string()));
            }
        }

        self.set_decrypt(DecryptPhase::Done);
        self.reload_after_commit(session).await;
        Ok(DecryptOutcome::Decrypted(value))
    }

    /// Second half of the disclosure protocol: put the clear values and the
    /// proof on-chain and wait for the transaction to be mined. The result is
    /// consumed so no unconfirmed cleartext outlives the call.
    pub async fn commit_verification(
        &self,
        signer: &dyn RegistryWrite,
        id: &RecordId,
        result: DecryptionResult,
    ) -> Result<Confirmation, SubmitError> {
        self.set_decrypt(DecryptPhase::SubmittingProof);
        let pending = signer
            .submit_verification(id, result.encoded_clear_values, result.proof)
            .await?;
        self.set_decrypt(DecryptPhase::Confirming);
        pending.confirm().await
    }

    /// Someone else committed the proof first. That is a success for us as
    /// long as the chain now reports the record verified.
    async fn settle_lost_race(
        &self,
        session: &Session,
        id: &RecordId,
    ) -> Result<DecryptOutcome, LifecycleError> {
        info!("Record was verified concurrently by another party");
        self.reload_after_commit(session).await;
        let record = self
            .reader
            .get_record(id)
            .await
            .map_err(|e| LifecycleError::VerificationFailed(e.to_string()))?;
        match record.decrypted_amount() {
            Some(value) => {
                self.set_decrypt(DecryptPhase::AlreadyVerified);
                Ok(DecryptOutcome::AlreadyVerified(value))
            }
            None => Err(LifecycleError::VerificationFailed(
                "Reported as already verified but the registry disagrees".to_string(),
            )),
        }
    }

    async fn verified_on_chain(&self, id: &RecordId) -> bool {
        match self.reader.get_record(id).await {
            Ok(record) => record.is_verified(),
            Err(e) => {
                warn!(error = %e, "Could not re-read record after failed commit");
                false
            }
        }
    }

    async fn reload_after_commit(&self, session: &Session) {
        if let Err(e) = session.registry().reload_after_mutation().await {
            warn!(error = %e, "Reload after commit failed");
            session
                .notifier()
                .notify(StatusPhase::Error, "Failed to load data");
        }
    }
}
