// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::primitives::Address;
use anyhow::Result;
use cbx_config::AppConfig;
use cbx_evm::{load_signer_from_env, ProviderConfig, RegistryContractFactory, RegistryRead};
use cbx_lifecycle::{
    ContributionLifecycle, ContributionRegistry, LifecycleSettings, Session, StatusNotifier,
};
use cbx_relayer::RelayerClient;
use std::sync::Arc;
use tracing::info;

const PRIVATE_KEY_VAR: &str = "PRIVATE_KEY";

/// Session plus workflows, wired from configuration
pub struct AppContext {
    pub session: Session,
    pub lifecycle: ContributionLifecycle,
}

impl AppContext {
    /// Build the context. A signer is attached when `PRIVATE_KEY` is set,
    /// otherwise `identity` (if any) is connected read-only.
    pub async fn build(config: &AppConfig, identity: Option<Address>) -> Result<Self> {
        let contract = config.contract_address()?;
        let provider_config = ProviderConfig::new(config.rpc()?, config.rpc_auth().clone());
        let fallback_target = config.fallback_target_amount();

        let reader: Arc<dyn RegistryRead> = Arc::new(
            RegistryContractFactory::create_read(&provider_config, contract)
                .await?
                .with_fallback_target(fallback_target),
        );
        let relayer = Arc::new(RelayerClient::new(config.relayer_url())?);
        let lifecycle = ContributionLifecycle::new(
            reader.clone(),
            relayer.clone(),
            relayer,
            LifecycleSettings::from(config),
        );

        let mut session = Session::new(
            ContributionRegistry::new(reader),
            StatusNotifier::new(config.notifications().clone()),
        );

        match load_signer_from_env(PRIVATE_KEY_VAR)? {
            Some(signer) => {
                let writer = RegistryContractFactory::create_write(&provider_config, contract, signer)
                    .await?
                    .with_fallback_target(fallback_target);
                session.connect_signer(Arc::new(writer));
                info!(identity = ?session.identity(), "Connected with signer");
            }
            None => {
                if let Some(identity) = identity {
                    session.connect(identity, None);
                    info!(identity = %identity, "Connected read-only");
                }
            }
        }

        Ok(Self { session, lifecycle })
    }
}
