// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::load_config::{find_in_parent, resolve_config_path};
use crate::rpc::{RpcAuth, RpcEndpoint};
use alloy::primitives::Address;
use anyhow::{anyhow, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

pub const DEFAULT_CONFIG_NAME: &str = "charitybox.config.yaml";
pub const ENV_PREFIX: &str = "CHARITYBOX_";

/// How long status notifications stay visible
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationConfig {
    pub success_ms: u64,
    pub error_ms: u64,
    pub pending_ms: u64,
    /// Maximum number of notifications held at once
    pub capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            success_ms: 2000,
            error_ms: 3000,
            pending_ms: 30_000,
            capacity: 8,
        }
    }
}

impl NotificationConfig {
    pub fn success_ttl(&self) -> Duration {
        Duration::from_millis(self.success_ms)
    }

    pub fn error_ttl(&self) -> Duration {
        Duration::from_millis(self.error_ms)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_millis(self.pending_ms)
    }
}

/// The configuration used throughout the app
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Name of this node, reported as the telemetry service name
    name: String,
    /// RPC endpoint of the chain hosting the registry
    rpc_url: String,
    #[serde(default)]
    rpc_auth: RpcAuth,
    /// Address of the registry contract
    contract: Option<String>,
    /// Base URL of the encryption and decryption relayer
    relayer_url: String,
    /// Encrypted amount submitted alongside a new project
    initial_contribution: u64,
    /// Target used when a record reports none
    fallback_target_amount: u64,
    notifications: NotificationConfig,
    /// Open Telemetry collector grpc endpoint. Eg. http://127.0.0.1:4317
    otel: Option<String>,
    #[serde(skip)]
    config_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "charitybox".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            rpc_auth: RpcAuth::None,
            contract: None,
            relayer_url: "http://localhost:3000".to_string(),
            initial_contribution: 100,
            fallback_target_amount: 1000,
            notifications: NotificationConfig::default(),
            otel: None,
            config_file: None,
        }
    }
}

impl AppConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rpc(&self) -> Result<RpcEndpoint> {
        RpcEndpoint::parse(&self.rpc_url)
            .with_context(|| format!("Failed to parse rpc_url '{}'", self.rpc_url))
    }

    pub fn rpc_auth(&self) -> &RpcAuth {
        &self.rpc_auth
    }

    pub fn contract_address(&self) -> Result<Address> {
        let raw = self
            .contract
            .as_ref()
            .ok_or_else(|| anyhow!("No registry contract configured. Set `contract` in {DEFAULT_CONFIG_NAME}."))?;
        raw.parse()
            .with_context(|| format!("Invalid contract address '{raw}'"))
    }

    pub fn relayer_url(&self) -> &str {
        &self.relayer_url
    }

    pub fn initial_contribution(&self) -> u64 {
        self.initial_contribution
    }

    pub fn fallback_target_amount(&self) -> u64 {
        self.fallback_target_amount
    }

    pub fn notifications(&self) -> &NotificationConfig {
        &self.notifications
    }

    pub fn otel(&self) -> Option<String> {
        self.otel.clone()
    }

    /// The file this configuration was read from, if any
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }
}

/// Values passed from the cli that override the file and environment
#[derive(Default, Serialize, Deserialize, Clone, Debug)]
pub struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otel: Option<String>,
}

/// Load the config at `cli_file` or the nearest/default location.
///
/// A missing default file is not an error: defaults and `CHARITYBOX_*` environment
/// variables are used instead. A missing file that was asked for explicitly is.
pub fn load_config(cli_file: Option<&Path>, overrides: CliOverrides) -> Result<AppConfig> {
    let resolved = resolve_config_path(
        find_in_parent,
        &env::current_dir()?,
        &OsDirs::config_dir(),
        DEFAULT_CONFIG_NAME,
        cli_file,
    );

    let exists = resolved.exists();
    if cli_file.is_some() && !exists {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Configuration file not found: {}", resolved.display()),
        )
        .into());
    }

    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
    if exists {
        debug!("Reading configuration from {}", resolved.display());
        figment = figment.merge(Yaml::file(&resolved));
    }

    let mut config: AppConfig = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .merge(Serialized::defaults(overrides))
        .extract()
        .context("Could not parse configuration")?;

    config.config_file = exists.then_some(resolved);
    Ok(config)
}

pub struct OsDirs;

impl OsDirs {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("charitybox")
    }
}
