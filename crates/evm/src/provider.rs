// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use alloy::{
    network::EthereumWallet,
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::client::RpcClient,
    signers::local::PrivateKeySigner,
    transports::{
        http::{
            reqwest::{
                header::{HeaderMap, HeaderValue, AUTHORIZATION},
                Client,
            },
            Http,
        },
        ws::WsConnect,
        Authorization,
    },
};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use cbx_config::{RpcAuth, RpcEndpoint};
use std::env;

pub trait AuthConversions {
    fn to_header_value(&self) -> Option<HeaderValue>;
    fn to_ws_auth(&self) -> Option<Authorization>;
}

impl AuthConversions for RpcAuth {
    fn to_header_value(&self) -> Option<HeaderValue> {
        let value = match self {
            RpcAuth::None => return None,
            RpcAuth::Basic { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
            }
            RpcAuth::Bearer(token) => format!("Bearer {token}"),
        };
        HeaderValue::from_str(&value).ok()
    }

    fn to_ws_auth(&self) -> Option<Authorization> {
        match self {
            RpcAuth::None => None,
            RpcAuth::Basic { username, password } => Some(Authorization::basic(username, password)),
            RpcAuth::Bearer(token) => Some(Authorization::bearer(token)),
        }
    }
}

/// Connection settings for the registry RPC endpoint
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    rpc: RpcEndpoint,
    auth: RpcAuth,
}

impl ProviderConfig {
    pub fn new(rpc: RpcEndpoint, auth: RpcAuth) -> Self {
        Self { rpc, auth }
    }

    pub async fn connect_read(&self) -> Result<DynProvider> {
        let provider = if self.rpc.is_websocket() {
            ProviderBuilder::new()
                .connect_ws(self.ws_connect()?)
                .await
                .context("Failed to connect to WebSocket RPC")?
                .erased()
        } else {
            ProviderBuilder::new()
                .connect_client(self.http_client()?)
                .erased()
        };
        Ok(provider)
    }

    pub async fn connect_signer(&self, signer: PrivateKeySigner) -> Result<DynProvider> {
        let wallet = EthereumWallet::from(signer);
        let provider = if self.rpc.is_websocket() {
            ProviderBuilder::new()
                .wallet(wallet)
                .with_cached_nonce_management()
                .connect_ws(self.ws_connect()?)
                .await
                .context("Failed to connect to WebSocket RPC")?
                .erased()
        } else {
            ProviderBuilder::new()
                .wallet(wallet)
                .with_cached_nonce_management()
                .connect_client(self.http_client()?)
                .erased()
        };
        Ok(provider)
    }

    fn ws_connect(&self) -> Result<WsConnect> {
        let mut ws = WsConnect::new(self.rpc.ws_url()?);
        if let Some(auth) = self.auth.to_ws_auth() {
            ws = ws.with_auth(auth);
        }
        Ok(ws)
    }

    fn http_client(&self) -> Result<RpcClient> {
        let mut headers = HeaderMap::new();
        if let Some(auth) = self.auth.to_header_value() {
            headers.insert(AUTHORIZATION, auth);
        }
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;
        let http = Http::with_client(client, self.rpc.http_url()?.parse()?);
        Ok(RpcClient::new(http, self.rpc.is_local()))
    }
}

/// Read a private key from the environment and scrub the variable afterwards
pub fn load_signer_from_env(var: &str) -> Result<Option<PrivateKeySigner>> {
    let Ok(private_key) = env::var(var) else {
        return Ok(None);
    };
    env::remove_var(var);
    let signer = private_key
        .trim()
        .parse()
        .with_context(|| format!("{var} does not hold a valid private key"))?;
    Ok(Some(signer))
}
