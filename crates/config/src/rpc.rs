// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// A validated registry RPC endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcEndpoint {
    url: Url,
    websocket: bool,
    secure: bool,
}

impl RpcEndpoint {
    pub fn parse(url: &str) -> Result<Self> {
        let url = Url::parse(url).context("Invalid RPC URL format")?;
        let (websocket, secure) = match url.scheme() {
            "http" => (false, false),
            "https" => (false, true),
            "ws" => (true, false),
            "wss" => (true, true),
            _ => bail!("Invalid protocol. Expected: http://, https://, ws://, wss://"),
        };
        if url.host_str().is_none() {
            bail!("RPC URL must contain a host");
        }
        Ok(Self {
            url,
            websocket,
            secure,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_websocket(&self) -> bool {
        self.websocket
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Loopback hosts skip the provider's remote-node polling defaults
    pub fn is_local(&self) -> bool {
        match self.url.host_str() {
            Some("localhost") | Some("::1") | Some("[::1]") => true,
            Some(host) => host.starts_with("127."),
            None => false,
        }
    }

    pub fn http_url(&self) -> Result<String> {
        self.with_scheme(if self.secure { "https" } else { "http" })
    }

    pub fn ws_url(&self) -> Result<String> {
        self.with_scheme(if self.secure { "wss" } else { "ws" })
    }

    fn with_scheme(&self, scheme: &str) -> Result<String> {
        let mut url = self.url.clone();
        url.set_scheme(scheme)
            .map_err(|_| anyhow!("cannot switch RPC URL to {scheme}"))?;
        Ok(url.to_string())
    }
}

#[derive(Debug, Default, Hash, Eq, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", content = "credentials")]
pub enum RpcAuth {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    Bearer(String),
}
