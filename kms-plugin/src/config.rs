// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{env, path::Path, time::Duration};

use config::{Config, File};
use log::{debug, info};
use serde::Deserialize;

use crate::{client::ClientConfig, Error, Result};

pub const DEFAULT_SOCKET: &str = "/var/run/kmsplugin/socket.sock";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REGION: &str = "eu01";

/// Regions the KMS API is served in.
pub const SUPPORTED_REGIONS: &[&str] = &["eu01"];

const ENDPOINT_TEMPLATE: &str = "https://kms.api.{region}.stackit.cloud";

const CONFIG_PATH_ENV: &str = "KMS_PLUGIN_CONFIG_PATH";
const SERVICE_ACCOUNT_TOKEN_ENV: &str = "STACKIT_SERVICE_ACCOUNT_TOKEN";

fn default_region() -> String {
    DEFAULT_REGION.into()
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct KmsConfig {
    #[serde(default = "default_region")]
    pub region: String,

    /// Overrides the regional endpoint, e.g. to point at a simulator.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub service_account_token: Option<String>,
}

impl Default for KmsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            service_account_token: None,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct PluginConfig {
    /// Unix socket the gRPC service listens on.
    pub socket: String,

    /// Per-request timeout in seconds, for both the gRPC service and the
    /// calls to the KMS API.
    pub timeout: u64,

    /// Key used for encryption, `{projectId}/{keyRingId}/{keyId}/{version}`.
    #[serde(default)]
    pub key: String,

    #[serde(default)]
    pub kms: KmsConfig,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            socket: DEFAULT_SOCKET.into(),
            timeout: DEFAULT_TIMEOUT_SECS,
            key: String::new(),
            kms: KmsConfig::default(),
        }
    }
}

impl PluginConfig {
    /// Load the configuration from `config_path`, falling back to the path in
    /// `KMS_PLUGIN_CONFIG_PATH` and then to the defaults.
    pub fn new(config_path: Option<String>) -> Result<Self> {
        let config_path = config_path.or_else(|| {
            if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
                debug!("Read plugin config path from env: {env_path}");
                return Some(env_path);
            }
            None
        });

        match config_path {
            Some(path) => {
                info!("Use configuration file {path}");
                if !Path::new(&path).exists() {
                    return Err(Error::Config(format!("config file {path} not found")));
                }
                Self::from_file(&path)
            }
            None => {
                info!("No config path specified, use a default config.");
                Ok(Self::default())
            }
        }
    }

    /// Load `PluginConfig` from a configuration file. Supported formats are all formats supported by the
    /// `config` crate.
    fn from_file(config_path: &str) -> Result<Self> {
        let c = Config::builder()
            .set_default("socket", DEFAULT_SOCKET)
            .and_then(|b| b.set_default("timeout", DEFAULT_TIMEOUT_SECS as i64))
            .and_then(|b| b.set_default("kms.region", DEFAULT_REGION))
            .map_err(|e| Error::Config(e.to_string()))?
            .add_source(File::with_name(config_path))
            .build()
            .map_err(|e| Error::Config(format!("read {config_path} failed: {e}")))?;

        c.try_deserialize()
            .map_err(|e| Error::Config(format!("invalid config: {e}")))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Base URL of the KMS API: the configured override, or the endpoint of
    /// the configured region.
    pub fn endpoint(&self) -> Result<String> {
        if let Some(endpoint) = &self.kms.endpoint {
            return Ok(endpoint.clone());
        }

        if !SUPPORTED_REGIONS.contains(&self.kms.region.as_str()) {
            return Err(Error::UnsupportedRegion(format!(
                "{} (supported: {})",
                self.kms.region,
                SUPPORTED_REGIONS.join(", ")
            )));
        }

        Ok(ENDPOINT_TEMPLATE.replace("{region}", &self.kms.region))
    }

    pub fn client_config(&self) -> Result<ClientConfig> {
        let service_account_token = self
            .kms
            .service_account_token
            .clone()
            .or_else(|| env::var(SERVICE_ACCOUNT_TOKEN_ENV).ok())
            .filter(|token| !token.is_empty());

        Ok(ClientConfig {
            endpoint: self.endpoint()?,
            timeout: Some(self.timeout()),
            service_account_token,
        })
    }
}
