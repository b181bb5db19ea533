// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use kms_plugin::{GrpcService, KeyAddress, KmsPlugin, PluginConfig};
use log::info;
use tokio::signal::unix::{signal, SignalKind};

/// KMS plugin: envelope encryption backed by the remote Key Management API.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the config file
    ///
    /// `--config /etc/kms-plugin.toml`
    #[arg(short, long)]
    config: Option<String>,

    /// Unix socket to serve the gRPC API on, e.g. `unix:///var/run/kmsplugin/socket.sock`.
    #[arg(long)]
    listen: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Region of the KMS API.
    #[arg(long)]
    region: Option<String>,

    /// Key to encrypt with, as `{projectId}/{keyRingId}/{keyId}/{version}`.
    #[arg(long)]
    key: Option<String>,

    /// Base URL of the KMS API, overriding the regional endpoint.
    #[arg(long)]
    endpoint: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut PluginConfig) {
        if let Some(listen) = self.listen {
            config.socket = listen;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(region) = self.region {
            config.kms.region = region;
        }
        if let Some(key) = self.key {
            config.key = key;
        }
        if let Some(endpoint) = self.endpoint {
            config.kms.endpoint = Some(endpoint);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let cli = Cli::parse();

    let mut config = PluginConfig::new(cli.config.clone())?;
    cli.apply(&mut config);

    if config.key.is_empty() {
        bail!("no key configured, set `key` in the config file or pass --key");
    }
    KeyAddress::parse(&config.key)?;

    let client_config = config.client_config()?;
    let plugin = KmsPlugin::from_config(&client_config, config.key.clone())
        .context("create KMS plugin")?;
    info!(
        "KMS endpoint {}, key {}, timeout {}s",
        client_config.endpoint,
        plugin.key(),
        config.timeout
    );
    let grpc = Arc::new(GrpcService::new(&config.socket, config.timeout(), plugin));
    let shutdown = grpc.shutdown_handle();

    let mut server = tokio::spawn({
        let grpc = grpc.clone();
        async move { grpc.serve().await }
    });

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    tokio::select! {
        _ = hangup.recv() => info!("Client terminal disconnected."),
        _ = interrupt.recv() => info!("SIGINT received, gracefully shutdown."),
        _ = terminate.recv() => info!("SIGTERM received, gracefully shutdown."),
        res = &mut server => {
            res.context("gRPC server task")?.context("serve gRPC")?;
            info!("gRPC server exits.");
            return Ok(());
        }
    }

    shutdown.shutdown();
    server
        .await
        .context("gRPC server task")?
        .context("serve gRPC")?;

    Ok(())
}
