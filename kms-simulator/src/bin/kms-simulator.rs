// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use kms_simulator::Keystore;
use log::info;

const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Reference backend for the remote KMS API.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to serve the KMS API on.
    #[arg(default_value_t = DEFAULT_BIND.to_string(), short, long)]
    bind: String,

    /// Key to load, as `{projectId}/{keyRingId}/{keyId}/{version}`.
    /// May be given more than once.
    #[arg(short, long = "key", required = true)]
    keys: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let cli = Cli::parse();

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;

    let keystore = Keystore::from_key_ids(cli.keys)?;
    for label in keystore.labels() {
        info!("loaded key {label}");
    }

    kms_simulator::serve_with_shutdown(addr, keystore, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, gracefully shutdown.");
        }
    })
    .await
    .context("serve KMS simulator")?;

    Ok(())
}
