// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! # KMS plugin
//!
//! Envelope encryption for a container orchestrator's control plane, backed
//! by a remote Key Management API. The control plane talks gRPC
//! (`v2.KeyManagementService`) to the plugin over a unix socket, and the
//! plugin forwards every `Encrypt` and `Decrypt` to the remote KMS, which
//! holds the key material.
//!
//! Layers, from the socket inwards:
//! - [`grpc`] serves the control-plane API and maps errors to gRPC codes,
//! - [`service::KmsPlugin`] implements [`KmsService`] on top of the client,
//! - [`client::KmsApiClient`] speaks HTTP and JSON to the KMS API.

pub mod api;
pub use api::*;

pub mod client;
pub use client::{ClientConfig, KmsApiClient};

pub mod config;
pub use config::PluginConfig;

pub mod error;
pub use error::*;

pub mod grpc;
pub use grpc::{GrpcService, ShutdownHandle};

pub mod key;
pub use key::KeyAddress;

pub mod service;
pub use service::KmsPlugin;
