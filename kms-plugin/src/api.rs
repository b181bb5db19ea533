// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! # The KMS plugin contract
//!
//! The control plane envelope-encrypts its state through three calls:
//! - `Status`: a capability report (protocol version, health and the key
//!   new data is encrypted with),
//! - `Encrypt`: wrap `plaintext` with the currently active key,
//! - `Decrypt`: unwrap a ciphertext with the key it was produced with.
//!
//! The key id returned from `Encrypt` is opaque to the control plane. It is
//! stored next to the ciphertext and handed back on `Decrypt`, which is how
//! ciphertexts produced before a key rotation stay readable.
//!
//! Every call carries a caller-chosen `uid`. It only correlates log lines
//! across the control plane and the plugin and is never used for
//! authorization.

use async_trait::async_trait;

use crate::Result;

/// Protocol version reported by `Status`.
pub const API_VERSION: &str = "v2";

/// Health string reported by a serving plugin.
pub const HEALTHZ_OK: &str = "ok";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusResponse {
    pub version: String,
    pub healthz: String,
    pub key_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptResponse {
    pub ciphertext: Vec<u8>,

    /// Key id to persist alongside `ciphertext`.
    pub key_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptRequest {
    pub key_id: String,
    pub ciphertext: Vec<u8>,
}

#[async_trait]
pub trait KmsService: Send + Sync {
    /// Report the plugin's version, health and active key id.
    async fn status(&self) -> Result<StatusResponse>;

    /// Encrypt `plaintext` with the active key.
    async fn encrypt(&self, uid: &str, plaintext: &[u8]) -> Result<EncryptResponse>;

    /// Decrypt `request.ciphertext` with the key named by `request.key_id`,
    /// which need not be the active key.
    async fn decrypt(&self, uid: &str, request: &DecryptRequest) -> Result<Vec<u8>>;
}
