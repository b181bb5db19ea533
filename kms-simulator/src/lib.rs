// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! # Reference backend for the remote KMS API
//!
//! A self-contained stand-in for the remote Key Management API, used to
//! exercise the plugin's HTTP client without a live dependency. It serves
//! the same resource paths and `{"data": <base64>}` bodies and answers with
//! the same status codes:
//! - `200` with the transformed payload,
//! - `404` when the addressed key is not in the [`Keystore`],
//! - `500` for malformed bodies and ciphertexts.
//!
//! Keys are labelled `{project}/{keyring}/{key}/{version}`, exactly as a
//! key identifier is written on the plugin side.

pub mod error;
pub use error::*;

pub mod keystore;
pub use keystore::Keystore;

pub mod server;
pub use server::{serve_with_shutdown, spawn, KmsHandler, SimulatorHandle};
