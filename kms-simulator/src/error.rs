// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("key is in unknown format: {0}")]
    KeyFormat(String),

    #[error("invalid path segment: {0}")]
    InvalidPath(String),

    #[error("ciphertext too short: got {len} bytes, need at least {min}")]
    CiphertextTooShort { len: usize, min: usize },

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("simulator task failed: {0}")]
    Task(String),

    #[error("simulator server failed")]
    Server(#[from] hyper::Error),
}
