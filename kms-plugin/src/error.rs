// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("key is in unknown format: {0}")]
    KeyFormat(String),

    #[error("key {key} not found in remote KMS: {message}")]
    KeyNotFound { key: String, message: String },

    #[error("{operation} was not successful ({status}): {message}")]
    UnexpectedStatus {
        operation: &'static str,
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("request to remote KMS timed out")]
    Timeout(#[source] reqwest::Error),

    #[error("request to remote KMS failed")]
    Http(#[source] reqwest::Error),

    #[error("malformed response from remote KMS: {0}")]
    MalformedResponse(String),

    #[error("invalid KMS endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("unsupported region: {0}")]
    UnsupportedRegion(String),

    #[error("invalid plugin configuration: {0}")]
    Config(String),

    #[error("socket {path} unavailable")]
    Socket {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gRPC server failed")]
    GrpcServer(#[from] tonic::transport::Error),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e)
        } else {
            Error::Http(e)
        }
    }
}
