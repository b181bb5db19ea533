// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! HTTP client for the remote Key Management API.
//!
//! Both operations POST `{"data": <base64>}` to
//! `{endpoint}/v1alpha/projects/{projectId}/keyrings/{keyRingId}/keys/{keyId}/versions/{version}/{operation}`
//! and read the transformed payload back from the same JSON shape. Payloads
//! are base64 encoded exactly once on the way out and decoded exactly once
//! on the way in, so callers only ever see raw bytes.

use std::time::Duration;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use log::debug;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, KeyAddress, Result};

/// First path segment of every KMS API route.
pub const API_ROOT: &str = "v1alpha";

/// Standard alphabet, written without padding, read with or without it.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Serialize, Deserialize)]
struct DataBody {
    data: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the KMS API.
    pub endpoint: String,

    /// Upper bound for one request, connect to last body byte.
    pub timeout: Option<Duration>,

    /// Sent as a bearer token when set.
    pub service_account_token: Option<String>,
}

pub struct EncryptRequest<'a> {
    pub key: KeyAddress,
    pub plaintext: &'a [u8],
}

pub struct DecryptRequest<'a> {
    pub key: KeyAddress,
    pub ciphertext: &'a [u8],
}

/// Client for the remote KMS API. One client is meant to be shared by all
/// requests; the underlying connection pool is safe for concurrent use.
#[derive(Clone, Debug)]
pub struct KmsApiClient {
    endpoint: Url,
    http: reqwest::Client,
    token: Option<String>,
}

impl KmsApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| Error::InvalidEndpoint(format!("{}: {e}", config.endpoint)))?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::InvalidEndpoint(format!(
                "{}: not a base URL",
                config.endpoint
            )));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            endpoint,
            http,
            token: config.service_account_token.clone(),
        })
    }

    /// Encrypt `request.plaintext` with `request.key` and return the raw
    /// ciphertext.
    pub async fn encrypt(&self, request: &EncryptRequest<'_>) -> Result<Vec<u8>> {
        self.post(&request.key, "encrypt", request.plaintext).await
    }

    /// Decrypt `request.ciphertext` with `request.key` and return the raw
    /// plaintext.
    pub async fn decrypt(&self, request: &DecryptRequest<'_>) -> Result<Vec<u8>> {
        self.post(&request.key, "decrypt", request.ciphertext).await
    }

    fn operation_url(&self, key: &KeyAddress, operation: &str) -> Result<Url> {
        let segments = key.segments();
        // The URL path would resolve these instead of sending them.
        if segments.iter().any(|s| matches!(*s, "." | "..")) {
            return Err(Error::KeyFormat(key.to_string()));
        }

        let [project_id, key_ring_id, key_id, version] = segments;
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend([
                API_ROOT,
                "projects",
                project_id,
                "keyrings",
                key_ring_id,
                "keys",
                key_id,
                "versions",
                version,
                operation,
            ]);

        Ok(url)
    }

    async fn post(&self, key: &KeyAddress, operation: &'static str, data: &[u8]) -> Result<Vec<u8>> {
        let url = self.operation_url(key, operation)?;
        debug!("POST {url}");

        let body = DataBody {
            data: BASE64.encode(data),
        };
        let mut request = self.http.post(url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let message = response.text().await?;
            return Err(match status {
                StatusCode::NOT_FOUND => Error::KeyNotFound {
                    key: key.to_string(),
                    message,
                },
                _ => Error::UnexpectedStatus {
                    operation,
                    status,
                    message,
                },
            });
        }

        let body = response.bytes().await?;
        let body: DataBody = serde_json::from_slice(&body).map_err(|e| {
            Error::MalformedResponse(format!("parse {operation} response failed: {e}"))
        })?;
        BASE64.decode(body.data).map_err(|e| {
            Error::MalformedResponse(format!("decode {operation} response data failed: {e}"))
        })
    }
}
