// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use async_trait::async_trait;
use log::{debug, error, info};

use crate::client::{self, ClientConfig, KmsApiClient};
use crate::{
    DecryptRequest, EncryptResponse, KeyAddress, KmsService, Result, StatusResponse, API_VERSION,
    HEALTHZ_OK,
};

/// [`KmsService`] backed by the remote KMS API.
///
/// New data is always encrypted with the configured key. Decryption uses
/// whichever key the ciphertext was stored with, so the configured key can
/// be rotated without losing access to older ciphertexts.
pub struct KmsPlugin {
    client: KmsApiClient,
    key: String,
}

impl KmsPlugin {
    pub fn new(client: KmsApiClient, key: impl Into<String>) -> Self {
        Self {
            client,
            key: key.into(),
        }
    }

    pub fn from_config(config: &ClientConfig, key: impl Into<String>) -> Result<Self> {
        Ok(Self::new(KmsApiClient::new(config)?, key))
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl KmsService for KmsPlugin {
    /// Static report; the KMS API is not contacted, so this stays healthy
    /// while the backend is unreachable.
    async fn status(&self) -> Result<StatusResponse> {
        debug!("status requested, key: {}", self.key);
        Ok(StatusResponse {
            version: API_VERSION.into(),
            healthz: HEALTHZ_OK.into(),
            key_id: self.key.clone(),
        })
    }

    async fn encrypt(&self, uid: &str, plaintext: &[u8]) -> Result<EncryptResponse> {
        info!("encrypting, uid: {uid}");
        let key = KeyAddress::parse(&self.key).map_err(|e| {
            error!("splitting key failed, uid: {uid}: {e}");
            e
        })?;

        let request = client::EncryptRequest { key, plaintext };
        let ciphertext = self.client.encrypt(&request).await.map_err(|e| {
            error!("encrypting with kms failed, uid: {uid}: {e}");
            e
        })?;

        Ok(EncryptResponse {
            ciphertext,
            key_id: self.key.clone(),
        })
    }

    async fn decrypt(&self, uid: &str, request: &DecryptRequest) -> Result<Vec<u8>> {
        info!("decrypting, uid: {uid}, key: {}", request.key_id);
        let key = KeyAddress::parse(&request.key_id).map_err(|e| {
            error!("splitting key failed, uid: {uid}: {e}");
            e
        })?;

        let request = client::DecryptRequest {
            key,
            ciphertext: &request.ciphertext,
        };
        self.client.decrypt(&request).await.map_err(|e| {
            error!("decrypting with kms failed, uid: {uid}: {e}");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, OnceLock};

    use super::*;
    use crate::Error;

    fn plugin(key: &str) -> KmsPlugin {
        // Nothing listens on port 1; any request reaching the network fails.
        KmsPlugin::from_config(
            &ClientConfig {
                endpoint: "http://127.0.0.1:1".into(),
                ..Default::default()
            },
            key,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn status_reports_configured_key() {
        let plugin = plugin("p1/kr1/k1/v1");
        assert_eq!(plugin.key(), "p1/kr1/k1/v1");
        let status = plugin.status().await.unwrap();
        assert_eq!(
            status,
            StatusResponse {
                version: "v2".into(),
                healthz: "ok".into(),
                key_id: "p1/kr1/k1/v1".into(),
            }
        );
    }

    struct CapturingLogger(Mutex<Vec<String>>);

    impl log::Log for CapturingLogger {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            self.0.lock().unwrap().push(record.args().to_string());
        }

        fn flush(&self) {}
    }

    fn captured_logs() -> &'static CapturingLogger {
        static LOGGER: OnceLock<&'static CapturingLogger> = OnceLock::new();
        LOGGER.get_or_init(|| {
            let logger = Box::leak(Box::new(CapturingLogger(Mutex::new(Vec::new()))));
            log::set_logger(logger).unwrap();
            log::set_max_level(log::LevelFilter::Trace);
            logger
        })
    }

    #[tokio::test]
    async fn status_is_logged() {
        let logs = captured_logs();
        plugin("logged/kr1/k1/v1").status().await.unwrap();
        assert!(logs
            .0
            .lock()
            .unwrap()
            .iter()
            .any(|line| line == "status requested, key: logged/kr1/k1/v1"));
    }

    #[tokio::test]
    async fn malformed_configured_key() {
        let err = plugin("onlytwo/segments")
            .encrypt("uid", b"foo")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeyFormat(k) if k == "onlytwo/segments"));
    }

    #[tokio::test]
    async fn malformed_request_key() {
        let request = DecryptRequest {
            key_id: "a/b/c".into(),
            ciphertext: b"ciphertext".to_vec(),
        };
        let err = plugin("p1/kr1/k1/v1")
            .decrypt("uid", &request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeyFormat(k) if k == "a/b/c"));
    }

    #[tokio::test]
    async fn unreachable_backend() {
        let err = plugin("p1/kr1/k1/v1")
            .encrypt("uid", b"foo")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }
}
