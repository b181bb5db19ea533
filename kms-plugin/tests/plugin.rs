// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use hyper_util::rt::TokioIo;
use kms_plugin::{
    grpc::{
        v2::{
            self, key_management_service_client::KeyManagementServiceClient,
            key_management_service_server::KeyManagementService,
        },
        KmsGrpcService,
    },
    ClientConfig, DecryptRequest, Error, GrpcService, KmsPlugin, KmsService,
};
use kms_simulator::{Keystore, SimulatorHandle};
use rstest::rstest;
use tokio::net::UnixStream;
use tonic::codegen::{http::Uri, BoxFuture, Context, Poll, Service};
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request};

const KEY_V1: &str = "p1/kr1/k1/v1";
const KEY_V2: &str = "p1/kr1/k1/v2";

fn simulator() -> SimulatorHandle {
    let keystore = Keystore::new([KEY_V1, KEY_V2]);
    kms_simulator::spawn("127.0.0.1:0".parse().unwrap(), keystore).unwrap()
}

fn plugin(simulator: &SimulatorHandle, key: &str) -> KmsPlugin {
    let config = ClientConfig {
        endpoint: simulator.url(),
        timeout: Some(Duration::from_secs(5)),
        service_account_token: Some("test-token".into()),
    };
    KmsPlugin::from_config(&config, key).unwrap()
}

#[tokio::test]
async fn encrypt_then_decrypt() {
    let simulator = simulator();
    let plugin = plugin(&simulator, KEY_V1);

    let encrypted = plugin.encrypt("uid-1", b"foo").await.unwrap();
    assert!(!encrypted.ciphertext.is_empty());
    assert_ne!(encrypted.ciphertext, b"foo");
    assert_eq!(encrypted.key_id, KEY_V1);

    let request = DecryptRequest {
        key_id: encrypted.key_id,
        ciphertext: encrypted.ciphertext,
    };
    let plaintext = plugin.decrypt("uid-2", &request).await.unwrap();
    assert_eq!(plaintext, b"foo");

    simulator.shutdown().await.unwrap();
}

#[rstest]
#[case(b"".to_vec())]
#[case(b"foo".to_vec())]
#[case(vec![0u8; 4096])]
#[case((0..=255u8).collect::<Vec<_>>())]
#[tokio::test]
async fn payloads_survive_round_trip(#[case] payload: Vec<u8>) {
    let simulator = simulator();
    let plugin = plugin(&simulator, KEY_V1);

    let encrypted = plugin.encrypt("uid", &payload).await.unwrap();
    let request = DecryptRequest {
        key_id: encrypted.key_id,
        ciphertext: encrypted.ciphertext,
    };
    assert_eq!(plugin.decrypt("uid", &request).await.unwrap(), payload);

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn decrypt_after_key_rotation() {
    let simulator = simulator();

    let old = plugin(&simulator, KEY_V1);
    let encrypted = old.encrypt("uid", b"foo").await.unwrap();

    // The plugin now encrypts with v2 but still reads v1 ciphertexts.
    let rotated = plugin(&simulator, KEY_V2);
    assert_eq!(rotated.status().await.unwrap().key_id, KEY_V2);

    let request = DecryptRequest {
        key_id: encrypted.key_id,
        ciphertext: encrypted.ciphertext,
    };
    assert_eq!(rotated.decrypt("uid", &request).await.unwrap(), b"foo");

    let reencrypted = rotated.encrypt("uid", b"foo").await.unwrap();
    assert_eq!(reencrypted.key_id, KEY_V2);

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_key() {
    let simulator = simulator();
    let plugin = plugin(&simulator, "missing/key/id/v1");

    let err = plugin.encrypt("uid", b"foo").await.unwrap_err();
    match err {
        Error::KeyNotFound { key, .. } => assert_eq!(key, "missing/key/id/v1"),
        other => panic!("unexpected error: {other}"),
    }

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn wrong_key_does_not_recover_plaintext() {
    let simulator = simulator();
    let plugin = plugin(&simulator, KEY_V1);

    let encrypted = plugin.encrypt("uid", b"secret payload").await.unwrap();
    let request = DecryptRequest {
        key_id: KEY_V2.into(),
        ciphertext: encrypted.ciphertext,
    };
    let plaintext = plugin.decrypt("uid", &request).await.unwrap();
    assert_ne!(plaintext, b"secret payload");

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn truncated_ciphertext() {
    let simulator = simulator();
    let plugin = plugin(&simulator, KEY_V1);

    let request = DecryptRequest {
        key_id: KEY_V1.into(),
        ciphertext: b"short".to_vec(),
    };
    let err = plugin.decrypt("uid", &request).await.unwrap_err();
    assert!(matches!(err, Error::UnexpectedStatus { .. }));

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_key_never_reaches_backend() {
    let simulator = simulator();
    let plugin = plugin(&simulator, "p1/kr1/k1");

    let err = plugin.encrypt("uid", b"foo").await.unwrap_err();
    assert!(matches!(err, Error::KeyFormat(_)));

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn escaped_key_round_trip() {
    let key = "my project/kr?/k#1/v1";
    let simulator =
        kms_simulator::spawn("127.0.0.1:0".parse().unwrap(), Keystore::new([key])).unwrap();
    let plugin = plugin(&simulator, key);

    let encrypted = plugin.encrypt("uid", b"foo").await.unwrap();
    assert_eq!(encrypted.key_id, key);
    let request = DecryptRequest {
        key_id: encrypted.key_id,
        ciphertext: encrypted.ciphertext,
    };
    assert_eq!(plugin.decrypt("uid", &request).await.unwrap(), b"foo");

    simulator.shutdown().await.unwrap();
}

#[rstest]
#[case("p1/../k1/v1")]
#[case("p1/kr1/./v1")]
#[tokio::test]
async fn dot_segments_never_reach_backend(#[case] key: &str) {
    let simulator = simulator();
    let plugin = plugin(&simulator, key);

    let err = plugin.encrypt("uid", b"foo").await.unwrap_err();
    assert!(matches!(err, Error::KeyFormat(k) if k == key));

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn empty_segments_reach_keystore() {
    let simulator = simulator();
    let plugin = plugin(&simulator, "p1//k1/v1");

    let err = plugin.encrypt("uid", b"foo").await.unwrap_err();
    match err {
        Error::KeyNotFound { key, .. } => assert_eq!(key, "p1//k1/v1"),
        other => panic!("unexpected error: {other}"),
    }

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn unsupported_route_is_not_key_not_found() {
    let simulator = simulator();
    let config = ClientConfig {
        endpoint: format!("{}/extra", simulator.url()),
        timeout: Some(Duration::from_secs(5)),
        service_account_token: None,
    };
    let plugin = KmsPlugin::from_config(&config, KEY_V1).unwrap();

    let err = plugin.encrypt("uid", b"foo").await.unwrap_err();
    match err {
        Error::UnexpectedStatus { status, .. } => {
            assert_eq!(status, reqwest::StatusCode::BAD_REQUEST)
        }
        other => panic!("unexpected error: {other}"),
    }

    simulator.shutdown().await.unwrap();
}

#[tokio::test]
async fn grpc_round_trip() {
    let simulator = simulator();
    let grpc = KmsGrpcService::new(Arc::new(plugin(&simulator, KEY_V1)));

    let status = grpc
        .status(Request::new(v2::StatusRequest {}))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(
        (status.version.as_str(), status.healthz.as_str(), status.key_id.as_str()),
        ("v2", "ok", KEY_V1)
    );

    let encrypted = grpc
        .encrypt(Request::new(v2::EncryptRequest {
            plaintext: b"foo".to_vec(),
            uid: "uid-1".into(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(encrypted.key_id, KEY_V1);

    let decrypted = grpc
        .decrypt(Request::new(v2::DecryptRequest {
            ciphertext: encrypted.ciphertext,
            uid: "uid-2".into(),
            key_id: encrypted.key_id,
            annotations: Default::default(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(decrypted.plaintext, b"foo");

    let status = grpc
        .decrypt(Request::new(v2::DecryptRequest {
            ciphertext: b"foo".to_vec(),
            uid: "uid-3".into(),
            key_id: "missing/key/id/v1".into(),
            annotations: Default::default(),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    let status = grpc
        .decrypt(Request::new(v2::DecryptRequest {
            ciphertext: b"foo".to_vec(),
            uid: "uid-4".into(),
            key_id: "not-a-key".into(),
            annotations: Default::default(),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    simulator.shutdown().await.unwrap();
}

#[derive(Clone)]
struct UnixConnector(PathBuf);

impl Service<Uri> for UnixConnector {
    type Response = TokioIo<UnixStream>;
    type Error = std::io::Error;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _uri: Uri) -> Self::Future {
        let path = self.0.clone();
        Box::pin(async move { Ok(TokioIo::new(UnixStream::connect(path).await?)) })
    }
}

async fn connect(socket: &Path) -> KeyManagementServiceClient<Channel> {
    for _ in 0..100 {
        if UnixStream::connect(socket).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let channel = Endpoint::from_static("http://[::]:50051")
        .connect_with_connector(UnixConnector(socket.to_path_buf()))
        .await
        .unwrap();
    KeyManagementServiceClient::new(channel)
}

#[tokio::test]
async fn grpc_over_unix_socket() {
    let simulator = simulator();
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("kmsplugin").join("socket.sock");

    let grpc = Arc::new(GrpcService::new(
        &format!("unix://{}", socket.display()),
        Duration::from_secs(5),
        plugin(&simulator, KEY_V1),
    ));
    let shutdown = grpc.shutdown_handle();
    let server = tokio::spawn({
        let grpc = grpc.clone();
        async move { grpc.serve().await }
    });

    let mut client = connect(&socket).await;

    let status = client
        .status(v2::StatusRequest {})
        .await
        .unwrap()
        .into_inner();
    assert_eq!(status.key_id, KEY_V1);

    let encrypted = client
        .encrypt(v2::EncryptRequest {
            plaintext: b"foo".to_vec(),
            uid: "uid-1".into(),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(!encrypted.ciphertext.is_empty());
    assert_eq!(encrypted.key_id, KEY_V1);

    let decrypted = client
        .decrypt(v2::DecryptRequest {
            ciphertext: encrypted.ciphertext.clone(),
            uid: "uid-2".into(),
            key_id: encrypted.key_id,
            annotations: Default::default(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(decrypted.plaintext, b"foo");

    let status = client
        .decrypt(v2::DecryptRequest {
            ciphertext: encrypted.ciphertext,
            uid: "uid-3".into(),
            key_id: "missing/key/id/v1".into(),
            annotations: Default::default(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
    drop(client);

    shutdown.shutdown();
    server.await.unwrap().unwrap();
    assert!(!socket.exists());

    simulator.shutdown().await.unwrap();
}
