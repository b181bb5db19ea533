// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::{AddrIncoming, AddrStream};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use log::{debug, info, warn};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{Error, Keystore, Result};

/// First path segment of every KMS API route.
pub const API_ROOT: &str = "v1alpha";

const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Deserialize)]
struct DataRequest {
    data: String,
}

#[derive(Serialize)]
struct DataResponse {
    data: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Operation {
    Encrypt,
    Decrypt,
}

/// Key coordinates taken from a request path.
#[derive(Debug, PartialEq)]
struct KeyPath<'a> {
    project: &'a str,
    keyring: &'a str,
    key: &'a str,
    version: &'a str,
}

impl KeyPath<'_> {
    /// The keystore label for this key, `{project}/{keyring}/{key}/{version}`,
    /// built from the percent-decoded segments.
    fn label(&self) -> Result<String> {
        let segments = [self.project, self.keyring, self.key, self.version]
            .into_iter()
            .map(|segment| {
                percent_decode_str(segment)
                    .decode_utf8()
                    .map_err(|e| Error::InvalidPath(format!("{segment}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(segments.join("/"))
    }
}

/// Match `/v1alpha/projects/{p}/keyrings/{r}/keys/{k}/versions/{v}/{encrypt|decrypt}`.
/// Key segments may be empty.
fn parse_route(path: &str) -> Option<(KeyPath<'_>, Operation)> {
    let segments: Vec<&str> = path.strip_prefix('/')?.split('/').collect();
    let &[API_ROOT, "projects", project, "keyrings", keyring, "keys", key, "versions", version, op] =
        segments.as_slice()
    else {
        return None;
    };

    let operation = match op {
        "encrypt" => Operation::Encrypt,
        "decrypt" => Operation::Decrypt,
        _ => return None,
    };

    Some((
        KeyPath {
            project,
            keyring,
            key,
            version,
        },
        operation,
    ))
}

/// Request handler for the KMS API, backed by a [`Keystore`].
pub struct KmsHandler {
    keystore: Arc<Keystore>,
}

impl KmsHandler {
    pub fn new(keystore: Arc<Keystore>) -> Self {
        Self { keystore }
    }

    fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Body>) -> Response<Body> {
        let mut response = Response::new(body.into());
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
    }

    fn error_response(status: StatusCode, message: String) -> Response<Body> {
        Self::respond(status, "text/plain; charset=utf-8", message)
    }

    fn keystore_error(err: Error) -> Response<Body> {
        let status = match err {
            Error::KeyNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!("request failed with {status}: {err}");
        Self::error_response(status, err.to_string())
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let path = req.uri().path().to_string();
        // 404 is reserved for missing keys.
        let Some((key_path, operation)) = parse_route(&path) else {
            return Self::error_response(
                StatusCode::BAD_REQUEST,
                format!("unsupported route: {path}"),
            );
        };

        if req.method() != Method::POST {
            return Self::error_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "Method Not Allowed".into(),
            );
        }

        let label = match key_path.label() {
            Ok(label) => label,
            Err(e) => return Self::keystore_error(e),
        };
        debug!("{operation:?} request for key {label}");

        let body = match hyper::body::to_bytes(req.into_body()).await {
            Ok(body) => body,
            Err(e) => return Self::keystore_error(Error::InvalidBody(e.to_string())),
        };

        match self.process(&label, operation, &body) {
            Ok(data) => {
                let response = DataResponse {
                    data: BASE64.encode(data),
                };
                match serde_json::to_vec(&response) {
                    Ok(json) => Self::respond(StatusCode::OK, "application/json", json),
                    Err(e) => Self::keystore_error(Error::InvalidBody(e.to_string())),
                }
            }
            Err(e) => Self::keystore_error(e),
        }
    }

    fn process(&self, label: &str, operation: Operation, body: &[u8]) -> Result<Vec<u8>> {
        let request: DataRequest = serde_json::from_slice(body)
            .map_err(|e| Error::InvalidBody(format!("parse request JSON failed: {e}")))?;
        let data = BASE64
            .decode(request.data)
            .map_err(|e| Error::InvalidBody(format!("decode base64 data failed: {e}")))?;

        match operation {
            Operation::Encrypt => self.keystore.encrypt(label, &data),
            Operation::Decrypt => self.keystore.decrypt(label, &data),
        }
    }
}

/// A simulator server running on a background task.
pub struct SimulatorHandle {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::result::Result<(), hyper::Error>>,
}

impl SimulatorHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL to configure a KMS client with.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.task
            .await
            .map_err(|e| Error::Task(e.to_string()))?
            .map_err(Error::from)
    }
}

/// Bind the simulator to `addr` and serve it on a background task. Binding to
/// port 0 picks a free port, see [`SimulatorHandle::local_addr`].
pub fn spawn(addr: SocketAddr, keystore: Keystore) -> Result<SimulatorHandle> {
    let incoming = AddrIncoming::bind(&addr)?;
    let addr = incoming.local_addr();
    let (shutdown, rx) = oneshot::channel::<()>();
    info!("KMS simulator listening on http://{addr}");

    let task = tokio::spawn(run(incoming, keystore, async move {
        let _ = rx.await;
    }));

    Ok(SimulatorHandle {
        addr,
        shutdown,
        task,
    })
}

/// Serve the simulator on `addr` until `signal` completes.
pub async fn serve_with_shutdown<F>(addr: SocketAddr, keystore: Keystore, signal: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let incoming = AddrIncoming::bind(&addr)?;
    info!("KMS simulator listening on http://{}", incoming.local_addr());
    run(incoming, keystore, signal).await?;
    Ok(())
}

async fn run<F>(
    incoming: AddrIncoming,
    keystore: Keystore,
    signal: F,
) -> std::result::Result<(), hyper::Error>
where
    F: Future<Output = ()>,
{
    let handler = Arc::new(KmsHandler::new(Arc::new(keystore)));
    let make_service = make_service_fn(move |_conn: &AddrStream| {
        let handler = handler.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(handler.handle(req).await) }
            }))
        }
    });

    Server::builder(incoming)
        .serve(make_service)
        .with_graceful_shutdown(signal)
        .await
}
