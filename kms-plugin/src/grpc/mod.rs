// Copyright (c) 2026 The KMS Plugin Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! gRPC frontend of the plugin, served on a unix domain socket.

pub mod v2;

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use log::{debug, error, info, warn};
use tokio::{fs, net::UnixListener, sync::Notify};
use tonic::{transport::Server, Request, Response, Status};

use crate::{DecryptRequest, Error, KmsService, Result};
use v2::key_management_service_server::{KeyManagementService, KeyManagementServiceServer};

const UNIX_SCHEME: &str = "unix://";

/// Map a plugin error onto the gRPC status returned to the control plane.
pub fn to_status(e: &Error) -> Status {
    match e {
        Error::KeyFormat(_) => Status::invalid_argument(e.to_string()),
        Error::KeyNotFound { .. } => Status::not_found(e.to_string()),
        Error::Timeout(_) => Status::deadline_exceeded(e.to_string()),
        _ => Status::internal(e.to_string()),
    }
}

/// Adapts a [`KmsService`] to the generated `KeyManagementService` trait.
pub struct KmsGrpcService<S> {
    inner: Arc<S>,
}

impl<S> KmsGrpcService<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self { inner }
    }
}

#[tonic::async_trait]
impl<S: KmsService + 'static> KeyManagementService for KmsGrpcService<S> {
    async fn status(
        &self,
        _request: Request<v2::StatusRequest>,
    ) -> std::result::Result<Response<v2::StatusResponse>, Status> {
        debug!("[gRPC] Status");
        let status = self.inner.status().await.map_err(|e| {
            error!("[gRPC] Status failed: {e}");
            to_status(&e)
        })?;

        Ok(Response::new(v2::StatusResponse {
            version: status.version,
            healthz: status.healthz,
            key_id: status.key_id,
        }))
    }

    async fn decrypt(
        &self,
        request: Request<v2::DecryptRequest>,
    ) -> std::result::Result<Response<v2::DecryptResponse>, Status> {
        let request = request.into_inner();
        debug!("[gRPC] Decrypt, uid: {}", request.uid);

        let decrypt_request = DecryptRequest {
            key_id: request.key_id,
            ciphertext: request.ciphertext,
        };
        let plaintext = self
            .inner
            .decrypt(&request.uid, &decrypt_request)
            .await
            .map_err(|e| {
                error!("[gRPC] Decrypt failed, uid: {}: {e}", request.uid);
                to_status(&e)
            })?;

        Ok(Response::new(v2::DecryptResponse { plaintext }))
    }

    async fn encrypt(
        &self,
        request: Request<v2::EncryptRequest>,
    ) -> std::result::Result<Response<v2::EncryptResponse>, Status> {
        let request = request.into_inner();
        debug!("[gRPC] Encrypt, uid: {}", request.uid);

        let encrypted = self
            .inner
            .encrypt(&request.uid, &request.plaintext)
            .await
            .map_err(|e| {
                error!("[gRPC] Encrypt failed, uid: {}: {e}", request.uid);
                to_status(&e)
            })?;

        Ok(Response::new(v2::EncryptResponse {
            ciphertext: encrypted.ciphertext,
            key_id: encrypted.key_id,
            annotations: Default::default(),
        }))
    }
}

/// Stops a running [`GrpcService`]. Calling it before `serve` makes the
/// next `serve` return right after binding.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<Notify>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.notify_one();
    }
}

pub struct GrpcService<S> {
    socket: PathBuf,
    timeout: Duration,
    service: Arc<S>,
    shutdown: Arc<Notify>,
}

impl<S: KmsService + 'static> GrpcService<S> {
    /// `socket` is a filesystem path, optionally prefixed with `unix://`.
    pub fn new(socket: &str, timeout: Duration, service: S) -> Self {
        Self {
            socket: socket_path(socket),
            timeout,
            service: Arc::new(service),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Serve until [`ShutdownHandle::shutdown`] is called. The socket file is
    /// removed once the server stops.
    pub async fn serve(&self) -> Result<()> {
        let listener = self.bind().await?;
        info!("Listening on {}", self.socket.display());

        let incoming = Box::pin(futures::stream::unfold(listener, |listener| async move {
            let conn = listener.accept().await.map(|(stream, _)| stream);
            Some((conn, listener))
        }));

        let server = KeyManagementServiceServer::new(KmsGrpcService::new(self.service.clone()));
        let res = Server::builder()
            .timeout(self.timeout)
            .add_service(server)
            .serve_with_incoming_shutdown(incoming, self.shutdown.notified())
            .await;

        self.remove_socket().await;
        res?;
        info!("gRPC server stopped");
        Ok(())
    }

    async fn bind(&self) -> Result<UnixListener> {
        let socket_err = |source| Error::Socket {
            path: self.socket.display().to_string(),
            source,
        };

        if let Some(parent) = self.socket.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(socket_err)?;
            }
        }

        match fs::remove_file(&self.socket).await {
            Ok(()) => debug!("Removed stale socket {}", self.socket.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(socket_err(e)),
        }

        UnixListener::bind(&self.socket).map_err(socket_err)
    }

    async fn remove_socket(&self) {
        if let Err(e) = fs::remove_file(&self.socket).await {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove socket {}: {e}", self.socket.display());
            }
        }
    }
}

fn socket_path(socket: &str) -> PathBuf {
    PathBuf::from(socket.strip_prefix(UNIX_SCHEME).unwrap_or(socket))
}
