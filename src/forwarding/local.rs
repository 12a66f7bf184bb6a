// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Local port forwarding for one hop.
//!
//! ```text
//! [Client] → [Local Listener] → [SSH Channel] → [Remote Target]
//!             ↑ TCP addr:port or socket path     ↑ host:port or socket path
//! ```
//!
//! Every accepted connection gets its own SSH channel on the hop's session
//! and is pumped by [`Tunnel::run`].

use super::tunnel::{Tunnel, TunnelStats};
use super::{ForwardingConfig, ForwardingStatus};
use crate::endpoint::Endpoint;
use crate::ssh::tokio_client::Client;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

#[cfg(unix)]
use std::path::PathBuf;
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// A bound local listener, TCP or Unix domain socket.
#[derive(Debug)]
pub enum LocalListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

/// A connection accepted by a [`LocalListener`].
pub enum AcceptedConnection {
    Tcp(TcpStream, SocketAddr),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl LocalListener {
    /// Bind `endpoint`. A stale socket file at a Unix path is removed first.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port))
                    .await
                    .with_context(|| format!("Failed to bind to {endpoint}"))?;
                Ok(Self::Tcp(listener))
            }
            #[cfg(unix)]
            Endpoint::UnixSocket { path } => {
                remove_stale_socket(path).await?;
                let listener = UnixListener::bind(path)
                    .with_context(|| format!("Failed to bind to {}", path.display()))?;
                Ok(Self::Unix {
                    listener,
                    path: path.clone(),
                })
            }
            #[cfg(not(unix))]
            Endpoint::UnixSocket { path } => Err(anyhow::anyhow!(
                "Unix socket {} is not supported on this platform",
                path.display()
            )),
        }
    }

    /// The address actually bound; differs from the request when port 0 was asked for.
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        match self {
            Self::Tcp(listener) => {
                let addr = listener
                    .local_addr()
                    .context("Failed to get local address")?;
                Ok(Endpoint::tcp(addr.ip().to_string(), addr.port()))
            }
            #[cfg(unix)]
            Self::Unix { path, .. } => Ok(Endpoint::UnixSocket { path: path.clone() }),
        }
    }

    pub async fn accept(&self) -> std::io::Result<AcceptedConnection> {
        match self {
            Self::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                let _ = stream.set_nodelay(true);
                Ok(AcceptedConnection::Tcp(stream, peer))
            }
            #[cfg(unix)]
            Self::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(AcceptedConnection::Unix(stream))
            }
        }
    }
}

#[cfg(unix)]
impl Drop for LocalListener {
    fn drop(&mut self) {
        if let Self::Unix { path, .. } = self {
            if let Err(e) = std::fs::remove_file(&*path) {
                trace!("Could not remove socket {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(unix)]
async fn remove_stale_socket(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::FileTypeExt;

    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.file_type().is_socket() => {
            debug!("Removing stale socket {}", path.display());
            tokio::fs::remove_file(path)
                .await
                .with_context(|| format!("Failed to remove stale socket {}", path.display()))
        }
        Ok(_) => Err(anyhow::anyhow!(
            "{} exists and is not a socket",
            path.display()
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to inspect {}", path.display())),
    }
}

/// Connection counters for one forwarder.
#[derive(Debug, Default)]
pub struct LocalForwarderStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub connections_failed: AtomicU64,
    pub total_bytes_transferred: AtomicU64,
}

/// Accept loop forwarding a local listener to one remote target.
#[derive(Debug)]
pub struct LocalForwarder {
    session_id: Uuid,
    remote: Endpoint,
    config: ForwardingConfig,
    ssh_client: Arc<Client>,
    cancel_token: CancellationToken,
    status_tx: watch::Sender<ForwardingStatus>,
    stats: Arc<LocalForwarderStats>,
}

impl LocalForwarder {
    pub fn new(
        ssh_client: Arc<Client>,
        remote: Endpoint,
        config: ForwardingConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        let (status_tx, _) = watch::channel(ForwardingStatus::Initializing);
        Self {
            session_id: Uuid::new_v4(),
            remote,
            config,
            ssh_client,
            cancel_token,
            status_tx,
            stats: Arc::new(LocalForwarderStats::default()),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Receiver tracking the forwarder's lifecycle.
    pub fn subscribe(&self) -> watch::Receiver<ForwardingStatus> {
        self.status_tx.subscribe()
    }

    pub fn stats(&self) -> Arc<LocalForwarderStats> {
        Arc::clone(&self.stats)
    }

    /// Serve `listener` until cancelled.
    pub async fn run(self, listener: LocalListener) -> Result<()> {
        let local = match listener.local_endpoint() {
            Ok(local) => local,
            Err(e) => {
                self.set_status(ForwardingStatus::Failed(e.to_string()));
                return Err(e);
            }
        };
        info!(
            session = %self.session_id,
            "Local forwarding listening on {} → {}", local, self.remote
        );
        self.set_status(ForwardingStatus::Active);

        let connection_semaphore = Arc::new(Semaphore::new(self.config.max_connections));

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok(conn) => {
                            self.stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
                            self.spawn_connection_handler(conn, Arc::clone(&connection_semaphore));
                        }
                        Err(e) => {
                            error!("Failed to accept connection on {}: {}", local, e);
                            self.stats.connections_failed.fetch_add(1, Ordering::Relaxed);
                            sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
                _ = self.cancel_token.cancelled() => {
                    debug!("Local forwarding on {} cancelled, stopping listener", local);
                    break;
                }
            }
        }

        self.set_status(ForwardingStatus::Stopped);
        Ok(())
    }

    fn set_status(&self, status: ForwardingStatus) {
        self.status_tx.send_replace(status);
    }

    fn spawn_connection_handler(&self, conn: AcceptedConnection, semaphore: Arc<Semaphore>) {
        let remote = self.remote.clone();
        let ssh_client = Arc::clone(&self.ssh_client);
        let stats = Arc::clone(&self.stats);
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Failed to acquire connection permit");
                    return;
                }
            };

            stats.active_connections.fetch_add(1, Ordering::Relaxed);
            let (peer, result) = match conn {
                AcceptedConnection::Tcp(stream, peer_addr) => (
                    peer_addr.to_string(),
                    Self::handle_connection(
                        stream,
                        Some(peer_addr),
                        &remote,
                        &ssh_client,
                        cancel_token,
                    )
                    .await,
                ),
                #[cfg(unix)]
                AcceptedConnection::Unix(stream) => (
                    "unix socket peer".to_string(),
                    Self::handle_connection(stream, None, &remote, &ssh_client, cancel_token)
                        .await,
                ),
            };
            stats.active_connections.fetch_sub(1, Ordering::Relaxed);

            match result {
                Ok(tunnel_stats) => {
                    debug!(
                        "Connection from {} completed: {} bytes transferred",
                        peer,
                        tunnel_stats.total_bytes()
                    );
                    stats
                        .total_bytes_transferred
                        .fetch_add(tunnel_stats.total_bytes(), Ordering::Relaxed);
                }
                Err(e) => {
                    error!("Connection from {} failed: {:#}", peer, e);
                    stats.connections_failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
    }

    async fn handle_connection<S>(
        stream: S,
        originator: Option<SocketAddr>,
        remote: &Endpoint,
        ssh_client: &Client,
        cancel_token: CancellationToken,
    ) -> Result<TunnelStats>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug!("Creating SSH channel to {}", remote);
        let ssh_channel = ssh_client
            .open_forward_channel(remote, originator)
            .await
            .with_context(|| format!("Failed to create SSH channel to {remote}"))?;

        Tunnel::run(stream, ssh_channel, cancel_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_tcp_reports_actual_port() {
        let listener = LocalListener::bind(&Endpoint::tcp("127.0.0.1", 0))
            .await
            .unwrap();
        let local = listener.local_endpoint().unwrap();
        assert_eq!(local.host(), Some("127.0.0.1"));
        assert_ne!(local.port(), Some(0));
    }

    #[tokio::test]
    async fn test_bind_tcp_port_in_use_fails() {
        let first = LocalListener::bind(&Endpoint::tcp("127.0.0.1", 0))
            .await
            .unwrap();
        let taken = first.local_endpoint().unwrap();
        let err = LocalListener::bind(&taken).await.unwrap_err();
        assert!(err.to_string().contains("Failed to bind"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_socket_replaced_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hop.sock");
        let endpoint = Endpoint::UnixSocket { path: path.clone() };

        // Leave a stale socket behind.
        let stale = std::os::unix::net::UnixListener::bind(&path).unwrap();
        drop(stale);
        assert!(path.exists());

        let listener = LocalListener::bind(&endpoint).await.unwrap();
        assert!(path.exists());
        drop(listener);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_path_that_is_a_regular_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-socket");
        std::fs::write(&path, b"data").unwrap();

        let err = LocalListener::bind(&Endpoint::UnixSocket { path: path.clone() })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is not a socket"));
        assert!(path.exists());
    }

    #[test]
    fn test_local_forwarder_stats() {
        let stats = LocalForwarderStats::default();
        stats.connections_accepted.store(10, Ordering::Relaxed);
        stats.connections_failed.store(2, Ordering::Relaxed);
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 10);
        assert_eq!(stats.connections_failed.load(Ordering::Relaxed), 2);
    }
}
