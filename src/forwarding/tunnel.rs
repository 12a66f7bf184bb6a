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

//! Bidirectional data pump between a local stream and an SSH channel.
//!
//! The local side is any `AsyncRead + AsyncWrite` stream, so the same loop
//! serves accepted TCP connections and Unix socket connections.

use anyhow::Result;
use russh::Channel;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// Read buffer size for the local side.
pub const TUNNEL_BUFFER_SIZE: usize = 32 * 1024;

/// Statistics for a tunnel session
#[derive(Debug, Clone)]
pub struct TunnelStats {
    /// Bytes transferred from local to remote
    pub bytes_local_to_remote: Arc<AtomicU64>,
    /// Bytes transferred from remote to local
    pub bytes_remote_to_local: Arc<AtomicU64>,
    /// Start time of the tunnel
    pub started_at: Instant,
}

impl Default for TunnelStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelStats {
    pub fn new() -> Self {
        Self {
            bytes_local_to_remote: Arc::new(AtomicU64::new(0)),
            bytes_remote_to_local: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    /// Get total bytes transferred in both directions
    pub fn total_bytes(&self) -> u64 {
        self.bytes_local_to_remote.load(Ordering::Relaxed)
            + self.bytes_remote_to_local.load(Ordering::Relaxed)
    }

    pub fn duration(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

/// Pumps one accepted connection through one SSH channel.
pub struct Tunnel;

impl Tunnel {
    /// Copy data both ways until either side closes or `cancel_token` fires.
    pub async fn run<S>(
        mut stream: S,
        mut ssh_channel: Channel<russh::client::Msg>,
        cancel_token: CancellationToken,
    ) -> Result<TunnelStats>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let stats = TunnelStats::new();
        let mut buffer = vec![0u8; TUNNEL_BUFFER_SIZE];

        debug!("Starting bidirectional tunnel");

        loop {
            tokio::select! {
                result = stream.read(&mut buffer) => {
                    match result {
                        Ok(0) => {
                            trace!("Local stream closed, ending tunnel");
                            break;
                        }
                        Ok(n) => {
                            if let Err(e) = ssh_channel.data(&buffer[..n]).await {
                                error!("Failed to write to SSH channel: {}", e);
                                return Err(anyhow::anyhow!("SSH channel write error: {}", e));
                            }
                            stats.bytes_local_to_remote.fetch_add(n as u64, Ordering::Relaxed);
                        }
                        Err(e) if matches!(e.kind(), ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset) => {
                            trace!("Local connection closed: {}", e);
                            break;
                        }
                        Err(e) => {
                            error!("Local read error: {}", e);
                            return Err(anyhow::anyhow!("Local read error: {}", e));
                        }
                    }
                }
                msg = ssh_channel.wait() => {
                    match msg {
                        Some(russh::ChannelMsg::Data { data }) => {
                            match stream.write_all(&data).await {
                                Ok(()) => {
                                    stats.bytes_remote_to_local.fetch_add(data.len() as u64, Ordering::Relaxed);
                                }
                                Err(e) if matches!(e.kind(), ErrorKind::BrokenPipe | ErrorKind::ConnectionAborted) => {
                                    trace!("Local connection closed: {}", e);
                                    break;
                                }
                                Err(e) => {
                                    error!("Local write error: {}", e);
                                    return Err(anyhow::anyhow!("Local write error: {}", e));
                                }
                            }
                        }
                        Some(russh::ChannelMsg::Eof) | Some(russh::ChannelMsg::Close) | None => {
                            trace!("SSH channel finished");
                            break;
                        }
                        Some(other) => {
                            trace!("Ignoring SSH channel message: {:?}", other);
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    trace!("Tunnel cancelled");
                    break;
                }
            }
        }

        if let Err(e) = ssh_channel.eof().await {
            warn!("Failed to send EOF to SSH channel: {}", e);
        }
        if let Err(e) = ssh_channel.close().await {
            trace!("Failed to close SSH channel: {}", e);
        }
        let _ = stream.shutdown().await;

        debug!(
            "Tunnel completed: {} bytes L→R, {} bytes R→L, duration: {:?}",
            stats.bytes_local_to_remote.load(Ordering::Relaxed),
            stats.bytes_remote_to_local.load(Ordering::Relaxed),
            stats.duration()
        );

        Ok(stats)
    }
}
