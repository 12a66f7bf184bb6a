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

//! SSH connection establishment.
//!
//! A session can run over a TCP socket, a Unix domain socket or the stdio of
//! a `ProxyCommand`. The transport is established under the connect timeout,
//! then the banner exchange, key exchange and authentication run under the
//! handshake timeout.

use russh::client::{Config, Handle, Handler};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use super::authentication::{AuthMethod, ServerCheckMethod};
use super::transport::ProxyCommandStream;
use crate::endpoint::Endpoint;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounds on session establishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectTimeouts {
    /// Opening the transport (TCP/Unix connect, proxy spawn).
    pub connect: Duration,
    /// Banner, key exchange and authentication.
    pub handshake: Duration,
}

impl Default for ConnectTimeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            handshake: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// Everything needed to open one authenticated session.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub target: Endpoint,
    pub username: String,
    pub auth: AuthMethod,
    pub proxy_command: Option<String>,
    pub server_check: ServerCheckMethod,
    pub timeouts: ConnectTimeouts,
}

impl ConnectOptions {
    pub fn new(target: Endpoint, username: impl Into<String>, auth: AuthMethod) -> Self {
        Self {
            target,
            username: username.into(),
            auth,
            proxy_command: None,
            server_check: ServerCheckMethod::NoCheck,
            timeouts: ConnectTimeouts::default(),
        }
    }

    pub fn with_proxy_command(mut self, proxy_command: Option<String>) -> Self {
        self.proxy_command = proxy_command;
        self
    }

    pub fn with_server_check(mut self, server_check: ServerCheckMethod) -> Self {
        self.server_check = server_check;
        self
    }

    pub fn with_timeouts(mut self, timeouts: ConnectTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// An authenticated SSH session.
#[derive(Clone)]
pub struct Client {
    pub(super) connection_handle: Arc<Handle<ClientHandler>>,
    pub(super) username: String,
    pub(super) target: Endpoint,
}

impl Client {
    /// Open a session using default timeouts and no proxy.
    pub async fn connect(
        target: Endpoint,
        username: &str,
        auth: AuthMethod,
        server_check: ServerCheckMethod,
    ) -> Result<Self, super::Error> {
        Self::connect_with_options(
            ConnectOptions::new(target, username, auth).with_server_check(server_check),
        )
        .await
    }

    pub async fn connect_with_options(options: ConnectOptions) -> Result<Self, super::Error> {
        Self::connect_with_config(options, Config::default()).await
    }

    /// Same as [`Client::connect_with_options`] with a non default russh config.
    pub async fn connect_with_config(
        options: ConnectOptions,
        config: Config,
    ) -> Result<Self, super::Error> {
        let config = Arc::new(config);
        let (hostname, port) = match &options.target {
            Endpoint::Tcp { host, port } => (host.clone(), *port),
            Endpoint::UnixSocket { path } => (path.display().to_string(), 0),
        };
        let handler = ClientHandler::new(hostname.clone(), port, options.server_check.clone());
        let timeouts = options.timeouts;

        let mut handle = if let Some(proxy) = options.proxy_command.as_deref() {
            let stream = ProxyCommandStream::spawn(proxy, &hostname, port, &options.username)?;
            handshake(config, stream, handler, timeouts.handshake).await?
        } else {
            match &options.target {
                Endpoint::Tcp { host, port } => {
                    let target = format!("{host}:{port}");
                    let stream = with_timeout(
                        timeouts.connect,
                        "connecting",
                        TcpStream::connect((host.as_str(), *port)),
                    )
                    .await?
                    .map_err(|source| super::Error::Connect {
                        target: target.clone(),
                        source,
                    })?;
                    stream.set_nodelay(true)?;
                    handshake(config, stream, handler, timeouts.handshake).await?
                }
                #[cfg(unix)]
                Endpoint::UnixSocket { path } => {
                    let stream = with_timeout(
                        timeouts.connect,
                        "connecting",
                        tokio::net::UnixStream::connect(path),
                    )
                    .await?
                    .map_err(|source| super::Error::Connect {
                        target: path.display().to_string(),
                        source,
                    })?;
                    handshake(config, stream, handler, timeouts.handshake).await?
                }
                #[cfg(not(unix))]
                Endpoint::UnixSocket { path } => {
                    return Err(super::Error::Connect {
                        target: path.display().to_string(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::Unsupported,
                            "unix sockets are not supported on this platform",
                        ),
                    });
                }
            }
        };

        with_timeout(
            timeouts.handshake,
            "authenticating",
            super::authentication::authenticate(&mut handle, &options.username, options.auth),
        )
        .await??;

        Ok(Self {
            connection_handle: Arc::new(handle),
            username: options.username,
            target: options.target,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    /// Disconnect from the remote host.
    pub async fn disconnect(&self) -> Result<(), super::Error> {
        self.connection_handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .map_err(super::Error::SshError)
    }

    /// Check if the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.connection_handle.is_closed()
    }
}

impl Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("target", &self.target)
            .field("connection_handle", &"Handle<ClientHandler>")
            .finish()
    }
}

async fn handshake<S>(
    config: Arc<Config>,
    stream: S,
    handler: ClientHandler,
    limit: Duration,
) -> Result<Handle<ClientHandler>, super::Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    with_timeout(
        limit,
        "waiting for the SSH banner",
        russh::client::connect_stream(config, stream, handler),
    )
    .await?
}

async fn with_timeout<F: Future>(
    limit: Duration,
    stage: &'static str,
    fut: F,
) -> Result<F::Output, super::Error> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| super::Error::Timeout {
            stage,
            seconds: limit.as_secs(),
        })
}

/// Verifies the server host key.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    port: u16,
    server_check: ServerCheckMethod,
}

impl ClientHandler {
    pub fn new(hostname: String, port: u16, server_check: ServerCheckMethod) -> Self {
        Self {
            hostname,
            port,
            server_check,
        }
    }
}

impl Handler for ClientHandler {
    type Error = super::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.server_check {
            ServerCheckMethod::NoCheck => Ok(true),
            ServerCheckMethod::DefaultKnownHostsFile => {
                russh::keys::check_known_hosts(&self.hostname, self.port, server_public_key)
                    .map_err(|_| super::Error::ServerCheckFailed)
            }
            ServerCheckMethod::KnownHostsFile(path) => russh::keys::check_known_hosts_path(
                &self.hostname,
                self.port,
                server_public_key,
                path,
            )
            .map_err(|_| super::Error::ServerCheckFailed),
        }
    }
}
