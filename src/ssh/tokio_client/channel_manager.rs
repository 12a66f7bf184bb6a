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

//! SSH channel operations: command execution and forwarding channels.

use russh::client::Msg;
use russh::Channel;
use std::net::SocketAddr;
use std::path::Path;

use super::connection::Client;
use crate::endpoint::Endpoint;

/// Initial capacity for command stdout.
const SSH_CMD_BUFFER_SIZE: usize = 8192;

/// Initial capacity for command stderr.
const SSH_RESPONSE_BUFFER_SIZE: usize = 1024;

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandExecutedResult {
    /// The stdout output of the command.
    pub stdout: String,
    /// The stderr output of the command.
    pub stderr: String,
    /// The unix exit status (`$?` in bash).
    pub exit_status: u32,
}

impl Client {
    /// Get a new session channel.
    pub async fn get_channel(&self) -> Result<Channel<Msg>, super::Error> {
        self.connection_handle
            .channel_open_session()
            .await
            .map_err(super::Error::SshError)
    }

    /// Open a `direct-tcpip` channel to `host:port`.
    ///
    /// The host name is handed to the server unresolved so names that only
    /// exist on the far side of the bastion still work.
    pub async fn open_direct_tcpip(
        &self,
        host: &str,
        port: u16,
        originator: Option<SocketAddr>,
    ) -> Result<Channel<Msg>, super::Error> {
        let (orig_host, orig_port) = originator
            .map(|src| (src.ip().to_string(), u32::from(src.port())))
            .unwrap_or_else(|| ("127.0.0.1".to_string(), 0));

        self.connection_handle
            .channel_open_direct_tcpip(host, u32::from(port), orig_host, orig_port)
            .await
            .map_err(super::Error::SshError)
    }

    /// Open a `direct-streamlocal@openssh.com` channel to a remote Unix socket.
    pub async fn open_direct_streamlocal(
        &self,
        socket_path: &Path,
    ) -> Result<Channel<Msg>, super::Error> {
        self.connection_handle
            .channel_open_direct_streamlocal(socket_path.to_string_lossy())
            .await
            .map_err(super::Error::SshError)
    }

    /// Open the forwarding channel matching the kind of `target`.
    pub async fn open_forward_channel(
        &self,
        target: &Endpoint,
        originator: Option<SocketAddr>,
    ) -> Result<Channel<Msg>, super::Error> {
        match target {
            Endpoint::Tcp { host, port } => self.open_direct_tcpip(host, *port, originator).await,
            Endpoint::UnixSocket { path } => self.open_direct_streamlocal(path).await,
        }
    }

    /// Execute a remote command via the ssh connection.
    ///
    /// Returns stdout, stderr and the exit code of the command.
    /// Every invocation is a new shell context.
    pub async fn execute(&self, command: &str) -> Result<CommandExecutedResult, super::Error> {
        let mut stdout_buffer = Vec::with_capacity(SSH_CMD_BUFFER_SIZE);
        let mut stderr_buffer = Vec::with_capacity(SSH_RESPONSE_BUFFER_SIZE);
        let mut channel = self.connection_handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut result: Option<u32> = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                russh::ChannelMsg::Data { ref data } => stdout_buffer.extend_from_slice(data),
                russh::ChannelMsg::ExtendedData { ref data, ext } => {
                    if ext == 1 {
                        stderr_buffer.extend_from_slice(data);
                    }
                }
                // The exit status may arrive before the last data packet.
                russh::ChannelMsg::ExitStatus { exit_status } => result = Some(exit_status),
                _ => {}
            }
        }

        match result {
            Some(exit_status) => Ok(CommandExecutedResult {
                stdout: String::from_utf8_lossy(&stdout_buffer).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_buffer).into_owned(),
                exit_status,
            }),
            None => Err(super::Error::CommandDidntExit),
        }
    }
}
