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

//! One-shot remote command execution over a fresh SSH session.
//!
//! Used for host lookups through a hop and for the `command` subcommand.
//! Connection and authentication failures are returned immediately; only the
//! exec step is retried, and only for channel errors and timeouts.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::HopSpec;
use crate::endpoint::Endpoint;
use crate::error::RemoteError;
use crate::ssh::tokio_client::{
    AuthMethod, Client, ConnectOptions, ConnectTimeouts, ServerCheckMethod,
};
use crate::tunnel::RetryPolicy;

/// User for command sessions when the hop names none.
pub const DEFAULT_REMOTE_USER: &str = "root";

/// Per-attempt bound on a single exec.
pub const EXEC_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs a command somewhere and returns its trimmed stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<String, RemoteError>;
}

/// Everything a finished remote command produced, trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: u32,
}

impl CommandOutput {
    /// Strict interpretation: any stderr is an error, and so is empty stdout.
    pub fn into_result(self, command: &str) -> Result<String, RemoteError> {
        if !self.stderr.is_empty() {
            return Err(RemoteError::Command {
                command: command.to_string(),
                stderr: self.stderr,
            });
        }
        if self.stdout.is_empty() {
            return Err(RemoteError::EmptyResult {
                command: command.to_string(),
            });
        }
        Ok(self.stdout)
    }
}

#[derive(Debug, Clone)]
pub struct RemoteCommandRunner {
    target: Endpoint,
    user: String,
    auth: AuthMethod,
    proxy_command: Option<String>,
    server_check: ServerCheckMethod,
    timeouts: ConnectTimeouts,
    exec_timeout: Duration,
    retry: RetryPolicy,
}

impl RemoteCommandRunner {
    pub fn new(target: Endpoint, user: Option<&str>, auth: AuthMethod) -> Self {
        Self {
            target,
            user: user.unwrap_or(DEFAULT_REMOTE_USER).to_string(),
            auth,
            proxy_command: None,
            server_check: ServerCheckMethod::NoCheck,
            timeouts: ConnectTimeouts::default(),
            exec_timeout: EXEC_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Runner logging into `hop` with its own credentials, dialed at `target`.
    pub fn for_hop(hop: &HopSpec, target: Endpoint) -> Self {
        Self::new(target, hop.sshuser.as_deref(), AuthMethod::for_hop(hop))
    }

    pub fn with_proxy_command(mut self, proxy_command: Option<String>) -> Self {
        self.proxy_command = proxy_command;
        self
    }

    pub fn with_server_check(mut self, server_check: ServerCheckMethod) -> Self {
        self.server_check = server_check;
        self
    }

    pub fn with_timeouts(mut self, timeouts: ConnectTimeouts, exec_timeout: Duration) -> Self {
        self.timeouts = timeouts;
        self.exec_timeout = exec_timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    async fn connect(&self) -> Result<Client, RemoteError> {
        let options = ConnectOptions::new(self.target.clone(), &self.user, self.auth.clone())
            .with_proxy_command(self.proxy_command.clone())
            .with_server_check(self.server_check.clone())
            .with_timeouts(self.timeouts);

        let client = Client::connect_with_options(options)
            .await
            .map_err(|e| {
                if e.is_auth_failure() {
                    RemoteError::Auth {
                        user: self.user.clone(),
                        target: self.target.to_string(),
                    }
                } else {
                    RemoteError::Connect {
                        target: self.target.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;
        debug!("Connected to {} as {}", self.target, self.user);
        Ok(client)
    }

    /// Run `command` and return whatever it produced, exit status included.
    pub async fn execute(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let client = self.connect().await?;
        let result = self.execute_with_retry(&client, command).await;
        if let Err(e) = client.disconnect().await {
            debug!("Disconnect from {} failed: {}", self.target, e);
        }
        result
    }

    async fn execute_with_retry(
        &self,
        client: &Client,
        command: &str,
    ) -> Result<CommandOutput, RemoteError> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.exec_timeout, client.execute(command))
                .await
            {
                Ok(Ok(result)) => {
                    return Ok(CommandOutput {
                        stdout: result.stdout.trim().to_string(),
                        stderr: result.stderr.trim().to_string(),
                        exit_status: result.exit_status,
                    })
                }
                Ok(Err(e)) => RemoteError::Channel {
                    target: self.target.to_string(),
                    message: e.to_string(),
                },
                Err(_) => RemoteError::Timeout {
                    what: format!("running '{command}' on {}", self.target),
                    seconds: self.exec_timeout.as_secs(),
                },
            };

            if !outcome.is_transient() || attempt >= attempts || client.is_closed() {
                return Err(outcome);
            }
            warn!(
                "Attempt {} of {} to run '{}' on {} failed: {}",
                attempt, attempts, command, self.target, outcome
            );
            tokio::time::sleep(self.retry.backoff).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl CommandRunner for RemoteCommandRunner {
    async fn run(&self, command: &str) -> Result<String, RemoteError> {
        self.execute(command).await?.into_result(command)
    }
}
