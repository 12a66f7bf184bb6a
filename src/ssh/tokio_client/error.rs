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

use std::io;
use thiserror::Error;

/// Errors raised by the SSH client layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Invalid address was provided: {0}")]
    AddressInvalid(io::Error),

    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start proxy command '{command}': {source}")]
    ProxyCommand {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Timed out after {seconds}s while {stage}")]
    Timeout { stage: &'static str, seconds: u64 },

    #[error("The server host key was rejected")]
    ServerCheckFailed,

    #[error("Unable to load the private key: {0}")]
    KeyInvalid(russh::keys::Error),

    #[error("Password authentication failed")]
    PasswordWrong,

    #[error("Public key authentication failed")]
    KeyAuthFailed,

    #[error("Unable to connect to the SSH agent")]
    AgentConnectionFailed,

    #[error("The SSH agent has no identities")]
    AgentNoIdentities,

    #[error("SSH agent authentication failed")]
    AgentAuthenticationFailed,

    #[error("The executed command did not report an exit status")]
    CommandDidntExit,

    #[error("SSH error: {0}")]
    SshError(#[from] russh::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl Error {
    /// True when the server rejected our credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::PasswordWrong
                | Self::KeyAuthFailed
                | Self::KeyInvalid(_)
                | Self::AgentConnectionFailed
                | Self::AgentNoIdentities
                | Self::AgentAuthenticationFailed
        )
    }
}
