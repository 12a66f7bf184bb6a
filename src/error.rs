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

//! Error types shared across the hop graph, remote execution and hosts handling.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed or incomplete hop configuration.
///
/// Raised while loading and resolving a profile, always before any
/// connection attempt is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Field {0} cannot be empty.")]
    EmptyField(&'static str),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid hop definition{}: {message}", hop_suffix(.id))]
    Invalid { id: Option<String>, message: String },

    #[error("Error retrieving secret {name}: {message}")]
    Secret { name: String, message: String },
}

fn hop_suffix(id: &Option<String>) -> String {
    id.as_ref().map(|id| format!(" '{id}'")).unwrap_or_default()
}

impl ConfigError {
    pub fn invalid(id: Option<&str>, message: impl Into<String>) -> Self {
        Self::Invalid {
            id: id.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Failures of a one-shot remote session.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Authentication failed for {user}@{target}")]
    Auth { user: String, target: String },

    #[error("No valid connection to {target}. Did the parent tunnel start? {message}")]
    Connect { target: String, message: String },

    #[error("SSH channel error on {target}: {message}")]
    Channel { target: String, message: String },

    #[error("Timed out after {seconds}s: {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("No result found for: {command}")]
    EmptyResult { command: String },

    #[error("Error from {command}: {stderr}")]
    Command { command: String, stderr: String },
}

impl RemoteError {
    /// Transient failures are retried by the exec loop; everything else fails fast.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Channel { .. } | Self::Timeout { .. })
    }
}

/// Permission or I/O failure writing the hosts file.
#[derive(Debug, Error)]
#[error("Error writing hosts file {path}. Are you root or do you own the hosts file? Error: {source}")]
pub struct HostsFileError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_field_message() {
        let err = ConfigError::EmptyField("localbindport");
        assert_eq!(err.to_string(), "Field localbindport cannot be empty.");
    }

    #[test]
    fn test_invalid_message_with_and_without_id() {
        let with_id = ConfigError::invalid(Some("bastion"), "bad port");
        assert_eq!(with_id.to_string(), "Invalid hop definition 'bastion': bad port");

        let without = ConfigError::invalid(None, "bad port");
        assert_eq!(without.to_string(), "Invalid hop definition: bad port");
    }

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::Channel {
            target: "h:22".into(),
            message: "closed".into()
        }
        .is_transient());
        assert!(!RemoteError::Auth {
            user: "root".into(),
            target: "h:22".into()
        }
        .is_transient());
        assert!(!RemoteError::EmptyResult {
            command: "dig".into()
        }
        .is_transient());
    }
}
