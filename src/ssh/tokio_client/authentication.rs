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

//! SSH authentication methods and server verification.

use russh::client::{Handle, Handler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::config::{expand_tilde, HopSpec};

/// Credentials used to log into a bastion.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthMethod {
    Password(Zeroizing<String>),
    PrivateKeyFile {
        key_file_path: PathBuf,
        key_pass: Option<Zeroizing<String>>,
    },
    #[cfg(not(target_os = "windows"))]
    Agent,
}

impl AuthMethod {
    pub fn with_password(password: &str) -> Self {
        Self::Password(Zeroizing::new(password.to_string()))
    }

    pub fn with_key_file<T: AsRef<Path>>(key_file_path: T, passphrase: Option<&str>) -> Self {
        Self::PrivateKeyFile {
            key_file_path: key_file_path.as_ref().to_path_buf(),
            key_pass: passphrase.map(|p| Zeroizing::new(p.to_string())),
        }
    }

    #[cfg(not(target_os = "windows"))]
    pub fn with_agent() -> Self {
        Self::Agent
    }

    /// Pick the method for a hop. A key file wins over a password; with
    /// neither, the SSH agent is used.
    pub fn for_hop(hop: &HopSpec) -> Self {
        Self::from_parts(hop.sshkeyfile.as_deref(), hop.sshpass.as_deref())
    }

    pub fn from_parts(key_file: Option<&str>, password: Option<&str>) -> Self {
        if let Some(key_file) = key_file {
            tracing::debug!("sshkeyfile present, using it instead of password");
            return Self::with_key_file(expand_tilde(Path::new(key_file)), None);
        }
        match password {
            Some(password) => Self::with_password(password),
            #[cfg(not(target_os = "windows"))]
            None => Self::with_agent(),
            #[cfg(target_os = "windows")]
            None => Self::with_password(""),
        }
    }
}

/// Server host key verification methods.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ServerCheckMethod {
    /// Accept any host key.
    NoCheck,
    /// Use `~/.ssh/known_hosts`.
    DefaultKnownHostsFile,
    /// Use a specific known_hosts file.
    KnownHostsFile(String),
}

/// Authenticate `handle` as `username` with `auth`.
pub(super) async fn authenticate<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    auth: AuthMethod,
) -> Result<(), super::Error> {
    match auth {
        AuthMethod::Password(password) => {
            let result = handle.authenticate_password(username, &**password).await?;
            if !result.success() {
                return Err(super::Error::PasswordWrong);
            }
        }
        AuthMethod::PrivateKeyFile {
            key_file_path,
            key_pass,
        } => {
            let key = russh::keys::load_secret_key(&key_file_path, key_pass.as_ref().map(|p| &***p))
                .map_err(super::Error::KeyInvalid)?;
            let result = handle
                .authenticate_publickey(
                    username,
                    russh::keys::PrivateKeyWithHashAlg::new(
                        Arc::new(key),
                        handle.best_supported_rsa_hash().await?.flatten(),
                    ),
                )
                .await?;
            if !result.success() {
                return Err(super::Error::KeyAuthFailed);
            }
        }
        #[cfg(not(target_os = "windows"))]
        AuthMethod::Agent => {
            let mut agent = russh::keys::agent::client::AgentClient::connect_env()
                .await
                .map_err(|_| super::Error::AgentConnectionFailed)?;
            let identities = agent
                .request_identities()
                .await
                .map_err(|_| super::Error::AgentConnectionFailed)?;
            if identities.is_empty() {
                return Err(super::Error::AgentNoIdentities);
            }

            let mut authenticated = false;
            for identity in identities {
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                if let Ok(result) = handle
                    .authenticate_publickey_with(username, identity, hash_alg, &mut agent)
                    .await
                {
                    if result.success() {
                        authenticated = true;
                        break;
                    }
                }
            }
            if !authenticated {
                return Err(super::Error::AgentAuthenticationFailed);
            }
        }
    }
    Ok(())
}
