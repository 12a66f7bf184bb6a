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

//! Hop resolution: ssh-config defaults, vault secrets and validation.

use futures::future::BoxFuture;
use std::sync::Arc;

use super::secrets::{LastPass, SecretSource};
use super::types::{HopSet, HopSpec, DEFAULT_SSH_PORT};
use crate::error::ConfigError;
use crate::ssh::SshConfig;

/// Turns parsed hop definitions into fully resolved, validated ones.
///
/// Every node is resolved independently and a new tree is returned; the
/// input is left untouched.
#[derive(Clone)]
pub struct HopResolver {
    ssh_config: Arc<SshConfig>,
    secrets: Arc<dyn SecretSource>,
}

impl HopResolver {
    pub fn new(ssh_config: SshConfig, secrets: Arc<dyn SecretSource>) -> Self {
        Self {
            ssh_config: Arc::new(ssh_config),
            secrets,
        }
    }

    /// Resolver backed by the LastPass CLI.
    pub fn with_lastpass(ssh_config: SshConfig) -> Self {
        Self::new(ssh_config, Arc::new(LastPass::default()))
    }

    pub async fn resolve_set(&self, hops: &HopSet) -> Result<HopSet, ConfigError> {
        let mut resolved = Vec::new();
        for root in hops.roots() {
            resolved.push(self.resolve(root).await?);
        }
        Ok(match hops {
            HopSet::Single(_) => match resolved.pop() {
                Some(root) => HopSet::from(root),
                None => HopSet::Many(Vec::new()),
            },
            HopSet::Many(_) => HopSet::Many(resolved),
        })
    }

    pub fn resolve<'a>(&'a self, hop: &'a HopSpec) -> BoxFuture<'a, Result<HopSpec, ConfigError>> {
        Box::pin(async move {
            let mut node = hop.clone();
            self.apply_ssh_config(&mut node);
            self.apply_secret(&mut node).await?;
            validate(&node)?;

            if let Some(next) = &hop.nexthop {
                node.nexthop = Some(Box::new(self.resolve(next).await?));
            }
            if let Some(children) = &hop.nexthops {
                let mut resolved = Vec::with_capacity(children.len());
                for child in children {
                    resolved.push(self.resolve(child).await?);
                }
                node.nexthops = Some(resolved);
            }

            Ok(node)
        })
    }

    fn apply_ssh_config(&self, node: &mut HopSpec) {
        let defaults = self.ssh_config.find_host_config(&node.id);

        if node.sshuser.is_none() {
            node.sshuser = defaults.user;
        }
        if node.sshpass.is_none() {
            node.sshpass = defaults.password;
        }
        if node.port == DEFAULT_SSH_PORT {
            if let Some(port) = defaults.port {
                node.port = port;
            }
        }
        if node.host.is_none() {
            node.host = defaults.hostname;
        }
        if node.sshkeyfile.is_none() {
            node.sshkeyfile = defaults
                .identity_files
                .first()
                .map(|p| p.to_string_lossy().into_owned());
        }
        if node.proxycommand.is_none() {
            node.proxycommand = defaults.proxy_command;
        }
    }

    async fn apply_secret(&self, node: &mut HopSpec) -> Result<(), ConfigError> {
        let Some(name) = node.lastpass.as_deref() else {
            return Ok(());
        };
        let secret = self.secrets.fetch(name).await?;

        let host_unset = node.host.as_deref().is_none_or(|h| h == node.id);
        if host_unset && !secret.url.is_empty() {
            node.host = Some(secret.url.clone());
        }
        if node.sshuser.is_none() {
            node.sshuser = Some(secret.username.clone());
        }
        if node.sshpass.is_none() {
            node.sshpass = Some(secret.password.to_string());
        }
        Ok(())
    }
}

/// Check the fields every hop needs before any connection is attempted.
pub fn validate(node: &HopSpec) -> Result<(), ConfigError> {
    if node.id.trim().is_empty() {
        return Err(ConfigError::EmptyField("id"));
    }
    if node.localbindport.is_none() {
        return Err(ConfigError::EmptyField("localbindport"));
    }
    if node.host.as_deref().is_none_or(|h| h.trim().is_empty()) {
        return Err(ConfigError::EmptyField("host"));
    }
    if node.port == 0 {
        return Err(ConfigError::EmptyField("port"));
    }
    if node.nexthop.is_some() && node.nexthops.as_ref().is_some_and(|v| !v.is_empty()) {
        return Err(ConfigError::invalid(
            Some(&node.id),
            "nexthop and nexthops cannot both be set",
        ));
    }
    Ok(())
}
