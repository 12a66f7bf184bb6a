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

//! Subcommand handlers. Each returns the process exit status.

pub mod connect;
pub mod exec;
pub mod show;
pub mod stop;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::{HopResolver, HopSet, Profile};
use crate::hosts::HostsManager;
use crate::ssh::tokio_client::ServerCheckMethod;
use crate::ssh::SshConfig;
use crate::tunnel::{GraphContext, GraphOptions, Tunnels};

/// Load the profile and resolve every hop against ssh config and secrets.
pub async fn load_hops(profile: &Path, ssh_config: Option<&Path>) -> Result<(Profile, HopSet)> {
    let profile = Profile::load(profile).await?;

    let ssh_config = match ssh_config {
        Some(path) => SshConfig::load_from_file(path)
            .await
            .with_context(|| format!("Failed to load SSH config from {}", path.display()))?,
        None => SshConfig::load_default().await.unwrap_or_else(|e| {
            debug!("No usable SSH config, continuing without it: {e:#}");
            SshConfig::new()
        }),
    };

    let hops = HopResolver::with_lastpass(ssh_config)
        .resolve_set(&profile.hops)
        .await?;
    Ok((profile, hops))
}

/// Walk `hops` without opening anything.
pub async fn dry_run(hops: &HopSet, show_credentials: bool) -> Result<Tunnels> {
    let ctx = GraphContext::ssh(
        Arc::new(HostsManager::from_env()),
        ServerCheckMethod::NoCheck,
    );
    Ok(Tunnels::build(hops, GraphOptions::dry_run(show_credentials), ctx).await?)
}

pub(crate) fn tunnel_not_found(id: &str) -> i32 {
    eprintln!("Tunnel id {id} not found.");
    1
}
