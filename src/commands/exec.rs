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

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use super::{dry_run, tunnel_not_found};
use crate::config::HopSet;
use crate::remote::RemoteCommandRunner;
use crate::ssh::tokio_client::ServerCheckMethod;

/// Build the runner for hop `tunnel_id`, dialed where `connect` exposes it.
pub async fn runner_for(
    hops: &HopSet,
    tunnel_id: &str,
    server_check: ServerCheckMethod,
) -> Result<Option<RemoteCommandRunner>> {
    let graph = dry_run(hops, true).await?;
    let (Some(report), Some(hop)) = (graph.report(tunnel_id), hops.find(tunnel_id)) else {
        return Ok(None);
    };
    let target = report
        .dial_target()
        .cloned()
        .or_else(|| hop.endpoint())
        .with_context(|| format!("Hop {tunnel_id} has no address"))?;

    let proxy_command = hop
        .proxycommand
        .clone()
        .filter(|_| hop.endpoint().as_ref() == Some(&target));
    Ok(Some(
        RemoteCommandRunner::for_hop(hop, target)
            .with_proxy_command(proxy_command)
            .with_server_check(server_check),
    ))
}

pub async fn execute_command(
    hops: &HopSet,
    tunnel_id: &str,
    command: &[String],
    server_check: ServerCheckMethod,
) -> Result<i32> {
    let Some(runner) = runner_for(hops, tunnel_id, server_check).await? else {
        return Ok(tunnel_not_found(tunnel_id));
    };
    let command = command.join(" ");
    tracing::debug!("Running '{}' on {} as {}", command, runner.target(), runner.user());

    let output = runner.execute(&command).await?;
    if !output.stdout.is_empty() {
        println!("{}", output.stdout);
    }
    if !output.stderr.is_empty() {
        eprintln!("{}", format!("Error from {command}: {}", output.stderr).red());
    }
    Ok(output.exit_status as i32)
}
