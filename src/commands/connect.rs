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

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::HopSet;
use crate::hosts::HostsManager;
use crate::ssh::tokio_client::ServerCheckMethod;
use crate::tunnel::{
    pid_file_path, wait_for_shutdown, GraphContext, GraphOptions, PidFile, Tunnels,
};
use crate::utils::output;

/// Open every tunnel and supervise until shutdown.
pub async fn connect(
    profile: &Path,
    hops: &HopSet,
    detach: bool,
    server_check: ServerCheckMethod,
) -> Result<i32> {
    let pid_file = PidFile::create(pid_file_path(profile))?;
    info!(pid_file = %pid_file.path().display(), "Starting tunnels");

    let hosts = Arc::new(HostsManager::from_env());
    let ctx = GraphContext::ssh(hosts, server_check);
    let cancel = CancellationToken::new();

    let shutdown = wait_for_shutdown(detach);
    tokio::pin!(shutdown);
    let build = Tunnels::build_with_cancel(hops, GraphOptions::connect(detach), ctx, cancel.clone());
    tokio::pin!(build);

    let mut graph = tokio::select! {
        graph = &mut build => graph?,
        _ = &mut shutdown => {
            output::notice("Interrupted while starting tunnels");
            cancel.cancel();
            let mut graph = build.await?;
            graph.stop_all().await;
            return Ok(0);
        }
    };

    if let Err(e) = graph.commit_hosts().await {
        output::failure(&format!("Failed to update hosts file: {e}"));
        graph.stop_all().await;
        return Ok(1);
    }

    graph.monitor(shutdown).await;
    Ok(0)
}
