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

//! Supervision of a running graph: periodic status, shutdown triggers and
//! the pid file used by `stop`.

use anyhow::{Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use super::graph::Tunnels;
use crate::utils::output;

/// How often tunnel liveness is polled.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(5);

/// Liveness of every tunnel at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    pub active: usize,
    pub total: usize,
    /// Ids of hops that are not up, in creation order, without repeats.
    pub down: Vec<String>,
}

impl StatusSummary {
    pub fn is_healthy(&self) -> bool {
        self.down.is_empty()
    }

    pub fn message(&self) -> String {
        if self.is_healthy() {
            format!("[{}/{}] All tunnels are active", self.active, self.total)
        } else {
            format!(
                "[{}/{}] Down tunnels: {}",
                self.active,
                self.total,
                self.down.join(", ")
            )
        }
    }
}

impl Tunnels {
    /// Poll every tunnel once. Hops that failed before a tunnel was
    /// created count as down.
    pub fn status(&self) -> StatusSummary {
        let mut down: Vec<String> = Vec::new();
        let mut total = 0;
        let mut active = 0;

        for tunnel in self.tunnels() {
            total += 1;
            if tunnel.is_up() {
                active += 1;
            } else if !down.iter().any(|id| id == tunnel.id()) {
                down.push(tunnel.id().to_string());
            }
        }
        for failure in self.failures() {
            if self.tunnels().iter().any(|t| t.id() == failure.id) {
                continue;
            }
            total += 1;
            if !down.contains(&failure.id) {
                down.push(failure.id.clone());
            }
        }

        StatusSummary {
            active,
            total,
            down,
        }
    }

    /// Print status every [`MONITOR_INTERVAL`] until `shutdown` resolves,
    /// then tear everything down.
    pub async fn monitor<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.monitor_every(MONITOR_INTERVAL, shutdown).await
    }

    pub async fn monitor_every<F>(&mut self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let detach = self.options().detach;
        let mut ticker = tokio::time::interval(interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let summary = self.status();
                    debug!(active = summary.active, total = summary.total, "Tunnel status");
                    if detach {
                        output::status_record(&summary.message(), summary.is_healthy());
                    } else {
                        output::status_line(&summary.message(), summary.is_healthy());
                    }
                }
            }
        }

        if !detach {
            output::plain("");
        }
        info!("Shutdown requested");
        self.stop_all().await;
    }
}

/// Resolve on Ctrl-C, SIGTERM, or a `q`/`quit` line on stdin.
///
/// Stdin is ignored when detached.
pub async fn wait_for_shutdown(detach: bool) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    let quit = async {
        if !detach {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if is_quit_command(&line) {
                    return;
                }
            }
        }
        std::future::pending::<()>().await;
    };

    tokio::select! {
        _ = ctrl_c => debug!("Received Ctrl-C"),
        _ = terminate => debug!("Received SIGTERM"),
        _ = quit => debug!("Quit requested on stdin"),
    }
}

fn is_quit_command(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "q" | "quit")
}

/// Where a running `connect` for `profile` records its pid.
pub fn pid_file_path(profile: &Path) -> PathBuf {
    let stem = profile
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "default".to_string());
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(format!("tunnelgraf-{stem}.pid"))
}

/// Pid file owned by this process, removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Claim `path`. Fails if another live process holds it.
    pub fn create(path: PathBuf) -> Result<Self> {
        if let Ok(pid) = read_pid(&path) {
            if kill(Pid::from_raw(pid), None).is_ok() {
                anyhow::bail!(
                    "tunnelgraf is already running for this profile (pid {pid}, {})",
                    path.display()
                );
            }
            debug!(pid, "Replacing stale pid file");
        }
        std::fs::write(&path, format!("{}\n", std::process::id()))
            .with_context(|| format!("Failed to write pid file {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub fn read_pid(path: &Path) -> Result<i32> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("No running tunnels found ({})", path.display()))?;
    contents
        .trim()
        .parse()
        .with_context(|| format!("Invalid pid file {}", path.display()))
}

/// Ask the process recorded in `path` to stop. Returns its pid.
pub fn signal_stop(path: &Path) -> Result<i32> {
    let pid = read_pid(path)?;
    kill(Pid::from_raw(pid), Signal::SIGTERM)
        .with_context(|| format!("Failed to signal process {pid}"))?;
    Ok(pid)
}
