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

//! Hosts file aliases for reachable hops.
//!
//! Workers stage aliases as their hops come up. The supervisor commits them
//! once, and restores the original file verbatim on shutdown.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::HostsFileError;

pub const DEFAULT_HOSTS_FILE: &str = "/etc/hosts";

/// Overrides [`DEFAULT_HOSTS_FILE`].
pub const HOSTS_FILE_ENV: &str = "TUNNELGRAF_HOSTS_FILE";

const LOOPBACK: &str = "127.0.0.1";

/// One staged `127.0.0.1 <alias>` line and the hop that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostsEntry {
    pub alias: String,
    pub owner: String,
}

impl HostsEntry {
    fn render(&self) -> String {
        format!("{LOOPBACK}\t{}\t# tunnelgraf entry for {}", self.alias, self.owner)
    }
}

#[derive(Debug, Default)]
struct HostsState {
    staged: Vec<HostsEntry>,
    /// File content before the first commit; `Some` once committed.
    original: Option<String>,
}

#[derive(Debug)]
pub struct HostsManager {
    path: PathBuf,
    state: Mutex<HostsState>,
}

impl HostsManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(HostsState::default()),
        }
    }

    /// Manager for `$TUNNELGRAF_HOSTS_FILE`, or `/etc/hosts` when unset.
    pub fn from_env() -> Self {
        let path = std::env::var_os(HOSTS_FILE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HOSTS_FILE));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stage every alias in `aliases` for `owner`. Returns how many were new.
    pub async fn add_to_hosts(&self, owner: &str, aliases: &[String]) -> usize {
        let mut state = self.state.lock().await;
        let mut added = 0;
        for alias in aliases {
            let alias = alias.trim();
            if alias.is_empty() || state.staged.iter().any(|e| e.alias == alias) {
                continue;
            }
            info!("{} will be added to hosts file.", alias);
            state.staged.push(HostsEntry {
                alias: alias.to_string(),
                owner: owner.to_string(),
            });
            added += 1;
        }
        added
    }

    pub async fn staged(&self) -> Vec<HostsEntry> {
        self.state.lock().await.staged.clone()
    }

    pub async fn is_committed(&self) -> bool {
        self.state.lock().await.original.is_some()
    }

    /// Write the staged entries after the original content.
    ///
    /// Aliases the file already maps are skipped. With nothing staged the
    /// file is left untouched.
    pub async fn commit(&self) -> Result<(), HostsFileError> {
        let mut state = self.state.lock().await;
        if state.staged.is_empty() {
            debug!("No hosts entries staged, leaving {} alone", self.path.display());
            return Ok(());
        }

        let original = match &state.original {
            Some(original) => original.clone(),
            None => tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| self.error(source))?,
        };

        let existing = existing_names(&original);
        let mut content = original.clone();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        for entry in state.staged.iter().filter(|e| !existing.contains(e.alias.as_str())) {
            content.push_str(&entry.render());
            content.push('\n');
        }

        info!("Updating hosts file {}", self.path.display());
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|source| self.error(source))?;
        state.original = Some(original);
        Ok(())
    }

    /// Put back the content seen before the first commit. Safe to call repeatedly.
    pub async fn restore(&self) -> Result<(), HostsFileError> {
        let mut state = self.state.lock().await;
        let Some(original) = state.original.take() else {
            return Ok(());
        };
        info!("Restoring original hosts file.");
        if let Err(source) = tokio::fs::write(&self.path, &original).await {
            state.original = Some(original);
            return Err(self.error(source));
        }
        Ok(())
    }

    fn error(&self, source: std::io::Error) -> HostsFileError {
        HostsFileError {
            path: self.path.clone(),
            source,
        }
    }
}

/// Every name mapped by a non-comment line of a hosts file.
fn existing_names(content: &str) -> HashSet<&str> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .flat_map(|line| line.split_whitespace().skip(1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ORIGINAL: &str = "127.0.0.1\tlocalhost\n10.1.1.1\tdb.internal # pinned\n";

    fn hosts_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, ORIGINAL).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_commit_appends_tagged_entries() {
        let (_dir, path) = hosts_file();
        let manager = HostsManager::new(&path);
        manager
            .add_to_hosts("svc", &["svc.internal".into(), "api.internal".into()])
            .await;
        manager.commit().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(ORIGINAL));
        assert!(content.contains("127.0.0.1\tsvc.internal\t# tunnelgraf entry for svc\n"));
        assert!(content.contains("127.0.0.1\tapi.internal\t# tunnelgraf entry for svc\n"));
    }

    #[tokio::test]
    async fn test_existing_and_duplicate_aliases_skipped() {
        let (_dir, path) = hosts_file();
        let manager = HostsManager::new(&path);
        assert_eq!(manager.add_to_hosts("a", &["x".into(), "x".into()]).await, 1);
        assert_eq!(manager.add_to_hosts("b", &["x".into(), " ".into()]).await, 0);
        manager.add_to_hosts("c", &["db.internal".into()]).await;
        manager.commit().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("\tx\t").count(), 1);
        assert!(!content.contains("entry for c"));
    }

    #[tokio::test]
    async fn test_restore_is_verbatim_and_idempotent() {
        let (_dir, path) = hosts_file();
        let manager = HostsManager::new(&path);
        manager.add_to_hosts("svc", &["svc.internal".into()]).await;
        manager.commit().await.unwrap();
        assert!(manager.is_committed().await);

        manager.restore().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), ORIGINAL);

        // Someone else edits the file; a second restore must not clobber it.
        std::fs::write(&path, "edited\n").unwrap();
        manager.restore().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "edited\n");
    }

    #[tokio::test]
    async fn test_nothing_staged_never_touches_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist");
        let manager = HostsManager::new(&path);
        manager.commit().await.unwrap();
        manager.restore().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_commit_failure_is_hosts_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = HostsManager::new(dir.path().join("missing").join("hosts"));
        manager.add_to_hosts("svc", &["svc".into()]).await;
        let err = manager.commit().await.unwrap_err();
        assert!(err.to_string().contains("Are you root"));
        assert!(!manager.is_committed().await);
    }

    #[test]
    #[serial]
    fn test_from_env_override() {
        std::env::set_var(HOSTS_FILE_ENV, "/tmp/custom-hosts");
        assert_eq!(HostsManager::from_env().path(), Path::new("/tmp/custom-hosts"));
        std::env::remove_var(HOSTS_FILE_ENV);
        assert_eq!(HostsManager::from_env().path(), Path::new(DEFAULT_HOSTS_FILE));
    }

    #[test]
    fn test_existing_names_ignores_comments() {
        let names = existing_names("127.0.0.1 a b # c d\n# e f\n");
        assert!(names.contains("a") && names.contains("b"));
        assert!(!names.contains("c") && !names.contains("f"));
    }
}
