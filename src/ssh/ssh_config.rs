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

//! Minimal OpenSSH client configuration support.
//!
//! Only the options that feed hop defaults are understood: `HostName`,
//! `User`, `Port`, `IdentityFile`, `ProxyCommand` and the non-standard
//! `Password`. Everything else is skipped.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::expand_tilde;

/// Options collected from one `Host` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshHostConfig {
    pub host_patterns: Vec<String>,
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_files: Vec<PathBuf>,
    pub proxy_command: Option<String>,
    pub password: Option<String>,
}

/// Parsed `~/.ssh/config`.
#[derive(Debug, Clone, Default)]
pub struct SshConfig {
    pub hosts: Vec<SshHostConfig>,
}

impl SshConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `~/.ssh/config`; a missing file yields an empty configuration.
    pub async fn load_default() -> Result<Self> {
        match dirs::home_dir() {
            Some(home) => Self::load_from_file(&home.join(".ssh").join("config")).await,
            None => {
                tracing::debug!("No home directory, skipping ssh config");
                Ok(Self::new())
            }
        }
    }

    /// Load and parse a config file; a missing file yields an empty configuration.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let path = expand_tilde(path);
        if !path.exists() {
            tracing::debug!("SSH config file not found at {}", path.display());
            return Ok(Self::new());
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read SSH config file at {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse SSH config file at {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut hosts = Vec::new();
        let mut current: Option<SshHostConfig> = None;

        for (line_no, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (keyword, value) = split_option(line);
            let keyword = keyword.to_ascii_lowercase();

            if keyword == "host" {
                if let Some(block) = current.take() {
                    hosts.push(block);
                }
                if value.is_empty() {
                    anyhow::bail!("Host directive without patterns at line {}", line_no + 1);
                }
                current = Some(SshHostConfig {
                    host_patterns: value.split_whitespace().map(str::to_string).collect(),
                    ..Default::default()
                });
                continue;
            }

            // Options before the first Host block apply to every host.
            let block = current.get_or_insert_with(|| SshHostConfig {
                host_patterns: vec!["*".to_string()],
                ..Default::default()
            });
            parse_option(block, &keyword, value, line_no + 1)?;
        }

        if let Some(block) = current {
            hosts.push(block);
        }

        Ok(Self { hosts })
    }

    /// Effective settings for `hostname`.
    ///
    /// Blocks are applied in file order and the first value obtained for each
    /// option wins. Identity files accumulate.
    pub fn find_host_config(&self, hostname: &str) -> SshHostConfig {
        let mut merged = SshHostConfig::default();

        for block in &self.hosts {
            if !matches_host_patterns(hostname, &block.host_patterns) {
                continue;
            }
            merged.hostname = merged.hostname.or_else(|| block.hostname.clone());
            merged.user = merged.user.or_else(|| block.user.clone());
            merged.port = merged.port.or(block.port);
            merged.proxy_command = merged.proxy_command.or_else(|| block.proxy_command.clone());
            merged.password = merged.password.or_else(|| block.password.clone());
            merged
                .identity_files
                .extend(block.identity_files.iter().cloned());
        }

        merged
    }
}

fn split_option(line: &str) -> (&str, &str) {
    // Both "Key Value" and "Key=Value" are accepted.
    let split_at = line
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(line.len());
    let (keyword, rest) = line.split_at(split_at);
    let value = rest
        .trim_start()
        .trim_start_matches('=')
        .trim()
        .trim_matches('"');
    (keyword, value)
}

fn parse_option(block: &mut SshHostConfig, keyword: &str, value: &str, line_no: usize) -> Result<()> {
    match keyword {
        "hostname" => {
            block.hostname.get_or_insert_with(|| value.to_string());
        }
        "user" => {
            block.user.get_or_insert_with(|| value.to_string());
        }
        "port" => {
            let port: u16 = value
                .parse()
                .with_context(|| format!("Invalid port '{value}' at line {line_no}"))?;
            block.port.get_or_insert(port);
        }
        "identityfile" => {
            block.identity_files.push(expand_tilde(Path::new(value)));
        }
        "proxycommand" => {
            if !value.eq_ignore_ascii_case("none") {
                block.proxy_command.get_or_insert_with(|| value.to_string());
            }
        }
        "password" => {
            block.password.get_or_insert_with(|| value.to_string());
        }
        other => {
            tracing::trace!("Ignoring ssh config option '{other}' at line {line_no}");
        }
    }
    Ok(())
}

/// A host matches when some positive pattern matches and no negated one does.
fn matches_host_patterns(hostname: &str, patterns: &[String]) -> bool {
    let mut matched = false;
    for pattern in patterns {
        if let Some(negated) = pattern.strip_prefix('!') {
            if wildcard_match(hostname, negated) {
                return false;
            }
        } else if wildcard_match(hostname, pattern) {
            matched = true;
        }
    }
    matched
}

/// Case-insensitive glob match supporting `*` and `?`.
fn wildcard_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
