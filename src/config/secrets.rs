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

//! Credential lookup from a password vault.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use zeroize::Zeroizing;

use crate::error::ConfigError;

/// Credentials fetched for a hop.
#[derive(Debug, Clone, Default)]
pub struct Secret {
    pub name: String,
    pub username: String,
    pub password: Zeroizing<String>,
    /// Address with any leading `http://` removed.
    pub url: String,
}

#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Secret, ConfigError>;
}

/// Reads secrets through the LastPass CLI (`lpass show --json <name>`).
#[derive(Debug, Clone)]
pub struct LastPass {
    program: String,
}

impl Default for LastPass {
    fn default() -> Self {
        Self {
            program: "lpass".to_string(),
        }
    }
}

impl LastPass {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LpassEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    url: String,
}

#[async_trait]
impl SecretSource for LastPass {
    async fn fetch(&self, name: &str) -> Result<Secret, ConfigError> {
        tracing::debug!("Retrieving secret {name}");
        let output = Command::new(&self.program)
            .args(["show", "--json", name])
            .output()
            .await
            .map_err(|e| ConfigError::Secret {
                name: name.to_string(),
                message: format!("failed to run {}: {e}", self.program),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ConfigError::Secret {
                name: name.to_string(),
                message: format!("{stdout} - {stderr}"),
            });
        }

        parse_lpass_json(name, &stdout)
    }
}

fn parse_lpass_json(name: &str, json: &str) -> Result<Secret, ConfigError> {
    let entries: Vec<LpassEntry> = serde_json::from_str(json).map_err(|e| ConfigError::Secret {
        name: name.to_string(),
        message: format!("unexpected lpass output: {e}"),
    })?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| ConfigError::Secret {
            name: name.to_string(),
            message: "no matching entry".to_string(),
        })?;

    Ok(Secret {
        name: entry.name,
        username: entry.username,
        password: Zeroizing::new(entry.password),
        url: strip_http_scheme(&entry.url).to_string(),
    })
}

fn strip_http_scheme(url: &str) -> &str {
    url.strip_prefix("http://").unwrap_or(url)
}
