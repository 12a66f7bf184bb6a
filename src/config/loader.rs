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

//! Profile loading and `include` fragment merging.

use futures::future::BoxFuture;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tokio::fs;

use super::types::HopSet;
use super::utils::{expand_tilde, resolve_include_path};
use crate::error::ConfigError;

/// A parsed connection profile, before secret and ssh-config resolution.
#[derive(Debug, Clone)]
pub struct Profile {
    pub path: PathBuf,
    pub hops: HopSet,
}

impl Profile {
    /// Load a profile from disk, expanding `include` references on every node.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let path = expand_tilde(path);
        let content = fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let hops = parse_profile(&content, &path, &base_dir).await?;
        tracing::debug!("Loaded profile {} with {} hops", path.display(), hops.node_count());

        Ok(Self { path, hops })
    }

    /// Directory that relative `include` paths were resolved against.
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// File stem used to key per-profile runtime state such as the pid file.
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "profile".to_string())
    }
}

/// Parse profile text. `origin` is only used in error messages.
pub async fn parse_profile(
    content: &str,
    origin: &Path,
    base_dir: &Path,
) -> Result<HopSet, ConfigError> {
    let raw: Value = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;

    let expanded = match raw {
        Value::Sequence(items) => {
            let mut roots = Vec::with_capacity(items.len());
            for item in items {
                roots.push(expand_node(item, base_dir.to_path_buf()).await?);
            }
            Value::Sequence(roots)
        }
        Value::Mapping(_) => expand_node(raw, base_dir.to_path_buf()).await?,
        Value::Null => {
            return Err(ConfigError::invalid(None, "profile is empty"));
        }
        _ => {
            return Err(ConfigError::invalid(
                None,
                "profile must be a hop mapping or a list of hop mappings",
            ));
        }
    };

    serde_yaml::from_value(expanded).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })
}

/// Merge a node's `include` fragment underneath it, then do the same for its children.
fn expand_node(node: Value, base_dir: PathBuf) -> BoxFuture<'static, Result<Value, ConfigError>> {
    Box::pin(async move {
        let Value::Mapping(map) = node else {
            return Ok(node);
        };

        let mut merged = match map.get("include").and_then(Value::as_str).map(str::to_string) {
            Some(include) => {
                let fragment = load_fragment(&resolve_include_path(&base_dir, &include)).await?;
                merge_mappings(fragment, map)
            }
            None => map,
        };

        if let Some(next) = merged.remove("nexthop") {
            let next = match next {
                Value::Null => Value::Null,
                other => expand_node(other, base_dir.clone()).await?,
            };
            merged.insert(Value::from("nexthop"), next);
        }

        if let Some(Value::Sequence(children)) = merged.remove("nexthops") {
            let mut expanded = Vec::with_capacity(children.len());
            for child in children {
                expanded.push(expand_node(child, base_dir.clone()).await?);
            }
            merged.insert(Value::from("nexthops"), Value::Sequence(expanded));
        }

        Ok(Value::Mapping(merged))
    })
}

async fn load_fragment(path: &Path) -> Result<Mapping, ConfigError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let fragment: Value = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    match fragment {
        Value::Mapping(m) => Ok(m),
        Value::Null => Ok(Mapping::new()),
        _ => Err(ConfigError::invalid(
            None,
            format!("include file {} must contain a mapping", path.display()),
        )),
    }
}

/// Deep-merge `overlay` onto `base`; overlay keys win, mappings merge
/// recursively, sequences concatenate with base items first.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            Value::Mapping(merge_mappings(base, overlay))
        }
        (Value::Sequence(mut base), Value::Sequence(overlay)) => {
            base.extend(overlay);
            Value::Sequence(base)
        }
        (_, overlay) => overlay,
    }
}

fn merge_mappings(mut base: Mapping, overlay: Mapping) -> Mapping {
    for (key, value) in overlay {
        let merged = match base.remove(&key) {
            Some(existing) => deep_merge(existing, value),
            None => value,
        };
        base.insert(key, merged);
    }
    base
}
