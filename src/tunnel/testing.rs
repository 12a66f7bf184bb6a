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

//! In-memory connector and resolver for engine tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::builder::{Forwarder, TunnelConnector, TunnelSpec};
use super::graph::HostResolver;
use crate::config::HopSpec;
use crate::endpoint::Endpoint;
use crate::error::RemoteError;

#[derive(Clone, Default)]
pub struct FakeConnector {
    failing: Arc<HashSet<String>>,
    started: Arc<Mutex<Vec<String>>>,
    stopped: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    /// Forwarders for these tunnel ids never become active.
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            failing: Arc::new(ids.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }
}

impl TunnelConnector for FakeConnector {
    fn forwarder(&self, spec: &TunnelSpec) -> Box<dyn Forwarder> {
        Box::new(FakeForwarder {
            id: spec.id.clone(),
            fail: self.failing.contains(&spec.id),
            active: false,
            connector: self.clone(),
        })
    }
}

pub struct FakeForwarder {
    id: String,
    fail: bool,
    active: bool,
    connector: FakeConnector,
}

#[async_trait]
impl Forwarder for FakeForwarder {
    async fn start(&mut self) -> anyhow::Result<()> {
        self.connector.started.lock().unwrap().push(self.id.clone());
        if self.fail {
            anyhow::bail!("connection refused");
        }
        self.active = true;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn stop(&mut self) {
        if self.active {
            self.connector.stopped.lock().unwrap().push(self.id.clone());
        }
        self.active = false;
    }
}

/// Answers lookups from a fixed table; unknown records yield no result.
#[derive(Clone, Default)]
pub struct FakeResolver {
    answers: HashMap<String, String>,
}

impl FakeResolver {
    pub fn with(answers: &[(&str, &str)]) -> Self {
        Self {
            answers: answers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl HostResolver for FakeResolver {
    async fn lookup(
        &self,
        _via: &HopSpec,
        _via_target: &Endpoint,
        record: &str,
        _nameserver: Option<&str>,
    ) -> Result<String, RemoteError> {
        self.answers
            .get(record)
            .cloned()
            .ok_or_else(|| RemoteError::EmptyResult {
                command: format!("dig +short {record}"),
            })
    }
}
