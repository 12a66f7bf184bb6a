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

//! Hop definition types.

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_LOCAL_BIND_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PROTOCOL: &str = "ssh";

/// One hop of a tunnel graph.
///
/// Field names follow the profile YAML keys. A node with neither `nexthop`
/// nor `nexthops` ends its chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopSpec {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub include: Option<String>,

    /// Bastion address; a path here means a Unix domain socket.
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_local_bind_address")]
    pub localbindaddress: String,

    #[serde(default)]
    pub localbindport: Option<u16>,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default)]
    pub sshuser: Option<String>,

    #[serde(default)]
    pub sshpass: Option<String>,

    #[serde(default)]
    pub sshkeyfile: Option<String>,

    #[serde(default)]
    pub lastpass: Option<String>,

    #[serde(default)]
    pub hostlookup: Option<String>,

    #[serde(default)]
    pub nameserver: Option<String>,

    #[serde(default)]
    pub hosts_file_entry: Option<String>,

    #[serde(default)]
    pub hosts_file_entries: Vec<String>,

    #[serde(default)]
    pub proxycommand: Option<String>,

    #[serde(default)]
    pub nexthop: Option<Box<HopSpec>>,

    #[serde(default)]
    pub nexthops: Option<Vec<HopSpec>>,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_local_bind_address() -> String {
    DEFAULT_LOCAL_BIND_ADDRESS.to_string()
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

impl HopSpec {
    /// A bare hop with defaults applied, mostly useful for building graphs in code.
    pub fn new(id: impl Into<String>, localbindport: u16) -> Self {
        Self {
            id: id.into(),
            include: None,
            host: None,
            port: DEFAULT_SSH_PORT,
            localbindaddress: default_local_bind_address(),
            localbindport: Some(localbindport),
            protocol: default_protocol(),
            sshuser: None,
            sshpass: None,
            sshkeyfile: None,
            lastpass: None,
            hostlookup: None,
            nameserver: None,
            hosts_file_entry: None,
            hosts_file_entries: Vec::new(),
            proxycommand: None,
            nexthop: None,
            nexthops: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = port;
        self
    }

    pub fn with_nexthop(mut self, next: HopSpec) -> Self {
        self.nexthop = Some(Box::new(next));
        self
    }

    pub fn with_nexthops(mut self, children: Vec<HopSpec>) -> Self {
        self.nexthops = Some(children);
        self
    }

    /// The declared bastion address, if resolved.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.host
            .as_deref()
            .map(|host| Endpoint::from_parts(host, self.port))
    }

    /// Where this hop's forwarded channel listens locally.
    pub fn local_bind(&self) -> Option<Endpoint> {
        self.localbindport
            .map(|port| Endpoint::from_parts(&self.localbindaddress, port))
    }

    /// Direct children in declaration order: `nexthop` first, then `nexthops`.
    pub fn children(&self) -> impl Iterator<Item = &HopSpec> {
        self.nexthop
            .iter()
            .map(|b| b.as_ref())
            .chain(self.nexthops.iter().flatten())
    }

    pub fn is_leaf(&self) -> bool {
        self.nexthop.is_none() && self.nexthops.as_ref().is_none_or(|v| v.is_empty())
    }

    /// Number of hop nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children().map(HopSpec::node_count).sum::<usize>()
    }

    /// Every alias that should point at 127.0.0.1 once this hop is reachable.
    ///
    /// `hosts_file_entries` first, then the single entry, then the lookup name.
    pub fn host_aliases(&self) -> Vec<String> {
        let mut aliases = self.hosts_file_entries.clone();
        aliases.extend(self.hosts_file_entry.iter().cloned());
        aliases.extend(self.hostlookup.iter().cloned());
        aliases
    }

    /// First node in this subtree with `id`, depth first.
    pub fn find(&self, id: &str) -> Option<&HopSpec> {
        if self.id == id {
            return Some(self);
        }
        self.children().find_map(|child| child.find(id))
    }
}

/// A profile holds either a single root hop or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HopSet {
    Many(Vec<HopSpec>),
    Single(Box<HopSpec>),
}

impl HopSet {
    pub fn roots(&self) -> Vec<&HopSpec> {
        match self {
            HopSet::Many(list) => list.iter().collect(),
            HopSet::Single(root) => vec![root.as_ref()],
        }
    }

    pub fn into_roots(self) -> Vec<HopSpec> {
        match self {
            HopSet::Many(list) => list,
            HopSet::Single(root) => vec![*root],
        }
    }

    pub fn node_count(&self) -> usize {
        self.roots().into_iter().map(HopSpec::node_count).sum()
    }

    pub fn find(&self, id: &str) -> Option<&HopSpec> {
        self.roots().into_iter().find_map(|root| root.find(id))
    }
}

impl From<HopSpec> for HopSet {
    fn from(root: HopSpec) -> Self {
        HopSet::Single(Box::new(root))
    }
}

impl From<Vec<HopSpec>> for HopSet {
    fn from(roots: Vec<HopSpec>) -> Self {
        HopSet::Many(roots)
    }
}
