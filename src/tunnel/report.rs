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

//! Flattened per-hop records for `show` and `urls`.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::config::HopSpec;
use crate::endpoint::Endpoint;

/// Keys never present in a report.
pub const STRUCTURAL_FIELDS: [&str; 4] =
    ["nexthop", "nexthops", "localbindaddress", "localbindport"];

/// Keys present only when credentials are requested.
pub const CREDENTIAL_FIELDS: [&str; 3] = ["sshuser", "sshpass", "sshkeyfile"];

/// One hop as shown to the user.
///
/// The serialized fields are the hop's declared values after include,
/// ssh-config and secret resolution. Bastion rewriting and host lookups
/// never show up here.
#[derive(Debug, Clone, PartialEq)]
pub struct HopReport {
    id: String,
    fields: Map<String, Value>,
    protocol: String,
    hosts_file_entry: Option<String>,
    hosts_file_entries: Vec<String>,
    dial_target: Option<Endpoint>,
}

impl HopReport {
    /// Build the record for `hop`, which is reached at `dial_target`.
    pub fn new(hop: &HopSpec, dial_target: Option<Endpoint>, show_credentials: bool) -> Self {
        let mut fields = match serde_json::to_value(hop) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for key in STRUCTURAL_FIELDS {
            fields.remove(key);
        }
        if !show_credentials {
            for key in CREDENTIAL_FIELDS {
                fields.remove(key);
            }
        }

        Self {
            id: hop.id.clone(),
            fields,
            protocol: hop.protocol.clone(),
            hosts_file_entry: hop.hosts_file_entry.clone(),
            hosts_file_entries: hop.hosts_file_entries.clone(),
            dial_target,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Where a session to this hop connects: the declared address for a
    /// root, the hop's own local bind otherwise.
    pub fn dial_target(&self) -> Option<&Endpoint> {
        self.dial_target.as_ref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Local access URLs: the single hosts entry, else each hosts entry,
    /// else the dial host. The port is always the dial port.
    pub fn urls(&self) -> Vec<String> {
        let Some(target) = &self.dial_target else {
            return Vec::new();
        };
        let url = |host: &str| match target.port() {
            Some(port) => format!("{}://{}:{}", self.protocol, host, port),
            None => format!("{}://{}", self.protocol, host),
        };

        if let Some(entry) = self.hosts_file_entry.as_deref().filter(|e| !e.is_empty()) {
            return vec![url(entry)];
        }
        if !self.hosts_file_entries.is_empty() {
            return self.hosts_file_entries.iter().map(|e| url(e)).collect();
        }
        match target {
            Endpoint::Tcp { host, .. } => vec![url(host)],
            Endpoint::UnixSocket { path } => vec![url(&path.to_string_lossy())],
        }
    }
}

impl Serialize for HopReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// `{id: [url, ...]}` for every report.
pub fn url_map(reports: &[HopReport]) -> BTreeMap<String, Vec<String>> {
    reports
        .iter()
        .map(|r| (r.id.clone(), r.urls()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc() -> HopSpec {
        let mut hop = HopSpec::new("svc", 10001).with_host("10.0.0.5", 80);
        hop.sshuser = Some("ops".into());
        hop.sshpass = Some("secret".into());
        hop.protocol = "https".into();
        hop
    }

    #[test]
    fn test_structural_fields_always_removed() {
        let report = HopReport::new(&svc(), None, true);
        for key in STRUCTURAL_FIELDS {
            assert!(report.get(key).is_none(), "{key} should be excluded");
        }
        assert_eq!(report.get("host"), Some(&Value::from("10.0.0.5")));
        assert_eq!(report.get("port"), Some(&Value::from(80)));
    }

    #[test]
    fn test_credentials_redacted_unless_requested() {
        let hidden = HopReport::new(&svc(), None, false);
        for key in CREDENTIAL_FIELDS {
            assert!(hidden.get(key).is_none());
        }

        let shown = HopReport::new(&svc(), None, true);
        assert_eq!(shown.get("sshuser"), Some(&Value::from("ops")));
        assert_eq!(shown.get("sshpass"), Some(&Value::from("secret")));
        assert_eq!(shown.get("sshkeyfile"), Some(&Value::Null));
    }

    #[test]
    fn test_serializes_as_flat_object() {
        let json = serde_json::to_value(HopReport::new(&svc(), None, false)).unwrap();
        assert_eq!(json["id"], "svc");
        assert!(json.get("dial_target").is_none());
    }

    #[test]
    fn test_url_prefers_single_entry_over_host() {
        let mut hop = svc();
        hop.hosts_file_entry = Some("x".into());
        hop.hosts_file_entries = vec!["a".into()];
        let report = HopReport::new(&hop, Some(Endpoint::tcp("y", 10001)), false);
        assert_eq!(report.urls(), vec!["https://x:10001"]);
    }

    #[test]
    fn test_url_one_per_entry() {
        let mut hop = svc();
        hop.hosts_file_entries = vec!["a".into(), "b".into()];
        let report = HopReport::new(&hop, Some(Endpoint::tcp("127.0.0.1", 10001)), false);
        assert_eq!(report.urls(), vec!["https://a:10001", "https://b:10001"]);
    }

    #[test]
    fn test_url_falls_back_to_dial_host() {
        let report = HopReport::new(&svc(), Some(Endpoint::tcp("127.0.0.1", 10001)), false);
        assert_eq!(report.urls(), vec!["https://127.0.0.1:10001"]);

        let socket = HopReport::new(
            &svc(),
            Some(Endpoint::from_parts("/tmp/svc.sock", 0)),
            false,
        );
        assert_eq!(socket.urls(), vec!["https:///tmp/svc.sock"]);
    }
}
