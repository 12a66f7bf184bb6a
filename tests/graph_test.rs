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

//! End-to-end tests of the hop graph engine with in-memory tunnels.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use tunnelgraf::config::{HopSet, HopSpec};
use tunnelgraf::endpoint::Endpoint;
use tunnelgraf::error::{ConfigError, RemoteError};
use tunnelgraf::hosts::HostsManager;
use tunnelgraf::tunnel::{
    url_map, Forwarder, GraphContext, GraphOptions, HostResolver, RetryPolicy, TunnelConnector,
    TunnelSpec, Tunnels,
};

#[derive(Clone, Default)]
struct Recorder {
    failing: Arc<HashSet<String>>,
    starts: Arc<Mutex<Vec<String>>>,
    stops: Arc<Mutex<Vec<String>>>,
    specs: Arc<Mutex<Vec<TunnelSpec>>>,
}

impl Recorder {
    fn failing(ids: &[&str]) -> Self {
        Self {
            failing: Arc::new(ids.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        }
    }

    fn starts(&self) -> Vec<String> {
        self.starts.lock().unwrap().clone()
    }

    fn stops(&self) -> Vec<String> {
        self.stops.lock().unwrap().clone()
    }
}

struct RecordedForwarder {
    id: String,
    fail: bool,
    active: bool,
    recorder: Recorder,
}

#[async_trait]
impl Forwarder for RecordedForwarder {
    async fn start(&mut self) -> anyhow::Result<()> {
        self.recorder.starts.lock().unwrap().push(self.id.clone());
        self.active = !self.fail;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn stop(&mut self) {
        if self.active {
            self.recorder.stops.lock().unwrap().push(self.id.clone());
        }
        self.active = false;
    }
}

impl TunnelConnector for Recorder {
    fn forwarder(&self, spec: &TunnelSpec) -> Box<dyn Forwarder> {
        self.specs.lock().unwrap().push(spec.clone());
        Box::new(RecordedForwarder {
            id: spec.id.clone(),
            fail: self.failing.contains(&spec.id),
            active: false,
            recorder: self.clone(),
        })
    }
}

struct NoLookups;

#[async_trait]
impl HostResolver for NoLookups {
    async fn lookup(
        &self,
        _via: &HopSpec,
        _via_target: &Endpoint,
        record: &str,
        _nameserver: Option<&str>,
    ) -> Result<String, RemoteError> {
        Err(RemoteError::EmptyResult {
            command: format!("dig +short {record}"),
        })
    }
}

fn context(dir: &TempDir, recorder: &Recorder) -> GraphContext {
    GraphContext::new(
        Arc::new(HostsManager::new(dir.path().join("hosts"))),
        Arc::new(recorder.clone()),
        Arc::new(NoLookups),
    )
    .with_retry(RetryPolicy::new(3, Duration::ZERO))
}

fn bastion_svc() -> HopSet {
    let yaml = r#"
id: bastion
host: example.com
port: 2222
localbindport: 10000
nexthop:
  id: svc
  localbindport: 10001
  host: 10.0.0.5
  port: 80
"#;
    serde_yaml::from_str(yaml).unwrap()
}

fn wide_tree() -> HopSet {
    let leaf = |id: &str, port: u16| HopSpec::new(id, port).with_host(format!("{id}.internal"), 22);
    HopSet::from(vec![
        HopSpec::new("edge", 11000)
            .with_host("edge.example", 22)
            .with_nexthops(vec![
                leaf("a", 11001).with_nexthops(vec![leaf("a1", 11011), leaf("a2", 11012)]),
                leaf("b", 11002),
                leaf("c", 11003).with_nexthop(leaf("c1", 11013)),
            ]),
        HopSpec::new("other", 12000)
            .with_host("other.example", 22)
            .with_nexthop(leaf("d", 12001)),
    ])
}

async fn dry_run(hops: &HopSet, show_credentials: bool) -> Tunnels {
    let dir = TempDir::new().unwrap();
    Tunnels::build(
        hops,
        GraphOptions::dry_run(show_credentials),
        context(&dir, &Recorder::default()),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_bastion_svc_reports_declared_values() {
    let graph = dry_run(&bastion_svc(), false).await;
    let ids: Vec<_> = graph.reports().iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["bastion", "svc"]);

    let svc = graph.report("svc").unwrap();
    assert_eq!(svc.get("host").unwrap(), "10.0.0.5");
    assert_eq!(svc.get("port").unwrap(), 80);
    assert_eq!(svc.dial_target(), Some(&Endpoint::tcp("127.0.0.1", 10001)));
}

#[tokio::test]
async fn test_one_report_per_node_with_fanout() {
    let hops = wide_tree();
    let graph = dry_run(&hops, false).await;

    assert_eq!(graph.reports().len(), hops.node_count());
    let unique: HashSet<_> = graph.reports().iter().map(|r| r.id()).collect();
    assert_eq!(unique.len(), hops.node_count());
}

#[tokio::test]
async fn test_dry_run_is_repeatable() {
    let hops = wide_tree();
    let first = dry_run(&hops, true).await;
    let second = dry_run(&hops, true).await;
    assert_eq!(first.reports(), second.reports());
}

#[tokio::test]
async fn test_credentials_redacted_by_default() {
    let mut hop = HopSpec::new("bastion", 10000).with_host("example.com", 22);
    hop.sshuser = Some("ops".into());
    hop.sshpass = Some("hunter2".into());
    hop.sshkeyfile = Some("~/.ssh/id_ed25519".into());
    let hops = HopSet::from(hop);

    let hidden = dry_run(&hops, false).await;
    let json = serde_json::to_value(hidden.reports()).unwrap();
    for key in ["sshuser", "sshpass", "sshkeyfile"] {
        assert!(json[0].get(key).is_none(), "{key} leaked");
    }
    for key in ["nexthop", "nexthops", "localbindaddress", "localbindport"] {
        assert!(json[0].get(key).is_none(), "{key} present");
    }

    let shown = dry_run(&hops, true).await;
    let json = serde_json::to_value(shown.reports()).unwrap();
    assert_eq!(json[0]["sshuser"], "ops");
    assert_eq!(json[0]["sshpass"], "hunter2");
    assert_eq!(json[0]["sshkeyfile"], "~/.ssh/id_ed25519");
}

#[tokio::test]
async fn test_url_precedence() {
    let mut single = HopSpec::new("single", 10001).with_host("y", 80);
    single.hosts_file_entry = Some("x".into());
    let mut multi = HopSpec::new("multi", 10002).with_host("z", 80);
    multi.hosts_file_entries = vec!["a".into(), "b".into()];
    let hops = HopSet::from(
        HopSpec::new("root", 10000)
            .with_host("root.example", 22)
            .with_nexthops(vec![single, multi]),
    );

    let graph = dry_run(&hops, false).await;
    let urls = url_map(graph.reports());
    assert_eq!(urls["single"], vec!["ssh://x:10001"]);
    assert_eq!(urls["multi"], vec!["ssh://a:10002", "ssh://b:10002"]);
    assert_eq!(urls["root"], vec!["ssh://root.example:22"]);
}

#[tokio::test]
async fn test_missing_localbindport_rejected_before_connecting() {
    let mut hops = bastion_svc();
    if let HopSet::Single(root) = &mut hops {
        if let Some(svc) = root.nexthop.as_mut() {
            svc.localbindport = None;
        }
    }

    let dir = TempDir::new().unwrap();
    let recorder = Recorder::default();
    let err = Tunnels::build(&hops, GraphOptions::connect(true), context(&dir, &recorder))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::EmptyField("localbindport")));
    assert!(recorder.starts().is_empty());
}

#[tokio::test]
async fn test_each_hop_dials_its_immediate_parent() {
    let dir = TempDir::new().unwrap();
    let recorder = Recorder::default();
    let graph = Tunnels::build(&wide_tree(), GraphOptions::connect(true), context(&dir, &recorder))
        .await
        .unwrap();
    assert!(graph.failures().is_empty());

    let specs = recorder.specs.lock().unwrap().clone();
    let bastion_of = |id: &str| {
        specs
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.bastion.clone())
            .unwrap()
    };

    assert_eq!(bastion_of("a"), Endpoint::tcp("edge.example", 22));
    assert_eq!(bastion_of("b"), Endpoint::tcp("edge.example", 22));
    assert_eq!(bastion_of("a1"), Endpoint::tcp("127.0.0.1", 11001));
    assert_eq!(bastion_of("a2"), Endpoint::tcp("127.0.0.1", 11001));
    assert_eq!(bastion_of("c1"), Endpoint::tcp("127.0.0.1", 11003));
    assert_eq!(bastion_of("d"), Endpoint::tcp("other.example", 22));
    assert_eq!(specs.len(), 7);
}

#[tokio::test]
async fn test_teardown_in_reverse_creation_order() {
    let hops = HopSet::from(
        HopSpec::new("root", 10000).with_host("root.example", 22).with_nexthop(
            HopSpec::new("A", 10001).with_host("10.0.0.1", 22).with_nexthop(
                HopSpec::new("B", 10002)
                    .with_host("10.0.0.2", 22)
                    .with_nexthop(HopSpec::new("C", 10003).with_host("10.0.0.3", 22)),
            ),
        ),
    );

    let dir = TempDir::new().unwrap();
    let recorder = Recorder::default();
    let mut graph = Tunnels::build(&hops, GraphOptions::connect(true), context(&dir, &recorder))
        .await
        .unwrap();

    let created: Vec<_> = graph.tunnels().iter().map(|t| t.id().to_string()).collect();
    assert_eq!(created, vec!["A", "B", "C"]);

    graph.stop_all().await;
    assert_eq!(recorder.stops(), vec!["C", "B", "A"]);
}

#[tokio::test]
async fn test_inactive_forwarder_gets_three_attempts() {
    let dir = TempDir::new().unwrap();
    let recorder = Recorder::failing(&["svc"]);
    let graph = Tunnels::build(
        &bastion_svc(),
        GraphOptions::connect(true),
        context(&dir, &recorder),
    )
    .await
    .unwrap();

    assert_eq!(recorder.starts(), vec!["svc", "svc", "svc"]);
    assert_eq!(graph.tunnels().len(), 1);
    let status = graph.status();
    assert_eq!(status.active, 0);
    assert_eq!(status.down, vec!["svc"]);
}

#[tokio::test]
async fn test_failed_lookup_spares_siblings() {
    let mut db = HopSpec::new("db", 10001).with_host("db", 5432);
    db.hostlookup = Some("db.internal".into());
    let hops = HopSet::from(
        HopSpec::new("root", 10000)
            .with_host("root.example", 22)
            .with_nexthops(vec![
                db.with_nexthop(HopSpec::new("replica", 10003).with_host("10.0.0.8", 5432)),
                HopSpec::new("web", 10002).with_host("10.0.0.9", 80),
            ]),
    );

    let dir = TempDir::new().unwrap();
    let recorder = Recorder::default();
    let graph = Tunnels::build(&hops, GraphOptions::connect(true), context(&dir, &recorder))
        .await
        .unwrap();

    assert_eq!(recorder.starts(), vec!["web"]);
    let failed: Vec<_> = graph.failures().iter().map(|f| f.id.as_str()).collect();
    assert_eq!(failed, vec!["db", "replica"]);
    assert_eq!(graph.failures()[1].error, "Parent db is down");
    assert_eq!(graph.reports().len(), hops.node_count());
    assert!(graph.report("replica").is_some());
    assert_eq!(graph.status().message(), "[1/3] Down tunnels: db, replica");
}

#[tokio::test]
async fn test_hosts_committed_and_restored() {
    let dir = TempDir::new().unwrap();
    let hosts_path = dir.path().join("hosts");
    std::fs::write(&hosts_path, "127.0.0.1\tlocalhost\n").unwrap();

    let mut svc = HopSpec::new("svc", 10001).with_host("10.0.0.5", 80);
    svc.hosts_file_entries = vec!["svc.local".into(), "api.local".into()];
    let hops = HopSet::from(
        HopSpec::new("bastion", 10000)
            .with_host("example.com", 22)
            .with_nexthop(svc),
    );

    let recorder = Recorder::default();
    let mut graph = Tunnels::build(&hops, GraphOptions::connect(true), context(&dir, &recorder))
        .await
        .unwrap();
    graph.commit_hosts().await.unwrap();

    let written = std::fs::read_to_string(&hosts_path).unwrap();
    assert!(written.contains("svc.local"));
    assert!(written.contains("api.local"));
    assert!(written.contains("# tunnelgraf entry for svc"));

    graph.stop_all().await;
    assert_eq!(
        std::fs::read_to_string(&hosts_path).unwrap(),
        "127.0.0.1\tlocalhost\n"
    );
}
