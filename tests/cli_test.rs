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

//! Tests of the `tunnelgraf` binary's dry-run subcommands.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const PROFILE: &str = r#"
id: bastion
host: example.com
port: 2222
localbindport: 10000
sshuser: ops
sshpass: secret
nexthop:
  id: svc
  localbindport: 10001
  host: 10.0.0.5
  port: 80
  protocol: http
  hosts_file_entries: [svc.local, api.local]
"#;

fn profile(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("lab.yml");
    std::fs::write(&path, PROFILE).unwrap();
    path
}

fn tunnelgraf(profile: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tunnelgraf"))
        .arg("-p")
        .arg(profile)
        .arg("--ssh-config")
        .arg(profile.with_file_name("no-ssh-config"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute tunnelgraf")
}

#[test]
fn test_show_prints_all_hops() {
    let dir = TempDir::new().unwrap();
    let output = tunnelgraf(&profile(&dir), &["show"]);
    assert!(output.status.success());

    let reports: Value = serde_json::from_slice(&output.stdout).unwrap();
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["id"], "bastion");
    assert_eq!(reports[1]["host"], "10.0.0.5");
    assert!(reports[0].get("sshpass").is_none());
}

#[test]
fn test_show_one_hop_with_credentials() {
    let dir = TempDir::new().unwrap();
    let output = tunnelgraf(
        &profile(&dir),
        &["show", "-t", "bastion", "--show-credentials"],
    );
    assert!(output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["sshuser"], "ops");
    assert_eq!(report["sshpass"], "secret");
}

#[test]
fn test_show_unknown_id_fails() {
    let dir = TempDir::new().unwrap();
    let output = tunnelgraf(&profile(&dir), &["show", "-t", "nope"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Tunnel id nope not found."));
}

#[test]
fn test_urls() {
    let dir = TempDir::new().unwrap();
    let output = tunnelgraf(&profile(&dir), &["urls"]);
    assert!(output.status.success());

    let urls: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(urls["svc"][0], "http://svc.local:10001");
    assert_eq!(urls["svc"][1], "http://api.local:10001");
    assert_eq!(urls["bastion"][0], "ssh://example.com:2222");
}

#[test]
fn test_invalid_profile_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.yml");
    std::fs::write(&path, "id: lonely\nhost: a.example\n").unwrap();

    let output = tunnelgraf(&path, &["show"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("localbindport"));
}

#[test]
fn test_stop_without_running_connect() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("never-started-7f3a.yml");
    let output = tunnelgraf(&path, &["stop"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No running tunnels found"));
}
