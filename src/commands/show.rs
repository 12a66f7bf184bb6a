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

use anyhow::Result;

use super::{dry_run, tunnel_not_found};
use crate::config::HopSet;
use crate::tunnel::{url_map, Tunnels};

/// JSON for every report, or for one hop when `tunnel_id` is given.
///
/// `None` when the id is unknown.
pub fn render_reports(graph: &Tunnels, tunnel_id: Option<&str>) -> Result<Option<String>> {
    let json = match tunnel_id {
        Some(id) => match graph.report(id) {
            Some(report) => serde_json::to_string_pretty(report)?,
            None => return Ok(None),
        },
        None => serde_json::to_string_pretty(graph.reports())?,
    };
    Ok(Some(json))
}

pub fn render_urls(graph: &Tunnels) -> Result<String> {
    Ok(serde_json::to_string_pretty(&url_map(graph.reports()))?)
}

pub async fn show(hops: &HopSet, tunnel_id: Option<&str>, show_credentials: bool) -> Result<i32> {
    let graph = dry_run(hops, show_credentials).await?;
    match render_reports(&graph, tunnel_id)? {
        Some(json) => {
            println!("{json}");
            Ok(0)
        }
        None => Ok(tunnel_not_found(tunnel_id.unwrap_or_default())),
    }
}

pub async fn urls(hops: &HopSet) -> Result<i32> {
    let graph = dry_run(hops, false).await?;
    println!("{}", render_urls(&graph)?);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HopSpec;
    use serde_json::Value;

    fn hops() -> HopSet {
        let mut svc = HopSpec::new("svc", 10001).with_host("10.0.0.5", 80);
        svc.protocol = "http".into();
        svc.hosts_file_entry = Some("svc.local".into());
        HopSet::from(
            HopSpec::new("bastion", 10000)
                .with_host("example.com", 2222)
                .with_nexthop(svc),
        )
    }

    #[tokio::test]
    async fn test_render_single_report() {
        let graph = dry_run(&hops(), false).await.unwrap();
        let json = render_reports(&graph, Some("svc")).unwrap().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["host"], "10.0.0.5");
        assert_eq!(value["port"], 80);
        assert!(value.get("sshuser").is_none());
    }

    #[tokio::test]
    async fn test_unknown_id_is_none() {
        let graph = dry_run(&hops(), false).await.unwrap();
        assert!(render_reports(&graph, Some("nope")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_render_urls() {
        let graph = dry_run(&hops(), false).await.unwrap();
        let value: Value = serde_json::from_str(&render_urls(&graph).unwrap()).unwrap();
        assert_eq!(value["svc"][0], "http://svc.local:10001");
        assert_eq!(value["bastion"][0], "ssh://example.com:2222");
    }
}
