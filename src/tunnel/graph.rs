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

//! The hop graph engine.
//!
//! A resolved [`HopSet`] is walked root to leaf. Every `parent -> child`
//! edge becomes one [`TunnelBuilder`] dialing the parent's effective
//! address and listening on the child's local bind, so the child's own
//! children are reached through that listener.
//!
//! Walkers never share mutable state. They send [`GraphEvent`]s over a
//! channel and the collector in [`Tunnels::build`] is the only writer of
//! reports, tunnels and failures. Creation order of tunnels is the order
//! their events arrive, which within one chain is always parent first.

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::builder::{RetryPolicy, SshConnector, TunnelBuilder, TunnelConnector, TunnelSpec};
use super::report::HopReport;
use crate::config::{validate, HopSet, HopSpec};
use crate::endpoint::Endpoint;
use crate::error::{ConfigError, HostsFileError, RemoteError};
use crate::hosts::HostsManager;
use crate::nslookup::NsLookup;
use crate::remote::RemoteCommandRunner;
use crate::ssh::tokio_client::ServerCheckMethod;
use crate::utils::output;

/// How a graph is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphOptions {
    /// Open real tunnels. When false only reports are produced.
    pub connect: bool,
    pub show_credentials: bool,
    /// Status lines are appended instead of rewritten in place.
    pub detach: bool,
}

impl GraphOptions {
    pub fn dry_run(show_credentials: bool) -> Self {
        Self {
            connect: false,
            show_credentials,
            detach: false,
        }
    }

    pub fn connect(detach: bool) -> Self {
        Self {
            connect: true,
            show_credentials: false,
            detach,
        }
    }
}

/// Resolves a `hostlookup` record from the vantage point of a parent hop.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Look up `record` on `via`, which is reachable at `via_target`.
    async fn lookup(
        &self,
        via: &HopSpec,
        via_target: &Endpoint,
        record: &str,
        nameserver: Option<&str>,
    ) -> Result<String, RemoteError>;
}

/// Runs `dig` over a one-shot SSH session to the parent hop.
#[derive(Debug, Clone)]
pub struct SshHostResolver {
    pub server_check: ServerCheckMethod,
}

#[async_trait]
impl HostResolver for SshHostResolver {
    async fn lookup(
        &self,
        via: &HopSpec,
        via_target: &Endpoint,
        record: &str,
        nameserver: Option<&str>,
    ) -> Result<String, RemoteError> {
        let proxy_command = via
            .proxycommand
            .clone()
            .filter(|_| via.endpoint().as_ref() == Some(via_target));
        let runner = RemoteCommandRunner::for_hop(via, via_target.clone())
            .with_proxy_command(proxy_command)
            .with_server_check(self.server_check.clone());
        NsLookup::new(record, nameserver).resolve(&runner).await
    }
}

/// Collaborators shared by every walker of one graph.
#[derive(Clone)]
pub struct GraphContext {
    pub hosts: Arc<HostsManager>,
    pub connector: Arc<dyn TunnelConnector>,
    pub resolver: Arc<dyn HostResolver>,
    pub retry: RetryPolicy,
}

impl GraphContext {
    pub fn new(
        hosts: Arc<HostsManager>,
        connector: Arc<dyn TunnelConnector>,
        resolver: Arc<dyn HostResolver>,
    ) -> Self {
        Self {
            hosts,
            connector,
            resolver,
            retry: RetryPolicy::default(),
        }
    }

    /// Real SSH tunnels and lookups.
    pub fn ssh(hosts: Arc<HostsManager>, server_check: ServerCheckMethod) -> Self {
        Self::new(
            hosts,
            Arc::new(SshConnector::new(server_check.clone())),
            Arc::new(SshHostResolver { server_check }),
        )
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// A hop whose subtree could not be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchFailure {
    pub id: String,
    pub error: String,
}

/// What a walker reports back to the collector.
#[derive(Debug)]
pub enum GraphEvent {
    Processed(HopReport),
    TunnelStarted(TunnelBuilder),
    BranchFailed { id: String, error: String },
}

/// A built hop graph: its reports and, in connect mode, its tunnels.
pub struct Tunnels {
    options: GraphOptions,
    ctx: GraphContext,
    reports: Vec<HopReport>,
    tunnels: Vec<TunnelBuilder>,
    failures: Vec<BranchFailure>,
    stopped: bool,
}

impl std::fmt::Debug for Tunnels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnels")
            .field("options", &self.options)
            .field("reports", &self.reports.len())
            .field("tunnels", &self.tunnels.len())
            .field("failures", &self.failures)
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl Tunnels {
    /// Walk `hops` and return once every hop has been attempted.
    pub async fn build(
        hops: &HopSet,
        options: GraphOptions,
        ctx: GraphContext,
    ) -> Result<Self, ConfigError> {
        Self::build_with_cancel(hops, options, ctx, CancellationToken::new()).await
    }

    /// Like [`Tunnels::build`]; hops not yet attempted when `cancel` fires
    /// are skipped. Tunnels already created are kept for [`Tunnels::stop_all`].
    pub async fn build_with_cancel(
        hops: &HopSet,
        options: GraphOptions,
        ctx: GraphContext,
        cancel: CancellationToken,
    ) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for root in hops.roots() {
            validate_tree(root, &mut seen)?;
        }

        let roots: Vec<Arc<HopSpec>> = hops
            .roots()
            .into_iter()
            .map(|root| Arc::new(root.clone()))
            .collect();

        let (events, mut rx) = mpsc::unbounded_channel();
        let walker = Walker {
            ctx: ctx.clone(),
            options,
            events,
            cancel,
        };

        let mut graph = Tunnels {
            options,
            ctx,
            reports: Vec::new(),
            tunnels: Vec::new(),
            failures: Vec::new(),
            stopped: false,
        };

        let collect = async {
            while let Some(event) = rx.recv().await {
                graph.apply(event);
            }
        };
        tokio::join!(walker.run(roots), collect);

        debug!(
            reports = graph.reports.len(),
            tunnels = graph.tunnels.len(),
            failures = graph.failures.len(),
            "Hop graph built"
        );
        Ok(graph)
    }

    fn apply(&mut self, event: GraphEvent) {
        match event {
            GraphEvent::Processed(report) => {
                if self.reports.iter().all(|r| r.id() != report.id()) {
                    self.reports.push(report);
                }
            }
            GraphEvent::TunnelStarted(tunnel) => self.tunnels.push(tunnel),
            GraphEvent::BranchFailed { id, error } => {
                output::failure(&format!("Tunnel ID: {id}. {error}"));
                self.failures.push(BranchFailure { id, error });
            }
        }
    }

    pub fn options(&self) -> GraphOptions {
        self.options
    }

    /// Flattened hop records, one per id, in first-visit order.
    pub fn reports(&self) -> &[HopReport] {
        &self.reports
    }

    pub fn report(&self, id: &str) -> Option<&HopReport> {
        self.reports.iter().find(|r| r.id() == id)
    }

    /// Tunnels in creation order.
    pub fn tunnels(&self) -> &[TunnelBuilder] {
        &self.tunnels
    }

    pub fn failures(&self) -> &[BranchFailure] {
        &self.failures
    }

    /// Write the staged hosts entries. Nothing is written in dry-run mode.
    pub async fn commit_hosts(&self) -> Result<(), HostsFileError> {
        if !self.options.connect {
            return Ok(());
        }
        self.ctx.hosts.commit().await
    }

    /// Restore the hosts file, then close tunnels newest first.
    ///
    /// Safe to call more than once.
    pub async fn stop_all(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if let Err(e) = self.ctx.hosts.restore().await {
            warn!("Failed to restore hosts file: {e}");
            output::failure(&e.to_string());
        }

        output::plain("Stopping tunnels...");
        for tunnel in self.tunnels.iter_mut().rev() {
            tunnel.destroy().await;
        }
        info!(count = self.tunnels.len(), "All tunnels stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Validate every node and reject ids used by more than one node.
fn validate_tree<'a>(node: &'a HopSpec, seen: &mut HashSet<&'a str>) -> Result<(), ConfigError> {
    validate(node)?;
    if !seen.insert(node.id.as_str()) {
        return Err(ConfigError::invalid(Some(&node.id), "hop id is used more than once"));
    }
    node.children().try_for_each(|child| validate_tree(child, seen))
}

/// One traversal of the graph. Cloned into every spawned branch.
#[derive(Clone)]
struct Walker {
    ctx: GraphContext,
    options: GraphOptions,
    events: UnboundedSender<GraphEvent>,
    cancel: CancellationToken,
}

impl Walker {
    async fn run(self, roots: Vec<Arc<HopSpec>>) {
        let mut workers = Vec::new();
        for root in roots {
            let Some(dial) = root.endpoint() else {
                self.fail(&root.id, ConfigError::EmptyField("host"));
                continue;
            };
            if self.options.connect {
                let id = root.id.clone();
                workers.push((id, tokio::spawn(self.clone().make_tunnel(root, dial))));
            } else {
                self.clone().make_tunnel(root, dial).await;
            }
        }
        self.join_workers(workers).await;
    }

    /// Report `node`, then build the edges to its children.
    ///
    /// `dial` is where a session to `node` connects: its declared address
    /// for a root, its own local bind otherwise.
    fn make_tunnel(self, node: Arc<HopSpec>, dial: Endpoint) -> BoxFuture<'static, ()> {
        async move {
            self.emit(GraphEvent::Processed(HopReport::new(
                &node,
                Some(dial.clone()),
                self.options.show_credentials,
            )));

            if let Some(child) = node.nexthop.as_deref() {
                let child = Arc::new(child.clone());
                self.clone()
                    .process_nexthop(Arc::clone(&node), child, dial.clone())
                    .await;
            }
            if let Some(children) = node.nexthops.as_ref().filter(|c| !c.is_empty()) {
                self.process_nexthops(&node, children, dial).await;
            }
        }
        .boxed()
    }

    async fn process_nexthop(self, parent: Arc<HopSpec>, child: Arc<HopSpec>, dial: Endpoint) {
        if self.cancel.is_cancelled() {
            debug!(id = %child.id, "Skipping hop after cancellation");
            return;
        }
        let Some(next_dial) = child.local_bind() else {
            self.fail(&child.id, ConfigError::EmptyField("localbindport"));
            return;
        };

        if self.options.connect && !self.connect_edge(&parent, &child, dial).await {
            self.skip_subtree(&child, next_dial);
            return;
        }

        self.ctx
            .hosts
            .add_to_hosts(&child.id, &child.host_aliases())
            .await;
        self.make_tunnel(child, next_dial).await;
    }

    /// Report `node` and everything below it without building anything.
    /// Every descendant counts as down.
    fn skip_subtree(&self, node: &HopSpec, dial: Endpoint) {
        self.emit(GraphEvent::Processed(HopReport::new(
            node,
            Some(dial),
            self.options.show_credentials,
        )));
        for child in node.children() {
            self.fail(&child.id, format!("Parent {} is down", node.id));
            if let Some(next_dial) = child.local_bind() {
                self.skip_subtree(child, next_dial);
            }
        }
    }

    /// Open the tunnel for `parent -> child`. Returns whether it came up.
    async fn connect_edge(&self, parent: &HopSpec, child: &HopSpec, dial: Endpoint) -> bool {
        let remote = match &child.hostlookup {
            Some(record) => {
                output::notice(&format!(
                    "Tunnel ID: {} - Looking up {} via {}",
                    child.id, record, parent.id
                ));
                match self
                    .ctx
                    .resolver
                    .lookup(parent, &dial, record, child.nameserver.as_deref())
                    .await
                {
                    Ok(address) => {
                        debug!(id = %child.id, %record, %address, "Host lookup resolved");
                        Endpoint::from_parts(&address, child.port)
                    }
                    Err(e) => {
                        self.fail(&child.id, e);
                        return false;
                    }
                }
            }
            None => match child.endpoint() {
                Some(endpoint) => endpoint,
                None => {
                    self.fail(&child.id, ConfigError::EmptyField("host"));
                    return false;
                }
            },
        };

        let spec = match TunnelSpec::between(parent, dial, child, remote) {
            Ok(spec) => spec,
            Err(e) => {
                self.fail(&child.id, e);
                return false;
            }
        };

        let forwarder = self.ctx.connector.forwarder(&spec);
        let mut tunnel = TunnelBuilder::new(spec, forwarder, self.ctx.retry);
        let up = tokio::select! {
            up = tunnel.start() => up,
            _ = self.cancel.cancelled() => false,
        };
        self.emit(GraphEvent::TunnelStarted(tunnel));

        if !up {
            warn!(id = %child.id, "Tunnel is down, its descendants are not built");
        }
        up
    }

    /// Fan-out: each child becomes its own branch through the same parent.
    async fn process_nexthops(&self, node: &HopSpec, children: &[HopSpec], dial: Endpoint) {
        let mut workers = Vec::new();
        for child in children {
            let mut branch = node.clone();
            branch.nexthop = Some(Box::new(child.clone()));
            branch.nexthops = None;

            let walk = self.clone().make_tunnel(Arc::new(branch), dial.clone());
            if self.options.connect {
                workers.push((child.id.clone(), tokio::spawn(walk)));
            } else {
                walk.await;
            }
        }
        self.join_workers(workers).await;
    }

    async fn join_workers(&self, workers: Vec<(String, JoinHandle<()>)>) {
        let (ids, handles): (Vec<_>, Vec<_>) = workers.into_iter().unzip();
        for (id, result) in ids.into_iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                error!(%id, "Tunnel worker failed: {e}");
                self.fail(&id, e);
            }
        }
    }

    fn fail(&self, id: &str, error: impl std::fmt::Display) {
        warn!(%id, "Branch failed: {error}");
        self.emit(GraphEvent::BranchFailed {
            id: id.to_string(),
            error: error.to_string(),
        });
    }

    fn emit(&self, event: GraphEvent) {
        // The collector outlives every walker.
        let _ = self.events.send(event);
    }
}
