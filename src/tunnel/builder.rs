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

//! Lifecycle of a single hop's port forward.
//!
//! A [`TunnelBuilder`] owns one [`Forwarder`]. It starts it under a bounded
//! retry budget, answers liveness polls and tears it down exactly once.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{get_current_username, HopSpec};
use crate::endpoint::Endpoint;
use crate::error::ConfigError;
use crate::forwarding::{ForwardingConfig, ForwardingStatus, LocalForwarder, LocalListener};
use crate::ssh::tokio_client::{
    AuthMethod, Client, ConnectOptions, ConnectTimeouts, ServerCheckMethod,
};
use crate::utils::output;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// How many times to try something and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }
}

/// Connection parameters for one forward: log into `bastion`, listen on
/// `local_bind`, forward to `remote`.
#[derive(Debug, Clone)]
pub struct TunnelSpec {
    /// Id of the hop this tunnel makes reachable.
    pub id: String,
    pub bastion: Endpoint,
    pub user: String,
    pub auth: AuthMethod,
    pub proxy_command: Option<String>,
    pub remote: Endpoint,
    pub local_bind: Endpoint,
}

impl TunnelSpec {
    /// Tunnel through `parent`, dialed at `bastion`, to `child` at `remote`.
    ///
    /// The parent's proxy command only applies when dialing its declared
    /// address; a rewritten bastion is a local listener.
    pub fn between(
        parent: &HopSpec,
        bastion: Endpoint,
        child: &HopSpec,
        remote: Endpoint,
    ) -> Result<Self, ConfigError> {
        let local_bind = child
            .local_bind()
            .ok_or(ConfigError::EmptyField("localbindport"))?;
        let proxy_command = parent
            .proxycommand
            .clone()
            .filter(|_| parent.endpoint().as_ref() == Some(&bastion));

        Ok(Self {
            id: child.id.clone(),
            bastion,
            user: parent
                .sshuser
                .clone()
                .unwrap_or_else(get_current_username),
            auth: AuthMethod::for_hop(parent),
            proxy_command,
            remote,
            local_bind,
        })
    }
}

/// One forwarding session that can be started, polled and stopped.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Open the session and begin listening.
    async fn start(&mut self) -> Result<()>;

    /// Whether the forward is currently usable.
    fn is_active(&self) -> bool;

    /// Close everything. Must be safe to call when not started.
    async fn stop(&mut self);
}

/// Creates the forwarder for each tunnel the graph materializes.
pub trait TunnelConnector: Send + Sync {
    fn forwarder(&self, spec: &TunnelSpec) -> Box<dyn Forwarder>;
}

/// Production connector: russh sessions with a local listener each.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    pub server_check: Option<ServerCheckMethod>,
    pub timeouts: ConnectTimeouts,
    pub forwarding: ForwardingConfig,
}

impl SshConnector {
    pub fn new(server_check: ServerCheckMethod) -> Self {
        Self {
            server_check: Some(server_check),
            ..Self::default()
        }
    }
}

impl TunnelConnector for SshConnector {
    fn forwarder(&self, spec: &TunnelSpec) -> Box<dyn Forwarder> {
        Box::new(SshForwarder {
            spec: spec.clone(),
            server_check: self
                .server_check
                .clone()
                .unwrap_or(ServerCheckMethod::NoCheck),
            timeouts: self.timeouts,
            forwarding: self.forwarding.clone(),
            running: None,
        })
    }
}

struct Running {
    client: Arc<Client>,
    cancel_token: CancellationToken,
    status: watch::Receiver<ForwardingStatus>,
    task: JoinHandle<Result<()>>,
}

/// Local forward over one russh session.
pub struct SshForwarder {
    spec: TunnelSpec,
    server_check: ServerCheckMethod,
    timeouts: ConnectTimeouts,
    forwarding: ForwardingConfig,
    running: Option<Running>,
}

#[async_trait]
impl Forwarder for SshForwarder {
    async fn start(&mut self) -> Result<()> {
        self.stop().await;

        let options = ConnectOptions::new(
            self.spec.bastion.clone(),
            &self.spec.user,
            self.spec.auth.clone(),
        )
        .with_proxy_command(self.spec.proxy_command.clone())
        .with_server_check(self.server_check.clone())
        .with_timeouts(self.timeouts);

        let client = Client::connect_with_options(options)
            .await
            .with_context(|| format!("Could not connect to {}", self.spec.bastion))?;
        let client = Arc::new(client);

        let listener = match LocalListener::bind(&self.spec.local_bind).await {
            Ok(listener) => listener,
            Err(e) => {
                let _ = client.disconnect().await;
                return Err(e);
            }
        };

        let cancel_token = CancellationToken::new();
        let forwarder = LocalForwarder::new(
            Arc::clone(&client),
            self.spec.remote.clone(),
            self.forwarding.clone(),
            cancel_token.clone(),
        );
        let status = forwarder.subscribe();
        let task = tokio::spawn(forwarder.run(listener));

        self.running = Some(Running {
            client,
            cancel_token,
            status,
            task,
        });
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.running.as_ref().is_some_and(|running| {
            !running.client.is_closed()
                && !running.task.is_finished()
                && !matches!(
                    *running.status.borrow(),
                    ForwardingStatus::Stopped | ForwardingStatus::Failed(_)
                )
        })
    }

    async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel_token.cancel();
        match running.task.await {
            Ok(Err(e)) => debug!("Forwarder for {} ended with: {:#}", self.spec.id, e),
            Err(e) => warn!("Forwarder task for {} failed: {}", self.spec.id, e),
            Ok(Ok(())) => {}
        }
        if let Err(e) = running.client.disconnect().await {
            debug!("Disconnect from {} failed: {}", self.spec.bastion, e);
        }
    }
}

/// Owns exactly one forward for one hop.
pub struct TunnelBuilder {
    spec: TunnelSpec,
    forwarder: Box<dyn Forwarder>,
    retry: RetryPolicy,
    destroyed: bool,
}

impl std::fmt::Debug for TunnelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelBuilder")
            .field("spec", &self.spec)
            .field("retry", &self.retry)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl TunnelBuilder {
    pub fn new(spec: TunnelSpec, forwarder: Box<dyn Forwarder>, retry: RetryPolicy) -> Self {
        Self {
            spec,
            forwarder,
            retry,
            destroyed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn spec(&self) -> &TunnelSpec {
        &self.spec
    }

    /// Try to bring the forward up. Never fails; returns whether it is up.
    pub async fn start(&mut self) -> bool {
        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            let error = match self.forwarder.start().await {
                Ok(()) if self.forwarder.is_active() => {
                    output::success(&format!(
                        "Tunnel ID: {} - Created {} to {}",
                        self.spec.id, self.spec.local_bind, self.spec.remote
                    ));
                    return true;
                }
                Ok(()) => "forwarder did not become active".to_string(),
                Err(e) => format!("{e:#}"),
            };

            output::failure(&format!(
                "Tunnel ID: {}. Failed to start tunnel. Attempt {} of {}. Error: {}",
                self.spec.id, attempt, attempts, error
            ));
            self.forwarder.stop().await;

            if attempt < attempts {
                output::notice(&format!(
                    "Tunnel ID: {} - Retrying in {}s...",
                    self.spec.id,
                    self.retry.backoff.as_secs()
                ));
                tokio::time::sleep(self.retry.backoff).await;
            }
        }
        false
    }

    pub fn is_up(&self) -> bool {
        !self.destroyed && self.forwarder.is_active()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Close the forward. Later calls do nothing.
    pub async fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        output::plain(&format!(
            "Closing tunnel {} at {}...",
            self.spec.id, self.spec.local_bind
        ));
        self.forwarder.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Counters {
        starts: AtomicU32,
        stops: AtomicU32,
    }

    struct Scripted {
        counters: Arc<Counters>,
        succeed_on: Option<u32>,
        active: bool,
    }

    #[async_trait]
    impl Forwarder for Scripted {
        async fn start(&mut self) -> Result<()> {
            let n = self.counters.starts.fetch_add(1, Ordering::SeqCst) + 1;
            self.active = self.succeed_on.is_some_and(|k| n >= k);
            if self.active {
                Ok(())
            } else {
                Err(anyhow::anyhow!("connection refused"))
            }
        }

        fn is_active(&self) -> bool {
            self.active
        }

        async fn stop(&mut self) {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
            self.active = false;
        }
    }

    fn spec() -> TunnelSpec {
        let parent = HopSpec::new("bastion", 10000).with_host("example.com", 2222);
        let child = HopSpec::new("svc", 10001).with_host("10.0.0.5", 80);
        TunnelSpec::between(
            &parent,
            parent.endpoint().unwrap(),
            &child,
            child.endpoint().unwrap(),
        )
        .unwrap()
    }

    fn builder(succeed_on: Option<u32>) -> (TunnelBuilder, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let forwarder = Scripted {
            counters: Arc::clone(&counters),
            succeed_on,
            active: false,
        };
        (
            TunnelBuilder::new(
                spec(),
                Box::new(forwarder),
                RetryPolicy::new(3, Duration::ZERO),
            ),
            counters,
        )
    }

    #[tokio::test]
    async fn test_never_active_uses_exactly_three_attempts() {
        let (mut tunnel, counters) = builder(None);
        assert!(!tunnel.start().await);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 3);
        assert!(!tunnel.is_up());
    }

    #[tokio::test]
    async fn test_success_on_second_attempt() {
        let (mut tunnel, counters) = builder(Some(2));
        assert!(tunnel.start().await);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 2);
        assert!(tunnel.is_up());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let (mut tunnel, counters) = builder(Some(1));
        tunnel.start().await;
        tunnel.destroy().await;
        tunnel.destroy().await;
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        assert!(tunnel.is_destroyed());
        assert!(!tunnel.is_up());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_attempts_only() {
        let counters = Arc::new(Counters::default());
        let mut tunnel = TunnelBuilder::new(
            spec(),
            Box::new(Scripted {
                counters,
                succeed_on: None,
                active: false,
            }),
            RetryPolicy::default(),
        );
        let started = tokio::time::Instant::now();
        tunnel.start().await;
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn test_spec_between_uses_parent_credentials() {
        let mut parent = HopSpec::new("bastion", 10000).with_host("example.com", 2222);
        parent.sshuser = Some("ops".into());
        parent.sshpass = Some("pw".into());
        parent.proxycommand = Some("nc %h %p".into());
        let child = HopSpec::new("svc", 10001).with_host("10.0.0.5", 80);

        let direct = TunnelSpec::between(
            &parent,
            parent.endpoint().unwrap(),
            &child,
            child.endpoint().unwrap(),
        )
        .unwrap();
        assert_eq!(direct.user, "ops");
        assert_eq!(direct.auth, AuthMethod::with_password("pw"));
        assert_eq!(direct.bastion, Endpoint::tcp("example.com", 2222));
        assert_eq!(direct.local_bind, Endpoint::tcp("127.0.0.1", 10001));
        assert_eq!(direct.remote, Endpoint::tcp("10.0.0.5", 80));
        assert_eq!(direct.proxy_command.as_deref(), Some("nc %h %p"));

        let rewritten = TunnelSpec::between(
            &parent,
            Endpoint::tcp("127.0.0.1", 10000),
            &child,
            child.endpoint().unwrap(),
        )
        .unwrap();
        assert_eq!(rewritten.proxy_command, None);
    }
}
