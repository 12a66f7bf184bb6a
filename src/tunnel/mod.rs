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

//! Building, reporting and supervising a graph of chained tunnels.

pub mod builder;
pub mod graph;
pub mod monitor;
pub mod report;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{
    Forwarder, RetryPolicy, SshConnector, SshForwarder, TunnelBuilder, TunnelConnector, TunnelSpec,
};
pub use graph::{
    BranchFailure, GraphContext, GraphEvent, GraphOptions, HostResolver, SshHostResolver, Tunnels,
};
pub use monitor::{
    pid_file_path, read_pid, signal_stop, wait_for_shutdown, PidFile, StatusSummary,
    MONITOR_INTERVAL,
};
pub use report::{url_map, HopReport};
