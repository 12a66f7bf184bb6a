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

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::ssh::StrictHostKeyChecking;

/// Environment variable holding the default profile path.
pub const CONFIG_ENV: &str = "TUNNELGRAF_CONFIG";

#[derive(Parser, Debug)]
#[command(
    name = "tunnelgraf",
    version,
    about = "Build and supervise chains of SSH port-forward tunnels",
    long_about = "tunnelgraf reads a profile describing a graph of SSH hops and opens one local\nport forward per hop, each dialing through its parent's forward. Hosts file aliases\nare added while the tunnels run and restored on shutdown.",
    after_help = "EXAMPLES:\n  Open all tunnels:            tunnelgraf -p prod.yaml connect\n  Show resolved hops:          tunnelgraf -p prod.yaml show\n  Show one hop with secrets:   tunnelgraf -p prod.yaml show -t db --show-credentials\n  List local URLs:             tunnelgraf -p prod.yaml urls\n  Run a command on a hop:      tunnelgraf -p prod.yaml command -t db uptime\n  Stop a detached run:         tunnelgraf -p prod.yaml stop"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'p',
        long,
        env = CONFIG_ENV,
        help = "Tunnel profile (YAML)"
    )]
    pub profile: PathBuf,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    #[arg(
        long,
        help = "SSH configuration file [default: ~/.ssh/config]"
    )]
    pub ssh_config: Option<PathBuf>,

    #[arg(
        long,
        default_value = "no",
        help = "Host key checking mode (yes/no) [default: no]\n  yes - Check host keys against ~/.ssh/known_hosts\n  no  - Accept any host key"
    )]
    pub strict_host_key_checking: StrictHostKeyChecking,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    #[command(
        about = "Open every tunnel and supervise them",
        long_about = "Opens the tunnels in the profile, writes hosts file aliases and prints tunnel\nstatus every few seconds. Stops on Ctrl-C, SIGTERM or when 'q' is entered.\n\nExit codes: 0 (clean shutdown), 1 (configuration or hosts file error)"
    )]
    Connect {
        #[arg(long, help = "Print one status line per check instead of updating in place")]
        detach: bool,
    },

    #[command(about = "Print the resolved hops as JSON")]
    Show {
        #[arg(short = 't', long = "tunnel-id", help = "Only show this hop")]
        tunnel_id: Option<String>,

        #[arg(long, help = "Include sshuser, sshpass and sshkeyfile")]
        show_credentials: bool,
    },

    #[command(about = "Print the local URLs of every hop as JSON")]
    Urls,

    #[command(
        about = "Run a command on a hop",
        long_about = "Runs a command over a fresh SSH session to the hop. Hops behind a bastion are\nreached through their local forward, so a 'connect' for the same profile must be running.\n\nThe remote exit status becomes the exit status of tunnelgraf."
    )]
    Command {
        #[arg(short = 't', long = "tunnel-id", help = "Hop to run the command on")]
        tunnel_id: String,

        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    #[command(about = "Stop a running 'connect' for this profile")]
    Stop,
}
