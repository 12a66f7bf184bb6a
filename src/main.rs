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
use clap::Parser;

use tunnelgraf::{
    cli::{Cli, Commands},
    commands::{connect::connect, exec::execute_command, load_hops, show, stop::stop},
    ssh::get_check_method,
    utils::init_logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let code = run(cli).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<i32> {
    // stop only needs the pid file, not a resolvable profile
    if cli.command == Commands::Stop {
        return stop(&cli.profile);
    }

    let (profile, hops) = load_hops(&cli.profile, cli.ssh_config.as_deref()).await?;
    let server_check = get_check_method(cli.strict_host_key_checking);

    match cli.command {
        Commands::Connect { detach } => connect(&profile.path, &hops, detach, server_check).await,
        Commands::Show {
            tunnel_id,
            show_credentials,
        } => show::show(&hops, tunnel_id.as_deref(), show_credentials).await,
        Commands::Urls => show::urls(&hops).await,
        Commands::Command { tunnel_id, command } => {
            execute_command(&hops, &tunnel_id, &command, server_check).await
        }
        Commands::Stop => stop(&profile.path),
    }
}
