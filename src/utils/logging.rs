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

use tracing_subscriber::EnvFilter;

/// Base log level when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "TUNNELGRAF_LOG_LEVEL";

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Create an environment filter from the base level and `-v` count.
pub fn create_env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        // RUST_LOG allows debugging russh and other dependencies
        return EnvFilter::from_default_env();
    }
    EnvFilter::new(filter_directives(
        std::env::var(LOG_LEVEL_ENV).ok().as_deref(),
        verbosity,
    ))
}

fn filter_directives(base: Option<&str>, verbosity: u8) -> String {
    let base = base
        .map(|b| b.trim().to_lowercase())
        .and_then(|b| LEVELS.iter().position(|l| *l == b))
        .unwrap_or(2);
    let level = LEVELS[(base + verbosity as usize).min(LEVELS.len() - 1)];
    if verbosity >= 2 {
        format!("tunnelgraf={level},russh={level}")
    } else {
        format!("tunnelgraf={level}")
    }
}

/// Initialize logging to stderr.
pub fn init_logging(verbosity: u8) {
    let filter = create_env_filter(verbosity);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
