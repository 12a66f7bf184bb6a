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

use super::tokio_client::ServerCheckMethod;
use std::path::PathBuf;
use std::str::FromStr;

/// Get the default known_hosts file path
pub fn get_default_known_hosts_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts"))
}

/// Create a ServerCheckMethod based on strict host key checking mode
pub fn get_check_method(strict_mode: StrictHostKeyChecking) -> ServerCheckMethod {
    match strict_mode {
        StrictHostKeyChecking::Yes => match get_default_known_hosts_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Using known_hosts file: {:?} (strict mode)", path);
                ServerCheckMethod::DefaultKnownHostsFile
            }
            Some(path) => {
                tracing::warn!(
                    "Known hosts file not found at {:?}, host key verification disabled",
                    path
                );
                ServerCheckMethod::NoCheck
            }
            None => {
                tracing::warn!("Could not determine known_hosts path, using NoCheck");
                ServerCheckMethod::NoCheck
            }
        },
        StrictHostKeyChecking::No => {
            tracing::debug!("Host key checking disabled (strict mode = no)");
            ServerCheckMethod::NoCheck
        }
    }
}

/// Mode for host key checking.
///
/// Tunnel hops routinely land on loopback ports whose keys change between
/// runs, so checking is off unless asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrictHostKeyChecking {
    /// Verify host keys against `~/.ssh/known_hosts`
    Yes,
    /// Accept any host key
    #[default]
    No,
}

impl FromStr for StrictHostKeyChecking {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" | "true" => Ok(Self::Yes),
            "no" | "false" => Ok(Self::No),
            other => Err(format!("invalid host key checking mode '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_host_key_checking_from_str() {
        assert_eq!(
            StrictHostKeyChecking::from_str("yes").unwrap(),
            StrictHostKeyChecking::Yes
        );
        assert_eq!(
            StrictHostKeyChecking::from_str("TRUE").unwrap(),
            StrictHostKeyChecking::Yes
        );
        assert_eq!(
            StrictHostKeyChecking::from_str("no").unwrap(),
            StrictHostKeyChecking::No
        );
        assert!(StrictHostKeyChecking::from_str("accept-new").is_err());
    }

    #[test]
    fn test_default_is_no() {
        assert_eq!(StrictHostKeyChecking::default(), StrictHostKeyChecking::No);
    }

    #[test]
    fn test_get_check_method() {
        let method = get_check_method(StrictHostKeyChecking::No);
        assert!(matches!(method, ServerCheckMethod::NoCheck));

        let method = get_check_method(StrictHostKeyChecking::Yes);
        assert!(matches!(
            method,
            ServerCheckMethod::DefaultKnownHostsFile | ServerCheckMethod::NoCheck
        ));
    }
}
