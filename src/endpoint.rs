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

//! Network endpoints a hop can dial or listen on.

use std::fmt;
use std::path::{Path, PathBuf};

/// A TCP address or a Unix domain socket path.
///
/// Hop definitions carry addresses as plain strings; any string containing a
/// path separator is a socket path and its paired port is not used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    UnixSocket { path: PathBuf },
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Classify `address`, pairing it with `port` when it is a TCP host.
    pub fn from_parts(address: &str, port: u16) -> Self {
        if is_socket_path(address) {
            Self::UnixSocket {
                path: PathBuf::from(address),
            }
        } else {
            Self::tcp(address, port)
        }
    }

    pub fn is_unix_socket(&self) -> bool {
        matches!(self, Self::UnixSocket { .. })
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            Self::Tcp { host, .. } => Some(host),
            Self::UnixSocket { .. } => None,
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Tcp { port, .. } => Some(*port),
            Self::UnixSocket { .. } => None,
        }
    }

    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            Self::Tcp { .. } => None,
            Self::UnixSocket { path } => Some(path),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::UnixSocket { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Hostnames and IP literals never contain a path separator.
pub fn is_socket_path(address: &str) -> bool {
    address.contains('/')
}
