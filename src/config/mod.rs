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

//! Connection profiles: hop definitions, includes, secrets and resolution.

mod loader;
mod resolver;
pub mod secrets;
mod types;
mod utils;

pub use loader::{deep_merge, parse_profile, Profile};
pub use resolver::{validate, HopResolver};
pub use secrets::{LastPass, Secret, SecretSource};
pub use types::{
    HopSet, HopSpec, DEFAULT_LOCAL_BIND_ADDRESS, DEFAULT_PROTOCOL, DEFAULT_SSH_PORT,
};
pub use utils::{expand_tilde, get_current_username, resolve_include_path};
