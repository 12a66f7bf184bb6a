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
use std::path::Path;

use crate::tunnel::{pid_file_path, signal_stop};
use crate::utils::output;

/// Signal the `connect` running for `profile` to shut down.
pub fn stop(profile: &Path) -> Result<i32> {
    let pid = signal_stop(&pid_file_path(profile))?;
    output::notice(&format!("Sent stop signal to tunnelgraf (pid {pid})"));
    Ok(0)
}
