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

//! Colored progress lines on stdout.
//!
//! Green means up, yellow means retrying or waiting, red means failed.

use owo_colors::OwoColorize;
use std::io::Write;

pub fn success(message: &str) {
    println!("{}", message.green());
}

pub fn notice(message: &str) {
    println!("{}", message.yellow());
}

pub fn failure(message: &str) {
    println!("{}", message.red());
}

pub fn plain(message: &str) {
    println!("{message}");
}

/// Overwrite the current terminal line.
pub fn status_line(message: &str, healthy: bool) {
    let mut stdout = std::io::stdout().lock();
    let _ = if healthy {
        write!(stdout, "\r\x1b[2K{}", message.green())
    } else {
        write!(stdout, "\r\x1b[2K{}", message.red())
    };
    let _ = stdout.flush();
}

/// Append a timestamped status line, for logs captured from a detached run.
pub fn status_record(message: &str, healthy: bool) {
    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    if healthy {
        success(&format!("{stamp} {message}"));
    } else {
        failure(&format!("{stamp} {message}"));
    }
}
