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

//! DNS lookups from the vantage point of a remote hop.

use crate::error::RemoteError;
use crate::remote::CommandRunner;

/// A `dig +short` query, optionally against a specific nameserver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsLookup {
    record: String,
    nameserver: Option<String>,
}

impl NsLookup {
    pub fn new(record: impl Into<String>, nameserver: Option<&str>) -> Self {
        Self {
            record: record.into(),
            nameserver: nameserver.map(str::to_string),
        }
    }

    pub fn command(&self) -> String {
        match &self.nameserver {
            Some(ns) => format!("dig +short {} @{}", self.record, ns),
            None => format!("dig +short {}", self.record),
        }
    }

    /// Run the query through `runner` and return the address.
    ///
    /// CNAME chains print one line per step; the address is the last one.
    pub async fn resolve(&self, runner: &dyn CommandRunner) -> Result<String, RemoteError> {
        let command = self.command();
        let output = runner.run(&command).await?;
        output
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or(RemoteError::EmptyResult { command })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        reply: Result<String, ()>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for Canned {
        async fn run(&self, command: &str) -> Result<String, RemoteError> {
            self.seen.lock().unwrap().push(command.to_string());
            self.reply.clone().map_err(|_| RemoteError::EmptyResult {
                command: command.to_string(),
            })
        }
    }

    fn canned(reply: Result<&str, ()>) -> Canned {
        Canned {
            reply: reply.map(str::to_string),
            seen: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn test_command_forms() {
        assert_eq!(NsLookup::new("db.internal", None).command(), "dig +short db.internal");
        assert_eq!(
            NsLookup::new("db.internal", Some("10.0.0.2")).command(),
            "dig +short db.internal @10.0.0.2"
        );
    }

    #[tokio::test]
    async fn test_resolve_takes_last_line() {
        let runner = canned(Ok("alias.internal.\n10.0.0.7"));
        let ip = NsLookup::new("db.internal", Some("10.0.0.2"))
            .resolve(&runner)
            .await
            .unwrap();
        assert_eq!(ip, "10.0.0.7");
        assert_eq!(
            runner.seen.lock().unwrap().as_slice(),
            ["dig +short db.internal @10.0.0.2"]
        );
    }

    #[tokio::test]
    async fn test_empty_result_propagates() {
        let runner = canned(Err(()));
        let err = NsLookup::new("nope", None).resolve(&runner).await.unwrap_err();
        assert!(matches!(err, RemoteError::EmptyResult { .. }));
    }
}
