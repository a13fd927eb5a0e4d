// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ensure;

use crate::{Result, error::InvalidConfigSnafu};

/// Default upper bound on an encoded record.
pub const DEFAULT_MAX_RECORD_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct QueueConfig {
    /// Store prefix all records live under. Usually the map id.
    #[default = "queue"]
    pub key_prefix:      String,
    #[default(DEFAULT_MAX_RECORD_SIZE)]
    pub max_record_size: usize,
    /// How long a single `dequeue` waits for a record. `None` waits forever.
    pub dequeue_timeout: Option<Duration>,
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.key_prefix.is_empty(),
            InvalidConfigSnafu {
                message: "key prefix must not be empty",
            }
        );
        ensure!(
            !self.key_prefix.ends_with('/'),
            InvalidConfigSnafu {
                message: format!("key prefix {:?} must not end with '/'", self.key_prefix),
            }
        );
        ensure!(
            self.max_record_size > 0,
            InvalidConfigSnafu {
                message: "max record size must be positive",
            }
        );
        if let Some(timeout) = self.dequeue_timeout {
            ensure!(
                !timeout.is_zero(),
                InvalidConfigSnafu {
                    message: "dequeue timeout must be positive",
                }
            );
        }
        Ok(())
    }
}
