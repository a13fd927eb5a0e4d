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

use std::{sync::Arc, time::Duration};

use crate::{CoordinationStore, Queue, QueueConfig, Result};

pub struct QueueBuilder<S: ?Sized> {
    store:  Arc<S>,
    config: QueueConfig,
}

impl<S: CoordinationStore + ?Sized> QueueBuilder<S> {
    pub fn new(store: Arc<S>, map_id: impl Into<String>) -> Self {
        Self {
            store,
            config: QueueConfig {
                key_prefix: map_id.into(),
                ..Default::default()
            },
        }
    }

    #[must_use]
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn max_record_size(mut self, size: usize) -> Self {
        self.config.max_record_size = size;
        self
    }

    #[must_use]
    pub fn dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.config.dequeue_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Queue<S>> {
        self.config.validate()?;
        Ok(Queue::with_config(self.store, self.config))
    }
}
