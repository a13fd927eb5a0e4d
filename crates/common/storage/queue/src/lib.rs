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

//! Single-reader, multi-writer FIFO queue on top of a coordination store.
//!
//! Ordering, atomic key creation and blocking removal come from the store's
//! unique-key and queue recipes, reached through [`CoordinationStore`]. This
//! crate encodes [`Record`]s, forwards them, and dispatches what comes back to
//! a [`RecordHandler`].

pub mod builder;
pub mod config;
pub mod consumer;
pub mod error;
pub mod queue;
pub mod record;
pub mod store;

pub use builder::QueueBuilder;
pub use config::{DEFAULT_MAX_RECORD_SIZE, QueueConfig};
pub use consumer::{Consumer, ConsumerHandle, ConsumerStats};
pub use error::{BoxError, QueueError, Result, StoreError, StoreResult};
pub use queue::{HandlerResult, MutationQueue, Queue, RecordHandler};
pub use record::Record;
pub use store::{CoordinationStore, MemoryStore};
