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

//! The coordination store seam.
//!
//! The queue never orders, locks or retries on its own. It relies on two
//! recipes that a consensus-backed key-value store already provides:
//!
//! - **unique key**: atomically create a fresh key under a prefix, ordered
//!   after every key created before it;
//! - **queue dequeue**: remove the oldest key under a prefix, blocking on a
//!   watch until one exists.
//!
//! A client for a real store implements [`CoordinationStore`] by forwarding to
//! those recipes. [`MemoryStore`] implements the same contract in-process.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
pub use memory::MemoryStore;

use crate::error::StoreResult;

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Create a new key `"{prefix}/{suffix}"` holding `value`.
    ///
    /// The key must not have existed before and must sort, by creation order,
    /// after every key already created under `prefix`. Returns the full key.
    async fn create_unique(&self, prefix: &str, value: Bytes) -> StoreResult<String>;

    /// Remove the oldest key under `prefix` and return its value.
    ///
    /// Waits for a put under `prefix` when none exists. The key is gone from
    /// the store by the time the value is returned.
    async fn dequeue(&self, prefix: &str) -> StoreResult<Bytes>;

    /// Number of keys currently under `prefix`.
    async fn len(&self, prefix: &str) -> StoreResult<usize>;
}

#[async_trait]
impl<T: CoordinationStore + ?Sized> CoordinationStore for Arc<T> {
    async fn create_unique(&self, prefix: &str, value: Bytes) -> StoreResult<String> {
        (**self).create_unique(prefix, value).await
    }

    async fn dequeue(&self, prefix: &str) -> StoreResult<Bytes> { (**self).dequeue(prefix).await }

    async fn len(&self, prefix: &str) -> StoreResult<usize> { (**self).len(prefix).await }
}
