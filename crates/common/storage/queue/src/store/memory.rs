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

use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::atomic::{AtomicBool, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use bytes::Bytes;
use snafu::ensure;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use super::CoordinationStore;
use crate::error::{ClosedSnafu, KeyConflictSnafu, StoreResult};

/// Suffix bumps tried before giving up on a unique key.
const MAX_CREATE_ATTEMPTS: u64 = 16;

#[derive(Debug)]
struct Entry {
    create_revision: u64,
    value:           Bytes,
}

#[derive(Debug, Default)]
struct State {
    /// Store-wide revision, bumped by every put.
    revision: u64,
    entries:  BTreeMap<String, Entry>,
}

impl State {
    fn under<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = (&'a String, &'a Entry)> + 'a {
        self.entries
            .range::<str, _>((Bound::Included(dir), Bound::Unbounded))
            .take_while(move |(key, _)| key.starts_with(dir))
    }

    fn take_oldest(&mut self, dir: &str) -> Option<(String, u64, Bytes)> {
        let key = self
            .under(dir)
            .min_by_key(|(_, entry)| entry.create_revision)
            .map(|(key, _)| key.clone())?;
        self.entries
            .remove(&key)
            .map(|entry| (key, entry.create_revision, entry.value))
    }
}

/// In-process coordination store with the unique-key and queue recipe
/// semantics of a consensus-backed store.
///
/// Keys are `"{prefix}/{unix-nanos}"`; FIFO order follows the creation
/// revision, not the key text. Used by tests and the demo binary.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state:      Mutex<State>,
    put_notify: Notify,
    closed:     AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Reject all further calls and wake every blocked `dequeue`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.put_notify.notify_waiters();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::SeqCst) }

    /// Keys under `prefix` in creation order.
    pub async fn keys(&self, prefix: &str) -> Vec<String> {
        let dir = dir_prefix(prefix);
        let state = self.state.lock().await;
        let mut keys: Vec<_> = state
            .under(&dir)
            .map(|(key, entry)| (entry.create_revision, key.clone()))
            .collect();
        keys.sort_unstable();
        keys.into_iter().map(|(_, key)| key).collect()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn create_unique(&self, prefix: &str, value: Bytes) -> StoreResult<String> {
        ensure!(!self.is_closed(), ClosedSnafu);

        let mut state = self.state.lock().await;
        let base = unix_nanos();
        let key = (0..MAX_CREATE_ATTEMPTS)
            .map(|bump| format!("{}{:020}", dir_prefix(prefix), base.saturating_add(bump)))
            .find(|key| !state.entries.contains_key(key));
        let Some(key) = key else {
            return KeyConflictSnafu {
                key: format!("{}{base:020}", dir_prefix(prefix)),
            }
            .fail();
        };

        state.revision += 1;
        let create_revision = state.revision;
        state.entries.insert(
            key.clone(),
            Entry {
                create_revision,
                value,
            },
        );
        drop(state);

        self.put_notify.notify_waiters();
        debug!(key = %key, create_revision, "created unique key");
        Ok(key)
    }

    async fn dequeue(&self, prefix: &str) -> StoreResult<Bytes> {
        let dir = dir_prefix(prefix);
        loop {
            // Register for the next put before looking, so one landing between
            // the scan and the await is not missed.
            let notified = self.put_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            ensure!(!self.is_closed(), ClosedSnafu);

            if let Some((key, create_revision, value)) = self.state.lock().await.take_oldest(&dir) {
                debug!(key = %key, create_revision, "dequeued oldest key");
                return Ok(value);
            }

            notified.await;
        }
    }

    async fn len(&self, prefix: &str) -> StoreResult<usize> {
        ensure!(!self.is_closed(), ClosedSnafu);
        let dir = dir_prefix(prefix);
        Ok(self.state.lock().await.under(&dir).count())
    }
}

fn dir_prefix(prefix: &str) -> String { format!("{prefix}/") }

fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}
