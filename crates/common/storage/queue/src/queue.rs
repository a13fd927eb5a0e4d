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

//! The queue handle and its callback traits.
//!
//! A [`Queue`] is a single-reader, multi-writer FIFO bound to one key prefix
//! of a [`CoordinationStore`]:
//! - Writers call [`enqueue`](Queue::enqueue) or
//!   [`advance_epoch`](Queue::advance_epoch); each call creates one unique key
//! - The reader calls [`dequeue`](Queue::dequeue), which blocks until the
//!   oldest key is removed and then hands its record to a [`RecordHandler`]
//!
//! ## Usage
//!
//! ```ignore
//! let store = Arc::new(MemoryStore::new());
//! let queue = Queue::new(store, "map-1");
//!
//! queue.enqueue("index", "leaf").await?;
//! queue.advance_epoch().await?;
//!
//! queue.dequeue(&mut signer).await?; // process_key_value("index", "leaf")
//! queue.dequeue(&mut signer).await?; // advance_epoch()
//! ```
//!
//! ## Delivery
//!
//! The store removes a key before its value is returned, so a record whose
//! handler fails is not seen again.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use snafu::{OptionExt, ResultExt};
use tracing::debug;

use crate::{
    CoordinationStore, QueueBuilder, QueueConfig, Result,
    error::{BoxError, DequeueTimeoutSnafu, HandlerSnafu, StoreSnafu},
    record::Record,
};

/// Result type returned by [`RecordHandler`] callbacks.
pub type HandlerResult = std::result::Result<(), BoxError>;

/// Callbacks invoked by [`Queue::dequeue`], one per record.
#[async_trait]
pub trait RecordHandler: Send {
    /// Called for every mutation record.
    async fn process_key_value(&mut self, key: Bytes, value: Bytes) -> HandlerResult;

    /// Called for every advance-epoch marker.
    async fn advance_epoch(&mut self) -> HandlerResult;
}

/// The queue interface producers and the signer depend on.
#[async_trait]
pub trait MutationQueue: Send + Sync {
    /// Submit a mutation. Returns the store key it was written to.
    async fn enqueue(&self, key: Bytes, value: Bytes) -> Result<String>;

    /// Submit an advance-epoch marker. Returns the store key it was written
    /// to.
    async fn advance_epoch(&self) -> Result<String>;

    async fn dequeue(&self, handler: &mut dyn RecordHandler) -> Result<()>;
}

/// A FIFO of [`Record`]s stored under one prefix of a coordination store.
///
/// Cloning is cheap; clones share the store client and configuration, so any
/// number of writers can hold one. Only one task should dequeue at a time.
pub struct Queue<S: ?Sized> {
    store:  Arc<S>,
    config: Arc<QueueConfig>,
}

impl<S: ?Sized> Clone for Queue<S> {
    fn clone(&self) -> Self {
        Self {
            store:  self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: CoordinationStore + ?Sized> Queue<S> {
    /// Bind a queue to `store`, using `map_id` as the key prefix.
    pub fn new(store: Arc<S>, map_id: impl Into<String>) -> Self {
        Self::with_config(
            store,
            QueueConfig {
                key_prefix: map_id.into(),
                ..Default::default()
            },
        )
    }

    pub fn builder(store: Arc<S>, map_id: impl Into<String>) -> QueueBuilder<S> {
        QueueBuilder::new(store, map_id)
    }

    pub(crate) fn with_config(store: Arc<S>, config: QueueConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// Submit a key/value mutation. Returns the store key it was written to.
    pub async fn enqueue(&self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<String> {
        self.submit(&Record::mutation(key, value)).await
    }

    /// Submit an advance-epoch marker. Returns the store key it was written
    /// to.
    pub async fn advance_epoch(&self) -> Result<String> { self.submit(&Record::AdvanceEpoch).await }

    async fn submit(&self, record: &Record) -> Result<String> {
        let data = record.encode(self.config.max_record_size)?;
        let size = data.len();

        let key = self
            .store
            .create_unique(&self.config.key_prefix, data)
            .await
            .context(StoreSnafu {
                operation: "create_unique",
            })?;

        debug!(
            key = %key,
            size,
            advance_epoch = record.is_advance_epoch(),
            "record enqueued"
        );
        Ok(key)
    }

    /// Remove the oldest record and decode it without dispatching.
    ///
    /// Blocks until a record exists, or until `dequeue_timeout` elapses when
    /// one is configured. Dropping the returned future before it completes
    /// leaves the queue untouched.
    pub async fn next_record(&self) -> Result<Record> {
        let pending = self.store.dequeue(&self.config.key_prefix);
        let data = match self.config.dequeue_timeout {
            Some(timeout) => tokio::time::timeout(timeout, pending)
                .await
                .ok()
                .context(DequeueTimeoutSnafu { timeout })?,
            None => pending.await,
        }
        .context(StoreSnafu {
            operation: "dequeue",
        })?;

        Record::decode(&data, self.config.max_record_size)
    }

    /// Remove the oldest record and hand it to `handler`.
    ///
    /// Markers go to [`RecordHandler::advance_epoch`], mutations to
    /// [`RecordHandler::process_key_value`]. The handler's error is returned.
    pub async fn dequeue<H: RecordHandler + ?Sized>(&self, handler: &mut H) -> Result<()> {
        let record = self.next_record().await?;
        dispatch(record, handler).await
    }

    /// Number of records waiting in the store.
    pub async fn len(&self) -> Result<usize> {
        self.store
            .len(&self.config.key_prefix)
            .await
            .context(StoreSnafu { operation: "len" })
    }

    pub async fn is_empty(&self) -> Result<bool> { Ok(self.len().await? == 0) }

    #[must_use]
    pub fn config(&self) -> &QueueConfig { &self.config }

    #[must_use]
    pub const fn store(&self) -> &Arc<S> { &self.store }
}

/// Route one decoded record to the matching handler callback.
pub async fn dispatch<H: RecordHandler + ?Sized>(record: Record, handler: &mut H) -> Result<()> {
    match record {
        Record::AdvanceEpoch => handler.advance_epoch().await,
        Record::Mutation { key, value } => handler.process_key_value(key, value).await,
    }
    .context(HandlerSnafu)
}

#[async_trait]
impl<S: CoordinationStore + ?Sized> MutationQueue for Queue<S> {
    async fn enqueue(&self, key: Bytes, value: Bytes) -> Result<String> {
        self.submit(&Record::Mutation { key, value }).await
    }

    async fn advance_epoch(&self) -> Result<String> { self.submit(&Record::AdvanceEpoch).await }

    async fn dequeue(&self, handler: &mut dyn RecordHandler) -> Result<()> {
        let record = self.next_record().await?;
        dispatch(record, handler).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{MemoryStore, QueueError, StoreError};

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        Mutation(Bytes, Bytes),
        Epoch,
    }

    #[derive(Default)]
    struct Recorder {
        events:     Vec<Event>,
        fail_epoch: bool,
    }

    #[async_trait]
    impl RecordHandler for Recorder {
        async fn process_key_value(&mut self, key: Bytes, value: Bytes) -> HandlerResult {
            self.events.push(Event::Mutation(key, value));
            Ok(())
        }

        async fn advance_epoch(&mut self) -> HandlerResult {
            if self.fail_epoch {
                return Err("epoch rejected".into());
            }
            self.events.push(Event::Epoch);
            Ok(())
        }
    }

    fn queue() -> Queue<MemoryStore> { Queue::new(Arc::new(MemoryStore::new()), "map-1") }

    #[tokio::test]
    async fn test_enqueue_then_dequeue_in_order() {
        let queue = queue();
        queue.enqueue("k1", "v1").await.unwrap();
        queue.advance_epoch().await.unwrap();
        queue.enqueue("k2", "v2").await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 3);

        let mut recorder = Recorder::default();
        for _ in 0..3 {
            queue.dequeue(&mut recorder).await.unwrap();
        }

        assert_eq!(
            recorder.events,
            vec![
                Event::Mutation(Bytes::from("k1"), Bytes::from("v1")),
                Event::Epoch,
                Event::Mutation(Bytes::from("k2"), Bytes::from("v2")),
            ]
        );
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_enqueue_writes_under_map_prefix() {
        let queue = queue();
        let key = queue.enqueue("k", "v").await.unwrap();
        assert!(key.starts_with("map-1/"));
        assert_eq!(queue.store().keys("map-1").await, vec![key]);
    }

    #[tokio::test]
    async fn test_handler_error_is_returned_and_record_consumed() {
        let queue = queue();
        queue.advance_epoch().await.unwrap();

        let mut recorder = Recorder {
            fail_epoch: true,
            ..Default::default()
        };
        let err = queue.dequeue(&mut recorder).await.unwrap_err();

        assert!(matches!(err, QueueError::Handler { .. }));
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_undecodable_record_surfaces_decode_error() {
        let queue = queue();
        queue
            .store()
            .create_unique("map-1", Bytes::from_static(&[0xff, 0xff]))
            .await
            .unwrap();

        let err = queue.dequeue(&mut Recorder::default()).await.unwrap_err();
        assert!(matches!(err, QueueError::Decode { .. }), "got {err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dequeue_timeout() {
        let queue = Queue::builder(Arc::new(MemoryStore::new()), "map-1")
            .dequeue_timeout(Duration::from_millis(10))
            .build()
            .unwrap();

        let err = queue.dequeue(&mut Recorder::default()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_oversized_enqueue_rejected_before_store() {
        let queue = Queue::builder(Arc::new(MemoryStore::new()), "map-1")
            .max_record_size(8)
            .build()
            .unwrap();

        let err = queue.enqueue("key", "a value too long").await.unwrap_err();
        assert!(matches!(err, QueueError::RecordTooLarge { .. }));
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_store_error() {
        let queue = queue();
        queue.store().close();

        let err = queue.enqueue("k", "v").await.unwrap_err();
        assert!(matches!(
            err,
            QueueError::Store {
                operation: "create_unique",
                source: StoreError::Closed { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_usable_as_trait_object() {
        let queue: Arc<dyn MutationQueue> = Arc::new(queue());
        let first = queue
            .enqueue(Bytes::from("k"), Bytes::from("v"))
            .await
            .unwrap();
        let second = queue.advance_epoch().await.unwrap();
        assert!(first.starts_with("map-1/"));
        assert!(second.starts_with("map-1/"));
        assert_ne!(first, second);

        let mut recorder = Recorder::default();
        queue.dequeue(&mut recorder).await.unwrap();
        queue.dequeue(&mut recorder).await.unwrap();
        assert_eq!(
            recorder.events,
            vec![Event::Mutation(Bytes::from("k"), Bytes::from("v")), Event::Epoch]
        );
    }
}
