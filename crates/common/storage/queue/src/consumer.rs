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

//! The single reader's dequeue loop.
//!
//! [`Consumer`] drives [`Queue::next_record`] until cancelled. Cancellation
//! is only observed while waiting for a record, never while a handler runs,
//! so a record that left the store always reaches the handler.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    CoordinationStore, Queue, RecordHandler, Result, error::InternalSnafu, queue::dispatch,
};

/// Records handled by a consumer since it started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub mutations: u64,
    pub epochs:    u64,
}

pub struct Consumer<S: ?Sized> {
    queue:  Queue<S>,
    cancel: CancellationToken,
}

impl<S: CoordinationStore + ?Sized + 'static> Consumer<S> {
    pub fn new(queue: Queue<S>) -> Self { Self::with_cancellation(queue, CancellationToken::new()) }

    pub const fn with_cancellation(queue: Queue<S>, cancel: CancellationToken) -> Self {
        Self { queue, cancel }
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken { self.cancel.clone() }

    /// Dequeue and dispatch until cancelled.
    ///
    /// Dequeue timeouts are retried. Any other error stops the loop and is
    /// returned.
    pub async fn run<H: RecordHandler + ?Sized>(&self, handler: &mut H) -> Result<ConsumerStats> {
        let prefix = &self.queue.config().key_prefix;
        info!(prefix = %prefix, "consumer started");

        let mut stats = ConsumerStats::default();
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                next = self.queue.next_record() => next,
            };

            let record = match next {
                Ok(record) => record,
                Err(e) if e.is_retryable() => continue,
                Err(e) => {
                    warn!(prefix = %prefix, error = %e, "consumer stopped: dequeue failed");
                    return Err(e);
                }
            };

            let advance = record.is_advance_epoch();
            if let Err(e) = dispatch(record, handler).await {
                warn!(prefix = %prefix, error = %e, advance, "consumer stopped: handler failed");
                return Err(e);
            }

            if advance {
                stats.epochs += 1;
            } else {
                stats.mutations += 1;
            }
        }

        info!(
            prefix = %prefix,
            mutations = stats.mutations,
            epochs = stats.epochs,
            "consumer stopped"
        );
        Ok(stats)
    }

    /// Run the loop on a tokio task, handing the handler back on exit.
    pub fn spawn<H: RecordHandler + 'static>(self, mut handler: H) -> ConsumerHandle<H> {
        let cancel = self.cancel.clone();
        let join = tokio::spawn(async move {
            let stats = self.run(&mut handler).await?;
            Ok((handler, stats))
        });
        ConsumerHandle { cancel, join }
    }
}

/// Handle to a spawned [`Consumer`].
pub struct ConsumerHandle<H> {
    cancel: CancellationToken,
    join:   JoinHandle<Result<(H, ConsumerStats)>>,
}

impl<H> ConsumerHandle<H> {
    pub fn cancel(&self) { self.cancel.cancel(); }

    #[must_use]
    pub fn is_finished(&self) -> bool { self.join.is_finished() }

    /// Wait for the loop to exit on its own.
    pub async fn join(self) -> Result<(H, ConsumerStats)> {
        self.join.await.map_err(|e| {
            InternalSnafu {
                message: format!("consumer task failed: {e}"),
            }
            .build()
        })?
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn shutdown(self) -> Result<(H, ConsumerStats)> {
        self.cancel();
        self.join().await
    }
}
