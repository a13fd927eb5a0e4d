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

use snafu::{Location, Snafu};

/// Boxed error returned by record handlers and store backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Queue operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueueError {
    /// The record could not be serialized.
    #[snafu(display("Failed to encode record"))]
    Encode {
        source: bincode::error::EncodeError,
        #[snafu(implicit)]
        loc:    Location,
    },

    /// The bytes read from the store are not a valid record.
    #[snafu(display("Failed to decode record of {len} bytes"))]
    Decode {
        len:    usize,
        source: bincode::error::DecodeError,
        #[snafu(implicit)]
        loc:    Location,
    },

    /// A record decoded cleanly but did not consume its whole buffer.
    #[snafu(display("Record has {trailing} trailing bytes"))]
    TrailingBytes {
        trailing: usize,
        #[snafu(implicit)]
        loc:      Location,
    },

    /// The encoded record is larger than the configured limit.
    #[snafu(display("Record of {size} bytes exceeds the {limit} byte limit"))]
    RecordTooLarge {
        size:  usize,
        limit: usize,
        #[snafu(implicit)]
        loc:   Location,
    },

    /// The coordination store rejected or failed the operation.
    #[snafu(display("Coordination store {operation} failed"))]
    Store {
        operation: &'static str,
        source:    StoreError,
        #[snafu(implicit)]
        loc:       Location,
    },

    /// A caller-supplied handler returned an error.
    #[snafu(display("Record handler failed"))]
    Handler {
        source: BoxError,
        #[snafu(implicit)]
        loc:    Location,
    },

    /// No record arrived before the configured dequeue timeout.
    #[snafu(display("No record arrived within {timeout:?}"))]
    DequeueTimeout {
        timeout: Duration,
        #[snafu(implicit)]
        loc:     Location,
    },

    #[snafu(display("Invalid queue configuration: {message}"))]
    InvalidConfig {
        message: String,
        #[snafu(implicit)]
        loc:     Location,
    },

    #[snafu(display("Internal error: {message}"))]
    Internal {
        message: String,
        #[snafu(implicit)]
        loc:     Location,
    },
}

impl QueueError {
    /// Whether the consumer loop may keep going after this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool { matches!(self, Self::DequeueTimeout { .. }) }
}

/// Errors surfaced by a [`CoordinationStore`](crate::CoordinationStore)
/// implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The store has been closed and accepts no further calls.
    #[snafu(display("Coordination store is closed"))]
    Closed {
        #[snafu(implicit)]
        loc: Location,
    },

    /// A unique key could not be created without colliding.
    #[snafu(display("Key {key} already exists"))]
    KeyConflict {
        key: String,
        #[snafu(implicit)]
        loc: Location,
    },

    /// Failure reported by a networked store client.
    #[snafu(display("Store backend error: {message}"))]
    Backend {
        message: String,
        source:  BoxError,
        #[snafu(implicit)]
        loc:     Location,
    },
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
