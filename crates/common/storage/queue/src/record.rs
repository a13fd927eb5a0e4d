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

//! Record types and their wire encoding.
//!
//! Every value stored under the queue prefix is one [`Record`] encoded with
//! bincode's standard configuration (little-endian, varint lengths):
//!
//! ```text
//! ┌──────────────────┬───────────────────────────────────────────┐
//! │ variant (varint) │ body                                      │
//! ├──────────────────┼───────────────────────────────────────────┤
//! │ 0 = Mutation     │ key len (varint) ‖ key ‖ value len ‖ value│
//! │ 1 = AdvanceEpoch │ (empty)                                   │
//! └──────────────────┴───────────────────────────────────────────┘
//! ```
//!
//! Variant order is part of the format. Append new variants, never reorder.
//!
//! Decoding borrows the key and value from the input, so a length prefix is
//! checked against the bytes actually present before anything is allocated.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use crate::{
    Result,
    error::{DecodeSnafu, EncodeSnafu, RecordTooLargeSnafu, TrailingBytesSnafu},
};

/// A single entry in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A key/value mutation to hand to the processing callback.
    Mutation { key: Bytes, value: Bytes },
    /// Marker asking the reader to close the current epoch.
    AdvanceEpoch,
}

/// Borrowed mirror of [`Record`] that defines the wire format.
#[derive(Serialize, Deserialize)]
enum WireRecord<'a> {
    Mutation {
        key:   &'a [u8],
        value: &'a [u8],
    },
    AdvanceEpoch,
}

impl<'a> From<&'a Record> for WireRecord<'a> {
    fn from(record: &'a Record) -> Self {
        match record {
            Record::Mutation { key, value } => Self::Mutation {
                key:   key.as_ref(),
                value: value.as_ref(),
            },
            Record::AdvanceEpoch => Self::AdvanceEpoch,
        }
    }
}

impl From<WireRecord<'_>> for Record {
    fn from(wire: WireRecord<'_>) -> Self {
        match wire {
            WireRecord::Mutation { key, value } => Self::Mutation {
                key:   Bytes::copy_from_slice(key),
                value: Bytes::copy_from_slice(value),
            },
            WireRecord::AdvanceEpoch => Self::AdvanceEpoch,
        }
    }
}

impl Record {
    pub fn mutation(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self::Mutation {
            key:   key.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub const fn is_advance_epoch(&self) -> bool { matches!(self, Self::AdvanceEpoch) }

    /// Serialize the record, refusing anything above `limit` bytes so that
    /// writers never publish a record the reader would reject.
    pub fn encode(&self, limit: usize) -> Result<Bytes> {
        let buf = bincode::serde::encode_to_vec(WireRecord::from(self), bincode::config::standard())
            .context(EncodeSnafu)?;
        ensure!(
            buf.len() <= limit,
            RecordTooLargeSnafu {
                size: buf.len(),
                limit,
            }
        );
        Ok(Bytes::from(buf))
    }

    /// Deserialize a record, rejecting oversized input and trailing bytes.
    pub fn decode(data: &[u8], limit: usize) -> Result<Self> {
        ensure!(
            data.len() <= limit,
            RecordTooLargeSnafu {
                size: data.len(),
                limit,
            }
        );
        let (wire, read): (WireRecord<'_>, usize) =
            bincode::serde::borrow_decode_from_slice(data, bincode::config::standard())
                .context(DecodeSnafu { len: data.len() })?;
        ensure!(
            read == data.len(),
            TrailingBytesSnafu {
                trailing: data.len() - read,
            }
        );
        Ok(wire.into())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::QueueError;

    const LIMIT: usize = 1024;

    #[test]
    fn test_mutation_round_trip() {
        let record = Record::mutation("index-1", "leaf-bytes");
        let encoded = record.encode(LIMIT).unwrap();
        assert_eq!(Record::decode(&encoded, LIMIT).unwrap(), record);
    }

    #[test]
    fn test_advance_epoch_is_one_byte() {
        let encoded = Record::AdvanceEpoch.encode(LIMIT).unwrap();
        assert_eq!(encoded.as_ref(), &[1u8]);
        assert!(Record::decode(&encoded, LIMIT).unwrap().is_advance_epoch());
    }

    #[test]
    fn test_mutation_layout() {
        let encoded = Record::mutation(b"ab".as_slice(), b"c".as_slice())
            .encode(LIMIT)
            .unwrap();
        assert_eq!(encoded.as_ref(), &[0, 2, b'a', b'b', 1, b'c']);
    }

    #[test]
    fn test_empty_key_and_value_preserved() {
        let record = Record::mutation(Bytes::new(), Bytes::new());
        let decoded = Record::decode(&record.encode(LIMIT).unwrap(), LIMIT).unwrap();
        assert_eq!(decoded, record);
        assert!(!decoded.is_advance_epoch());
    }

    #[test]
    fn test_encode_respects_limit() {
        let record = Record::mutation(vec![0u8; 64], vec![0u8; 64]);
        let err = record.encode(32).unwrap_err();
        assert!(matches!(err, QueueError::RecordTooLarge { limit: 32, .. }));
    }

    #[test]
    fn test_decode_respects_limit() {
        let encoded = Record::mutation(vec![7u8; 64], Bytes::new())
            .encode(LIMIT)
            .unwrap();
        let err = Record::decode(&encoded, 16).unwrap_err();
        assert!(matches!(err, QueueError::RecordTooLarge { limit: 16, .. }));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut buf = Record::AdvanceEpoch.encode(LIMIT).unwrap().to_vec();
        buf.extend_from_slice(b"junk");
        let err = Record::decode(&buf, LIMIT).unwrap_err();
        assert!(matches!(err, QueueError::TrailingBytes { trailing: 4, .. }));
    }

    #[test_case(&[] ; "empty")]
    #[test_case(&[9] ; "unknown variant")]
    #[test_case(&[0, 5, b'a'] ; "truncated key")]
    #[test_case(&[0, 252, 0, 0, 0, 64] ; "u32 key length past end")]
    #[test_case(&[0, 253, 0, 0, 0, 0, 0, 0, 0, 64] ; "u64 key length past end")]
    #[test_case(&[0, 0, 253, 255, 255, 255, 255, 255, 255, 255, 127] ; "u64 value length past end")]
    fn test_decode_rejects_garbage(data: &[u8]) {
        let err = Record::decode(data, LIMIT).unwrap_err();
        assert!(matches!(err, QueueError::Decode { .. }), "got {err:?}");
    }
}
