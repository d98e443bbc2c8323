//! Counts keys
//!
//! A counts key identifies one aggregate counter tracked by the store. The key
//! space is closed: node counts, relationship counts, index statistics and
//! index samples.
//!
//! ## Encoding
//!
//! Every key encodes to exactly [`KEY_SIZE`] bytes so a sorted snapshot file can
//! be binary searched without an auxiliary index:
//!
//! ```text
//! byte 0      : discriminant
//! bytes 1..4  : zero padding
//! Node        : bytes 4..8  label id, rest zero
//! Relationship: bytes 4..8 start label, 8..12 type, 12..16 end label
//! Index*      : bytes 4..8 zero, bytes 8..16 index id
//! ```
//!
//! Integers are big-endian with the sign bit flipped, so comparing encoded
//! keys byte-wise gives the same answer as comparing the keys themselves.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Encoded key size in bytes
pub const KEY_SIZE: usize = 16;

/// Wildcard label id ("any label" / "all nodes")
pub const ANY_LABEL: i32 = -1;

/// Wildcard relationship type id
pub const ANY_RELATIONSHIP_TYPE: i32 = -1;

/// Key discriminant codes
pub mod key_tags {
    /// Node count per label
    pub const NODE: u8 = 0x02;
    /// Relationship count per (start label, type, end label)
    pub const RELATIONSHIP: u8 = 0x03;
    /// Index update/size statistics
    pub const INDEX_STATISTICS: u8 = 0x04;
    /// Index unique/size sample
    pub const INDEX_SAMPLE: u8 = 0x05;

    /// Get the tag name for display
    pub fn tag_name(tag: u8) -> &'static str {
        match tag {
            NODE => "Node",
            RELATIONSHIP => "Relationship",
            INDEX_STATISTICS => "IndexStatistics",
            INDEX_SAMPLE => "IndexSample",
            _ => "Unknown",
        }
    }
}

/// Key of a single counter pair
///
/// Variants are declared in discriminant order, so the derived `Ord` sorts by
/// discriminant first and then by the variant's fields ascending. That order is
/// identical to byte-wise order of [`CountsKey::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CountsKey {
    /// Number of nodes carrying `label_id` ([`ANY_LABEL`] for all nodes)
    Node {
        /// Label id or wildcard
        label_id: i32,
    },
    /// Number of relationships matching a (start label, type, end label) pattern
    Relationship {
        /// Start node label id or wildcard
        start_label_id: i32,
        /// Relationship type id or wildcard
        type_id: i32,
        /// End node label id or wildcard
        end_label_id: i32,
    },
    /// `{updates, size}` statistics for an index
    IndexStatistics {
        /// Index id
        index_id: i64,
    },
    /// `{unique, size}` sample for an index
    IndexSample {
        /// Index id
        index_id: i64,
    },
}

impl CountsKey {
    /// Key for the node count of a label
    pub fn node(label_id: i32) -> Self {
        CountsKey::Node { label_id }
    }

    /// Key for the relationship count of a pattern
    pub fn relationship(start_label_id: i32, type_id: i32, end_label_id: i32) -> Self {
        CountsKey::Relationship {
            start_label_id,
            type_id,
            end_label_id,
        }
    }

    /// Key for an index's update statistics
    pub fn index_statistics(index_id: i64) -> Self {
        CountsKey::IndexStatistics { index_id }
    }

    /// Key for an index's sample
    pub fn index_sample(index_id: i64) -> Self {
        CountsKey::IndexSample { index_id }
    }

    /// Discriminant code of this key
    pub fn tag(&self) -> u8 {
        match self {
            CountsKey::Node { .. } => key_tags::NODE,
            CountsKey::Relationship { .. } => key_tags::RELATIONSHIP,
            CountsKey::IndexStatistics { .. } => key_tags::INDEX_STATISTICS,
            CountsKey::IndexSample { .. } => key_tags::INDEX_SAMPLE,
        }
    }

    /// Encode to the fixed-width on-disk form
    pub fn encode(&self) -> [u8; KEY_SIZE] {
        let mut bytes = [0u8; KEY_SIZE];
        bytes[0] = self.tag();
        match *self {
            CountsKey::Node { label_id } => {
                bytes[4..8].copy_from_slice(&encode_i32(label_id));
            }
            CountsKey::Relationship {
                start_label_id,
                type_id,
                end_label_id,
            } => {
                bytes[4..8].copy_from_slice(&encode_i32(start_label_id));
                bytes[8..12].copy_from_slice(&encode_i32(type_id));
                bytes[12..16].copy_from_slice(&encode_i32(end_label_id));
            }
            CountsKey::IndexStatistics { index_id } | CountsKey::IndexSample { index_id } => {
                bytes[8..16].copy_from_slice(&encode_i64(index_id));
            }
        }
        bytes
    }

    /// Decode from the fixed-width on-disk form
    ///
    /// Fails if the slice is short, the discriminant is unknown, or a byte that
    /// the variant leaves unused is not zero.
    pub fn decode(bytes: &[u8]) -> Result<Self, CorruptKeyError> {
        if bytes.len() < KEY_SIZE {
            return Err(CorruptKeyError::Truncated { len: bytes.len() });
        }
        let tag = bytes[0];
        let key = match tag {
            key_tags::NODE => {
                check_zero(tag, &bytes[1..4])?;
                check_zero(tag, &bytes[8..16])?;
                CountsKey::Node {
                    label_id: decode_i32(&bytes[4..8]),
                }
            }
            key_tags::RELATIONSHIP => {
                check_zero(tag, &bytes[1..4])?;
                CountsKey::Relationship {
                    start_label_id: decode_i32(&bytes[4..8]),
                    type_id: decode_i32(&bytes[8..12]),
                    end_label_id: decode_i32(&bytes[12..16]),
                }
            }
            key_tags::INDEX_STATISTICS | key_tags::INDEX_SAMPLE => {
                check_zero(tag, &bytes[1..8])?;
                let index_id = decode_i64(&bytes[8..16]);
                if tag == key_tags::INDEX_STATISTICS {
                    CountsKey::IndexStatistics { index_id }
                } else {
                    CountsKey::IndexSample { index_id }
                }
            }
            other => return Err(CorruptKeyError::UnknownTag { tag: other }),
        };
        Ok(key)
    }

    /// Compare two keys
    ///
    /// Equivalent to `Ord::cmp`; spelled out for call sites that read better
    /// with a named comparison.
    pub fn compare(a: &CountsKey, b: &CountsKey) -> Ordering {
        a.cmp(b)
    }
}

impl fmt::Display for CountsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountsKey::Node { label_id } => write!(f, "NodeKey[(:{})]", label_name(*label_id)),
            CountsKey::Relationship {
                start_label_id,
                type_id,
                end_label_id,
            } => write!(
                f,
                "RelationshipKey[(:{})-[:{}]->(:{})]",
                label_name(*start_label_id),
                label_name(*type_id),
                label_name(*end_label_id)
            ),
            CountsKey::IndexStatistics { index_id } => write!(f, "IndexStatisticsKey[{}]", index_id),
            CountsKey::IndexSample { index_id } => write!(f, "IndexSampleKey[{}]", index_id),
        }
    }
}

fn label_name(id: i32) -> String {
    if id == ANY_LABEL {
        "*".to_string()
    } else {
        id.to_string()
    }
}

fn check_zero(tag: u8, bytes: &[u8]) -> Result<(), CorruptKeyError> {
    if bytes.iter().all(|b| *b == 0) {
        Ok(())
    } else {
        Err(CorruptKeyError::NonZeroPadding { tag })
    }
}

fn encode_i32(v: i32) -> [u8; 4] {
    ((v as u32) ^ 0x8000_0000).to_be_bytes()
}

fn decode_i32(bytes: &[u8]) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    (u32::from_be_bytes(raw) ^ 0x8000_0000) as i32
}

fn encode_i64(v: i64) -> [u8; 8] {
    ((v as u64) ^ 0x8000_0000_0000_0000).to_be_bytes()
}

fn decode_i64(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    (u64::from_be_bytes(raw) ^ 0x8000_0000_0000_0000) as i64
}

/// Errors decoding a key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorruptKeyError {
    /// Discriminant is not one of the known key codes
    #[error("Unknown counts key discriminant: {tag:#04x}")]
    UnknownTag {
        /// Tag found
        tag: u8,
    },
    /// Bytes unused by the variant are not zero
    #[error("Non-zero padding in {} key", key_tags::tag_name(*tag))]
    NonZeroPadding {
        /// Tag of the key being decoded
        tag: u8,
    },
    /// Fewer than `KEY_SIZE` bytes available
    #[error("Counts key truncated: {len} bytes")]
    Truncated {
        /// Bytes available
        len: usize,
    },
}
