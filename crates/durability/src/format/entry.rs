//! Fixed-width entry records and the file footer
//!
//! An entry is an encoded key followed by an encoded counter pair, 32 bytes in
//! total. The footer closes the file with a CRC32 over header and entries and
//! a trailer magic.

use countsdb_core::{CorruptKeyError, CounterPair, CountsKey, COUNTER_PAIR_SIZE, KEY_SIZE};

/// Size of one `(key, counter pair)` record
pub const ENTRY_SIZE: usize = KEY_SIZE + COUNTER_PAIR_SIZE;

/// Trailer magic bytes: "STNC"
pub const TRAILER_MAGIC: [u8; 4] = *b"STNC";

/// Footer size: CRC32 + trailer magic
pub const FOOTER_SIZE: usize = 8;

/// Encode one record
pub fn encode_entry(key: &CountsKey, pair: &CounterPair) -> [u8; ENTRY_SIZE] {
    let mut bytes = [0u8; ENTRY_SIZE];
    bytes[..KEY_SIZE].copy_from_slice(&key.encode());
    bytes[KEY_SIZE..].copy_from_slice(&pair.encode());
    bytes
}

/// Decode one record
pub fn decode_entry(bytes: &[u8]) -> Result<(CountsKey, CounterPair), CorruptKeyError> {
    if bytes.len() < ENTRY_SIZE {
        return Err(CorruptKeyError::Truncated { len: bytes.len() });
    }
    let key = CountsKey::decode(&bytes[..KEY_SIZE])?;
    let pair = CounterPair::decode(&bytes[KEY_SIZE..ENTRY_SIZE])
        .ok_or(CorruptKeyError::Truncated { len: bytes.len() })?;
    Ok((key, pair))
}

/// Encode the footer
pub fn encode_footer(crc: u32) -> [u8; FOOTER_SIZE] {
    let mut bytes = [0u8; FOOTER_SIZE];
    bytes[0..4].copy_from_slice(&crc.to_le_bytes());
    bytes[4..8].copy_from_slice(&TRAILER_MAGIC);
    bytes
}

/// Decode the footer into `(crc, trailer magic)`
pub fn decode_footer(bytes: &[u8; FOOTER_SIZE]) -> (u32, [u8; 4]) {
    let crc = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = [bytes[4], bytes[5], bytes[6], bytes[7]];
    (crc, magic)
}

/// Expected file size for a given entry count
///
/// None if the size does not fit in a u64, which only a corrupt header yields.
pub fn expected_file_size(entry_count: u64) -> Option<u64> {
    entry_count
        .checked_mul(ENTRY_SIZE as u64)?
        .checked_add((super::SNAPSHOT_HEADER_SIZE + FOOTER_SIZE) as u64)
}
