// Log frame and index entry encoding: big-endian i64 lengths and offsets.
use crate::core::error::{Error, ErrorKind};

/// Width of one index entry.
pub const INDEX_ENTRY_LEN: u64 = 8;
/// Width of the length prefix in front of every log payload.
pub const LENGTH_PREFIX_LEN: u64 = 8;

/// Big-endian bytes of a signed 64-bit field.
pub(crate) fn encode_i64(value: i64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Reads a big-endian signed 64-bit field.
pub(crate) fn decode_i64(buf: [u8; 8]) -> i64 {
    i64::from_be_bytes(buf)
}

/// Length prefix for a payload about to be appended.
pub fn encode_length(payload_len: usize) -> Result<[u8; 8], Error> {
    let len = i64::try_from(payload_len).map_err(|_| {
        Error::new(ErrorKind::Usage).with_message("payload length exceeds i64::MAX")
    })?;
    Ok(encode_i64(len))
}

/// Decodes a length prefix read from the log. Negative lengths are corrupt.
pub fn decode_length(buf: [u8; 8]) -> Result<u64, Error> {
    let len = decode_i64(buf);
    u64::try_from(len).map_err(|_| {
        Error::new(ErrorKind::Corrupt).with_message(format!("negative record length {len}"))
    })
}

pub fn encode_offset(offset: u64) -> Result<[u8; 8], Error> {
    let offset = i64::try_from(offset).map_err(|_| {
        Error::new(ErrorKind::Write).with_message("log offset exceeds i64::MAX")
    })?;
    Ok(encode_i64(offset))
}

/// Decodes an index entry. Negative offsets are corrupt.
pub fn decode_offset(buf: [u8; 8]) -> Result<u64, Error> {
    let offset = decode_i64(buf);
    u64::try_from(offset).map_err(|_| {
        Error::new(ErrorKind::Corrupt).with_message(format!("negative log offset {offset}"))
    })
}

/// Byte position of index entry `seq`, or `None` if it cannot be addressed.
pub fn index_position(seq: u64) -> Option<u64> {
    seq.checked_mul(INDEX_ENTRY_LEN)
}

/// Total log bytes taken by a frame carrying `payload_len` bytes.
pub fn frame_len(payload_len: u64) -> u64 {
    LENGTH_PREFIX_LEN + payload_len
}
