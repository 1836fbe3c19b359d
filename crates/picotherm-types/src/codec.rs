//! Binary blob encoding for a [`Series`].
//!
//! The layout is little-endian:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | magic `PTS1` |
//! | 4 | 1 | column count, always 3 |
//! | 5 | 4 | row count (u32) |
//! | 9 | 24 × rows | `i64` timestamp ms, `f64` temperature, `f64` humidity |
//!
//! Floats are stored bit-for-bit, so `decode(&encode(s)) == s` exactly.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ParseError;
use crate::types::{MEASUREMENT_FIELDS, Measurement, Series};

/// Magic bytes at the start of every blob.
pub const MAGIC: [u8; 4] = *b"PTS1";

/// Size of the fixed header in bytes.
pub const HEADER_BYTES: usize = 9;

/// Size of one encoded measurement in bytes.
pub const ROW_BYTES: usize = 24;

/// Encode a series into a blob.
///
/// # Errors
///
/// Returns [`ParseError::InvalidLength`] if the series has more rows than
/// the `u32` row count can describe.
pub fn encode(series: &Series) -> Result<Bytes, ParseError> {
    let rows = row_count(series.len())?;
    let mut buf = BytesMut::with_capacity(HEADER_BYTES + ROW_BYTES * series.len());
    buf.put_slice(&MAGIC);
    buf.put_u8(MEASUREMENT_FIELDS);
    buf.put_u32_le(rows);
    for m in series {
        buf.put_i64_le(m.timestamp_ms);
        buf.put_f64_le(m.temperature);
        buf.put_f64_le(m.humidity);
    }
    Ok(buf.freeze())
}

fn row_count(len: usize) -> Result<u32, ParseError> {
    u32::try_from(len).map_err(|_| ParseError::InvalidLength {
        expected: u32::MAX as usize,
        actual: len,
    })
}

/// Decode a blob into a series.
///
/// # Errors
///
/// - [`ParseError::InvalidMagic`] if the blob is not a series blob
/// - [`ParseError::InvalidShape`] if the column count is not 3
/// - [`ParseError::InvalidLength`] if the body does not match the row count
/// - [`ParseError::NotAscending`] if timestamps are not strictly ascending
pub fn decode(data: &[u8]) -> Result<Series, ParseError> {
    if data.len() < HEADER_BYTES {
        let mut actual = [0u8; 4];
        let n = data.len().min(4);
        actual[..n].copy_from_slice(&data[..n]);
        if actual != MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: MAGIC,
                actual,
            });
        }
        return Err(ParseError::InvalidLength {
            expected: HEADER_BYTES,
            actual: data.len(),
        });
    }

    let mut buf = data;
    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if magic != MAGIC {
        return Err(ParseError::InvalidMagic {
            expected: MAGIC,
            actual: magic,
        });
    }

    let columns = buf.get_u8();
    if columns != MEASUREMENT_FIELDS {
        return Err(ParseError::InvalidShape {
            expected: MEASUREMENT_FIELDS,
            actual: columns,
        });
    }

    let rows = buf.get_u32_le() as usize;
    let expected = HEADER_BYTES + rows * ROW_BYTES;
    if data.len() != expected {
        return Err(ParseError::InvalidLength {
            expected,
            actual: data.len(),
        });
    }

    let mut points = Vec::with_capacity(rows);
    for _ in 0..rows {
        let timestamp_ms = buf.get_i64_le();
        let temperature = buf.get_f64_le();
        let humidity = buf.get_f64_le();
        points.push(Measurement {
            timestamp_ms,
            temperature,
            humidity,
        });
    }

    Series::new(points)
}
