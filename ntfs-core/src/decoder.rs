// Little-endian primitive reads, UTF-16LE decoding and USA fixup application.
// These are the bottom of the decoding pipeline: every other module reads
// bytes through these helpers rather than slicing and casting by hand.

use crate::error::{NtfsError, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};

#[inline]
pub fn u16_le(data: &[u8], offset: usize) -> Result<u16> {
    let bytes = data
        .get(offset..offset + 2)
        .ok_or_else(|| NtfsError::OutOfBounds(format!("u16 read at {}", offset)))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn u32_le(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = data
        .get(offset..offset + 4)
        .ok_or_else(|| NtfsError::OutOfBounds(format!("u32 read at {}", offset)))?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn u64_le(data: &[u8], offset: usize) -> Result<u64> {
    let bytes = data
        .get(offset..offset + 8)
        .ok_or_else(|| NtfsError::OutOfBounds(format!("u64 read at {}", offset)))?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

#[inline]
pub fn i64_le(data: &[u8], offset: usize) -> Result<i64> {
    Ok(u64_le(data, offset)? as i64)
}

/// Windows FILETIME: 100 ns ticks since 1601-01-01 UTC.
pub fn filetime_to_datetime(ticks: u64) -> Option<DateTime<Utc>> {
    let epoch = Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0).single()?;
    let micros = (ticks / 10) as i64;
    epoch.checked_add_signed(Duration::microseconds(micros))
}

/// Decode a UTF-16LE byte slice (even length) to a UTF-8 `String`.
/// Rejects unpaired surrogates, matching the spec's `InvalidEncoding`.
pub fn utf16le_to_string(data: &[u8]) -> Result<String> {
    if data.len() % 2 != 0 {
        return Err(NtfsError::InvalidEncoding(
            "UTF-16LE byte slice has odd length".to_string(),
        ));
    }
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units)
        .map_err(|_| NtfsError::InvalidEncoding("unpaired UTF-16 surrogate".to_string()))
}

/// Apply the Update Sequence Array fixup to a *copy* of a record.
///
/// `usa_offset`/`usa_count` name the Update Sequence Array embedded in
/// `record`. The first word is the update sequence number (USN); the
/// following `usa_count - 1` words are the real trailing bytes of each
/// 512-byte sub-block, which on disk were overwritten with the USN as a
/// torn-write detector. This restores the real bytes and verifies the USN
/// was present everywhere it should be.
pub fn apply_fixup(record: &[u8], usa_offset: u16, usa_count: u16) -> Result<Vec<u8>> {
    let mut buf = record.to_vec();
    if usa_count == 0 {
        return Ok(buf);
    }
    let usa_offset = usa_offset as usize;
    let usa_count = usa_count as usize;

    let usn = u16_le(&buf, usa_offset)?;

    for i in 0..usa_count - 1 {
        let sector_end = 512 * (i + 1);
        if sector_end > buf.len() {
            return Err(NtfsError::CorruptRecord(format!(
                "fixup sub-block {} extends beyond record ({} > {})",
                i,
                sector_end,
                buf.len()
            )));
        }
        let trailer_offset = sector_end - 2;
        let trailer = u16_le(&buf, trailer_offset)?;
        if trailer != usn {
            return Err(NtfsError::CorruptRecord(format!(
                "fixup mismatch at sub-block {}: expected USN {:#06x}, found {:#06x}",
                i, usn, trailer
            )));
        }
        let original_offset = usa_offset + 2 * (i + 1);
        let original = u16_le(&buf, original_offset)?;
        buf[trailer_offset..trailer_offset + 2].copy_from_slice(&original.to_le_bytes());
    }

    Ok(buf)
}
