// Abstract seekable byte stream. The core only ever reads through this trait;
// it never touches a file handle or device descriptor directly, so the same
// decoding pipeline runs over a file, a block device, or an in-memory buffer.

use crate::error::{NtfsError, Result};
use std::io::{Read, Seek, SeekFrom};
use std::sync::Mutex;

/// A seekable byte source. Implementors must treat short reads as errors:
/// `read_buffer_at_offset` either returns exactly `len` bytes or an
/// `NtfsError::IoError`.
pub trait BlockSource: Send + Sync {
    fn read_buffer_at_offset(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Total size of the underlying stream, when known.
    fn size(&self) -> Option<u64> {
        None
    }
}

/// A `BlockSource` backed by any `Read + Seek` (e.g. `std::fs::File`),
/// guarded by a mutex since `Read`/`Seek` require `&mut self` but the trait
/// above hands out only `&self`. This mirrors the outer whole-handle lock the
/// spec describes at the facade layer (§5): here it exists purely so a single
/// shared file handle can serve sequential reads, not as a concurrency
/// primitive for callers.
pub struct SeekableBlockSource<T> {
    inner: Mutex<T>,
    size: Option<u64>,
}

impl<T: Read + Seek> SeekableBlockSource<T> {
    pub fn new(mut inner: T) -> Result<Self> {
        let size = inner.seek(SeekFrom::End(0)).ok();
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner: Mutex::new(inner),
            size,
        })
    }
}

impl<T: Read + Seek + Send> BlockSource for SeekableBlockSource<T> {
    fn read_buffer_at_offset(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| NtfsError::IoError(std::io::Error::other("block source lock poisoned")))?;
        guard.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        guard.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                NtfsError::IoError(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("short read at offset {} requesting {} bytes", offset, len),
                ))
            } else {
                NtfsError::IoError(e)
            }
        })?;
        Ok(buf)
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

/// A `BlockSource` over an in-memory buffer, used heavily by tests and by
/// callers that have already mapped or loaded a volume image.
pub struct MemoryBlockSource {
    data: Vec<u8>,
}

impl MemoryBlockSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl BlockSource for MemoryBlockSource {
    fn read_buffer_at_offset(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let start = offset as usize;
        let end = start
            .checked_add(len)
            .ok_or_else(|| NtfsError::OutOfBounds("offset+len overflow".to_string()))?;
        self.data
            .get(start..end)
            .map(|s| s.to_vec())
            .ok_or_else(|| {
                NtfsError::IoError(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "short read at offset {} requesting {} bytes (source is {} bytes)",
                        offset,
                        len,
                        self.data.len()
                    ),
                ))
            })
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}
