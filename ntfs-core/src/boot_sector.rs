// Minimal NTFS boot sector parser. §10.4: the spec treats `IoHandle` fields
// as externally supplied; nothing in this repository provides them, so this
// is a deliberately small bootstrap with no repair or backup-sector fallback.

use crate::decoder::{i64_le, u16_le, u32_le, u64_le};
use crate::error::{NtfsError, Result};

const BOOT_SECTOR_SIZE: usize = 512;

/// Volume-geometry parameters consumed by the rest of the decoding pipeline
/// (§6 "IO Handle contract").
#[derive(Debug, Clone, Copy)]
pub struct IoHandle {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub cluster_block_size: u64,
    pub mft_entry_size: u32,
    pub index_entry_size: u32,
    pub mft_cluster: u64,
    pub mft_mirror_cluster: u64,
    pub volume_size: u64,
    pub serial_number: u64,
    /// Size in bytes of the $MFT itself. The boot sector carries no such
    /// field in real NTFS (it's normally derived from entry 0's $DATA run
    /// list, §4.6 Normal mode); this is populated by the caller only when
    /// opening in `MFT_ONLY` mode, where no such derivation is possible.
    pub mft_size: Option<u64>,
}

impl IoHandle {
    pub fn mft_offset(&self) -> u64 {
        self.mft_cluster * self.cluster_block_size
    }

    pub fn with_mft_size(mut self, mft_size: u64) -> Self {
        self.mft_size = Some(mft_size);
        self
    }
}

/// Parse a 512-byte NTFS boot sector. Rejects anything not carrying the
/// "NTFS    " OEM id at offset 3, which is the only integrity check this
/// minimal reader performs (no CRC, no backup-sector comparison).
pub fn parse_boot_sector(data: &[u8]) -> Result<IoHandle> {
    if data.len() < BOOT_SECTOR_SIZE {
        return Err(NtfsError::CorruptRecord(
            "boot sector shorter than 512 bytes".to_string(),
        ));
    }
    if &data[3..11] != b"NTFS    " {
        return Err(NtfsError::CorruptRecord(
            "boot sector OEM id is not \"NTFS    \"".to_string(),
        ));
    }

    let bytes_per_sector = u16_le(data, 11)? as u32;
    let sectors_per_cluster = data[13] as u32;
    if bytes_per_sector == 0 || sectors_per_cluster == 0 {
        return Err(NtfsError::CorruptRecord(
            "boot sector declares zero bytes_per_sector or sectors_per_cluster".to_string(),
        ));
    }
    let cluster_block_size = bytes_per_sector as u64 * sectors_per_cluster as u64;

    let total_sectors = u64_le(data, 40)?;
    let mft_cluster = u64_le(data, 48)?;
    let mft_mirror_cluster = u64_le(data, 56)?;

    let clusters_per_mft_record = i64_le(data, 64)? as i8;
    let mft_entry_size = size_from_clusters_or_log2(clusters_per_mft_record, cluster_block_size)?;

    let clusters_per_index_record = i64_le(data, 68)? as i8;
    let index_entry_size = size_from_clusters_or_log2(clusters_per_index_record, cluster_block_size)?;

    let serial_number = u64_le(data, 72)?;

    Ok(IoHandle {
        bytes_per_sector,
        sectors_per_cluster,
        cluster_block_size,
        mft_entry_size,
        index_entry_size,
        mft_cluster,
        mft_mirror_cluster,
        volume_size: total_sectors * bytes_per_sector as u64,
        serial_number,
        mft_size: None,
    })
}

/// NTFS overloads this byte: a positive count means "this many clusters per
/// record"; a negative count `n` means `2.pow(-n)` bytes per record,
/// independent of cluster size (used when the record is smaller than one
/// cluster).
fn size_from_clusters_or_log2(value: i8, cluster_block_size: u64) -> Result<u32> {
    if value >= 0 {
        let clusters = value as u64;
        if clusters == 0 {
            return Err(NtfsError::CorruptRecord(
                "boot sector declares zero clusters per record".to_string(),
            ));
        }
        Ok((clusters * cluster_block_size) as u32)
    } else {
        let log2 = (-value) as u32;
        Ok(1u32 << log2)
    }
}
