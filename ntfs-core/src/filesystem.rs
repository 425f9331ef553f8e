// Binds MFT, bitmap and security index; serves entry/SD lookups to the
// facade. §4.9. The only cross-cutting owner in the pipeline (§2).

use crate::attribute::{ATTR_TYPE_DATA, Residency};
use crate::boot_sector::IoHandle;
use crate::cluster_vector::{ClusterBlockVector, ClusterCacheConfig};
use crate::entry::MftEntry;
use crate::error::{NtfsError, Result};
use crate::mft::{EntryCacheConfig, Mft, MftOpenFlags};
use crate::security::SecurityDescriptorIndex;
use crate::BlockSource;
use log::{debug, info};
use std::sync::Arc;

const MFT_SELF_ENTRY: u64 = 0;
const BITMAP_ENTRY: u64 = 6;
const SECURE_ENTRY: u64 = 9;

#[derive(Debug, Clone, Copy)]
pub struct NtfsFileSystemConfig {
    pub mft_open_flags: MftOpenFlags,
    pub cluster_cache_config: ClusterCacheConfig,
    pub entry_cache_config: EntryCacheConfig,
}

impl Default for NtfsFileSystemConfig {
    fn default() -> Self {
        Self {
            mft_open_flags: MftOpenFlags::empty(),
            cluster_cache_config: ClusterCacheConfig::default(),
            entry_cache_config: EntryCacheConfig::default(),
        }
    }
}

/// One contiguous run of allocated clusters, as surfaced by [`NtfsFileSystem::read_bitmap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterExtent {
    pub start_lcn: u64,
    pub length_in_clusters: u64,
}

/// Binds an MFT, the volume's cluster bitmap, and the security descriptor
/// index for the lifetime of a mounted handle.
pub struct NtfsFileSystem {
    source: Arc<dyn BlockSource>,
    io_handle: IoHandle,
    mft: Mft,
    security_index: Option<SecurityDescriptorIndex>,
    cluster_cache_config: ClusterCacheConfig,
}

impl NtfsFileSystem {
    /// `read_mft` + `read_security_descriptors` per §4.9's lifecycle; the
    /// bitmap step is exposed separately via [`Self::read_bitmap`] since it
    /// takes a caller-supplied callback.
    pub fn open(source: Arc<dyn BlockSource>, io_handle: IoHandle, config: NtfsFileSystemConfig) -> Result<Self> {
        let mft = if config.mft_open_flags.contains(MftOpenFlags::MFT_ONLY) {
            let mft_size = io_handle.mft_size.ok_or_else(|| {
                NtfsError::InvalidArgument(
                    "MFT_ONLY mode requires IoHandle::mft_size to be set".to_string(),
                )
            })?;
            info!("opening $MFT in MFT_ONLY mode ({} bytes)", mft_size);
            Mft::open_mft_only(
                source.clone(),
                io_handle.mft_offset(),
                mft_size,
                io_handle.mft_entry_size,
                config.entry_cache_config,
            )?
        } else {
            info!("opening $MFT in Normal mode via entry {}'s $DATA runs", MFT_SELF_ENTRY);
            Mft::open_normal(
                source.clone(),
                io_handle.mft_offset(),
                io_handle.mft_entry_size,
                io_handle.cluster_block_size,
                config.cluster_cache_config,
                config.entry_cache_config,
            )?
        };

        let mut filesystem = Self {
            source,
            io_handle,
            mft,
            security_index: None,
            cluster_cache_config: config.cluster_cache_config,
        };
        filesystem.read_security_descriptors()?;
        Ok(filesystem)
    }

    pub fn get_number_of_mft_entries(&self) -> u64 {
        self.mft.number_of_entries()
    }

    /// Volume geometry this handle was opened with.
    pub fn io_handle(&self) -> &IoHandle {
        &self.io_handle
    }

    /// The underlying block source, for callers (e.g. `ntfs-cli`) building
    /// their own `ClusterBlockVector`s outside the MFT/security paths this
    /// orchestrator already owns.
    pub fn source_handle(&self) -> Arc<dyn BlockSource> {
        self.source.clone()
    }

    pub fn get_mft_entry_by_index(&mut self, index: u64) -> Result<MftEntry> {
        self.mft.get_entry(index)
    }

    pub fn get_mft_entry_by_index_no_cache(&mut self, index: u64) -> Result<MftEntry> {
        self.mft.get_entry_no_cache(index)
    }

    /// `read_security_descriptors`: opens entry 9, verifies its name, and
    /// constructs the Security Descriptor Index. A name mismatch (older
    /// volumes) leaves `security_index` at `None` and is not an error.
    fn read_security_descriptors(&mut self) -> Result<()> {
        let secure_entry = self.mft.get_entry_no_cache(SECURE_ENTRY)?;
        self.security_index = SecurityDescriptorIndex::build(
            self.source.clone(),
            &secure_entry,
            self.io_handle.cluster_block_size,
            self.cluster_cache_config,
        )?;
        Ok(())
    }

    pub fn get_security_descriptor_by_id(&mut self, id: u32) -> Result<Option<Vec<u8>>> {
        match &mut self.security_index {
            Some(index) => index.get(id, self.cluster_cache_config),
            None => Ok(None),
        }
    }

    /// `read_bitmap` per §4.9 step 2 / §9's open-question decision: scans
    /// MFT entry 6's $DATA as a cluster bitmap, LSB-first per 32-bit word,
    /// tracking contiguous allocated ranges. When `on_extent` is `None` the
    /// scan still runs (so its cost and correctness are covered by tests)
    /// but produces no observable side effect, matching the "instrumentation
    /// only" behaviour the original hook never wired up.
    pub fn read_bitmap(&mut self, mut on_extent: Option<&mut dyn FnMut(ClusterExtent)>) -> Result<()> {
        let entry = self.mft.get_entry_no_cache(BITMAP_ENTRY)?;
        let data_attribute = entry
            .find_attribute(ATTR_TYPE_DATA)
            .ok_or_else(|| NtfsError::CorruptRecord("MFT entry 6 has no $DATA attribute".to_string()))?;

        let (runs, data_size, valid_data_size, allocated_size, attribute_id) = match &data_attribute.residency {
            Residency::NonResident {
                data_runs,
                data_size,
                valid_data_size,
                allocated_size,
                ..
            } => (
                data_runs.clone(),
                *data_size,
                *valid_data_size,
                *allocated_size,
                data_attribute.attribute_identifier,
            ),
            Residency::Resident { data, .. } => {
                scan_bitmap_bytes(data, &mut on_extent);
                return Ok(());
            }
        };

        let mut vector = ClusterBlockVector::new(
            self.source.clone(),
            runs,
            self.io_handle.cluster_block_size,
            data_size,
            valid_data_size,
            allocated_size,
            attribute_id,
            self.cluster_cache_config,
        );
        let bytes = vector.read_range(0, data_size as usize)?;
        scan_bitmap_bytes(&bytes, &mut on_extent);
        Ok(())
    }
}

fn scan_bitmap_bytes(bytes: &[u8], on_extent: &mut Option<&mut dyn FnMut(ClusterExtent)>) {
    let mut run_start: Option<u64> = None;
    let mut lcn = 0u64;

    for word in bytes.chunks(4) {
        let mut value = 0u32;
        for (i, &b) in word.iter().enumerate() {
            value |= (b as u32) << (i * 8);
        }
        for bit in 0..(word.len() * 8) {
            let allocated = value & (1 << bit) != 0;
            match (allocated, run_start) {
                (true, None) => run_start = Some(lcn),
                (false, Some(start)) => {
                    emit_extent(on_extent, start, lcn - start);
                    run_start = None;
                }
                _ => {}
            }
            lcn += 1;
        }
    }

    if let Some(start) = run_start {
        emit_extent(on_extent, start, lcn - start);
    }
}

fn emit_extent(on_extent: &mut Option<&mut dyn FnMut(ClusterExtent)>, start_lcn: u64, length_in_clusters: u64) {
    debug!(
        "bitmap extent: {} clusters starting at {}",
        length_in_clusters, start_lcn
    );
    if let Some(callback) = on_extent.as_deref_mut() {
        callback(ClusterExtent {
            start_lcn,
            length_in_clusters,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_contiguous_and_sparse_runs() {
        // byte 0: 0b0000_0111 -> bits 0,1,2 allocated; byte 1: 0b0000_0001 -> bit 8.
        let bytes = [0b0000_0111u8, 0b0000_0001];
        let mut extents = Vec::new();
        let mut collect = |extent: ClusterExtent| extents.push(extent);
        let mut callback: Option<&mut dyn FnMut(ClusterExtent)> = Some(&mut collect);
        scan_bitmap_bytes(&bytes, &mut callback);

        assert_eq!(extents.len(), 2);
        assert_eq!(extents[0], ClusterExtent { start_lcn: 0, length_in_clusters: 3 });
        assert_eq!(extents[1], ClusterExtent { start_lcn: 8, length_in_clusters: 1 });
    }

    #[test]
    fn no_callback_still_scans_without_panicking() {
        let bytes = [0xFFu8; 4];
        let mut callback: Option<&mut dyn FnMut(ClusterExtent)> = None;
        scan_bitmap_bytes(&bytes, &mut callback);
    }
}
