//! Read-only decoding pipeline for NTFS volumes.
//!
//! Data flows bottom-up: [`BlockSource`] → [`decoder`] → {[`entry`],
//! [`cluster_vector`]} → [`mft`] → [`filesystem`]. [`filesystem::NtfsFileSystem`]
//! is the only cross-cutting owner; everything else is a leaf the
//! orchestrator composes.

mod attribute;
mod attribute_list;
mod block_source;
mod boot_sector;
mod cluster_vector;
mod data_runs;
mod decoder;
mod entry;
mod error;
mod file_reference;
mod filesystem;
mod index;
mod mft;
mod security;
mod values;

pub use attribute::{
    AttributeDataFlags, MftAttribute, Residency, ATTR_TYPE_ATTRIBUTE_LIST, ATTR_TYPE_BITMAP,
    ATTR_TYPE_DATA, ATTR_TYPE_END, ATTR_TYPE_FILE_NAME, ATTR_TYPE_INDEX_ALLOCATION,
    ATTR_TYPE_INDEX_ROOT, ATTR_TYPE_OBJECT_ID, ATTR_TYPE_REPARSE_POINT,
    ATTR_TYPE_SECURITY_DESCRIPTOR, ATTR_TYPE_STANDARD_INFORMATION, ATTR_TYPE_VOLUME_INFORMATION,
    ATTR_TYPE_VOLUME_NAME,
};
pub use attribute_list::AttributeListEntry;
pub use block_source::{BlockSource, MemoryBlockSource, SeekableBlockSource};
pub use boot_sector::{parse_boot_sector, IoHandle};
pub use cluster_vector::{ClusterBlock, ClusterBlockVector, ClusterCacheConfig};
pub use data_runs::{decode_data_runs, encode_data_runs, DataRun};
pub use decoder::{apply_fixup, filetime_to_datetime, i64_le, u16_le, u32_le, u64_le, utf16le_to_string};
pub use entry::{EntryFlags, MftEntry};
pub use error::{NtfsError, Result};
pub use file_reference::FileReference;
pub use filesystem::{ClusterExtent, NtfsFileSystem, NtfsFileSystemConfig};
pub use index::{parse_index_record, parse_index_root, Collation, IndexAllocation, IndexEntry, IndexRoot, IndexTree};
pub use mft::{EntryCacheConfig, Mft, MftOpenFlags};
pub use security::SecurityDescriptorIndex;
pub use values::{
    AttributeValue, DataValue, FileNameValue, ObjectIdValue, ReparsePointValue,
    StandardInformation, VolumeInformationValue, VolumeNameValue,
};
