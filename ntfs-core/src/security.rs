// Security Descriptor Index: lookup SD-by-id via the $Secure MFT entry's
// $SII index into its $SDS data stream. §4.8.

use crate::attribute::ATTR_TYPE_DATA;
use crate::cluster_vector::{ClusterBlockVector, ClusterCacheConfig};
use crate::decoder::{u32_le, u64_le};
use crate::entry::MftEntry;
use crate::error::{NtfsError, Result};
use crate::index::{parse_index_root, Collation, IndexAllocation, IndexTree};
use crate::values::parse_file_name;
use crate::BlockSource;
use log::{debug, warn};
use std::sync::Arc;

const SDS_HEADER_SIZE: usize = 20;

/// Constructed from the $Secure MFT entry (index 9). `None` when the entry's
/// name doesn't match "$Secure" (pre-2000 volumes) — per §4.9 step 3, lookups
/// against an absent index are a no-op, not an error.
pub struct SecurityDescriptorIndex {
    source: Arc<dyn BlockSource>,
    sii_root_data: Vec<u8>,
    sii_allocation_runs: Option<crate::attribute::Residency>,
    sds_vector: ClusterBlockVector,
    cluster_block_size: u64,
}

impl SecurityDescriptorIndex {
    /// Build the index from MFT entry 9, or return `Ok(None)` if this volume
    /// doesn't name it "$Secure" (no-op per the design notes).
    pub fn build(
        source: Arc<dyn BlockSource>,
        secure_entry: &MftEntry,
        cluster_block_size: u64,
        cluster_cache_config: ClusterCacheConfig,
    ) -> Result<Option<Self>> {
        let name_matches = secure_entry
            .attributes_of_type(crate::attribute::ATTR_TYPE_FILE_NAME)
            .any(|attr| match attr.resident_data() {
                Some(data) => parse_file_name(data).map(|v| v.name == "$Secure").unwrap_or(false),
                None => false,
            });
        if !name_matches {
            warn!("MFT entry 9 is not named $Secure; security descriptor lookup disabled");
            return Ok(None);
        }

        let sds_attribute = secure_entry
            .find_attribute_named(ATTR_TYPE_DATA, "$SDS")
            .ok_or_else(|| NtfsError::CorruptRecord("$Secure has no $SDS stream".to_string()))?;
        let (sds_runs, sds_data_size, sds_valid_data_size, sds_allocated_size) =
            match &sds_attribute.residency {
                crate::attribute::Residency::NonResident {
                    data_runs,
                    data_size,
                    valid_data_size,
                    allocated_size,
                    ..
                } => (data_runs.clone(), *data_size, *valid_data_size, *allocated_size),
                crate::attribute::Residency::Resident { .. } => {
                    return Err(NtfsError::Unsupported(
                        "resident $SDS is not supported".to_string(),
                    ))
                }
            };

        let sii_attribute = secure_entry
            .find_attribute_named(crate::attribute::ATTR_TYPE_INDEX_ROOT, "$SII")
            .ok_or_else(|| NtfsError::CorruptRecord("$Secure has no $SII index root".to_string()))?;
        let sii_root_data = sii_attribute
            .resident_data()
            .ok_or_else(|| NtfsError::CorruptRecord("$SII index root is not resident".to_string()))?
            .to_vec();

        let sii_allocation_runs = secure_entry
            .find_attribute_named(crate::attribute::ATTR_TYPE_INDEX_ALLOCATION, "$SII")
            .map(|attr| attr.residency.clone());

        let sds_vector = ClusterBlockVector::new(
            source.clone(),
            sds_runs,
            cluster_block_size,
            sds_data_size,
            sds_valid_data_size,
            sds_allocated_size,
            sds_attribute.attribute_identifier,
            cluster_cache_config,
        );

        Ok(Some(Self {
            source,
            sii_root_data,
            sii_allocation_runs,
            sds_vector,
            cluster_block_size,
        }))
    }

    /// `get(id)` per §4.8: miss is a negative result, not an error.
    pub fn get(&mut self, id: u32, cluster_cache_config: ClusterCacheConfig) -> Result<Option<Vec<u8>>> {
        let root = parse_index_root(&self.sii_root_data)?;
        if root.collation != Collation::Integer {
            return Err(NtfsError::CorruptRecord(
                "$SII index root has unexpected collation".to_string(),
            ));
        }

        let mut allocation_vector;
        let mut allocation = match &self.sii_allocation_runs {
            Some(crate::attribute::Residency::NonResident {
                data_runs,
                data_size,
                valid_data_size,
                allocated_size,
                ..
            }) => {
                allocation_vector = ClusterBlockVector::new(
                    self.source.clone(),
                    data_runs.clone(),
                    self.cluster_block_size,
                    *data_size,
                    *valid_data_size,
                    *allocated_size,
                    0,
                    cluster_cache_config,
                );
                Some(IndexAllocation::new(
                    &mut allocation_vector,
                    root.index_block_size as u64,
                    Collation::Integer,
                ))
            }
            _ => None,
        };

        let mut tree = IndexTree::new(root, allocation.take(), None);
        let key = id.to_le_bytes();
        let entry = match tree.find(&key)? {
            Some(entry) => entry,
            None => {
                debug!("security descriptor id {} not found in $SII", id);
                return Ok(None);
            }
        };

        // SECURITY_ID_INDEX_DATA: hash(4), id(4), sds_offset(8), sds_size(4).
        if entry.value.len() < 20 {
            return Err(NtfsError::CorruptSds(
                "$SII entry value shorter than SECURITY_ID_INDEX_DATA".to_string(),
            ));
        }
        let sds_offset = u64_le(&entry.value, 8)?;
        let sds_size = u32_le(&entry.value, 16)? as usize;

        let header_and_descriptor = self.sds_vector.read_range(sds_offset, sds_size.max(SDS_HEADER_SIZE))?;
        if header_and_descriptor.len() < SDS_HEADER_SIZE {
            return Err(NtfsError::CorruptSds("SDS entry shorter than its header".to_string()));
        }

        let header_id = u32_le(&header_and_descriptor, 4)?;
        if header_id != id {
            return Err(NtfsError::CorruptSds(format!(
                "SDS header id {} does not match requested id {}",
                header_id, id
            )));
        }

        let descriptor = header_and_descriptor[SDS_HEADER_SIZE..].to_vec();
        Ok(Some(descriptor))
    }
}
