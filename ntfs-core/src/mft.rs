// Entry-indexed store over the Master File Table. §4.6. Resolves the MFT's
// own physical layout (entry 0's $DATA run list, Normal mode) or trusts the
// caller's flat byte_offset arithmetic (MFT_ONLY mode), then serves cached
// entry lookups and splices $ATTRIBUTE_LIST extension entries into the
// logical attribute chain (§4.5's "only recursive cross-entry dependency").

use crate::attribute::{MftAttribute, Residency, ATTR_TYPE_ATTRIBUTE_LIST};
use crate::cluster_vector::{ClusterBlockVector, ClusterCacheConfig};
use crate::entry::{parse_entry, MftEntry};
use crate::error::{NtfsError, Result};
use crate::BlockSource;
use bitflags::bitflags;
use log::{debug, trace};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

bitflags! {
    /// Mirrors §6's "Flags" surface: bit 0 suppresses $MFT self-description.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MftOpenFlags: u32 {
        /// Known limitation (§9 open questions): a fragmented $MFT is
        /// mis-addressed in this mode, since entries are read by flat
        /// arithmetic off `mft_offset` rather than through $DATA's run list.
        /// This is preserved behaviour, not silently upgraded to Normal mode.
        const MFT_ONLY = 0b0000_0001;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EntryCacheConfig {
    pub capacity: usize,
}

impl Default for EntryCacheConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

enum MftLayout {
    MftOnly { mft_offset: u64 },
    Normal { cluster_vector: Box<ClusterBlockVector> },
}

struct EntryCache {
    capacity: usize,
    order: VecDeque<u64>,
    entries: HashMap<u64, MftEntry>,
}

impl EntryCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    fn get(&mut self, index: u64) -> Option<MftEntry> {
        if self.entries.contains_key(&index) {
            if let Some(pos) = self.order.iter().position(|k| *k == index) {
                let k = self.order.remove(pos).unwrap();
                self.order.push_back(k);
            }
            self.entries.get(&index).cloned()
        } else {
            None
        }
    }

    fn insert(&mut self, index: u64, entry: MftEntry) {
        if !self.entries.contains_key(&index) {
            if self.entries.len() >= self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.entries.remove(&evicted);
                }
            }
            self.order.push_back(index);
        }
        self.entries.insert(index, entry);
    }
}

/// Entry-indexed store over the Master File Table.
pub struct Mft {
    source: Arc<dyn BlockSource>,
    mft_entry_size: u32,
    number_of_entries: u64,
    layout: MftLayout,
    cache: EntryCache,
}

impl Mft {
    /// MFT_ONLY mode: `number_of_entries = mft_size / mft_entry_size`, reads
    /// are flat `mft_offset + index * mft_entry_size`.
    pub fn open_mft_only(
        source: Arc<dyn BlockSource>,
        mft_offset: u64,
        mft_size: u64,
        mft_entry_size: u32,
        cache_config: EntryCacheConfig,
    ) -> Result<Self> {
        if mft_entry_size == 0 {
            return Err(NtfsError::InvalidArgument("mft_entry_size is zero".to_string()));
        }
        let number_of_entries = mft_size / mft_entry_size as u64;
        debug!(
            "opening MFT in MFT_ONLY mode: {} entries at offset {}",
            number_of_entries, mft_offset
        );
        Ok(Self {
            source,
            mft_entry_size,
            number_of_entries,
            layout: MftLayout::MftOnly { mft_offset },
            cache: EntryCache::new(cache_config.capacity),
        })
    }

    /// Normal mode: read entry 0 (`$MFT`) directly at `mft_offset`, install
    /// its unnamed $DATA run list as the MFT's own physical layout, and
    /// derive `number_of_entries` from that attribute's `data_size`.
    pub fn open_normal(
        source: Arc<dyn BlockSource>,
        mft_offset: u64,
        mft_entry_size: u32,
        cluster_block_size: u64,
        cluster_cache_config: ClusterCacheConfig,
        cache_config: EntryCacheConfig,
    ) -> Result<Self> {
        if mft_entry_size == 0 {
            return Err(NtfsError::InvalidArgument("mft_entry_size is zero".to_string()));
        }
        let raw = source.read_buffer_at_offset(mft_offset, mft_entry_size as usize)?;
        let mft_self_entry = parse_entry(&raw, 0)?;

        let data_attribute = mft_self_entry
            .attributes
            .iter()
            .find(|a| a.type_code == crate::attribute::ATTR_TYPE_DATA && a.name.is_none())
            .ok_or_else(|| {
                NtfsError::CorruptRecord("MFT entry 0 has no unnamed $DATA attribute".to_string())
            })?;

        let (data_runs, data_size, valid_data_size, allocated_size) = match &data_attribute.residency
        {
            Residency::NonResident {
                data_runs,
                data_size,
                valid_data_size,
                allocated_size,
                ..
            } => (data_runs.clone(), *data_size, *valid_data_size, *allocated_size),
            Residency::Resident { .. } => {
                return Err(NtfsError::CorruptRecord(
                    "MFT entry 0's $DATA attribute is resident; $MFT cannot fit inline".to_string(),
                ))
            }
        };

        let number_of_entries = data_size / mft_entry_size as u64;
        debug!(
            "opening MFT in Normal mode: {} entries, $DATA spans {} runs",
            number_of_entries,
            data_runs.len()
        );

        let cluster_vector = ClusterBlockVector::new(
            source.clone(),
            data_runs,
            cluster_block_size,
            data_size,
            valid_data_size,
            allocated_size,
            data_attribute.attribute_identifier,
            cluster_cache_config,
        );

        Ok(Self {
            source,
            mft_entry_size,
            number_of_entries,
            layout: MftLayout::Normal {
                cluster_vector: Box::new(cluster_vector),
            },
            cache: EntryCache::new(cache_config.capacity),
        })
    }

    pub fn number_of_entries(&self) -> u64 {
        self.number_of_entries
    }

    fn read_entry_bytes(&mut self, index: u64) -> Result<Vec<u8>> {
        match &mut self.layout {
            MftLayout::MftOnly { mft_offset } => {
                let offset = *mft_offset + index * self.mft_entry_size as u64;
                self.source.read_buffer_at_offset(offset, self.mft_entry_size as usize)
            }
            MftLayout::Normal { cluster_vector } => {
                let offset = index * self.mft_entry_size as u64;
                cluster_vector.read_range(offset, self.mft_entry_size as usize)
            }
        }
    }

    /// Parse entry `index` with no ATTRIBUTE_LIST splicing and no cache
    /// interaction. Used both as the no-cache public variant's base case and
    /// to fetch extension entries while splicing.
    fn parse_entry_raw(&mut self, index: u64) -> Result<MftEntry> {
        let bytes = self.read_entry_bytes(index)?;
        parse_entry(&bytes, index)
    }

    /// Splice `$ATTRIBUTE_LIST` extension entries into `entry`'s attribute
    /// chain, in place. A visited-set keyed by `(entry_index, attribute_id)`
    /// bounds recursion and absorbs the self-referencing cycle edge case
    /// (§8 boundary behaviours, §9 cyclic ownership avoidance).
    fn splice_attribute_list(&mut self, entry: &mut MftEntry) -> Result<()> {
        let list = match entry.attribute_list() {
            Some(result) => result?,
            None => return Ok(()),
        };

        let mut visited: HashSet<(u64, u16)> = HashSet::new();
        let mut merged: Vec<MftAttribute> = Vec::new();

        for list_entry in &list {
            let key = (list_entry.mft_reference.entry_number, list_entry.attribute_identifier);
            if !visited.insert(key) {
                trace!(
                    "attribute list entry {:?} already spliced, skipping (cycle guard)",
                    key
                );
                continue;
            }

            let source_entry_attrs: &[MftAttribute] =
                if list_entry.mft_reference.entry_number == entry.file_reference.entry_number {
                    &entry.attributes
                } else {
                    let extension = self.parse_entry_raw(list_entry.mft_reference.entry_number)?;
                    merged.extend(
                        extension
                            .attributes
                            .into_iter()
                            .filter(|a| {
                                a.type_code == list_entry.type_code
                                    && a.attribute_identifier == list_entry.attribute_identifier
                            }),
                    );
                    continue;
                };

            if let Some(attr) = source_entry_attrs.iter().find(|a| {
                a.type_code == list_entry.type_code
                    && a.attribute_identifier == list_entry.attribute_identifier
            }) {
                merged.push(attr.clone());
            }
        }

        merged.sort_by(|a, b| {
            a.type_code
                .cmp(&b.type_code)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| first_vcn_of(a).cmp(&first_vcn_of(b)))
        });

        entry.replace_attributes(merged);
        Ok(())
    }

    /// Fetch entry `index`, bypassing the cache. Returns an owned copy with
    /// its ATTRIBUTE_LIST (if any) already spliced in.
    pub fn get_entry_no_cache(&mut self, index: u64) -> Result<MftEntry> {
        if index >= self.number_of_entries {
            return Err(NtfsError::OutOfBounds(format!(
                "MFT entry index {} >= number_of_entries {}",
                index, self.number_of_entries
            )));
        }
        let mut entry = self.parse_entry_raw(index)?;
        if entry.find_attribute(ATTR_TYPE_ATTRIBUTE_LIST).is_some() {
            self.splice_attribute_list(&mut entry)?;
        }
        Ok(entry)
    }

    /// Fetch entry `index` through the LRU entry cache.
    pub fn get_entry(&mut self, index: u64) -> Result<MftEntry> {
        if index >= self.number_of_entries {
            return Err(NtfsError::OutOfBounds(format!(
                "MFT entry index {} >= number_of_entries {}",
                index, self.number_of_entries
            )));
        }
        if let Some(entry) = self.cache.get(index) {
            trace!("MFT entry cache hit for index {}", index);
            return Ok(entry);
        }
        trace!("MFT entry cache miss for index {}", index);
        let entry = self.get_entry_no_cache(index)?;
        self.cache.insert(index, entry.clone());
        Ok(entry)
    }
}

fn first_vcn_of(attribute: &MftAttribute) -> u64 {
    match &attribute.residency {
        Residency::NonResident { first_vcn, .. } => *first_vcn,
        Residency::Resident { .. } => 0,
    }
}
