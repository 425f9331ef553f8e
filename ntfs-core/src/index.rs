// B+-tree reader over an $INDEX_ROOT / $INDEX_ALLOCATION pair. §4.7.
// Entry layout (16-byte header + key + optional trailing sub-node VCN)
// mirrors the teacher's `IndexEntryHeader`/`FileNameAttr` byte offsets; the
// collation rule is injected so the same walk serves $I30, $SII and $SDH.

use crate::cluster_vector::ClusterBlockVector;
use crate::decoder::{apply_fixup, u16_le, u32_le, u64_le, utf16le_to_string};
use crate::error::{NtfsError, Result};
use crate::file_reference::FileReference;
use log::{debug, trace};
use std::cmp::Ordering;

pub const COLLATION_BINARY: u32 = 0x00;
pub const COLLATION_FILE_NAME: u32 = 0x01;
pub const COLLATION_UNICODE_STRING: u32 = 0x02;
pub const COLLATION_ULONG: u32 = 0x10;
pub const COLLATION_SID: u32 = 0x11;
pub const COLLATION_SECURITY_HASH: u32 = 0x12;
pub const COLLATION_ULONGS: u32 = 0x13;

const INDEX_ENTRY_FLAG_HAS_SUB_NODE: u16 = 0x0001;
const INDEX_ENTRY_FLAG_LAST: u16 = 0x0002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collation {
    FileName,
    Integer,
    SecurityHash,
}

impl Collation {
    pub fn from_rule(rule: u32) -> Result<Self> {
        match rule {
            COLLATION_FILE_NAME => Ok(Collation::FileName),
            COLLATION_ULONG | COLLATION_ULONGS => Ok(Collation::Integer),
            COLLATION_SECURITY_HASH | COLLATION_SID => Ok(Collation::SecurityHash),
            COLLATION_BINARY | COLLATION_UNICODE_STRING => Err(NtfsError::Unsupported(format!(
                "collation rule {:#x} is not implemented",
                rule
            ))),
            other => Err(NtfsError::Unsupported(format!(
                "unknown collation rule {:#x}",
                other
            ))),
        }
    }

    /// Compare a search key against a candidate entry's key, both as raw
    /// on-disk bytes. `upcase_table` is required (and only meaningful) for
    /// `FileName` collation.
    pub fn compare(&self, query: &[u8], candidate: &[u8], upcase_table: Option<&[u16]>) -> Result<Ordering> {
        match self {
            Collation::FileName => compare_file_names(query, candidate, upcase_table),
            Collation::Integer => {
                let a = u32_le(query, 0)?;
                let b = u32_le(candidate, 0)?;
                Ok(a.cmp(&b))
            }
            Collation::SecurityHash => {
                let a_hash = u32_le(query, 0)?;
                let a_id = u32_le(query, 4)?;
                let b_hash = u32_le(candidate, 0)?;
                let b_id = u32_le(candidate, 4)?;
                Ok((a_hash, a_id).cmp(&(b_hash, b_id)))
            }
        }
    }
}

fn compare_file_names(query: &[u8], candidate: &[u8], upcase_table: Option<&[u16]>) -> Result<Ordering> {
    let query_name = file_name_key_units(query)?;
    let candidate_name = file_name_key_units(candidate)?;

    let upcased = |units: &[u16]| -> Vec<u16> {
        match upcase_table {
            Some(table) => units
                .iter()
                .map(|&u| table.get(u as usize).copied().unwrap_or(u))
                .collect(),
            None => units.to_vec(),
        }
    };

    let query_upcased = upcased(&query_name);
    let candidate_upcased = upcased(&candidate_name);
    match query_upcased.cmp(&candidate_upcased) {
        Ordering::Equal => Ok(query_name.cmp(&candidate_name)),
        other => Ok(other),
    }
}

/// The key for a $FILE_NAME-collated index entry is a full $FILE_NAME
/// attribute value; the comparable part is just the name, at byte 66
/// onward (see `values::parse_file_name`'s `HEADER_SIZE`).
fn file_name_key_units(key: &[u8]) -> Result<Vec<u16>> {
    const HEADER_SIZE: usize = 66;
    if key.len() < HEADER_SIZE {
        return Err(NtfsError::CorruptRecord(
            "index key shorter than $FILE_NAME fixed header".to_string(),
        ));
    }
    let name_length = key[64] as usize;
    let name_bytes_len = name_length * 2;
    let name_bytes = key
        .get(HEADER_SIZE..HEADER_SIZE + name_bytes_len)
        .ok_or_else(|| NtfsError::CorruptRecord("index key name extends beyond key bytes".to_string()))?;
    Ok(name_bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect())
}

/// One parsed index entry. `file_reference` is populated for `FileName`
/// collation (the MFT reference the directory entry names); `value` holds
/// the payload bytes for data-carrying collations ($SII/$SDH).
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub file_reference: Option<FileReference>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub has_sub_node: bool,
    pub is_last: bool,
    pub sub_node_vcn: Option<u64>,
}

impl IndexEntry {
    pub fn file_name(&self) -> Result<String> {
        let units = file_name_key_units(&self.key)?;
        utf16le_to_string(
            &units
                .iter()
                .flat_map(|u| u.to_le_bytes())
                .collect::<Vec<u8>>(),
        )
    }
}

/// Decode one node's worth of packed index entries (16-byte header + key +
/// optional trailing sub-node VCN, terminated by the LAST-flagged entry).
fn decode_entries(data: &[u8], collation: Collation) -> Result<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    let mut offset = 0usize;

    loop {
        if offset + 16 > data.len() {
            break;
        }
        let header_data = &data[offset..offset + 8];
        let length = u16_le(data, offset + 8)? as usize;
        let key_length = u16_le(data, offset + 10)? as usize;
        let flags = u16_le(data, offset + 12)?;

        if length == 0 {
            return Err(NtfsError::CorruptRecord(
                "zero-length index entry".to_string(),
            ));
        }
        if offset + length > data.len() {
            return Err(NtfsError::CorruptRecord(
                "index entry extends beyond node".to_string(),
            ));
        }

        let has_sub_node = flags & INDEX_ENTRY_FLAG_HAS_SUB_NODE != 0;
        let is_last = flags & INDEX_ENTRY_FLAG_LAST != 0;

        let (file_reference, value) = match collation {
            Collation::FileName => (Some(FileReference::from_raw(u64_le(header_data, 0)?)), Vec::new()),
            Collation::Integer | Collation::SecurityHash => {
                let data_offset = u16_le(header_data, 0)? as usize;
                let data_length = u16_le(header_data, 2)? as usize;
                let value = if data_length == 0 {
                    Vec::new()
                } else {
                    data.get(offset + data_offset..offset + data_offset + data_length)
                        .ok_or_else(|| {
                            NtfsError::CorruptRecord("index entry value extends beyond node".to_string())
                        })?
                        .to_vec()
                };
                (None, value)
            }
        };

        let key = if is_last || key_length == 0 {
            Vec::new()
        } else {
            data.get(offset + 16..offset + 16 + key_length)
                .ok_or_else(|| NtfsError::CorruptRecord("index entry key extends beyond node".to_string()))?
                .to_vec()
        };

        let sub_node_vcn = if has_sub_node {
            Some(u64_le(data, offset + length - 8)?)
        } else {
            None
        };

        entries.push(IndexEntry {
            file_reference,
            key,
            value,
            has_sub_node,
            is_last,
            sub_node_vcn,
        });

        if is_last {
            break;
        }
        offset += length;
    }

    Ok(entries)
}

struct NodeHeader {
    entries_offset: u32,
    index_length: u32,
}

fn parse_node_header(data: &[u8], header_start: usize) -> Result<NodeHeader> {
    Ok(NodeHeader {
        entries_offset: u32_le(data, header_start)?,
        index_length: u32_le(data, header_start + 4)?,
    })
}

fn entries_in_node(data: &[u8], header_start: usize, collation: Collation) -> Result<Vec<IndexEntry>> {
    let header = parse_node_header(data, header_start)?;
    let start = header_start + header.entries_offset as usize;
    let end = header_start + header.index_length as usize;
    if start > end || end > data.len() {
        return Err(NtfsError::CorruptRecord(
            "index node entries region out of range".to_string(),
        ));
    }
    decode_entries(&data[start..end], collation)
}

/// Resident $INDEX_ROOT: `attribute_type, collation_rule, index_block_size,
/// clusters_per_index_block` (16 bytes) followed by a 16-byte node header.
pub struct IndexRoot {
    pub attribute_type: u32,
    pub collation: Collation,
    pub index_block_size: u32,
    pub entries: Vec<IndexEntry>,
}

pub fn parse_index_root(data: &[u8]) -> Result<IndexRoot> {
    const PREFIX_SIZE: usize = 16;
    if data.len() < PREFIX_SIZE + 16 {
        return Err(NtfsError::CorruptRecord(
            "$INDEX_ROOT shorter than fixed header".to_string(),
        ));
    }
    let attribute_type = u32_le(data, 0)?;
    let collation_rule = u32_le(data, 4)?;
    let index_block_size = u32_le(data, 8)?;
    let collation = Collation::from_rule(collation_rule)?;

    let entries = entries_in_node(data, PREFIX_SIZE, collation)?;
    trace!(
        "$INDEX_ROOT for attribute {:#x}: {} entries, collation {:?}",
        attribute_type,
        entries.len(),
        collation
    );

    Ok(IndexRoot {
        attribute_type,
        collation,
        index_block_size,
        entries,
    })
}

/// One non-resident `INDX` record: signature, fixup, VCN, node header and
/// entries.
pub fn parse_index_record(raw: &[u8], collation: Collation) -> Result<Vec<IndexEntry>> {
    const HEADER_SIZE: usize = 24;
    if raw.len() < HEADER_SIZE + 16 {
        return Err(NtfsError::CorruptRecord(
            "INDX record shorter than fixed header".to_string(),
        ));
    }
    if &raw[0..4] != b"INDX" {
        return Err(NtfsError::CorruptRecord(
            "INDX record has invalid signature".to_string(),
        ));
    }
    let usa_offset = u16_le(raw, 4)?;
    let usa_count = u16_le(raw, 6)?;
    let record = apply_fixup(raw, usa_offset, usa_count)?;

    entries_in_node(&record, HEADER_SIZE, collation)
}

/// Reads $INDEX_ALLOCATION nodes on demand via the cluster block vector,
/// addressed by VCN in units of `index_block_size` bytes.
pub struct IndexAllocation<'a> {
    cluster_vector: &'a mut ClusterBlockVector,
    index_block_size: u64,
    collation: Collation,
}

impl<'a> IndexAllocation<'a> {
    pub fn new(cluster_vector: &'a mut ClusterBlockVector, index_block_size: u64, collation: Collation) -> Self {
        Self {
            cluster_vector,
            index_block_size,
            collation,
        }
    }

    fn read_node(&mut self, vcn: u64) -> Result<Vec<IndexEntry>> {
        let offset = vcn
            .checked_mul(self.index_block_size)
            .ok_or_else(|| NtfsError::OutOfBounds("index VCN * block size overflow".to_string()))?;
        let raw = self.cluster_vector.read_range(offset, self.index_block_size as usize)?;
        parse_index_record(&raw, self.collation)
    }
}

/// Owns an $INDEX_ROOT plus an optional $INDEX_ALLOCATION reader, and
/// implements the search/traversal algorithms of §4.7.
pub struct IndexTree<'a> {
    root: IndexRoot,
    allocation: Option<IndexAllocation<'a>>,
    upcase_table: Option<&'a [u16]>,
}

impl<'a> IndexTree<'a> {
    pub fn new(root: IndexRoot, allocation: Option<IndexAllocation<'a>>, upcase_table: Option<&'a [u16]>) -> Self {
        Self {
            root,
            allocation,
            upcase_table,
        }
    }

    pub fn collation(&self) -> Collation {
        self.root.collation
    }

    /// `find(key)` per §4.7: linear scan at each node, descending via
    /// `sub_node_vcn` when present.
    pub fn find(&mut self, key: &[u8]) -> Result<Option<IndexEntry>> {
        let root_entries = self.root.entries.clone();
        let collation = self.root.collation;
        let upcase_table = self.upcase_table;
        Self::search_node(&mut self.allocation, root_entries, key, collation, upcase_table)
    }

    fn search_node(
        allocation: &mut Option<IndexAllocation<'a>>,
        entries: Vec<IndexEntry>,
        key: &[u8],
        collation: Collation,
        upcase_table: Option<&[u16]>,
    ) -> Result<Option<IndexEntry>> {
        for entry in &entries {
            if entry.is_last {
                if entry.has_sub_node {
                    return Self::descend(allocation, entry.sub_node_vcn.unwrap(), key, collation, upcase_table);
                }
                return Ok(None);
            }

            let ordering = collation.compare(key, &entry.key, upcase_table)?;
            match ordering {
                Ordering::Equal => return Ok(Some(entry.clone())),
                Ordering::Less => {
                    if entry.has_sub_node {
                        return Self::descend(allocation, entry.sub_node_vcn.unwrap(), key, collation, upcase_table);
                    }
                    return Ok(None);
                }
                Ordering::Greater => continue,
            }
        }
        Ok(None)
    }

    fn descend(
        allocation: &mut Option<IndexAllocation<'a>>,
        vcn: u64,
        key: &[u8],
        collation: Collation,
        upcase_table: Option<&[u16]>,
    ) -> Result<Option<IndexEntry>> {
        debug!("descending $INDEX_ALLOCATION to vcn {}", vcn);
        match allocation {
            Some(alloc) => {
                let entries = alloc.read_node(vcn)?;
                Self::search_node(allocation, entries, key, collation, upcase_table)
            }
            None => Err(NtfsError::CorruptRecord(
                "index entry has a sub-node but no $INDEX_ALLOCATION is present".to_string(),
            )),
        }
    }

    /// In-order traversal yielding every entry, root and allocation nodes
    /// alike, in collation order. Used for directory listing.
    pub fn iter_all(&mut self) -> Result<Vec<IndexEntry>> {
        let root_entries = self.root.entries.clone();
        let mut out = Vec::new();
        self.visit_in_order(root_entries, &mut out)?;
        Ok(out)
    }

    fn visit_in_order(&mut self, entries: Vec<IndexEntry>, out: &mut Vec<IndexEntry>) -> Result<()> {
        for entry in entries {
            if entry.has_sub_node {
                let vcn = entry.sub_node_vcn.unwrap();
                let child_entries = match &mut self.allocation {
                    Some(alloc) => alloc.read_node(vcn)?,
                    None => {
                        return Err(NtfsError::CorruptRecord(
                            "index entry has a sub-node but no $INDEX_ALLOCATION is present".to_string(),
                        ))
                    }
                };
                self.visit_in_order(child_entries, out)?;
            }
            if !entry.is_last {
                out.push(entry);
            }
        }
        Ok(())
    }
}
