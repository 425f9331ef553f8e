// One MFT attribute: common header plus resident or non-resident body.
// §4.4 of the design.

use crate::data_runs::{decode_data_runs, DataRun};
use crate::decoder::{u16_le, u32_le, u64_le, utf16le_to_string};
use crate::error::{NtfsError, Result};

pub const ATTR_TYPE_STANDARD_INFORMATION: u32 = 0x10;
pub const ATTR_TYPE_ATTRIBUTE_LIST: u32 = 0x20;
pub const ATTR_TYPE_FILE_NAME: u32 = 0x30;
pub const ATTR_TYPE_OBJECT_ID: u32 = 0x40;
pub const ATTR_TYPE_SECURITY_DESCRIPTOR: u32 = 0x50;
pub const ATTR_TYPE_VOLUME_NAME: u32 = 0x60;
pub const ATTR_TYPE_VOLUME_INFORMATION: u32 = 0x70;
pub const ATTR_TYPE_DATA: u32 = 0x80;
pub const ATTR_TYPE_INDEX_ROOT: u32 = 0x90;
pub const ATTR_TYPE_INDEX_ALLOCATION: u32 = 0xA0;
pub const ATTR_TYPE_BITMAP: u32 = 0xB0;
pub const ATTR_TYPE_REPARSE_POINT: u32 = 0xC0;
pub const ATTR_TYPE_END: u32 = 0xFFFFFFFF;

const FLAG_COMPRESSED: u16 = 0x0001;
const FLAG_ENCRYPTED: u16 = 0x4000;
const FLAG_SPARSE: u16 = 0x8000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeDataFlags {
    pub compressed: bool,
    pub encrypted: bool,
    pub sparse: bool,
}

impl AttributeDataFlags {
    fn from_raw(raw: u16) -> Self {
        Self {
            compressed: raw & FLAG_COMPRESSED != 0,
            encrypted: raw & FLAG_ENCRYPTED != 0,
            sparse: raw & FLAG_SPARSE != 0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Residency {
    Resident { data: Vec<u8>, indexed: bool },
    NonResident {
        first_vcn: u64,
        last_vcn: u64,
        allocated_size: u64,
        data_size: u64,
        valid_data_size: u64,
        compression_unit_size_log2: u16,
        total_size: Option<u64>,
        data_runs: Vec<DataRun>,
    },
}

#[derive(Debug, Clone)]
pub struct MftAttribute {
    pub type_code: u32,
    pub record_length: u32,
    pub name: Option<String>,
    pub data_flags: AttributeDataFlags,
    pub attribute_identifier: u16,
    pub residency: Residency,
}

impl MftAttribute {
    pub fn is_resident(&self) -> bool {
        matches!(self.residency, Residency::Resident { .. })
    }

    pub fn resident_data(&self) -> Option<&[u8]> {
        match &self.residency {
            Residency::Resident { data, .. } => Some(data),
            Residency::NonResident { .. } => None,
        }
    }

    pub fn data_runs(&self) -> Option<&[DataRun]> {
        match &self.residency {
            Residency::NonResident { data_runs, .. } => Some(data_runs),
            Residency::Resident { .. } => None,
        }
    }

    pub fn name_matches(&self, query: &str) -> bool {
        match &self.name {
            Some(name) => name == query,
            None => query.is_empty(),
        }
    }
}

/// Parse one attribute starting at `offset` in `record`. Returns the
/// attribute and the byte offset of the attribute following it
/// (`offset + record_length`).
pub fn parse_attribute(record: &[u8], offset: usize) -> Result<(MftAttribute, usize)> {
    let type_code = u32_le(record, offset)?;
    if type_code == ATTR_TYPE_END {
        return Ok((
            MftAttribute {
                type_code,
                record_length: 0,
                name: None,
                data_flags: AttributeDataFlags::default(),
                attribute_identifier: 0,
                residency: Residency::Resident {
                    data: Vec::new(),
                    indexed: false,
                },
            },
            offset,
        ));
    }

    let record_length = u32_le(record, offset + 4)?;
    if record_length == 0 || record_length % 8 != 0 {
        return Err(NtfsError::CorruptRecord(format!(
            "attribute record_length {} is not a nonzero multiple of 8",
            record_length
        )));
    }
    if offset + record_length as usize > record.len() {
        return Err(NtfsError::CorruptRecord(format!(
            "attribute at {} with length {} extends beyond record of {} bytes",
            offset,
            record_length,
            record.len()
        )));
    }

    let non_resident_flag = record[offset + 8];
    let name_length = record[offset + 9];
    let name_offset = u16_le(record, offset + 10)?;
    let data_flags = AttributeDataFlags::from_raw(u16_le(record, offset + 12)?);
    let attribute_identifier = u16_le(record, offset + 14)?;

    let residency = if non_resident_flag == 0 {
        let data_size = u32_le(record, offset + 16)? as usize;
        let data_offset = u16_le(record, offset + 20)? as usize;
        let indexed = record[offset + 22] != 0;
        if data_offset + data_size > record_length as usize {
            return Err(NtfsError::CorruptRecord(
                "resident attribute data exceeds its own record_length".to_string(),
            ));
        }
        let data = record[offset + data_offset..offset + data_offset + data_size].to_vec();
        Residency::Resident { data, indexed }
    } else {
        let first_vcn = u64_le(record, offset + 16)?;
        let last_vcn = u64_le(record, offset + 24)?;
        let data_runs_offset = u16_le(record, offset + 32)? as usize;
        let compression_unit_size_log2 = u16_le(record, offset + 34)?;
        let allocated_size = u64_le(record, offset + 40)?;
        let data_size = u64_le(record, offset + 48)?;
        let valid_data_size = u64_le(record, offset + 56)?;
        let mut header_end = offset + 64;
        let total_size = if data_flags.compressed {
            let v = u64_le(record, header_end)?;
            header_end += 8;
            Some(v)
        } else {
            None
        };
        let _ = header_end;

        let runs_start = offset + data_runs_offset;
        let runs_end = offset + record_length as usize;
        if runs_start > runs_end || runs_end > record.len() {
            return Err(NtfsError::CorruptRecord(
                "data run offset out of range".to_string(),
            ));
        }
        let data_runs = decode_data_runs(&record[runs_start..runs_end], first_vcn)?;

        let run_total: u64 = data_runs.iter().map(|r| r.length_in_clusters).sum();
        let expected = last_vcn.checked_sub(first_vcn).map(|d| d + 1).unwrap_or(0);
        if !data_runs.is_empty() && run_total != expected {
            return Err(NtfsError::CorruptRecord(format!(
                "data run lengths sum to {} but first/last VCN imply {}",
                run_total, expected
            )));
        }

        Residency::NonResident {
            first_vcn,
            last_vcn,
            allocated_size,
            data_size,
            valid_data_size,
            compression_unit_size_log2,
            total_size,
            data_runs,
        }
    };

    let name = if name_length == 0 {
        None
    } else {
        let start = offset + name_offset as usize;
        let end = start + name_length as usize * 2;
        if end > record.len() {
            return Err(NtfsError::CorruptRecord(
                "attribute name extends beyond record".to_string(),
            ));
        }
        Some(utf16le_to_string(&record[start..end])?)
    };

    Ok((
        MftAttribute {
            type_code,
            record_length,
            name,
            data_flags,
            attribute_identifier,
            residency,
        },
        offset + record_length as usize,
    ))
}
