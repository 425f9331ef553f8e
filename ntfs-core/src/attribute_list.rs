// $ATTRIBUTE_LIST (0x20) payload: a packed list of pointers to attributes
// that live in this entry or in extension ("base") MFT entries. §4.5.

use crate::decoder::{u16_le, u32_le, u64_le, utf16le_to_string};
use crate::error::{NtfsError, Result};
use crate::file_reference::FileReference;

#[derive(Debug, Clone)]
pub struct AttributeListEntry {
    pub type_code: u32,
    pub name: Option<String>,
    pub first_vcn: u64,
    pub mft_reference: FileReference,
    pub attribute_identifier: u16,
}

/// Parse the resident payload of an $ATTRIBUTE_LIST attribute.
pub fn parse_attribute_list(data: &[u8]) -> Result<Vec<AttributeListEntry>> {
    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset < data.len() {
        if offset + 8 > data.len() {
            break;
        }
        let type_code = u32_le(data, offset)?;
        let record_length = u16_le(data, offset + 4)?;
        if record_length == 0 {
            return Err(NtfsError::CorruptRecord(
                "zero-length $ATTRIBUTE_LIST entry".to_string(),
            ));
        }
        if offset + record_length as usize > data.len() {
            return Err(NtfsError::CorruptRecord(
                "$ATTRIBUTE_LIST entry extends beyond payload".to_string(),
            ));
        }
        let name_length = data[offset + 6];
        let name_offset = data[offset + 7];
        let first_vcn = u64_le(data, offset + 8)?;
        let mft_reference = FileReference::from_raw(u64_le(data, offset + 16)?);
        let attribute_identifier = u16_le(data, offset + 24)?;

        let name = if name_length == 0 {
            None
        } else {
            let start = offset + name_offset as usize;
            let end = start + name_length as usize * 2;
            if end > data.len() {
                return Err(NtfsError::CorruptRecord(
                    "$ATTRIBUTE_LIST entry name extends beyond payload".to_string(),
                ));
            }
            Some(utf16le_to_string(&data[start..end])?)
        };

        entries.push(AttributeListEntry {
            type_code,
            name,
            first_vcn,
            mft_reference,
            attribute_identifier,
        });

        offset += record_length as usize;
    }

    Ok(entries)
}
