// One FILE record: header, fixup, and its own (unmerged) attribute chain.
// §4.5. ATTRIBUTE_LIST splicing across extension entries is the MFT's job
// (see mft.rs), not this module's — a record only ever knows about itself.

use crate::attribute::{
    parse_attribute, MftAttribute, ATTR_TYPE_ATTRIBUTE_LIST, ATTR_TYPE_DATA, ATTR_TYPE_END,
    ATTR_TYPE_FILE_NAME, ATTR_TYPE_OBJECT_ID,
};
use crate::attribute_list::{parse_attribute_list, AttributeListEntry};
use crate::decoder::{apply_fixup, u16_le, u32_le, u64_le};
use crate::error::{NtfsError, Result};
use crate::file_reference::FileReference;
use crate::values::{parse_file_name, FILE_NAME_NAMESPACE_WIN32, FILE_NAME_NAMESPACE_WIN32_AND_DOS};
use log::trace;

const FLAG_IN_USE: u16 = 0x0001;
const FLAG_IS_DIRECTORY: u16 = 0x0002;
const FLAG_IS_INDEX_VIEW: u16 = 0x0004;
const FLAG_IS_SPECIAL: u16 = 0x0008;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryFlags {
    pub in_use: bool,
    pub is_directory: bool,
    pub is_index_view: bool,
    pub is_special: bool,
}

impl EntryFlags {
    fn from_raw(raw: u16) -> Self {
        Self {
            in_use: raw & FLAG_IN_USE != 0,
            is_directory: raw & FLAG_IS_DIRECTORY != 0,
            is_index_view: raw & FLAG_IS_INDEX_VIEW != 0,
            is_special: raw & FLAG_IS_SPECIAL != 0,
        }
    }
}

/// §4.5: pick the $FILE_NAME attribute namespace resolution prefers — Win32
/// or Win32&DOS over a DOS 8.3 or POSIX name, since a name's namespace is
/// unrelated to its on-disk attribute order. Falls back to the first
/// $FILE_NAME attribute when none parses or none is Win32/Win32&DOS.
fn select_file_name_attribute_index(attributes: &[MftAttribute]) -> Option<usize> {
    let candidates: Vec<usize> = attributes
        .iter()
        .enumerate()
        .filter(|(_, a)| a.type_code == ATTR_TYPE_FILE_NAME)
        .map(|(i, _)| i)
        .collect();

    candidates
        .iter()
        .copied()
        .find(|&i| {
            attributes[i]
                .resident_data()
                .and_then(|data| parse_file_name(data).ok())
                .is_some_and(|value| {
                    value.namespace == FILE_NAME_NAMESPACE_WIN32
                        || value.namespace == FILE_NAME_NAMESPACE_WIN32_AND_DOS
                })
        })
        .or_else(|| candidates.first().copied())
}

#[derive(Debug, Clone)]
pub struct MftEntry {
    pub file_reference: FileReference,
    pub base_record_reference: FileReference,
    pub flags: EntryFlags,
    pub attributes: Vec<MftAttribute>,
    pub file_name_attribute_index: Option<usize>,
    pub data_attribute_index: Option<usize>,
    pub has_object_id: bool,
}

impl MftEntry {
    pub fn is_directory(&self) -> bool {
        self.flags.is_directory
    }

    pub fn is_in_use(&self) -> bool {
        self.flags.in_use
    }

    /// Find the first attribute of the given type, optionally filtered by
    /// name (pass `""` to match the unnamed instance).
    pub fn find_attribute(&self, type_code: u32) -> Option<&MftAttribute> {
        self.attributes.iter().find(|a| a.type_code == type_code)
    }

    pub fn find_attribute_named(&self, type_code: u32, name: &str) -> Option<&MftAttribute> {
        self.attributes
            .iter()
            .find(|a| a.type_code == type_code && a.name_matches(name))
    }

    pub fn attributes_of_type(&self, type_code: u32) -> impl Iterator<Item = &MftAttribute> {
        self.attributes
            .iter()
            .filter(move |a| a.type_code == type_code)
    }

    pub fn attribute_list(&self) -> Option<Result<Vec<AttributeListEntry>>> {
        self.find_attribute(ATTR_TYPE_ATTRIBUTE_LIST)
            .map(|attr| match attr.resident_data() {
                Some(data) => parse_attribute_list(data),
                None => Err(NtfsError::Unsupported(
                    "non-resident $ATTRIBUTE_LIST is not supported".to_string(),
                )),
            })
    }

    /// Replace this entry's attribute chain (used after ATTRIBUTE_LIST
    /// splicing in `mft.rs`), recomputing the derived indices to match.
    pub fn replace_attributes(&mut self, attributes: Vec<MftAttribute>) {
        self.file_name_attribute_index = select_file_name_attribute_index(&attributes);
        self.data_attribute_index = attributes
            .iter()
            .position(|a| a.type_code == ATTR_TYPE_DATA && a.name.is_none());
        self.has_object_id = attributes.iter().any(|a| a.type_code == ATTR_TYPE_OBJECT_ID);
        self.attributes = attributes;
    }
}

/// Parse one FILE record, applying its fixup and walking its local attribute
/// chain. Does not follow `$ATTRIBUTE_LIST` into other entries.
pub fn parse_entry(raw: &[u8], record_number: u64) -> Result<MftEntry> {
    if raw.len() < 56 {
        return Err(NtfsError::CorruptRecord("MFT record shorter than header".to_string()));
    }

    let signature = &raw[0..4];
    if signature == b"BAAD" {
        return Err(NtfsError::CorruptRecord(format!(
            "MFT record {} carries the BAAD signature",
            record_number
        )));
    }
    if signature != b"FILE" {
        return Err(NtfsError::CorruptRecord(format!(
            "MFT record {} has invalid signature {:?}",
            record_number, signature
        )));
    }

    let usa_offset = u16_le(raw, 4)?;
    let usa_count = u16_le(raw, 6)?;
    let sequence_number = u16_le(raw, 16)?;
    let attrs_offset = u16_le(raw, 20)? as usize;
    let flags = EntryFlags::from_raw(u16_le(raw, 22)?);
    let bytes_used = u32_le(raw, 24)? as usize;
    let base_record_reference = FileReference::from_raw(u64_le(raw, 32)?);

    let record = apply_fixup(raw, usa_offset, usa_count)?;

    if bytes_used > record.len() {
        return Err(NtfsError::CorruptRecord(format!(
            "MFT record {} bytes_used {} exceeds record size {}",
            record_number, bytes_used, record.len()
        )));
    }

    let mut attributes = Vec::new();
    let mut offset = attrs_offset;
    let mut last_type_code = 0u32;

    loop {
        if offset >= bytes_used {
            break;
        }
        let type_code = u32_le(&record, offset)?;
        if type_code == ATTR_TYPE_END {
            break;
        }
        let record_length = u32_le(&record, offset + 4)?;
        if record_length == 0 {
            break;
        }
        if type_code < last_type_code {
            return Err(NtfsError::CorruptRecord(format!(
                "MFT record {} attribute type_code out of order: {:#x} after {:#x}",
                record_number, type_code, last_type_code
            )));
        }
        last_type_code = type_code;

        let (attribute, next_offset) = parse_attribute(&record, offset)?;
        trace!(
            "entry {}: attribute type={:#x} resident={} len={}",
            record_number,
            attribute.type_code,
            attribute.is_resident(),
            attribute.record_length
        );
        offset = next_offset;
        attributes.push(attribute);
    }

    let file_name_attribute_index = select_file_name_attribute_index(&attributes);
    let data_attribute_index = attributes
        .iter()
        .position(|a| a.type_code == ATTR_TYPE_DATA && a.name.is_none());
    let has_object_id = attributes.iter().any(|a| a.type_code == ATTR_TYPE_OBJECT_ID);

    Ok(MftEntry {
        file_reference: FileReference {
            entry_number: record_number,
            sequence_number,
        },
        base_record_reference,
        flags,
        attributes,
        file_name_attribute_index,
        data_attribute_index,
        has_object_id,
    })
}
