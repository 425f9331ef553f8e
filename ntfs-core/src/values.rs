// Per-attribute-type payload parsers. §4.9 design note: dynamic dispatch
// over attribute types is represented as a tagged variant constructed by a
// dispatch on the decoded `type_code`; unknown types retain raw bytes.

use crate::attribute::{
    MftAttribute, ATTR_TYPE_DATA, ATTR_TYPE_FILE_NAME, ATTR_TYPE_OBJECT_ID,
    ATTR_TYPE_REPARSE_POINT, ATTR_TYPE_STANDARD_INFORMATION, ATTR_TYPE_VOLUME_INFORMATION,
    ATTR_TYPE_VOLUME_NAME,
};
use crate::decoder::{filetime_to_datetime, u16_le, u32_le, u64_le, utf16le_to_string};
use crate::error::{NtfsError, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const FILE_NAME_NAMESPACE_POSIX: u8 = 0;
pub const FILE_NAME_NAMESPACE_WIN32: u8 = 1;
pub const FILE_NAME_NAMESPACE_DOS: u8 = 2;
pub const FILE_NAME_NAMESPACE_WIN32_AND_DOS: u8 = 3;

#[derive(Debug, Clone)]
pub struct StandardInformation {
    pub creation_time: Option<DateTime<Utc>>,
    pub last_modification_time: Option<DateTime<Utc>>,
    pub last_mft_modification_time: Option<DateTime<Utc>>,
    pub last_access_time: Option<DateTime<Utc>>,
    pub file_attributes: u32,
    pub owner_id: Option<u32>,
    pub security_id: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct FileNameValue {
    pub parent_directory: crate::file_reference::FileReference,
    pub creation_time: Option<DateTime<Utc>>,
    pub last_modification_time: Option<DateTime<Utc>>,
    pub last_mft_modification_time: Option<DateTime<Utc>>,
    pub last_access_time: Option<DateTime<Utc>>,
    pub allocated_size: u64,
    pub real_size: u64,
    pub file_attributes: u32,
    pub namespace: u8,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ObjectIdValue {
    pub object_id: Uuid,
    pub birth_volume_id: Option<Uuid>,
    pub birth_object_id: Option<Uuid>,
    pub domain_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct VolumeNameValue {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct VolumeInformationValue {
    pub major_version: u8,
    pub minor_version: u8,
    pub flags: u16,
}

#[derive(Debug, Clone)]
pub struct ReparsePointValue {
    pub reparse_tag: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct DataValue {
    pub is_resident: bool,
    pub is_compressed: bool,
    pub is_encrypted: bool,
    pub is_sparse: bool,
    pub size: u64,
}

/// The tagged dispatch over attribute types. `Unknown` carries the raw
/// resident bytes (or nothing, for non-resident types with no typed parser);
/// the caller can still reach the raw attribute through `MftEntry` directly.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    StandardInformation(StandardInformation),
    FileName(FileNameValue),
    ObjectId(ObjectIdValue),
    VolumeName(VolumeNameValue),
    VolumeInformation(VolumeInformationValue),
    ReparsePoint(ReparsePointValue),
    Data(DataValue),
    Unknown { type_code: u32 },
}

pub fn parse_attribute_value(attribute: &MftAttribute) -> Result<AttributeValue> {
    match attribute.type_code {
        ATTR_TYPE_STANDARD_INFORMATION => {
            Ok(AttributeValue::StandardInformation(parse_standard_information(
                required_resident(attribute)?,
            )?))
        }
        ATTR_TYPE_FILE_NAME => Ok(AttributeValue::FileName(parse_file_name(required_resident(
            attribute,
        )?)?)),
        ATTR_TYPE_OBJECT_ID => Ok(AttributeValue::ObjectId(parse_object_id(required_resident(
            attribute,
        )?)?)),
        ATTR_TYPE_VOLUME_NAME => Ok(AttributeValue::VolumeName(VolumeNameValue {
            name: utf16le_to_string(required_resident(attribute)?)?,
        })),
        ATTR_TYPE_VOLUME_INFORMATION => Ok(AttributeValue::VolumeInformation(
            parse_volume_information(required_resident(attribute)?)?,
        )),
        ATTR_TYPE_REPARSE_POINT => Ok(AttributeValue::ReparsePoint(parse_reparse_point(
            required_resident(attribute)?,
        )?)),
        ATTR_TYPE_DATA => Ok(AttributeValue::Data(parse_data(attribute))),
        other => Ok(AttributeValue::Unknown { type_code: other }),
    }
}

fn required_resident(attribute: &MftAttribute) -> Result<&[u8]> {
    attribute.resident_data().ok_or_else(|| {
        NtfsError::Unsupported(format!(
            "typed value for attribute {:#x} requires resident data",
            attribute.type_code
        ))
    })
}

fn parse_standard_information(data: &[u8]) -> Result<StandardInformation> {
    if data.len() < 48 {
        return Err(NtfsError::CorruptRecord(
            "$STANDARD_INFORMATION shorter than fixed header".to_string(),
        ));
    }
    let creation_time = filetime_to_datetime(u64_le(data, 0)?);
    let last_modification_time = filetime_to_datetime(u64_le(data, 8)?);
    let last_mft_modification_time = filetime_to_datetime(u64_le(data, 16)?);
    let last_access_time = filetime_to_datetime(u64_le(data, 24)?);
    let file_attributes = u32_le(data, 32)?;
    let (owner_id, security_id) = if data.len() >= 60 {
        (Some(u32_le(data, 48)?), Some(u32_le(data, 52)?))
    } else {
        (None, None)
    };

    Ok(StandardInformation {
        creation_time,
        last_modification_time,
        last_mft_modification_time,
        last_access_time,
        file_attributes,
        owner_id,
        security_id,
    })
}

pub(crate) fn parse_file_name(data: &[u8]) -> Result<FileNameValue> {
    const HEADER_SIZE: usize = 66;
    if data.len() < HEADER_SIZE {
        return Err(NtfsError::CorruptRecord(
            "$FILE_NAME shorter than fixed header".to_string(),
        ));
    }
    let parent_directory = crate::file_reference::FileReference::from_raw(u64_le(data, 0)?);
    let creation_time = filetime_to_datetime(u64_le(data, 8)?);
    let last_modification_time = filetime_to_datetime(u64_le(data, 16)?);
    let last_mft_modification_time = filetime_to_datetime(u64_le(data, 24)?);
    let last_access_time = filetime_to_datetime(u64_le(data, 32)?);
    let allocated_size = u64_le(data, 40)?;
    let real_size = u64_le(data, 48)?;
    let file_attributes = u32_le(data, 56)?;
    let name_length = data[64] as usize;
    let namespace = data[65];
    let name_bytes_len = name_length * 2;
    if HEADER_SIZE + name_bytes_len > data.len() {
        return Err(NtfsError::CorruptRecord(
            "$FILE_NAME name extends beyond attribute".to_string(),
        ));
    }
    let name = utf16le_to_string(&data[HEADER_SIZE..HEADER_SIZE + name_bytes_len])?;

    Ok(FileNameValue {
        parent_directory,
        creation_time,
        last_modification_time,
        last_mft_modification_time,
        last_access_time,
        allocated_size,
        real_size,
        file_attributes,
        namespace,
        name,
    })
}

fn parse_object_id(data: &[u8]) -> Result<ObjectIdValue> {
    if data.len() < 16 {
        return Err(NtfsError::CorruptRecord(
            "$OBJECT_ID shorter than a single GUID".to_string(),
        ));
    }
    let object_id = read_guid(data, 0)?;
    let birth_volume_id = if data.len() >= 32 { Some(read_guid(data, 16)?) } else { None };
    let birth_object_id = if data.len() >= 48 { Some(read_guid(data, 32)?) } else { None };
    let domain_id = if data.len() >= 64 { Some(read_guid(data, 48)?) } else { None };

    Ok(ObjectIdValue {
        object_id,
        birth_volume_id,
        birth_object_id,
        domain_id,
    })
}

fn read_guid(data: &[u8], offset: usize) -> Result<Uuid> {
    let bytes: [u8; 16] = data
        .get(offset..offset + 16)
        .ok_or_else(|| NtfsError::OutOfBounds("GUID read out of range".to_string()))?
        .try_into()
        .unwrap();
    // NTFS stores GUIDs in the mixed-endian "Microsoft" layout: the first
    // three fields are little-endian, the trailing 8 bytes are taken as-is.
    let d1 = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let d2 = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
    let d3 = u16::from_le_bytes(bytes[6..8].try_into().unwrap());
    Ok(Uuid::from_fields(d1, d2, d3, &bytes[8..16].try_into().unwrap()))
}

fn parse_volume_information(data: &[u8]) -> Result<VolumeInformationValue> {
    if data.len() < 12 {
        return Err(NtfsError::CorruptRecord(
            "$VOLUME_INFORMATION shorter than fixed header".to_string(),
        ));
    }
    Ok(VolumeInformationValue {
        major_version: data[8],
        minor_version: data[9],
        flags: u16_le(data, 10)?,
    })
}

fn parse_reparse_point(data: &[u8]) -> Result<ReparsePointValue> {
    if data.len() < 8 {
        return Err(NtfsError::CorruptRecord(
            "$REPARSE_POINT shorter than fixed header".to_string(),
        ));
    }
    let reparse_tag = u32_le(data, 0)?;
    let data_length = u16_le(data, 4)? as usize;
    if 8 + data_length > data.len() {
        return Err(NtfsError::CorruptRecord(
            "$REPARSE_POINT data_length extends beyond attribute".to_string(),
        ));
    }
    Ok(ReparsePointValue {
        reparse_tag,
        data: data[8..8 + data_length].to_vec(),
    })
}

fn parse_data(attribute: &MftAttribute) -> DataValue {
    match &attribute.residency {
        crate::attribute::Residency::Resident { data, .. } => DataValue {
            is_resident: true,
            is_compressed: attribute.data_flags.compressed,
            is_encrypted: attribute.data_flags.encrypted,
            is_sparse: attribute.data_flags.sparse,
            size: data.len() as u64,
        },
        crate::attribute::Residency::NonResident { data_size, .. } => DataValue {
            is_resident: false,
            is_compressed: attribute.data_flags.compressed,
            is_encrypted: attribute.data_flags.encrypted,
            is_sparse: attribute.data_flags.sparse,
            size: *data_size,
        },
    }
}
