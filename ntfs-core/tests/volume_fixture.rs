// Exercises the full decoding pipeline — boot sector, $MFT, directory index,
// bitmap and security descriptor lookup — against a synthetic volume image
// assembled in memory. No real NTFS image is shipped; the fixture builds the
// on-disk structures directly the way `mft.rs`'s and `index.rs`'s own unit
// tests build single records, just wired together end to end.

use ntfs_core::{
    parse_boot_sector, BlockSource, ClusterExtent, MemoryBlockSource, NtfsFileSystem,
    NtfsFileSystemConfig,
};
use std::sync::Arc;

const SECTOR_SIZE: u32 = 512;
const SECTORS_PER_CLUSTER: u8 = 1;
const CLUSTER_SIZE: u64 = SECTOR_SIZE as u64 * SECTORS_PER_CLUSTER as u64;
const MFT_ENTRY_SIZE: u32 = 1024;
const CLUSTERS_PER_MFT_RECORD: u64 = MFT_ENTRY_SIZE as u64 / CLUSTER_SIZE;

const MFT_CLUSTER: u64 = 4;
const MFT_ENTRY_COUNT: u64 = 12;
const MFT_CLUSTER_COUNT: u64 = MFT_ENTRY_COUNT * CLUSTERS_PER_MFT_RECORD;

const SDS_CLUSTER: u64 = MFT_CLUSTER + MFT_CLUSTER_COUNT;
const SDS_CLUSTER_COUNT: u64 = 1;

const VOLUME_CLUSTER_COUNT: u64 = SDS_CLUSTER + SDS_CLUSTER_COUNT + 2;

const ENTRY_ROOT: u64 = 5;
const ENTRY_BITMAP: u64 = 6;
const ENTRY_SECURE: u64 = 9;
const ENTRY_HELLO: u64 = 10;
const ENTRY_WORLD: u64 = 11;

const SECURITY_ID: u32 = 1;
const SDS_ENTRY_TOTAL_SIZE: u32 = 24; // 20-byte header + 4-byte descriptor payload

fn push_resident_attribute(
    attributes: &mut Vec<u8>,
    type_code: u32,
    name: Option<&str>,
    attribute_id: u16,
    indexed: bool,
    data: &[u8],
) {
    let name_units: Vec<u16> = name.map(|n| n.encode_utf16().collect()).unwrap_or_default();
    let name_bytes_len = name_units.len() * 2;
    let name_offset: u16 = 24;
    let data_offset = name_offset as usize + name_bytes_len;

    let unpadded_len = data_offset + data.len();
    let record_length = ((unpadded_len + 7) / 8 * 8) as u32;

    let mut record = vec![0u8; record_length as usize];
    record[0..4].copy_from_slice(&type_code.to_le_bytes());
    record[4..8].copy_from_slice(&record_length.to_le_bytes());
    record[8] = 0; // resident
    record[9] = name_units.len() as u8;
    record[10..12].copy_from_slice(&name_offset.to_le_bytes());
    record[12..14].copy_from_slice(&0u16.to_le_bytes()); // data_flags
    record[14..16].copy_from_slice(&attribute_id.to_le_bytes());
    record[16..20].copy_from_slice(&(data.len() as u32).to_le_bytes());
    record[20..22].copy_from_slice(&(data_offset as u16).to_le_bytes());
    record[22] = indexed as u8;

    for (i, unit) in name_units.iter().enumerate() {
        let at = name_offset as usize + i * 2;
        record[at..at + 2].copy_from_slice(&unit.to_le_bytes());
    }
    record[data_offset..data_offset + data.len()].copy_from_slice(data);

    attributes.extend_from_slice(&record);
}

fn push_non_resident_attribute(
    attributes: &mut Vec<u8>,
    type_code: u32,
    name: Option<&str>,
    attribute_id: u16,
    data_size: u64,
    runs: &[u8],
) {
    let name_units: Vec<u16> = name.map(|n| n.encode_utf16().collect()).unwrap_or_default();
    let name_bytes_len = name_units.len() * 2;
    let name_offset: u16 = 64;
    let runs_offset = name_offset as usize + name_bytes_len;

    let unpadded_len = runs_offset + runs.len();
    let record_length = ((unpadded_len + 7) / 8 * 8) as u32;

    let mut record = vec![0u8; record_length as usize];
    record[0..4].copy_from_slice(&type_code.to_le_bytes());
    record[4..8].copy_from_slice(&record_length.to_le_bytes());
    record[8] = 1; // non-resident
    record[9] = name_units.len() as u8;
    record[10..12].copy_from_slice(&name_offset.to_le_bytes());
    record[12..14].copy_from_slice(&0u16.to_le_bytes());
    record[14..16].copy_from_slice(&attribute_id.to_le_bytes());
    record[16..24].copy_from_slice(&0u64.to_le_bytes()); // first_vcn
    let last_vcn = (data_size.div_ceil(CLUSTER_SIZE)).max(1) - 1;
    record[24..32].copy_from_slice(&last_vcn.to_le_bytes());
    record[32..34].copy_from_slice(&(runs_offset as u16).to_le_bytes());
    record[34..36].copy_from_slice(&0u16.to_le_bytes()); // compression_unit_size_log2
    let allocated_size = (last_vcn + 1) * CLUSTER_SIZE;
    record[40..48].copy_from_slice(&allocated_size.to_le_bytes());
    record[48..56].copy_from_slice(&data_size.to_le_bytes());
    record[56..64].copy_from_slice(&data_size.to_le_bytes());

    for (i, unit) in name_units.iter().enumerate() {
        let at = name_offset as usize + i * 2;
        record[at..at + 2].copy_from_slice(&unit.to_le_bytes());
    }
    record[runs_offset..runs_offset + runs.len()].copy_from_slice(runs);

    attributes.extend_from_slice(&record);
}

/// Single run, uncompressed: header 0x11/0x21/etc, length, then the LCN
/// delta from cursor 0 — good enough for this fixture, which never
/// fragments a stream across multiple runs.
fn single_run(lcn_start: u64, length_in_clusters: u64) -> Vec<u8> {
    let length_bytes = minimal_le_unsigned(length_in_clusters);
    let offset_bytes = minimal_le_unsigned(lcn_start);
    let header = (length_bytes.len() as u8) | ((offset_bytes.len() as u8) << 4);
    let mut out = vec![header];
    out.extend_from_slice(&length_bytes);
    out.extend_from_slice(&offset_bytes);
    out.push(0);
    out
}

fn minimal_le_unsigned(mut value: u64) -> Vec<u8> {
    if value == 0 {
        return vec![0];
    }
    let mut bytes = Vec::new();
    while value > 0 {
        bytes.push((value & 0xFF) as u8);
        value >>= 8;
    }
    bytes
}

/// 66-byte $FILE_NAME fixed header plus the UTF-16LE name, used both as a
/// resident $FILE_NAME attribute value and as an $I30 index entry key.
fn file_name_value(parent: u64, name: &str, real_size: u64, is_directory: bool) -> Vec<u8> {
    let name_units: Vec<u16> = name.encode_utf16().collect();
    let mut value = vec![0u8; 66 + name_units.len() * 2];
    value[0..8].copy_from_slice(&parent.to_le_bytes());
    // times (8 x 4 = 32 bytes at offset 8) left zero
    value[40..48].copy_from_slice(&real_size.to_le_bytes()); // allocated_size
    value[48..56].copy_from_slice(&real_size.to_le_bytes()); // real_size
    let attrs: u32 = if is_directory { 0x10000000 } else { 0 };
    value[56..60].copy_from_slice(&attrs.to_le_bytes());
    value[64] = name_units.len() as u8;
    value[65] = 1; // Win32 namespace
    for (i, unit) in name_units.iter().enumerate() {
        let at = 66 + i * 2;
        value[at..at + 2].copy_from_slice(&unit.to_le_bytes());
    }
    value
}

fn index_entry_file_name(file_reference: u64, key: &[u8], is_last: bool) -> Vec<u8> {
    let key_length = if is_last { 0 } else { key.len() };
    let length = 16 + key_length;
    let mut entry = vec![0u8; length];
    entry[0..8].copy_from_slice(&file_reference.to_le_bytes());
    entry[8..10].copy_from_slice(&(length as u16).to_le_bytes());
    entry[10..12].copy_from_slice(&(key_length as u16).to_le_bytes());
    let flags: u16 = if is_last { 0x0002 } else { 0 };
    entry[12..14].copy_from_slice(&flags.to_le_bytes());
    if !is_last {
        entry[16..16 + key.len()].copy_from_slice(key);
    }
    entry
}

fn index_entry_integer(key: u32, value: &[u8], is_last: bool) -> Vec<u8> {
    if is_last {
        let mut entry = vec![0u8; 16];
        entry[8..10].copy_from_slice(&16u16.to_le_bytes());
        entry[12..14].copy_from_slice(&0x0002u16.to_le_bytes());
        return entry;
    }
    let key_bytes = key.to_le_bytes();
    let length = 16 + key_bytes.len() + value.len();
    let mut entry = vec![0u8; length];
    let data_offset = 16 + key_bytes.len();
    entry[0..2].copy_from_slice(&(data_offset as u16).to_le_bytes());
    entry[2..4].copy_from_slice(&(value.len() as u16).to_le_bytes());
    entry[8..10].copy_from_slice(&(length as u16).to_le_bytes());
    entry[10..12].copy_from_slice(&(key_bytes.len() as u16).to_le_bytes());
    entry[16..16 + key_bytes.len()].copy_from_slice(&key_bytes);
    entry[data_offset..data_offset + value.len()].copy_from_slice(value);
    entry
}

/// `attribute_type, collation_rule, index_block_size, clusters_per_index_block`
/// (16 bytes) + a 16-byte leaf node header + packed entries.
fn index_root(collation_rule: u32, entries: &[u8]) -> Vec<u8> {
    let mut root = vec![0u8; 16 + 16];
    root[4..8].copy_from_slice(&collation_rule.to_le_bytes());
    root[8..12].copy_from_slice(&4096u32.to_le_bytes());
    root[12] = 1;
    root[16..20].copy_from_slice(&16u32.to_le_bytes()); // entries_offset
    let index_length = 16 + entries.len() as u32;
    root[20..24].copy_from_slice(&index_length.to_le_bytes());
    root[24..28].copy_from_slice(&index_length.to_le_bytes()); // allocated_size
    root[28..32].copy_from_slice(&0u32.to_le_bytes()); // flags: leaf only
    root.extend_from_slice(entries);
    root
}

/// One 1024-byte FILE record: header (no fixup — usa_count is 0, a no-op
/// per `decoder::apply_fixup`), the packed attribute bytes, and an END
/// marker.
fn build_entry(entry_number: u64, sequence_number: u16, flags: u16, attributes: &[u8]) -> Vec<u8> {
    let mut record = vec![0u8; MFT_ENTRY_SIZE as usize];
    record[0..4].copy_from_slice(b"FILE");
    record[4..6].copy_from_slice(&0u16.to_le_bytes()); // usa_offset
    record[6..8].copy_from_slice(&0u16.to_le_bytes()); // usa_count (no fixup)
    record[16..18].copy_from_slice(&sequence_number.to_le_bytes());
    let attrs_offset: u16 = 56;
    record[20..22].copy_from_slice(&attrs_offset.to_le_bytes());
    record[22..24].copy_from_slice(&flags.to_le_bytes());
    let bytes_used = attrs_offset as usize + attributes.len() + 8;
    record[24..28].copy_from_slice(&(bytes_used as u32).to_le_bytes());
    record[28..32].copy_from_slice(&(MFT_ENTRY_SIZE).to_le_bytes()); // allocated_size
    record[32..40].copy_from_slice(&0u64.to_le_bytes()); // base_record_reference

    let attrs_start = attrs_offset as usize;
    record[attrs_start..attrs_start + attributes.len()].copy_from_slice(attributes);
    let end_marker_at = attrs_start + attributes.len();
    record[end_marker_at..end_marker_at + 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());

    let _ = entry_number;
    record
}

fn sample_boot_sector() -> Vec<u8> {
    let mut data = vec![0u8; 512];
    data[3..11].copy_from_slice(b"NTFS    ");
    data[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
    data[13] = SECTORS_PER_CLUSTER;
    data[40..48].copy_from_slice(&(VOLUME_CLUSTER_COUNT * CLUSTER_SIZE / SECTOR_SIZE as u64).to_le_bytes());
    data[48..56].copy_from_slice(&MFT_CLUSTER.to_le_bytes());
    data[56..64].copy_from_slice(&(MFT_CLUSTER + 1).to_le_bytes());
    // clusters_per_mft_record: positive count of clusters since CLUSTER_SIZE(512) < 1024.
    data[64] = CLUSTERS_PER_MFT_RECORD as u8;
    data[68] = 1;
    data[72..80].copy_from_slice(&0x1234_5678u64.to_le_bytes());
    data
}

struct Fixture {
    source: Arc<dyn BlockSource>,
}

fn build_fixture() -> Fixture {
    let mut volume = vec![0u8; (VOLUME_CLUSTER_COUNT * CLUSTER_SIZE) as usize];
    volume[0..512].copy_from_slice(&sample_boot_sector());

    let mft_byte_offset = MFT_CLUSTER * CLUSTER_SIZE;
    let write_entry = |volume: &mut [u8], index: u64, record: &[u8]| {
        let at = (mft_byte_offset + index * MFT_ENTRY_SIZE as u64) as usize;
        volume[at..at + record.len()].copy_from_slice(record);
    };

    // Entry 0: $MFT itself — one non-resident, unnamed $DATA run over the
    // MFT's own cluster range.
    let mut entry0_attrs = Vec::new();
    push_non_resident_attribute(
        &mut entry0_attrs,
        0x80,
        None,
        0,
        MFT_CLUSTER_COUNT * CLUSTER_SIZE,
        &single_run(MFT_CLUSTER, MFT_CLUSTER_COUNT),
    );
    write_entry(&mut volume, 0, &build_entry(0, 1, 0x0001, &entry0_attrs));

    // Entry 5: root directory, resident $I30 listing "hello.txt" (10) and
    // "world.txt" (11) in collation order.
    let hello_key = file_name_value(ENTRY_ROOT, "hello.txt", 2, false);
    let world_key = file_name_value(ENTRY_ROOT, "world.txt", 5, false);
    let mut root_index_entries = Vec::new();
    root_index_entries.extend(index_entry_file_name(ENTRY_HELLO, &hello_key, false));
    root_index_entries.extend(index_entry_file_name(ENTRY_WORLD, &world_key, false));
    root_index_entries.extend(index_entry_file_name(0, &[], true));
    let root_index_root = index_root(0x01, &root_index_entries);

    let mut entry5_attrs = Vec::new();
    push_resident_attribute(&mut entry5_attrs, 0x90, Some("$I30"), 0, true, &root_index_root);
    write_entry(&mut volume, ENTRY_ROOT, &build_entry(ENTRY_ROOT, 1, 0x0003, &entry5_attrs));

    // Entry 6: $Bitmap — resident, marking clusters 0-1 and 10-16 allocated.
    let bitmap_bytes = [0b0000_0011u8, 0b1111_1100, 0b0000_0001];
    let mut entry6_attrs = Vec::new();
    push_resident_attribute(&mut entry6_attrs, 0x80, None, 0, false, &bitmap_bytes);
    write_entry(&mut volume, ENTRY_BITMAP, &build_entry(ENTRY_BITMAP, 1, 0x0001, &entry6_attrs));

    // Entry 9: $Secure — $FILE_NAME "$Secure", $SDS stream, resident $SII
    // index root with one entry for security id 1.
    let sds_cluster = SDS_CLUSTER;
    let sds_sector = (sds_cluster * CLUSTER_SIZE) as usize;
    volume[sds_sector + 4..sds_sector + 8].copy_from_slice(&SECURITY_ID.to_le_bytes()); // header id
    volume[sds_sector + 20..sds_sector + 24].copy_from_slice(b"SDBY"); // descriptor payload

    let mut sii_value = vec![0u8; 20];
    sii_value[0..4].copy_from_slice(&0xAAAAu32.to_le_bytes()); // hash
    sii_value[4..8].copy_from_slice(&SECURITY_ID.to_le_bytes());
    sii_value[8..16].copy_from_slice(&0u64.to_le_bytes()); // sds_offset
    sii_value[16..20].copy_from_slice(&SDS_ENTRY_TOTAL_SIZE.to_le_bytes());

    let mut sii_entries = Vec::new();
    sii_entries.extend(index_entry_integer(SECURITY_ID, &sii_value, false));
    sii_entries.extend(index_entry_integer(0, &[], true));
    let sii_root = index_root(0x10, &sii_entries);

    let mut entry9_attrs = Vec::new();
    push_resident_attribute(
        &mut entry9_attrs,
        0x30,
        None,
        0,
        false,
        &file_name_value(ENTRY_ROOT, "$Secure", 0, false),
    );
    push_non_resident_attribute(
        &mut entry9_attrs,
        0x80,
        Some("$SDS"),
        1,
        CLUSTER_SIZE,
        &single_run(SDS_CLUSTER, SDS_CLUSTER_COUNT),
    );
    push_resident_attribute(&mut entry9_attrs, 0x90, Some("$SII"), 2, true, &sii_root);
    write_entry(&mut volume, ENTRY_SECURE, &build_entry(ENTRY_SECURE, 1, 0x0001, &entry9_attrs));

    // Entries 10/11: the two files named by the root directory's index.
    let mut entry10_attrs = Vec::new();
    push_resident_attribute(
        &mut entry10_attrs,
        0x30,
        None,
        0,
        false,
        &file_name_value(ENTRY_ROOT, "hello.txt", 2, false),
    );
    push_resident_attribute(&mut entry10_attrs, 0x80, None, 1, false, b"hi");
    write_entry(&mut volume, ENTRY_HELLO, &build_entry(ENTRY_HELLO, 1, 0x0001, &entry10_attrs));

    let mut entry11_attrs = Vec::new();
    push_resident_attribute(
        &mut entry11_attrs,
        0x30,
        None,
        0,
        false,
        &file_name_value(ENTRY_ROOT, "world.txt", 5, false),
    );
    push_resident_attribute(&mut entry11_attrs, 0x80, None, 1, false, b"world");
    write_entry(&mut volume, ENTRY_WORLD, &build_entry(ENTRY_WORLD, 1, 0x0001, &entry11_attrs));

    Fixture {
        source: Arc::new(MemoryBlockSource::new(volume)),
    }
}

fn open_fixture(fixture: &Fixture) -> NtfsFileSystem {
    let boot_sector = fixture.source.read_buffer_at_offset(0, 512).unwrap();
    let io_handle = parse_boot_sector(&boot_sector).unwrap();
    NtfsFileSystem::open(fixture.source.clone(), io_handle, NtfsFileSystemConfig::default()).unwrap()
}

#[test]
fn opens_and_reports_mft_entry_count() {
    let fixture = build_fixture();
    let fs = open_fixture(&fixture);
    assert_eq!(fs.get_number_of_mft_entries(), MFT_ENTRY_COUNT);
}

#[test]
fn reads_file_contents_named_by_root_directory_index() {
    use ntfs_core::{ATTR_TYPE_DATA, ATTR_TYPE_INDEX_ALLOCATION, ATTR_TYPE_INDEX_ROOT};

    let fixture = build_fixture();
    let mut fs = open_fixture(&fixture);

    let root = fs.get_mft_entry_by_index(ENTRY_ROOT).unwrap();
    assert!(root.is_directory());

    let index_root_attr = root.find_attribute_named(ATTR_TYPE_INDEX_ROOT, "$I30").unwrap();
    let root_data = index_root_attr.resident_data().unwrap();
    let parsed_root = ntfs_core::parse_index_root(root_data).unwrap();
    assert!(root.find_attribute_named(ATTR_TYPE_INDEX_ALLOCATION, "$I30").is_none());

    let mut tree = ntfs_core::IndexTree::new(parsed_root, None, None);
    let listed: Vec<String> = tree.iter_all().unwrap().iter().map(|e| e.file_name().unwrap()).collect();
    assert_eq!(listed, vec!["hello.txt".to_string(), "world.txt".to_string()]);

    let hello = fs.get_mft_entry_by_index(ENTRY_HELLO).unwrap();
    let data_attr = hello.find_attribute(ATTR_TYPE_DATA).unwrap();
    assert_eq!(data_attr.resident_data().unwrap(), b"hi");

    let world = fs.get_mft_entry_by_index(ENTRY_WORLD).unwrap();
    let data_attr = world.find_attribute(ATTR_TYPE_DATA).unwrap();
    assert_eq!(data_attr.resident_data().unwrap(), b"world");
}

#[test]
fn resolves_security_descriptor_by_id_through_secure_stream() {
    let fixture = build_fixture();
    let mut fs = open_fixture(&fixture);

    let descriptor = fs.get_security_descriptor_by_id(SECURITY_ID).unwrap();
    assert_eq!(descriptor, Some(b"SDBY".to_vec()));

    let missing = fs.get_security_descriptor_by_id(999).unwrap();
    assert_eq!(missing, None);
}

#[test]
fn scans_bitmap_into_contiguous_extents() {
    let fixture = build_fixture();
    let mut fs = open_fixture(&fixture);

    let mut extents = Vec::new();
    let mut collect = |extent: ClusterExtent| extents.push(extent);
    fs.read_bitmap(Some(&mut collect)).unwrap();

    assert_eq!(
        extents,
        vec![
            ClusterExtent { start_lcn: 0, length_in_clusters: 2 },
            ClusterExtent { start_lcn: 10, length_in_clusters: 7 },
        ]
    );
}
