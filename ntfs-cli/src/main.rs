use clap::{Parser, Subcommand};
use ntfs_core::{
    parse_boot_sector, parse_index_root, BlockSource, ClusterBlockVector, ClusterCacheConfig,
    IndexAllocation, IndexTree, MftOpenFlags, NtfsFileSystem, NtfsFileSystemConfig, Residency,
    SeekableBlockSource,
};
use std::fs::File;
use std::sync::{Arc, RwLock};

const ROOT_DIRECTORY_ENTRY: u64 = 5;
const INDEX_NAME: &str = "$I30";

#[derive(Parser)]
#[command(name = "ntfs-cli")]
#[command(about = "Inspect a read-only NTFS volume image", long_about = None)]
struct Cli {
    /// Path to a volume image or block device
    volume: String,

    /// Open the MFT without walking entry 0's $DATA run list, using
    /// `--mft-size` for the entry count instead
    #[arg(long)]
    mft_only: bool,

    /// Required when `--mft-only` is set: size in bytes of $MFT
    #[arg(long)]
    mft_size: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print volume geometry and MFT entry count
    Info,
    /// List the root directory's $I30 index
    ListRoot,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let file = File::open(&cli.volume)?;
    let source: Arc<dyn BlockSource> = Arc::new(SeekableBlockSource::new(file)?);

    let boot_sector = source.read_buffer_at_offset(0, 512)?;
    let mut io_handle = parse_boot_sector(&boot_sector)?;
    if cli.mft_only {
        let mft_size = cli
            .mft_size
            .ok_or_else(|| anyhow::anyhow!("--mft-only requires --mft-size"))?;
        io_handle = io_handle.with_mft_size(mft_size);
    }

    let mut config = NtfsFileSystemConfig::default();
    if cli.mft_only {
        config.mft_open_flags = MftOpenFlags::MFT_ONLY;
    }

    // The lock is a convenience for this demonstration binary, not part of
    // the core's contract: `NtfsFileSystem` itself assumes single-threaded
    // access per §5.
    let filesystem = Arc::new(RwLock::new(NtfsFileSystem::open(source, io_handle, config)?));

    match cli.command {
        Commands::Info => print_info(&filesystem),
        Commands::ListRoot => list_root(&filesystem)?,
    }

    Ok(())
}

fn print_info(filesystem: &Arc<RwLock<NtfsFileSystem>>) {
    let fs = filesystem.read().unwrap();
    println!("MFT entries: {}", fs.get_number_of_mft_entries());
}

fn list_root(filesystem: &Arc<RwLock<NtfsFileSystem>>) -> anyhow::Result<()> {
    let mut fs = filesystem.write().unwrap();
    let root_entry = fs.get_mft_entry_by_index(ROOT_DIRECTORY_ENTRY)?;
    if !root_entry.is_directory() {
        return Err(anyhow::anyhow!("MFT entry {} is not a directory", ROOT_DIRECTORY_ENTRY));
    }

    let index_root_attribute = root_entry
        .find_attribute_named(ntfs_core::ATTR_TYPE_INDEX_ROOT, INDEX_NAME)
        .ok_or_else(|| anyhow::anyhow!("root directory has no {} index root", INDEX_NAME))?;
    let index_root_data = index_root_attribute
        .resident_data()
        .ok_or_else(|| anyhow::anyhow!("{} index root is not resident", INDEX_NAME))?;
    let root = parse_index_root(index_root_data)?;
    let collation = root.collation;
    let index_block_size = root.index_block_size as u64;

    let cluster_cache_config = ClusterCacheConfig::default();
    let source_clone = fs.source_handle();
    let cluster_block_size = fs.io_handle().cluster_block_size;

    let allocation_attribute = root_entry.find_attribute_named(ntfs_core::ATTR_TYPE_INDEX_ALLOCATION, INDEX_NAME);
    let mut allocation_vector = allocation_attribute.and_then(|attr| match &attr.residency {
        Residency::NonResident {
            data_runs,
            data_size,
            valid_data_size,
            allocated_size,
            ..
        } => Some(ClusterBlockVector::new(
            source_clone.clone(),
            data_runs.clone(),
            cluster_block_size,
            *data_size,
            *valid_data_size,
            *allocated_size,
            attr.attribute_identifier,
            cluster_cache_config,
        )),
        Residency::Resident { .. } => None,
    });

    let allocation = allocation_vector
        .as_mut()
        .map(|vector| IndexAllocation::new(vector, index_block_size, collation));
    let mut tree = IndexTree::new(root, allocation, None);

    for entry in tree.iter_all()? {
        match entry.file_name() {
            Ok(name) => println!("{}", name),
            Err(_) => println!("<non-filename index entry>"),
        }
    }

    Ok(())
}
