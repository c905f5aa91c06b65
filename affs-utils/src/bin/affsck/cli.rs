use std::path::PathBuf;

use affs::BlockSize;
use affs_utils::parse_block_size;
use clap::Parser;

#[derive(Parser)]
#[command(version, about = "Check an Amiga fast/old filesystem")]
pub struct Cli {
    /// Device or image file
    pub device: PathBuf,

    /// Be verbose, repeat for more detail
    #[arg(long, short, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Root block, in units of the forced block size (512 bytes otherwise)
    #[arg(long = "root", short = 'b', value_name = "BLOCK")]
    pub root: Option<u32>,

    /// Force block size
    #[arg(long, short, value_parser = parse_block_size)]
    pub size: Option<BlockSize>,

    /// Number of reserved blocks
    #[arg(long = "reserve", short, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..))]
    pub reserved: u32,

    /// No changes to the filesystem
    #[arg(long, short = 'n')]
    pub readonly: bool,

    /// Check even a cleanly unmounted filesystem
    #[arg(long, short)]
    pub force: bool,

    /// Clear the bitmap flag and exit
    #[arg(long, short)]
    pub clear: bool,

    /// Write back the rebuilt bitmap
    #[arg(long, short)]
    pub write: bool,

    /// Treat block count and file size mismatches as errors
    #[arg(long)]
    pub strict: bool,
}
