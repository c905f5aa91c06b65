use std::path::PathBuf;

use affs::BlockSize;
use affs_utils::parse_block_size;
use clap::Parser;

#[derive(Parser)]
#[command(version, about = "Create an empty Amiga fast/old filesystem")]
pub struct Cli {
    /// Device or image file
    pub device: PathBuf,

    /// Volume name, at most 30 bytes
    pub name: String,

    /// Be verbose, repeat for more detail
    #[arg(long, short, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Root block
    #[arg(long = "root", short = 'b', value_name = "BLOCK")]
    pub root: Option<u32>,

    /// Block size
    #[arg(long, short, default_value = "512", value_parser = parse_block_size)]
    pub size: BlockSize,

    /// Number of reserved blocks
    #[arg(long = "reserve", short, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..))]
    pub reserved: u32,

    /// Old filesystem
    #[arg(long = "ofs", short = 'o')]
    pub ofs: bool,

    /// International mode
    #[arg(long = "intl", short = 'i')]
    pub intl: bool,

    /// Directory cache mode
    #[arg(long = "dircache", short = 'd')]
    pub dircache: bool,

    /// Fail instead of truncating an over-long name
    #[arg(long)]
    pub strict: bool,
}
