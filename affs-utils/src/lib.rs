//! Host-side glue shared by `affsck` and `mkaffs`.

mod block_file;

use affs::BlockSize;
use log::LevelFilter;

pub use self::block_file::BlockFile;

/// Installs the logger. Each `-v` raises the default level by one step;
/// `RUST_LOG` still takes precedence.
pub fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .parse_default_env()
        .init();
}

/// Command-line parser for `--size`.
pub fn parse_block_size(arg: &str) -> Result<BlockSize, String> {
    let bytes = arg.parse::<u32>().map_err(|e| e.to_string())?;
    BlockSize::try_from(bytes).map_err(|e| e.to_string())
}
