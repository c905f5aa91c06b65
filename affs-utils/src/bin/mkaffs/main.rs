mod cli;

use std::sync::Arc;

use affs::FormatOptions;
use affs::volume::{self, FsFlag};
use affs_utils::BlockFile;
use anyhow::Context;
use block_dev::{BlockDevice, SECTOR_SHIFT};
use clap::Parser;
use typed_bytesize::ByteSizeIec;

use self::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    affs_utils::init_logger(cli.verbose);

    let mut opts = FormatOptions::new(cli.name);
    opts.block_size = cli.size;
    opts.reserved = cli.reserved;
    opts.root = cli.root;
    opts.strict = cli.strict;
    for (set, flag) in [
        (cli.ofs, FsFlag::Ofs),
        (cli.intl, FsFlag::Intl),
        (cli.dircache, FsFlag::DirCache),
    ] {
        if set {
            opts.flags |= flag;
        }
    }

    let dev: Arc<dyn BlockDevice> = Arc::new(
        BlockFile::open(&cli.device, true)
            .with_context(|| format!("unable to open {}", cli.device.display()))?,
    );
    let size = dev.sectors().context("unable to query device size")? << SECTOR_SHIFT;
    log::info!("device size: {}", ByteSizeIec(size));

    let geo = affs::format(&dev, &opts)?;
    log::info!(
        "created a {} amiga filesystem with {} blocks",
        volume::variant_name(opts.flags),
        geo.blocks
    );

    Ok(())
}
