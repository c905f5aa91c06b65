mod cli;

use std::sync::Arc;

use affs::CheckOptions;
use affs_utils::BlockFile;
use anyhow::Context;
use block_dev::BlockDevice;
use clap::Parser;

use self::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    affs_utils::init_logger(cli.verbose);

    let opts = CheckOptions {
        root: cli.root,
        block_size: cli.size,
        reserved: cli.reserved,
        read_only: cli.readonly,
        force: cli.force,
        write: cli.write,
        strict: cli.strict,
    };

    let writable = !cli.readonly;
    let dev: Arc<dyn BlockDevice> = Arc::new(
        BlockFile::open(&cli.device, writable)
            .with_context(|| format!("unable to open {}", cli.device.display()))?,
    );

    if cli.clear {
        affs::clear_bitmap_flag(&dev, &opts)?;
        return Ok(());
    }

    let report = affs::check(&dev, &opts)?;
    if report.skipped {
        return Ok(());
    }

    log::info!(
        "{} entries, {} error(s), {} warning(s), {} unreadable bitmap block(s), \
         {} leaked and {} orphaned block(s)",
        report.walk.entries.len(),
        report.walk.errors(),
        report.walk.warnings(),
        report.unreadable_bitmap_blocks,
        report.discrepancy.leaked.len(),
        report.discrepancy.orphaned.len()
    );
    if report.written {
        log::info!("bitmap written");
    }

    Ok(())
}
