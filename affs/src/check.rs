//! 检查卷：定位根块，读入位图，遍历目录树，比较两份位图，按需写回

use std::sync::Arc;

use block_dev::BlockDevice;
use enumflags2::BitFlags;

use crate::volume::{self, FsFlag};
use crate::{
    Bitmap, BlockSize, BlockStore, Discrepancy, Error, Geometry, Result, RootHint, WalkReport,
    Walker, detect_format, find_root,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOptions {
    /// 根块的块号
    pub root: Option<u32>,
    /// 强制的块大小
    pub block_size: Option<BlockSize>,
    pub reserved: u32,
    /// 不对卷作任何修改
    pub read_only: bool,
    /// 干净卸载的卷也照常检查
    pub force: bool,
    /// 检查完毕后写回推导出的位图
    pub write: bool,
    /// 文件大小相关的警告按错误处理
    pub strict: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            root: None,
            block_size: None,
            reserved: 2,
            read_only: false,
            force: false,
            write: false,
            strict: false,
        }
    }
}

impl CheckOptions {
    pub fn hint(&self) -> RootHint {
        RootHint {
            root: self.root,
            block_size: self.block_size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub geometry: Geometry,
    pub flags: BitFlags<FsFlag>,
    pub name: Vec<u8>,
    /// 根块的位图有效标志
    pub clean: bool,
    /// 卷是干净的，未作检查
    pub skipped: bool,
    pub unreadable_bitmap_blocks: u32,
    pub walk: WalkReport,
    pub discrepancy: Discrepancy,
    /// 位图与根块已写回
    pub written: bool,
}

impl CheckReport {
    /// 位图完好，目录树中也没有错误
    pub fn is_consistent(&self) -> bool {
        self.unreadable_bitmap_blocks == 0 && self.walk.errors() == 0 && self.discrepancy.is_empty()
    }
}

pub fn check(dev: &Arc<dyn BlockDevice>, opts: &CheckOptions) -> Result<CheckReport> {
    if opts.write && opts.read_only {
        return Err(Error::ReadOnly);
    }

    let (geo, mut root) = find_root(dev, opts.reserved, opts.hint())?;
    let store = BlockStore::new(dev, &geo);
    let flags = detect_format(&store)?;
    let geo = geo.with_format(flags);

    let clean = root.bitmap_valid();
    log::info!(
        "detected a {} amiga filesystem{}",
        volume::variant_name(flags),
        if clean { "" } else { " (not cleanly unmounted)" }
    );
    log::debug!(
        "volume \"{}\": {} blocks of {} bytes, root at {}",
        String::from_utf8_lossy(root.name()),
        geo.blocks,
        geo.block_size.bytes(),
        geo.root
    );

    let mut report = CheckReport {
        geometry: geo,
        flags,
        name: root.name().to_vec(),
        clean,
        skipped: false,
        unreadable_bitmap_blocks: 0,
        walk: WalkReport::default(),
        discrepancy: Discrepancy::default(),
        written: false,
    };

    if clean && !opts.force {
        log::info!("filesystem is clean, use --force to check anyway");
        report.skipped = true;
        return Ok(report);
    }

    let mut bitmap = Bitmap::new(&geo);
    report.unreadable_bitmap_blocks = bitmap.load(&store, &root);

    report.walk = Walker::new(&store, &mut bitmap, &geo, flags)
        .strict(opts.strict)
        .walk_volume(&root)?;

    report.discrepancy = bitmap.diff();
    if !report.discrepancy.is_empty() {
        log::error!(
            "{} differences in bitmap found ({} leaked, {} orphaned)",
            report.discrepancy.total(),
            report.discrepancy.leaked.len(),
            report.discrepancy.orphaned.len()
        );
    }

    if opts.write {
        bitmap.store(&store, &mut root)?;
        root.seal();
        log::debug!("writing root block at {}", geo.root);
        store.write(geo.root, root.as_block())?;
        report.written = true;
    }

    Ok(report)
}

/// 清除根块的位图有效标志，迫使下次挂载时重建位图
pub fn clear_bitmap_flag(dev: &Arc<dyn BlockDevice>, opts: &CheckOptions) -> Result<Geometry> {
    if opts.read_only {
        return Err(Error::ReadOnly);
    }

    let (geo, mut root) = find_root(dev, opts.reserved, opts.hint())?;
    root.set_bitmap_valid(false);
    root.seal();

    log::debug!("writing root block at {}", geo.root);
    BlockStore::new(dev, &geo).write(geo.root, root.as_block())?;
    Ok(geo)
}
