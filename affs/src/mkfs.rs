//! 在空白设备上建立一个空卷

use std::sync::Arc;

use block_dev::{BlockDevice, SECTOR_SHIFT};
use enumflags2::BitFlags;

use crate::volume::{self, AmigaDate, FsFlag, NAME_MAX, RootBlock};
use crate::{Bitmap, BlockId, BlockSize, BlockStore, Error, Geometry, Result};

#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// 卷名，超过30字节的部分被截去
    pub name: Vec<u8>,
    pub block_size: BlockSize,
    pub reserved: u32,
    /// 根块的块号，默认取卷的中部
    pub root: Option<u32>,
    pub flags: BitFlags<FsFlag>,
    /// 卷名超长时报错，而不是截断
    pub strict: bool,
    pub created: AmigaDate,
}

impl FormatOptions {
    pub fn new(name: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            block_size: BlockSize::B512,
            reserved: 2,
            root: None,
            flags: BitFlags::empty(),
            strict: false,
            created: AmigaDate::now(),
        }
    }
}

/// 格式化设备：写出位图链、根块与引导块的魔数
pub fn format(dev: &Arc<dyn BlockDevice>, opts: &FormatOptions) -> Result<Geometry> {
    let sectors = dev.sectors().map_err(Error::DeviceSize)?;
    let blocks = sectors >> (opts.block_size.shift() - SECTOR_SHIFT);
    let blocks = u32::try_from(blocks).unwrap_or(u32::MAX);

    let root = match opts.root {
        Some(root) => root,
        None => ((blocks as u64 + opts.reserved as u64).saturating_sub(1) / 2) as u32,
    };
    let geo = Geometry::new(opts.block_size, opts.reserved, blocks, BlockId::new(root))?
        .with_format(opts.flags);

    log::info!("blocks: {}", geo.blocks);
    log::info!("blocksize: {}", geo.block_size.bytes());
    log::info!("reserved blocks: {}", geo.reserved);
    log::info!("rootblock: {}", geo.root);

    if opts.name.len() > NAME_MAX {
        if opts.strict {
            return Err(Error::NameTooLong(opts.name.len()));
        }
        log::error!("name exceeds max name length of {NAME_MAX} characters");
    }

    let store = BlockStore::new(dev, &geo);
    let mut root = RootBlock::new(geo.block_size, &opts.name, opts.created);

    let mut bitmap = Bitmap::new(&geo);
    bitmap.build(&store, &mut root)?;
    bitmap.store(&store, &mut root)?;

    root.seal();
    log::debug!("writing root block at {}", geo.root);
    store.write(geo.root, root.as_block())?;

    let mut boot = store.read_boot()?;
    boot.set_word(0, volume::dos_type(opts.flags));
    store.write_boot(&boot)?;

    Ok(geo)
}
