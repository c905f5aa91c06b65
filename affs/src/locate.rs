//! 定位根块并识别格式
//!
//! 根块按惯例位于卷的中部，但位置和块大小都不确定。
//! 先按512字节读入候选块，只看头部几个字；像根块时再由哈希表大小推出块大小，
//! 按真正的块大小重读一遍，最后核对次类型与校验和。

use std::sync::Arc;

use block_dev::{BlockDevice, SECTOR_SHIFT};
use enumflags2::BitFlags;

use crate::volume::{self, FsFlag, RootBlock};
use crate::{BlockId, BlockSize, BlockStore, Error, Geometry, Result};

/// 不给提示时，从卷中部向后试探的次数
const PROBES: u32 = 8;

/// 操作者给出的提示
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RootHint {
    /// 根块的块号，以`block_size`（未指定时以512字节）为单位
    pub root: Option<u32>,
    /// 强制的块大小，推出的块大小与之不符的候选一律放弃
    pub block_size: Option<BlockSize>,
}

/// 找到根块，得出卷的几何信息
pub fn find_root(
    dev: &Arc<dyn BlockDevice>,
    reserved: u32,
    hint: RootHint,
) -> Result<(Geometry, RootBlock)> {
    let sectors = dev.sectors().map_err(Error::DeviceSize)?;
    let sectors = u32::try_from(sectors).unwrap_or(u32::MAX);

    let (mut candidate, probes) = match hint.root {
        Some(root) => {
            let scale = hint.block_size.map_or(1, BlockSize::sectors);
            (root.checked_mul(scale).ok_or(Error::RootNotFound)?, 1)
        }
        None => (sectors / 2, PROBES),
    };

    let probe_store = BlockStore::with_window(dev, BlockSize::MIN, reserved, sectors);
    for _ in 0..probes {
        match probe(&probe_store, candidate, sectors, hint.block_size) {
            Ok(Some(found)) => return Ok(found),
            Ok(None) => {}
            Err(e) if e.is_range() => {
                log::debug!("stop probing at {candidate}: {e}");
                break;
            }
            Err(e) => return Err(e),
        }
        candidate += 1;
    }

    log::error!("unable to find root block");
    Err(Error::RootNotFound)
}

/// 试探`candidate`（以512字节为单位）处是否为根块
fn probe(
    probe_store: &BlockStore,
    candidate: u32,
    sectors: u32,
    forced: Option<BlockSize>,
) -> Result<Option<(Geometry, RootBlock)>> {
    let block = probe_store.read(BlockId::new(candidate))?;
    if !RootBlock::is_candidate(&block) {
        return Ok(None);
    }

    let Some(size) = RootBlock::derived_block_size(&block) else {
        return Ok(None);
    };
    if forced.is_some_and(|forced| forced != size) {
        log::debug!("candidate {candidate} has block size {}", size.bytes());
        return Ok(None);
    }

    let scale = size.shift() - SECTOR_SHIFT;
    let root = BlockId::new(candidate >> scale);
    let blocks = sectors >> scale;
    let reserved = probe_store.reserved();

    let block = if size == BlockSize::MIN {
        block
    } else {
        // 重读整块：若候选并非块的起点，读到的头部就对不上
        let store = BlockStore::with_window(probe_store.device(), size, reserved, blocks);
        let block = store.read(root)?;
        if !RootBlock::is_candidate(&block) || RootBlock::derived_block_size(&block) != Some(size)
        {
            log::debug!("candidate {candidate} is misaligned");
            return Ok(None);
        }
        block
    };

    let root_block = RootBlock::from_block(block);
    if !root_block.is_root() {
        return Ok(None);
    }

    log::debug!("root block found at {root}");
    let geo = Geometry::new(size, reserved, blocks, root)?;
    Ok(Some((geo, root_block)))
}

/// 读引导块的魔数，识别格式变体
pub fn detect_format(store: &BlockStore) -> Result<BitFlags<FsFlag>> {
    let boot = store.read_boot()?;
    let magic = boot.word(0);
    volume::classify(magic).inspect_err(|_| log::error!("unknown filesystem type {magic:#010x}"))
}
