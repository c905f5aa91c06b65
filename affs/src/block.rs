//! 块的抽象与块存储
//!
//! 所有多字节整数均以大端序存放。

use std::sync::Arc;

use block_dev::{BlockDevice, SECTOR_SHIFT};
use derive_more::{Display, From, Into};

use crate::{BlockSize, Error, Geometry, Result};

/// 设备相对的块号，`0`兼作空指针。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    pub const NULL: Self = Self(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// 内存中的一块
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    data: Box<[u8]>,
}

impl core::fmt::Debug for Block {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Block")
            .field("len", &self.data.len())
            .field("ptype", &self.primary_type())
            .field("stype", &self.secondary_type())
            .finish()
    }
}

impl Block {
    pub fn zeroed(size: BlockSize) -> Self {
        Self {
            data: vec![0; size.bytes()].into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 字数
    pub fn words(&self) -> usize {
        self.data.len() / 4
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// 第`idx`个字
    pub fn word(&self, idx: usize) -> u32 {
        let off = idx * 4;
        u32::from_be_bytes([
            self.data[off],
            self.data[off + 1],
            self.data[off + 2],
            self.data[off + 3],
        ])
    }

    pub fn set_word(&mut self, idx: usize, value: u32) {
        let off = idx * 4;
        self.data[off..off + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// 倒数第`back`个字，`back`从1开始
    pub fn tail_word(&self, back: usize) -> u32 {
        self.word(self.words() - back)
    }

    pub fn set_tail_word(&mut self, back: usize, value: u32) {
        let idx = self.words() - back;
        self.set_word(idx, value);
    }

    #[inline]
    pub fn pointer(&self, idx: usize) -> BlockId {
        BlockId(self.word(idx))
    }

    #[inline]
    pub fn tail_pointer(&self, back: usize) -> BlockId {
        BlockId(self.tail_word(back))
    }

    pub fn primary_type(&self) -> u32 {
        self.word(0)
    }

    pub fn secondary_type(&self) -> u32 {
        self.tail_word(1)
    }

    /// 全部字按回绕加法求和
    pub fn checksum(&self) -> u32 {
        self.data
            .chunks_exact(4)
            .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
            .fold(0u32, u32::wrapping_add)
    }

    /// 校验和为0才算完好
    pub fn is_valid(&self) -> bool {
        self.checksum() == 0
    }

    /// 重新计算并写入位于第`idx`字的校验和
    pub fn stamp_checksum(&mut self, idx: usize) {
        self.set_word(idx, 0);
        let sum = self.checksum();
        self.set_word(idx, sum.wrapping_neg());
    }
}

/// 定长块的读写窗口：`[reserved, blocks)`以外的块一律拒绝访问。
#[derive(Debug, Clone)]
pub struct BlockStore {
    /// 底层块设备的引用
    dev: Arc<dyn BlockDevice>,
    size: BlockSize,
    reserved: u32,
    blocks: u32,
}

impl BlockStore {
    pub fn new(dev: &Arc<dyn BlockDevice>, geo: &Geometry) -> Self {
        Self::with_window(dev, geo.block_size, geo.reserved, geo.blocks)
    }

    /// 定位根块时，几何信息尚未确定，只能按试探的块大小开窗。
    pub fn with_window(
        dev: &Arc<dyn BlockDevice>,
        size: BlockSize,
        reserved: u32,
        blocks: u32,
    ) -> Self {
        Self {
            dev: Arc::clone(dev),
            size,
            reserved,
            blocks,
        }
    }

    pub const fn block_size(&self) -> BlockSize {
        self.size
    }

    pub const fn reserved(&self) -> u32 {
        self.reserved
    }

    pub fn device(&self) -> &Arc<dyn BlockDevice> {
        &self.dev
    }

    pub fn read(&self, id: BlockId) -> Result<Block> {
        self.validate(id)?;
        self.read_unchecked(id)
    }

    pub fn write(&self, id: BlockId, block: &Block) -> Result<()> {
        self.validate(id)?;
        self.write_unchecked(id, block)
    }

    /// 读引导块：它恒位于设备的#0块，不受保留区限制。
    pub fn read_boot(&self) -> Result<Block> {
        self.read_unchecked(BlockId::NULL)
    }

    pub fn write_boot(&self, block: &Block) -> Result<()> {
        self.write_unchecked(BlockId::NULL, block)
    }

    fn validate(&self, id: BlockId) -> Result<()> {
        if id.0 < self.reserved {
            Err(Error::Reserved { block: id })
        } else if id.0 >= self.blocks {
            Err(Error::OutOfRange { block: id })
        } else {
            Ok(())
        }
    }

    /// 块号拉伸至扇区号
    fn sector(&self, id: BlockId) -> usize {
        ((id.0 as u64) << (self.size.shift() - SECTOR_SHIFT)) as usize
    }

    fn read_unchecked(&self, id: BlockId) -> Result<Block> {
        let mut block = Block::zeroed(self.size);
        self.dev
            .read_block(self.sector(id), block.as_bytes_mut())
            .map_err(|source| Error::Io { block: id, source })?;
        Ok(block)
    }

    fn write_unchecked(&self, id: BlockId, block: &Block) -> Result<()> {
        debug_assert_eq!(self.size.bytes(), block.len());
        self.dev
            .write_block(self.sector(id), block.as_bytes())
            .map_err(|source| Error::Io { block: id, source })
    }
}
