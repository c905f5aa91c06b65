use super::{
    AmigaDate, HeaderBlock, NAME_MAX, ROOT_BITMAPS, SecondaryType, T_SHORT, head, read_bstr,
    tail, write_bstr,
};
use crate::{Block, BlockId, BlockSize};

/// 位图有效（卷已干净卸载）
const BITMAP_VALID: u32 = u32::MAX;

/// 根块，整个卷的锚点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootBlock {
    block: Block,
}

impl RootBlock {
    /// 新建空卷的根块，名字超长的部分被截去
    pub fn new(size: BlockSize, name: &[u8], date: AmigaDate) -> Self {
        let mut block = Block::zeroed(size);
        block.set_word(head::PRIMARY_TYPE, T_SHORT);
        block.set_word(head::HASH_SIZE, size.table_size() as u32);

        date.write(&mut block, tail::ROOT_CHANGE);
        date.write(&mut block, tail::DISK_CHANGE);
        date.write(&mut block, tail::DISK_CREATE);

        write_bstr(&mut block, tail::NAME, NAME_MAX, name);
        block.set_tail_word(tail::SECONDARY_TYPE, SecondaryType::Root.raw());

        Self { block }
    }

    pub fn from_block(block: Block) -> Self {
        Self { block }
    }

    /// 仅凭头部几个字判断是否像根块，与块大小无关，读512字节即可判断。
    pub fn is_candidate(block: &Block) -> bool {
        block.word(head::PRIMARY_TYPE) == T_SHORT
            && block.word(1) == 0
            && block.word(2) == 0
            && block.word(4) == 0
    }

    /// 由哈希表大小反推块大小
    pub fn derived_block_size(block: &Block) -> Option<BlockSize> {
        let words = block.word(head::HASH_SIZE).checked_add(56)?;
        BlockSize::from_bytes(words.checked_mul(4)?)
    }

    /// 次类型为根且校验和完好
    pub fn is_root(&self) -> bool {
        self.block.secondary_type() == SecondaryType::Root.raw() && self.block.is_valid()
    }

    pub fn as_block(&self) -> &Block {
        &self.block
    }

    /// 根目录哈希表中的非空链首
    pub fn hash_table(&self) -> impl DoubleEndedIterator<Item = BlockId> + '_ {
        HeaderBlock::new(&self.block).hash_table()
    }

    /// 位图标志非0表示卷是干净卸载的
    pub fn bitmap_valid(&self) -> bool {
        self.block.tail_word(tail::BITMAP_FLAG) != 0
    }

    pub fn set_bitmap_valid(&mut self, valid: bool) {
        let flag = if valid { BITMAP_VALID } else { 0 };
        self.block.set_tail_word(tail::BITMAP_FLAG, flag);
    }

    pub fn bitmap_page(&self, idx: usize) -> BlockId {
        debug_assert!(idx < ROOT_BITMAPS);
        self.block.tail_pointer(tail::BITMAP_PAGES - idx)
    }

    pub fn set_bitmap_page(&mut self, idx: usize, id: BlockId) {
        debug_assert!(idx < ROOT_BITMAPS);
        self.block.set_tail_word(tail::BITMAP_PAGES - idx, id.get());
    }

    pub fn bitmap_ext(&self) -> BlockId {
        self.block.tail_pointer(tail::BITMAP_EXT)
    }

    pub fn set_bitmap_ext(&mut self, id: BlockId) {
        self.block.set_tail_word(tail::BITMAP_EXT, id.get());
    }

    pub fn dir_cache(&self) -> BlockId {
        self.block.tail_pointer(tail::DIR_CACHE)
    }

    pub fn name(&self) -> &[u8] {
        read_bstr(&self.block, tail::NAME, NAME_MAX + 1)
    }

    pub fn created(&self) -> AmigaDate {
        AmigaDate::read(&self.block, tail::DISK_CREATE)
    }

    pub fn changed(&self) -> AmigaDate {
        AmigaDate::read(&self.block, tail::ROOT_CHANGE)
    }

    /// 写回前重算校验和
    pub fn seal(&mut self) {
        self.block.stamp_checksum(head::CHECKSUM);
    }
}
