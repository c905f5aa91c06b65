use super::{AmigaDate, NAME_MAX, SecondaryType, head, read_bstr, tail};
use crate::{Block, BlockId};

/// 目录、文件头、文件扩展块与链接共用的视图。
///
/// 它们的头尾布局一致，区别只在于中间的表：
/// 目录存放哈希表，文件头与扩展块存放倒序排列的数据块表。
#[derive(Debug, Clone, Copy)]
pub struct HeaderBlock<'a>(&'a Block);

impl<'a> HeaderBlock<'a> {
    pub fn new(block: &'a Block) -> Self {
        Self(block)
    }

    pub fn secondary_type(&self) -> Option<SecondaryType> {
        SecondaryType::from_raw(self.0.secondary_type())
    }

    /// 应等于块自身的块号
    pub fn own_key(&self) -> BlockId {
        self.0.pointer(head::OWN_KEY)
    }

    /// 本块表中登记的数据块数
    pub fn block_count(&self) -> u32 {
        self.0.word(head::BLOCK_COUNT)
    }

    /// 哈希表中的非空链首
    pub fn hash_table(&self) -> impl DoubleEndedIterator<Item = BlockId> + use<'a> {
        let block = self.0;
        (0..block.words() - 56)
            .map(move |idx| block.pointer(head::TABLE + idx))
            .filter(|id| !id.is_null())
    }

    /// 文件的数据块，按文件内的顺序（即表的倒序）
    pub fn data_blocks(&self) -> impl Iterator<Item = BlockId> + use<'a> {
        let block = self.0;
        (0..block.words() - 56)
            .rev()
            .map(move |idx| block.pointer(head::TABLE + idx))
    }

    pub fn hash_chain(&self) -> BlockId {
        self.0.tail_pointer(tail::HASH_CHAIN)
    }

    pub fn parent(&self) -> BlockId {
        self.0.tail_pointer(tail::PARENT)
    }

    /// 文件头的扩展块
    pub fn extension(&self) -> BlockId {
        self.0.tail_pointer(tail::EXTENSION)
    }

    /// 目录的缓存链
    pub fn dir_cache(&self) -> BlockId {
        self.0.tail_pointer(tail::EXTENSION)
    }

    pub fn byte_size(&self) -> u32 {
        self.0.tail_word(tail::BYTE_SIZE)
    }

    pub fn name(&self) -> &'a [u8] {
        read_bstr(self.0, tail::NAME, NAME_MAX + 1)
    }

    pub fn changed(&self) -> AmigaDate {
        AmigaDate::read(self.0, tail::CHANGE)
    }
}
