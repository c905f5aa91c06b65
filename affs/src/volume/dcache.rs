use super::head;
use crate::{Block, BlockId};

/// 目录缓存块：仅用于判断块是否存活，不解析其中的条目。
#[derive(Debug, Clone, Copy)]
pub struct DirCacheBlock<'a>(&'a Block);

impl<'a> DirCacheBlock<'a> {
    pub fn new(block: &'a Block) -> Self {
        Self(block)
    }

    pub fn own_key(&self) -> BlockId {
        self.0.pointer(head::OWN_KEY)
    }

    /// 链上的下一个缓存块
    pub fn next(&self) -> BlockId {
        self.0.pointer(4)
    }
}
