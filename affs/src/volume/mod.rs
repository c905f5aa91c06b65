//! 卷上各类块的布局
//!
//! 除位图块、位图扩展块与OFS数据块外，结构块的首字为主类型，末字为次类型，
//! 第5个字存放校验和。头部占6个字，尾部占50个字，中间是哈希表或块表。

mod boot;
mod date;
mod dcache;
mod header;
mod root;

pub use self::{
    boot::{FsFlag, classify, dos_type, variant_name},
    date::AmigaDate,
    dcache::DirCacheBlock,
    header::HeaderBlock,
    root::RootBlock,
};
use crate::Block;

/// 主类型：目录项、根块、文件头
pub const T_SHORT: u32 = 2;
/// 主类型：文件扩展块
pub const T_LIST: u32 = 16;
/// 主类型：目录缓存块
pub const T_DCACHE: u32 = 17;

/// 根块尾部直接记录的位图块数
pub const ROOT_BITMAPS: usize = 25;

/// 名字的最大长度（不含长度前缀）
pub const NAME_MAX: usize = 30;

/// OFS数据块头部的字节量
pub const DATA_HEADER_SIZE: u32 = 6 * 4;

/// 头部各字的位置
pub mod head {
    pub const PRIMARY_TYPE: usize = 0;
    pub const OWN_KEY: usize = 1;
    pub const BLOCK_COUNT: usize = 2;
    pub const HASH_SIZE: usize = 3;
    pub const CHECKSUM: usize = 5;
    /// 哈希表/块表的首个表项
    pub const TABLE: usize = 6;
}

/// 尾部各字的位置，以倒数第几个字计（末字为1）
pub mod tail {
    pub const SECONDARY_TYPE: usize = 1;
    /// 文件头：扩展块；目录：目录缓存
    pub const EXTENSION: usize = 2;
    pub const PARENT: usize = 3;
    pub const HASH_CHAIN: usize = 4;
    pub const NAME: usize = 20;
    pub const CHANGE: usize = 23;
    pub const BYTE_SIZE: usize = 47;

    /// 根块
    pub const BITMAP_FLAG: usize = 50;
    pub const BITMAP_PAGES: usize = 49;
    pub const BITMAP_EXT: usize = 24;
    pub const ROOT_CHANGE: usize = 23;
    pub const DISK_CHANGE: usize = 10;
    pub const DISK_CREATE: usize = 7;
    pub const DIR_CACHE: usize = 2;
}

/// 次类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SecondaryType {
    Root = 1,
    UserDir = 2,
    SoftLink = 3,
    LinkDir = 4,
    File = -3,
    LinkFile = -4,
}

impl SecondaryType {
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw as i32 {
            1 => Some(Self::Root),
            2 => Some(Self::UserDir),
            3 => Some(Self::SoftLink),
            4 => Some(Self::LinkDir),
            -3 => Some(Self::File),
            -4 => Some(Self::LinkFile),
            _ => None,
        }
    }

    pub const fn raw(self) -> u32 {
        self as i32 as u32
    }
}

/// 读出以长度为前缀的名字，长度最多取`NAME_MAX + 1`以免越过字段
pub(crate) fn read_bstr(block: &Block, back: usize, max: usize) -> &[u8] {
    let off = (block.words() - back) * 4;
    let bytes = block.as_bytes();
    let len = (bytes[off] as usize).min(max);
    &bytes[off + 1..off + 1 + len]
}

/// 写入以长度为前缀的名字，超长部分被截去
pub(crate) fn write_bstr(block: &mut Block, back: usize, max: usize, name: &[u8]) {
    let off = (block.words() - back) * 4;
    let len = name.len().min(max);
    let bytes = block.as_bytes_mut();
    bytes[off] = len as u8;
    bytes[off + 1..off + 1 + len].copy_from_slice(&name[..len]);
}
