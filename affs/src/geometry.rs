use enumflags2::BitFlags;

use crate::volume::{DATA_HEADER_SIZE, FsFlag};
use crate::{BlockId, Error, Result};

/// 块的字节量
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum BlockSize {
    B512 = 512,
    B1024 = 1024,
    B2048 = 2048,
    B4096 = 4096,
}

impl BlockSize {
    pub const MIN: Self = Self::B512;

    pub const fn bytes(self) -> usize {
        self as usize
    }

    pub const fn shift(self) -> u32 {
        match self {
            Self::B512 => 9,
            Self::B1024 => 10,
            Self::B2048 => 11,
            Self::B4096 => 12,
        }
    }

    /// 一块能容纳多少个32位字
    pub const fn words(self) -> usize {
        self.bytes() / 4
    }

    /// 一块跨越多少个512字节扇区
    pub const fn sectors(self) -> u32 {
        (self.bytes() >> block_dev::SECTOR_SHIFT) as u32
    }

    /// 哈希表（及文件块表）的表项数，头部与尾部共占56个字
    pub const fn table_size(self) -> usize {
        self.words() - 56
    }

    pub const fn from_bytes(bytes: u32) -> Option<Self> {
        match bytes {
            512 => Some(Self::B512),
            1024 => Some(Self::B1024),
            2048 => Some(Self::B2048),
            4096 => Some(Self::B4096),
            _ => None,
        }
    }
}

impl TryFrom<u32> for BlockSize {
    type Error = Error;

    fn try_from(bytes: u32) -> Result<Self> {
        Self::from_bytes(bytes).ok_or(Error::InvalidBlockSize(bytes))
    }
}

/// 卷的几何信息，确定后在整个运行期间只读。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_size: BlockSize,
    /// 卷首不参与分配的块数
    pub reserved: u32,
    /// 卷的总块数
    pub blocks: u32,
    pub root: BlockId,
    /// 数据块中可用于文件内容的字节量
    pub data_block_size: u32,
}

impl Geometry {
    pub fn new(block_size: BlockSize, reserved: u32, blocks: u32, root: BlockId) -> Result<Self> {
        if root.get() < reserved || root.get() >= blocks {
            return Err(Error::InvalidGeometry {
                root: root.get(),
                reserved,
                blocks,
            });
        }

        Ok(Self {
            block_size,
            reserved,
            blocks,
            root,
            data_block_size: block_size.bytes() as u32,
        })
    }

    /// 按格式修正数据块的有效载荷：OFS的数据块带有24字节的头部。
    pub fn with_format(mut self, flags: BitFlags<FsFlag>) -> Self {
        self.data_block_size = self.block_size.bytes() as u32;
        if flags.contains(FsFlag::Ofs) {
            self.data_block_size -= DATA_HEADER_SIZE;
        }
        self
    }

    pub const fn shift(&self) -> u32 {
        self.block_size.shift()
    }

    /// 可分配的块数
    pub const fn usable_blocks(&self) -> u32 {
        self.blocks - self.reserved
    }

    pub const fn contains(&self, id: BlockId) -> bool {
        id.get() >= self.reserved && id.get() < self.blocks
    }

    /// 文件内容占用的数据块数
    pub const fn data_blocks(&self, byte_size: u32) -> u32 {
        byte_size.div_ceil(self.data_block_size)
    }
}
