use std::io;

use crate::BlockId;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("block {block} is reserved")]
    Reserved { block: BlockId },

    #[error("block {block} is out of range")]
    OutOfRange { block: BlockId },

    #[error("i/o error on block {block}")]
    Io {
        block: BlockId,
        #[source]
        source: io::Error,
    },

    #[error("unable to query device size")]
    DeviceSize(#[source] io::Error),

    #[error("block {0} already allocated")]
    AlreadyAllocated(BlockId),

    #[error("unable to find root block")]
    RootNotFound,

    #[error("unknown filesystem type {0:#010x}")]
    UnknownFormat(u32),

    #[error("invalid block size {0}")]
    InvalidBlockSize(u32),

    #[error("invalid geometry: root {root} outside of [{reserved}, {blocks})")]
    InvalidGeometry { root: u32, reserved: u32, blocks: u32 },

    #[error("{0} bitmap block(s) could not be read, abort writing bitmap")]
    AbortDueToPriorErrors(u32),

    #[error("no free block left")]
    NoSpace,

    #[error("name of {0} bytes exceeds max name length of 30")]
    NameTooLong(usize),

    #[error("device was opened read-only")]
    ReadOnly,
}

impl Error {
    /// 越界访问：落在保留区或超出卷尾
    pub fn is_range(&self) -> bool {
        matches!(self, Self::Reserved { .. } | Self::OutOfRange { .. })
    }
}
