//! 块设备抽象
//!
//! 设备以512字节的扇区为寻址单位，上层按自己的块大小换算扇区号。

mod ram_disk;

use core::fmt::Debug;
use std::io;

pub use self::ram_disk::RamDisk;

/// 设备的最小寻址单位
pub const SECTOR_SIZE: usize = 512;

/// `log2(SECTOR_SIZE)`
pub const SECTOR_SHIFT: u32 = 9;

pub trait BlockDevice: Send + Sync + Debug {
    /// 从第`block_id`个扇区开始，读满`buf`。
    /// `buf`的长度须为[`SECTOR_SIZE`]的整数倍，读不满即报错。
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()>;

    /// 从第`block_id`个扇区开始，写入整个`buf`。
    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()>;

    /// 设备的扇区总数
    fn sectors(&self) -> io::Result<u64>;
}
