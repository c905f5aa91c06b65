use std::io;
use std::sync::{Mutex, PoisonError};

use crate::{BlockDevice, SECTOR_SIZE};

/// 内存中的磁盘，用于构建镜像与测试。
#[derive(Debug)]
pub struct RamDisk(Mutex<Vec<u8>>);

impl RamDisk {
    /// 创建`size`字节的全零磁盘，`size`向上取整到扇区。
    pub fn new(size: usize) -> Self {
        let size = size.div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
        Self(Mutex::new(vec![0; size]))
    }

    pub fn from_bytes(mut data: Vec<u8>) -> Self {
        data.resize(data.len().div_ceil(SECTOR_SIZE) * SECTOR_SIZE, 0);
        Self(Mutex::new(data))
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    /// 直接访问底层字节，测试中用来制造损坏。
    pub fn with_bytes<V>(&self, f: impl FnOnce(&mut [u8]) -> V) -> V {
        f(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn span(
        len: usize,
        block_id: usize,
        buf_len: usize,
        short: io::ErrorKind,
    ) -> io::Result<core::ops::Range<usize>> {
        if buf_len % SECTOR_SIZE != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "buffer is not a multiple of the sector size",
            ));
        }
        let start = block_id
            .checked_mul(SECTOR_SIZE)
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;
        let end = start + buf_len;
        if end > len {
            return Err(io::Error::new(short, "not a complete block!"));
        }
        Ok(start..end)
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()> {
        let data = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let span = Self::span(data.len(), block_id, buf.len(), io::ErrorKind::UnexpectedEof)?;
        buf.copy_from_slice(&data[span]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()> {
        let mut data = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let span = Self::span(data.len(), block_id, buf.len(), io::ErrorKind::WriteZero)?;
        data[span].copy_from_slice(buf);
        Ok(())
    }

    fn sectors(&self) -> io::Result<u64> {
        let data = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        Ok((data.len() / SECTOR_SIZE) as u64)
    }
}
