use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use block_dev::{BlockDevice, SECTOR_SHIFT};
use send_wrapper::SendWrapper;

/// An image file or a block device node.
#[derive(Debug)]
pub struct BlockFile {
    inner: SendWrapper<RefCell<File>>,
}

impl BlockFile {
    pub fn new(fd: File) -> Self {
        Self {
            inner: SendWrapper::new(RefCell::new(fd)),
        }
    }

    pub fn open(path: impl AsRef<Path>, writable: bool) -> io::Result<Self> {
        let fd = OpenOptions::new().read(true).write(writable).open(path)?;
        Ok(Self::new(fd))
    }

    fn seek_to(file: &mut File, block_id: usize) -> io::Result<()> {
        let pos = (block_id as u64) << SECTOR_SHIFT;
        file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()> {
        let mut file = self.inner.borrow_mut();
        Self::seek_to(&mut file, block_id)?;
        file.read_exact(buf)
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()> {
        let mut file = self.inner.borrow_mut();
        Self::seek_to(&mut file, block_id)?;
        file.write_all(buf)
    }

    /// Works for device nodes too, where the metadata length is zero.
    fn sectors(&self) -> io::Result<u64> {
        let mut file = self.inner.borrow_mut();
        let len = file.seek(SeekFrom::End(0))?;
        Ok(len >> SECTOR_SHIFT)
    }
}
