#![allow(dead_code)]

use std::sync::Arc;

use affs::volume::{RootBlock, SecondaryType, T_DCACHE, T_LIST, T_SHORT, head, tail};
use affs::{Block, BlockId, BlockStore, FormatOptions, Geometry};
use block_dev::{BlockDevice, RamDisk};

pub const MIB: usize = 1024 * 1024;

/// A freshly formatted in-memory volume that tests populate by writing raw
/// blocks. The on-disk bitmap is kept in sync by hand so that the checker's
/// own bitmap code is never used to build its inputs.
pub struct Volume {
    pub disk: Arc<RamDisk>,
    pub dev: Arc<dyn BlockDevice>,
    pub geo: Geometry,
    pub store: BlockStore,
    next: u32,
}

impl Volume {
    pub fn format(size: usize, opts: &FormatOptions) -> Self {
        let disk = Arc::new(RamDisk::new(size));
        let dev: Arc<dyn BlockDevice> = disk.clone();
        let geo = affs::format(&dev, opts).unwrap();
        let store = BlockStore::new(&dev, &geo);
        Self {
            disk,
            dev,
            geo,
            store,
            next: geo.reserved,
        }
    }

    pub fn root(&self) -> RootBlock {
        RootBlock::from_block(self.store.read(self.geo.root).unwrap())
    }

    /// Hands out blocks from the bottom of the volume, well below the root and
    /// the bitmap the formatter placed after it.
    pub fn alloc(&mut self) -> BlockId {
        let id = BlockId::new(self.next);
        assert!(id < self.geo.root);
        self.next += 1;
        self.mark_used(id);
        id
    }

    pub fn mark_used(&self, id: BlockId) {
        self.flip(id, false);
    }

    pub fn mark_free(&self, id: BlockId) {
        self.flip(id, true);
    }

    fn flip(&self, id: BlockId, free: bool) {
        let bits_per_page = (self.geo.block_size.words() - 1) * 32;
        let bit = (id.get() - self.geo.reserved) as usize;
        let page = self.bitmap_page(bit / bits_per_page);
        let word = 1 + (bit % bits_per_page) / 32;
        let mask = 1u32 << (bit % 32);

        let mut block = self.store.read(page).unwrap();
        let value = block.word(word);
        block.set_word(word, if free { value | mask } else { value & !mask });
        block.stamp_checksum(0);
        self.store.write(page, &block).unwrap();
    }

    fn bitmap_page(&self, idx: usize) -> BlockId {
        let root = self.root();
        if idx < 25 {
            return root.bitmap_page(idx);
        }
        let per_ext = self.geo.block_size.words() - 1;
        let mut idx = idx - 25;
        let mut ext = self.store.read(root.bitmap_ext()).unwrap();
        while idx >= per_ext {
            idx -= per_ext;
            ext = self.store.read(ext.pointer(per_ext)).unwrap();
        }
        ext.pointer(idx)
    }

    /// Fills in the fields every directory entry shares. The caller seals it.
    fn entry(&self, key: BlockId, parent: BlockId, name: &[u8], stype: SecondaryType) -> Block {
        let mut block = Block::zeroed(self.geo.block_size);
        block.set_word(head::PRIMARY_TYPE, T_SHORT);
        block.set_word(head::OWN_KEY, key.get());
        block.set_tail_word(tail::PARENT, parent.get());
        block.set_tail_word(tail::SECONDARY_TYPE, stype.raw());

        let off = (block.words() - tail::NAME) * 4;
        let bytes = block.as_bytes_mut();
        bytes[off] = name.len() as u8;
        bytes[off + 1..off + 1 + name.len()].copy_from_slice(name);
        block
    }

    /// Links `key` into the hash table of `dir` (the root or a user
    /// directory). Buckets are picked by key, which the checker never looks at.
    pub fn link(&self, dir: BlockId, key: BlockId) {
        let mut parent = self.store.read(dir).unwrap();
        let slot = head::TABLE + key.get() as usize % self.geo.block_size.table_size();
        let old = parent.word(slot);
        parent.set_word(slot, key.get());
        parent.stamp_checksum(head::CHECKSUM);
        self.store.write(dir, &parent).unwrap();

        if old != 0 {
            self.patch(key, |block| block.set_tail_word(tail::HASH_CHAIN, old));
        }
    }

    /// Rewrites one block in place and restores its checksum.
    pub fn patch(&self, id: BlockId, f: impl FnOnce(&mut Block)) {
        let mut block = self.store.read(id).unwrap();
        f(&mut block);
        block.stamp_checksum(head::CHECKSUM);
        self.store.write(id, &block).unwrap();
    }

    pub fn add_dir(&mut self, parent: BlockId, name: &str) -> BlockId {
        let key = self.alloc();
        let mut block = self.entry(key, parent, name.as_bytes(), SecondaryType::UserDir);
        block.stamp_checksum(head::CHECKSUM);
        self.store.write(key, &block).unwrap();
        self.link(parent, key);
        key
    }

    pub fn add_link(&mut self, parent: BlockId, name: &str, stype: SecondaryType) -> BlockId {
        let key = self.alloc();
        let mut block = self.entry(key, parent, name.as_bytes(), stype);
        block.stamp_checksum(head::CHECKSUM);
        self.store.write(key, &block).unwrap();
        self.link(parent, key);
        key
    }

    /// Creates a file of `byte_size` bytes, allocating as many data blocks as
    /// the payload size calls for. Returns the header key and the data blocks.
    pub fn add_file(&mut self, parent: BlockId, name: &str, byte_size: u32) -> (BlockId, Vec<BlockId>) {
        let key = self.alloc();
        let data = (0..self.geo.data_blocks(byte_size))
            .map(|_| self.alloc())
            .collect::<Vec<_>>();
        self.write_file(key, parent, name, byte_size, &data);
        (key, data)
    }

    /// Writes a file header over already-allocated blocks. Data blocks past
    /// the header's table go into freshly allocated extension blocks.
    pub fn write_file(
        &mut self,
        key: BlockId,
        parent: BlockId,
        name: &str,
        byte_size: u32,
        data: &[BlockId],
    ) {
        let table = self.geo.block_size.table_size();
        let mut chunks = data.chunks(table);

        let mut header = self.entry(key, parent, name.as_bytes(), SecondaryType::File);
        header.set_tail_word(tail::BYTE_SIZE, byte_size);
        fill_table(&mut header, chunks.next().unwrap_or_default());

        let mut current_key = key;
        let mut current = header;
        for chunk in chunks {
            let ext_key = self.alloc();
            let mut ext = Block::zeroed(self.geo.block_size);
            ext.set_word(head::PRIMARY_TYPE, T_LIST);
            ext.set_word(head::OWN_KEY, ext_key.get());
            ext.set_tail_word(tail::PARENT, key.get());
            ext.set_tail_word(tail::SECONDARY_TYPE, SecondaryType::File.raw());
            fill_table(&mut ext, chunk);

            current.set_tail_word(tail::EXTENSION, ext_key.get());
            current.stamp_checksum(head::CHECKSUM);
            self.store.write(current_key, &current).unwrap();

            current_key = ext_key;
            current = ext;
        }
        current.stamp_checksum(head::CHECKSUM);
        self.store.write(current_key, &current).unwrap();

        self.link(parent, key);
    }

    /// Attaches a chain of `len` directory cache blocks to `dir`.
    pub fn add_dir_cache(&mut self, dir: BlockId, len: usize) -> Vec<BlockId> {
        let chain = (0..len).map(|_| self.alloc()).collect::<Vec<_>>();
        for (i, &id) in chain.iter().enumerate() {
            let next = chain.get(i + 1).map_or(0, |id| id.get());
            let mut block = Block::zeroed(self.geo.block_size);
            block.set_word(head::PRIMARY_TYPE, T_DCACHE);
            block.set_word(1, id.get());
            block.set_word(2, dir.get());
            block.set_word(4, next);
            block.stamp_checksum(head::CHECKSUM);
            self.store.write(id, &block).unwrap();
        }
        if let Some(first) = chain.first() {
            self.patch(dir, |block| block.set_tail_word(tail::DIR_CACHE, first.get()));
        }
        chain
    }

    /// Flips one byte of a block without fixing its checksum.
    pub fn corrupt(&self, id: BlockId, offset: usize) {
        let pos = ((id.get() as usize) << self.geo.shift()) + offset;
        self.disk.with_bytes(|bytes| bytes[pos] ^= 0x5a);
    }

    pub fn set_boot_magic(&self, magic: u32) {
        self.disk
            .with_bytes(|bytes| bytes[..4].copy_from_slice(&magic.to_be_bytes()));
    }
}

/// Data blocks are listed from the end of the table backwards.
fn fill_table(block: &mut Block, data: &[BlockId]) {
    let table = block.words() - 56;
    for (i, id) in data.iter().enumerate() {
        block.set_word(head::TABLE + table - 1 - i, id.get());
    }
    block.set_word(head::BLOCK_COUNT, data.len() as u32);
}
