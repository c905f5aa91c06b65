//! 位图：记录`[reserved, blocks)`内每一块是否空闲
//!
//! 位图块的首字是校验和，其后全是位，置1表示空闲。
//! 第`i`位对应`reserved + i`号块；位以32位大端字为单位存放，字内从最低位数起。
//! 根块尾部直接记录前25个位图块，更多的位图块登记在位图扩展块组成的链表上：
//! 扩展块除末字外皆为位图块指针，末字指向下一个扩展块。

use crate::volume::{ROOT_BITMAPS, RootBlock};
use crate::{Block, BlockId, BlockStore, Error, Geometry, Result};

#[derive(Debug)]
pub struct Bitmap {
    geo: Geometry,
    /// 从盘上读出的位图
    old: Vec<u32>,
    /// 由遍历推导出的位图，初始时全部空闲
    new: Vec<u32>,
    /// 各位图块的块号，按位图顺序
    pages: Vec<BlockId>,
    /// 位图扩展块的块号
    extensions: Vec<BlockId>,
    /// 上一次分配出去的块，下一次从这里接着找
    last_alloc: BlockId,
    /// 读取时无法读出或校验失败的位图块数
    unreadable: u32,
}

/// 两份位图的差异
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    /// 盘上标记为空闲，遍历却发现在用
    pub leaked: Vec<BlockId>,
    /// 盘上标记为在用，遍历却没有到达
    pub orphaned: Vec<BlockId>,
}

impl Discrepancy {
    pub fn total(&self) -> usize {
        self.leaked.len() + self.orphaned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl Bitmap {
    /// 根块立即被标记为在用
    pub fn new(geo: &Geometry) -> Self {
        let words = Self::page_count_of(geo) * Self::page_words_of(geo);
        let mut bitmap = Self {
            geo: *geo,
            old: vec![0; words],
            new: vec![u32::MAX; words],
            pages: Vec::new(),
            extensions: Vec::new(),
            last_alloc: geo.root,
            unreadable: 0,
        };
        let root = bitmap.bit(geo.root);
        bitmap.new[root / 32] &= !(1u32 << (root % 32));
        bitmap
    }

    /// 一个位图块容纳的位图字数
    pub fn page_words(&self) -> usize {
        Self::page_words_of(&self.geo)
    }

    /// 覆盖整个可分配区所需的位图块数
    pub fn page_count(&self) -> usize {
        Self::page_count_of(&self.geo)
    }

    pub fn pages(&self) -> &[BlockId] {
        &self.pages
    }

    pub fn extensions(&self) -> &[BlockId] {
        &self.extensions
    }

    pub fn unreadable(&self) -> u32 {
        self.unreadable
    }

    /// 盘上的位图
    pub fn on_disk(&self) -> &[u32] {
        &self.old
    }

    /// 推导出的位图
    pub fn derived(&self) -> &[u32] {
        &self.new
    }

    /// 在推导位图中把`id`标记为在用。
    /// 若它已在用，则报[`Error::AlreadyAllocated`]且位图不变。
    pub fn allocate(&mut self, id: BlockId) -> Result<()> {
        let bit = self.checked_bit(id)?;
        let mask = 1u32 << (bit % 32);
        let word = &mut self.new[bit / 32];

        if *word & mask == 0 {
            return Err(Error::AlreadyAllocated(id));
        }
        *word &= !mask;
        Ok(())
    }

    /// 越界的块一律视为在用
    pub fn is_allocated(&self, id: BlockId) -> bool {
        match self.checked_bit(id) {
            Ok(bit) => !Self::test(&self.new, bit),
            Err(_) => true,
        }
    }

    /// 寻找并占用一个空闲块。
    ///
    /// 先从上次分配处向后找到卷尾；找不到再从可分配区的起点找到根块为止。
    /// 根块附近的位图块因此是连续分配的。
    ///
    /// 两遍合起来并不覆盖整个卷：`[root, last_alloc)`中的空闲块不会再被找到，
    /// 此时返回`None`。只有建卷时顺序分配，这一空隙不会出现空闲块。
    pub fn find_free(&mut self) -> Option<BlockId> {
        let end = self.geo.usable_blocks() as usize;
        let resume = (self.last_alloc.get() - self.geo.reserved) as usize;
        let root = (self.geo.root.get() - self.geo.reserved) as usize;

        let bit = self.scan(resume, end).or_else(|| self.scan(0, root))?;
        self.new[bit / 32] &= !(1u32 << (bit % 32));
        self.last_alloc = BlockId::new(bit as u32 + self.geo.reserved);
        Some(self.last_alloc)
    }

    /// 从盘上读入位图，返回无法读出的位图块数。
    ///
    /// 读不出或校验失败的位图块，其覆盖的区段保持“在用”。
    pub fn load(&mut self, store: &BlockStore, root: &RootBlock) -> u32 {
        self.pages.clear();
        self.extensions.clear();

        let total = self.page_count();
        let direct = total.min(ROOT_BITMAPS);
        for idx in 0..direct {
            self.load_page(store, idx, root.bitmap_page(idx));
        }

        let per_ext = self.page_words();
        let mut remaining = total - direct;
        let mut ext = root.bitmap_ext();
        while remaining > 0 {
            if ext.is_null() {
                log::error!("bitmap blocks missing");
                self.unreadable += 1;
                break;
            }
            let block = match store.read(ext) {
                Ok(block) => block,
                Err(e) => {
                    log::error!("unable to read bitmap extension {ext}: {e}");
                    self.unreadable += 1;
                    break;
                }
            };
            if let Err(e) = self.allocate(ext) {
                log::error!("bitmap extension {ext}: {e}");
                self.unreadable += 1;
                break;
            }
            log::trace!("read ext bitmap: {ext}");
            self.extensions.push(ext);

            let count = remaining.min(per_ext);
            for i in 0..count {
                let page = self.pages.len();
                self.load_page(store, page, block.pointer(i));
            }
            remaining -= count;
            ext = block.pointer(per_ext);
        }

        self.unreadable
    }

    /// 把推导位图写回盘上，并置根块的位图有效标志（根块由调用者写回）。
    pub fn store(&self, store: &BlockStore, root: &mut RootBlock) -> Result<()> {
        if self.unreadable > 0 {
            log::error!("error in bitmap. abort writing bitmap");
            return Err(Error::AbortDueToPriorErrors(self.unreadable));
        }

        let words = self.page_words();
        for (idx, &id) in self.pages.iter().enumerate() {
            let mut block = Block::zeroed(self.geo.block_size);
            for (i, &bits) in self.new[idx * words..(idx + 1) * words].iter().enumerate() {
                block.set_word(i + 1, bits);
            }
            block.stamp_checksum(0);
            log::trace!("write bitmap {idx}: {id}");
            store.write(id, &block)?;
        }

        root.set_bitmap_valid(true);
        Ok(())
    }

    /// 为空卷分配位图块与扩展块链，并登记到根块上。扩展块在此写出。
    pub fn build(&mut self, store: &BlockStore, root: &mut RootBlock) -> Result<()> {
        self.pages.clear();
        self.extensions.clear();

        let total = self.page_count();
        let direct = total.min(ROOT_BITMAPS);
        for idx in 0..direct {
            let id = self.find_free().ok_or(Error::NoSpace)?;
            log::trace!("alloc bitmap {idx} at {id}");
            root.set_bitmap_page(idx, id);
            self.pages.push(id);
        }

        let per_ext = self.page_words();
        let mut remaining = total - direct;
        if remaining == 0 {
            return Ok(());
        }

        let mut ext = self.find_free().ok_or(Error::NoSpace)?;
        log::trace!("alloc ext bitmap at {ext}");
        root.set_bitmap_ext(ext);

        loop {
            self.extensions.push(ext);
            let mut block = Block::zeroed(self.geo.block_size);

            let count = remaining.min(per_ext);
            for i in 0..count {
                let id = self.find_free().ok_or(Error::NoSpace)?;
                log::trace!("alloc bitmap {} at {id}", self.pages.len());
                block.set_word(i, id.get());
                self.pages.push(id);
            }
            remaining -= count;

            let next = if remaining > 0 {
                let next = self.find_free().ok_or(Error::NoSpace)?;
                log::trace!("alloc ext bitmap at {next}");
                block.set_word(per_ext, next.get());
                Some(next)
            } else {
                None
            };

            store.write(ext, &block)?;
            match next {
                Some(next) => ext = next,
                None => return Ok(()),
            }
        }
    }

    /// 比较两份位图，逐块汇报差异
    pub fn diff(&self) -> Discrepancy {
        let usable = self.geo.usable_blocks() as usize;
        let mut report = Discrepancy::default();

        for (idx, (&old, &new)) in self.old.iter().zip(&self.new).enumerate() {
            let base = idx * 32;
            if base >= usable {
                break;
            }
            let mut mask = old ^ new;
            if usable - base < 32 {
                mask &= (1u32 << (usable - base)) - 1;
            }

            while mask != 0 {
                let bit = mask.trailing_zeros() as usize;
                mask &= mask - 1;

                let id = BlockId::new((base + bit) as u32 + self.geo.reserved);
                if Self::test(&self.new, base + bit) {
                    log::trace!("{{{id}}} allocated on disk, but unreachable");
                    report.orphaned.push(id);
                } else {
                    log::trace!("<{id}> free on disk, but in use");
                    report.leaked.push(id);
                }
            }
        }

        report
    }
}

impl Bitmap {
    const fn page_words_of(geo: &Geometry) -> usize {
        geo.block_size.words() - 1
    }

    const fn page_count_of(geo: &Geometry) -> usize {
        let bits = Self::page_words_of(geo) * 32;
        (geo.usable_blocks() as usize).div_ceil(bits)
    }

    /// 已知在范围内的块对应的位
    fn bit(&self, id: BlockId) -> usize {
        (id.get() - self.geo.reserved) as usize
    }

    fn checked_bit(&self, id: BlockId) -> Result<usize> {
        if id.get() < self.geo.reserved {
            Err(Error::Reserved { block: id })
        } else if id.get() >= self.geo.blocks {
            Err(Error::OutOfRange { block: id })
        } else {
            Ok(self.bit(id))
        }
    }

    #[inline]
    fn test(words: &[u32], bit: usize) -> bool {
        words[bit / 32] & (1u32 << (bit % 32)) != 0
    }

    /// 在推导位图的`[from, to)`位中找第一个空闲位
    fn scan(&self, from: usize, to: usize) -> Option<usize> {
        let mut bit = from;
        while bit < to {
            let word = self.new[bit / 32] >> (bit % 32);
            if word == 0 {
                bit = (bit / 32 + 1) * 32;
                continue;
            }
            let hit = bit + word.trailing_zeros() as usize;
            return (hit < to).then_some(hit);
        }
        None
    }

    fn load_page(&mut self, store: &BlockStore, idx: usize, id: BlockId) {
        self.pages.push(id);

        let block = match store.read(id) {
            Ok(block) if block.is_valid() => block,
            Ok(block) => {
                log::error!(
                    "bitmap block {id} has invalid checksum ({:#x})",
                    block.checksum()
                );
                self.unreadable += 1;
                return;
            }
            Err(e) => {
                log::error!("unable to read bitmap block {id}: {e}");
                self.unreadable += 1;
                return;
            }
        };
        if let Err(e) = self.allocate(id) {
            log::error!("bitmap block {id}: {e}");
            self.unreadable += 1;
            return;
        }
        log::trace!("read bitmap {idx}: {id}");

        let words = self.page_words();
        for (i, word) in self.old[idx * words..(idx + 1) * words].iter_mut().enumerate() {
            *word = block.word(i + 1);
        }
    }
}
