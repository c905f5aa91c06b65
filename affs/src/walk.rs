//! 从根块出发遍历整棵目录树，把到达的每一块记入推导位图
//!
//! 递归改写为显式的工作栈。每访问一块都要先在位图中占用它，
//! 已被占用的块不会被再次进入，因此哈希链上的环与交叉链接都会在此终止。

use core::fmt;

use enumflags2::BitFlags;

use crate::volume::{
    AmigaDate, DirCacheBlock, FsFlag, HeaderBlock, RootBlock, SecondaryType, T_LIST, T_SHORT,
};
use crate::{Bitmap, Block, BlockId, BlockStore, Error, Geometry, Result};

/// 目录项的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File {
        byte_size: u32,
        /// 实际占用的数据块数
        data_blocks: u32,
        /// 扩展块数
        extensions: u32,
    },
    SoftLink,
    LinkFile,
    LinkDir,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dir => f.write_str("     <DIR>"),
            Self::File { byte_size, .. } => write!(f, "{byte_size:>10}"),
            Self::SoftLink => f.write_str("<SOFTLINK>"),
            Self::LinkFile => f.write_str("<FILELINK>"),
            Self::LinkDir => f.write_str(" <LINKDIR>"),
        }
    }
}

/// 遍历到的一个目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: BlockId,
    pub parent: BlockId,
    pub name: Vec<u8>,
    pub kind: EntryKind,
    pub changed: AmigaDate,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>10} {:<30} {} {}",
            self.key,
            String::from_utf8_lossy(&self.name),
            self.kind,
            self.changed
        )
    }
}

/// 结构上的问题：记录下来，放弃所在的链，遍历继续
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProblemKind {
    #[error("pointer outside of the volume")]
    OutOfRange,

    #[error("invalid checksum ({0:#x})")]
    BadChecksum(u32),

    #[error("invalid primary type {0}")]
    BadPrimaryType(u32),

    #[error("entry has root type")]
    UnexpectedRoot,

    #[error("unknown secondary type {0:#x}")]
    UnknownType(u32),

    #[error("wrong header key {found}")]
    WrongKey { found: BlockId },

    #[error("parent {found} does not match directory {expected}")]
    WrongParent { found: BlockId, expected: BlockId },

    #[error("already allocated")]
    AlreadyAllocated,

    #[error("wrong blockcount {declared}, table holds {found}")]
    BlockCount { declared: u32, found: u32 },

    #[error("block {0} exceeds file size")]
    BeyondFileSize(BlockId),

    #[error("extension exceeds file size")]
    ExtensionBeyondSize,

    #[error("{0} data block(s) missing")]
    MissingData(u32),
}

impl ProblemKind {
    /// 不影响块的归属判断的问题只算警告
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::WrongParent { .. }
                | Self::BlockCount { .. }
                | Self::BeyondFileSize(_)
                | Self::ExtensionBeyondSize
                | Self::MissingData(_)
        )
    }

    /// 严格模式下仍可容忍的问题
    fn is_tolerable(&self) -> bool {
        matches!(self, Self::WrongParent { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("block {block}: {kind}")]
pub struct Problem {
    pub block: BlockId,
    pub kind: ProblemKind,
    pub warning: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WalkReport {
    /// 按访问顺序排列的目录项
    pub entries: Vec<Entry>,
    pub problems: Vec<Problem>,
}

impl WalkReport {
    pub fn errors(&self) -> usize {
        self.problems.iter().filter(|p| !p.warning).count()
    }

    pub fn warnings(&self) -> usize {
        self.problems.iter().filter(|p| p.warning).count()
    }

    /// 给定种类的问题数
    pub fn count(&self, pred: impl Fn(&ProblemKind) -> bool) -> usize {
        self.problems.iter().filter(|p| pred(&p.kind)).count()
    }
}

/// 待访问的目录项
#[derive(Debug, Clone, Copy)]
struct Pending {
    key: BlockId,
    /// 所在目录
    parent: BlockId,
}

pub struct Walker<'a> {
    store: &'a BlockStore,
    bitmap: &'a mut Bitmap,
    geo: Geometry,
    dir_cache: bool,
    strict: bool,
    report: WalkReport,
    stack: Vec<Pending>,
}

impl<'a> Walker<'a> {
    pub fn new(
        store: &'a BlockStore,
        bitmap: &'a mut Bitmap,
        geo: &Geometry,
        flags: BitFlags<FsFlag>,
    ) -> Self {
        Self {
            store,
            bitmap,
            geo: *geo,
            dir_cache: flags.contains(FsFlag::DirCache),
            strict: false,
            report: WalkReport::default(),
            stack: Vec::new(),
        }
    }

    /// 把文件大小相关的警告升级为错误
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// 遍历整个卷。只有I/O错误会中止遍历。
    pub fn walk_volume(mut self, root: &RootBlock) -> Result<WalkReport> {
        if self.dir_cache {
            self.walk_dir_cache(root.dir_cache())?;
        }

        self.push_table(self.geo.root, root.hash_table());
        while let Some(next) = self.stack.pop() {
            self.visit(next)?;
        }

        log::debug!(
            "walked {} entries, {} error(s), {} warning(s)",
            self.report.entries.len(),
            self.report.errors(),
            self.report.warnings()
        );
        Ok(self.report)
    }

    /// 哈希表逆序入栈，出栈时即按表的顺序访问
    fn push_table(&mut self, parent: BlockId, table: impl DoubleEndedIterator<Item = BlockId>) {
        self.stack
            .extend(table.rev().map(|key| Pending { key, parent }));
    }

    fn visit(&mut self, Pending { key, parent }: Pending) -> Result<()> {
        let Some(block) = self.read_checked(key)? else {
            return Ok(());
        };
        if block.primary_type() != T_SHORT {
            self.problem(key, ProblemKind::BadPrimaryType(block.primary_type()));
            return Ok(());
        }

        let header = HeaderBlock::new(&block);
        let kind = match header.secondary_type() {
            Some(SecondaryType::UserDir) => EntryKind::Dir,
            Some(SecondaryType::File) => EntryKind::File {
                byte_size: header.byte_size(),
                data_blocks: 0,
                extensions: 0,
            },
            Some(SecondaryType::SoftLink) => EntryKind::SoftLink,
            Some(SecondaryType::LinkFile) => EntryKind::LinkFile,
            Some(SecondaryType::LinkDir) => EntryKind::LinkDir,
            Some(SecondaryType::Root) => {
                self.problem(key, ProblemKind::UnexpectedRoot);
                return Ok(());
            }
            None => {
                self.problem(key, ProblemKind::UnknownType(block.secondary_type()));
                return Ok(());
            }
        };

        if matches!(kind, EntryKind::Dir | EntryKind::File { .. }) && header.own_key() != key {
            self.problem(key, ProblemKind::WrongKey { found: header.own_key() });
        }
        if header.parent() != parent {
            self.problem(
                key,
                ProblemKind::WrongParent {
                    found: header.parent(),
                    expected: parent,
                },
            );
        }
        if !self.claim(key) {
            return Ok(());
        }

        let chain = header.hash_chain();
        if !chain.is_null() {
            self.stack.push(Pending { key: chain, parent });
        }

        let kind = match kind {
            EntryKind::Dir => {
                if self.dir_cache {
                    self.walk_dir_cache(header.dir_cache())?;
                }
                self.push_table(key, header.hash_table());
                EntryKind::Dir
            }
            EntryKind::File { .. } => self.walk_file(key, &block)?,
            links => links,
        };

        let entry = Entry {
            key,
            parent,
            name: header.name().to_vec(),
            kind,
            changed: header.changed(),
        };
        log::debug!("{entry}");
        self.report.entries.push(entry);
        Ok(())
    }

    /// 沿文件头与扩展块链占用全部数据块
    fn walk_file(&mut self, key: BlockId, header: &Block) -> Result<EntryKind> {
        let byte_size = HeaderBlock::new(header).byte_size();
        let mut remaining = self.geo.data_blocks(byte_size);
        let mut data_blocks = 0;
        let mut extensions = 0;

        let mut current = header.clone();
        let mut current_key = key;
        loop {
            let view = HeaderBlock::new(&current);

            let found = view.data_blocks().filter(|id| !id.is_null()).count() as u32;
            if view.block_count() != found {
                self.problem(
                    current_key,
                    ProblemKind::BlockCount {
                        declared: view.block_count(),
                        found,
                    },
                );
            }

            for id in view.data_blocks().filter(|id| !id.is_null()) {
                if remaining == 0 {
                    self.problem(current_key, ProblemKind::BeyondFileSize(id));
                    continue;
                }
                log::trace!(" [{id}]");
                if self.claim(id) {
                    data_blocks += 1;
                }
                remaining -= 1;
            }

            let next = view.extension();
            if next.is_null() {
                break;
            }
            if remaining == 0 {
                self.problem(next, ProblemKind::ExtensionBeyondSize);
                break;
            }

            let Some(ext) = self.read_checked(next)? else {
                break;
            };
            if ext.primary_type() != T_LIST {
                self.problem(next, ProblemKind::BadPrimaryType(ext.primary_type()));
                break;
            }
            let own_key = HeaderBlock::new(&ext).own_key();
            if own_key != next {
                self.problem(next, ProblemKind::WrongKey { found: own_key });
            }
            if !self.claim(next) {
                break;
            }
            log::trace!(" [ext:{next}]");
            extensions += 1;

            current = ext;
            current_key = next;
        }

        if remaining > 0 {
            self.problem(key, ProblemKind::MissingData(remaining));
        }

        Ok(EntryKind::File {
            byte_size,
            data_blocks,
            extensions,
        })
    }

    /// 目录缓存链只核对自身，其中的条目不解析
    fn walk_dir_cache(&mut self, mut next: BlockId) -> Result<()> {
        while !next.is_null() {
            let key = next;
            let Some(block) = self.read_checked(key)? else {
                break;
            };

            let cache = DirCacheBlock::new(&block);
            if cache.own_key() != key {
                self.problem(key, ProblemKind::WrongKey { found: cache.own_key() });
            }
            if !self.claim(key) {
                break;
            }
            log::trace!(" [{key}]");
            next = cache.next();
        }
        Ok(())
    }

    /// 读入并校验一块。越界或校验失败记为问题并返回`None`，I/O错误直接上抛。
    fn read_checked(&mut self, key: BlockId) -> Result<Option<Block>> {
        let block = match self.store.read(key) {
            Ok(block) => block,
            Err(e) if e.is_range() => {
                self.problem(key, ProblemKind::OutOfRange);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !block.is_valid() {
            self.problem(key, ProblemKind::BadChecksum(block.checksum()));
            return Ok(None);
        }
        Ok(Some(block))
    }

    /// 在推导位图中占用一块，失败时记为问题
    fn claim(&mut self, id: BlockId) -> bool {
        match self.bitmap.allocate(id) {
            Ok(()) => true,
            Err(Error::AlreadyAllocated(_)) => {
                self.problem(id, ProblemKind::AlreadyAllocated);
                false
            }
            Err(_) => {
                self.problem(id, ProblemKind::OutOfRange);
                false
            }
        }
    }

    fn problem(&mut self, block: BlockId, kind: ProblemKind) {
        let warning = kind.is_warning() && (!self.strict || kind.is_tolerable());
        let problem = Problem {
            block,
            kind,
            warning,
        };
        if warning {
            log::warn!("{problem}");
        } else {
            log::error!("{problem}");
        }
        self.report.problems.push(problem);
    }
}
