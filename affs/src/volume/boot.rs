//! 引导块的DOS类型魔数
//!
//! 引导块恒为设备的#0块，其首字标明卷的格式变体。

use enumflags2::{BitFlags, bitflags};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[bitflags]
#[repr(u8)]
pub enum FsFlag {
    /// 旧格式(OFS)，数据块带头部
    Ofs = 0b0001,
    /// 国际字符集的名字哈希
    Intl = 0b0010,
    /// 目录缓存
    DirCache = 0b0100,
    /// 多用户
    MultiUser = 0b1000,
}

const FS_OFS: u32 = 0x444F_5300;
const FS_FFS: u32 = 0x444F_5301;
const FS_INTLOFS: u32 = 0x444F_5302;
const FS_INTLFFS: u32 = 0x444F_5303;
const FS_DCOFS: u32 = 0x444F_5304;
const FS_DCFFS: u32 = 0x444F_5305;
/// 'muFS'
const MUFS_FS: u32 = 0x6D75_4653;
const MUFS_OFS: u32 = 0x6D75_4600;
const MUFS_FFS: u32 = 0x6D75_4601;
const MUFS_INTLOFS: u32 = 0x6D75_4602;
const MUFS_INTLFFS: u32 = 0x6D75_4603;
const MUFS_DCOFS: u32 = 0x6D75_4604;
const MUFS_DCFFS: u32 = 0x6D75_4605;

#[derive(Debug)]
struct DosTypes {
    base: [(u32, &'static [FsFlag]); 13],
}

impl DosTypes {
    fn get(&self, magic: u32) -> Option<BitFlags<FsFlag>> {
        self.base
            .iter()
            .find(|(ty, _)| *ty == magic)
            .map(|(_, flags)| flags.iter().copied().collect())
    }
}

#[rustfmt::skip]
static DOS_TYPES: DosTypes = DosTypes {
    base: [
        (FS_OFS,       &[FsFlag::Ofs]),
        (FS_FFS,       &[]),
        (FS_INTLOFS,   &[FsFlag::Intl, FsFlag::Ofs]),
        (FS_INTLFFS,   &[FsFlag::Intl]),
        (FS_DCOFS,     &[FsFlag::DirCache, FsFlag::Ofs]),
        (FS_DCFFS,     &[FsFlag::DirCache]),
        (MUFS_FS,      &[FsFlag::MultiUser, FsFlag::Intl]),
        (MUFS_OFS,     &[FsFlag::MultiUser, FsFlag::Ofs]),
        (MUFS_FFS,     &[FsFlag::MultiUser]),
        (MUFS_INTLOFS, &[FsFlag::MultiUser, FsFlag::Intl, FsFlag::Ofs]),
        (MUFS_INTLFFS, &[FsFlag::MultiUser, FsFlag::Intl]),
        (MUFS_DCOFS,   &[FsFlag::MultiUser, FsFlag::DirCache, FsFlag::Ofs]),
        (MUFS_DCFFS,   &[FsFlag::MultiUser, FsFlag::DirCache]),
    ],
};

/// 把引导块的魔数映射为格式变体
pub fn classify(magic: u32) -> Result<BitFlags<FsFlag>> {
    DOS_TYPES.get(magic).ok_or(Error::UnknownFormat(magic))
}

/// 格式变体对应的魔数。国际字符集与目录缓存互斥时，前者优先。
pub fn dos_type(flags: BitFlags<FsFlag>) -> u32 {
    let multi = flags.contains(FsFlag::MultiUser);
    let ofs = flags.contains(FsFlag::Ofs);

    match (
        multi,
        ofs,
        flags.contains(FsFlag::Intl),
        flags.contains(FsFlag::DirCache),
    ) {
        (false, true, true, _) => FS_INTLOFS,
        (false, true, false, true) => FS_DCOFS,
        (false, true, false, false) => FS_OFS,
        (false, false, true, _) => FS_INTLFFS,
        (false, false, false, true) => FS_DCFFS,
        (false, false, false, false) => FS_FFS,
        (true, true, true, _) => MUFS_INTLOFS,
        (true, true, false, true) => MUFS_DCOFS,
        (true, true, false, false) => MUFS_OFS,
        (true, false, true, _) => MUFS_INTLFFS,
        (true, false, false, true) => MUFS_DCFFS,
        (true, false, false, false) => MUFS_FFS,
    }
}

/// 供汇报使用的变体描述，如"international dircache fast"
pub fn variant_name(flags: BitFlags<FsFlag>) -> String {
    let mut words = Vec::new();
    if flags.contains(FsFlag::Intl) {
        words.push("international");
    }
    if flags.contains(FsFlag::DirCache) {
        words.push("dircache");
    }
    if flags.contains(FsFlag::MultiUser) {
        words.push("multiuser");
    }
    words.push(if flags.contains(FsFlag::Ofs) {
        "old"
    } else {
        "fast"
    });
    words.join(" ")
}
