//! Amiga快速文件系统(FFS/OFS)的检查与格式化
//!
//! 卷的布局：
//!
//! 引导块(#0) | 保留区 | ... | 根块(卷的中部) | 位图块 ... | 其余数据

mod bitmap;
mod block;
mod check;
mod error;
mod geometry;
mod locate;
mod mkfs;
pub mod volume;
mod walk;

pub use self::{
    bitmap::{Bitmap, Discrepancy},
    block::{Block, BlockId, BlockStore},
    check::{CheckOptions, CheckReport, check, clear_bitmap_flag},
    error::{Error, Result},
    geometry::{BlockSize, Geometry},
    locate::{RootHint, detect_format, find_root},
    mkfs::{FormatOptions, format},
    walk::{Entry, EntryKind, Problem, ProblemKind, WalkReport, Walker},
};
