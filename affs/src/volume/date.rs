use core::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Block;

/// 1978-01-01与1970-01-01相差的秒数
const EPOCH_OFFSET: u64 = (8 * 365 + 2) * SECS_PER_DAY;
const SECS_PER_DAY: u64 = 24 * 60 * 60;
pub const TICKS_PER_SECOND: u32 = 50;

/// 卷上的时间戳：自1978-01-01起的(天, 分, 刻)，一秒为50刻。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AmigaDate {
    pub days: u32,
    pub mins: u32,
    pub ticks: u32,
}

impl AmigaDate {
    /// 早于纪元的时刻一律记为0
    pub fn from_system_time(time: SystemTime) -> Self {
        let Some(secs) = time
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|d| d.as_secs().checked_sub(EPOCH_OFFSET))
            .filter(|&secs| secs > 0)
        else {
            return Self::default();
        };

        let days = secs / SECS_PER_DAY;
        let rest = secs % SECS_PER_DAY;
        Self {
            days: days as u32,
            mins: (rest / 60) as u32,
            ticks: (rest % 60) as u32 * TICKS_PER_SECOND,
        }
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// 从倒数第`back`个字开始读出三个字
    pub fn read(block: &Block, back: usize) -> Self {
        Self {
            days: block.tail_word(back),
            mins: block.tail_word(back - 1),
            ticks: block.tail_word(back - 2),
        }
    }

    pub fn write(self, block: &mut Block, back: usize) {
        block.set_tail_word(back, self.days);
        block.set_tail_word(back - 1, self.mins);
        block.set_tail_word(back - 2, self.ticks);
    }
}

impl fmt::Display for AmigaDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "day {} {:02}:{:02}:{:02}",
            self.days,
            self.mins / 60,
            self.mins % 60,
            self.ticks / TICKS_PER_SECOND
        )
    }
}
