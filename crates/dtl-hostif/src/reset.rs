//! Board reset sequence.
//!
//! The order below is load-bearing. Several steps look redundant (the buffer words are zeroed
//! again thirty thousand times) but the board relies on the access pattern itself, so nothing
//! here may be coalesced or replaced with a sleep.

use crate::regs::{
    Bootp, Stat, HOST_IF_BUFSIZE, REG_BUF_800, REG_BUF_C00, RESET_SETTLE_ITERATIONS,
    STAT_RESET_IDLE, STAT_RESET_KEEP_MASK,
};
use crate::window::RegisterWindow;

/// Number of register accesses issued by [`reset`].
pub const RESET_ACCESS_COUNT: usize = 2 * HOST_IF_BUFSIZE + 3 * RESET_SETTLE_ITERATIONS + 4;

/// Drives the board through its power-on sequence and releases the target CPU.
///
/// No acknowledgement is checked; afterwards `BOOTP` reads back `RUN` and `STAT` reads
/// [`STAT_RESET_IDLE`] unless the target has already changed them.
pub fn reset<W: RegisterWindow + ?Sized>(win: &mut W) {
    tracing::debug!("resetting board");

    for i in 0..HOST_IF_BUFSIZE {
        win.write_u8(REG_BUF_800 + i, 0);
    }
    for i in 0..HOST_IF_BUFSIZE {
        win.write_u8(REG_BUF_C00 + i, 0);
    }

    for _ in 0..RESET_SETTLE_ITERATIONS {
        win.set_bootp(0);
        win.write_u32(REG_BUF_C00, 0);
        win.write_u32(REG_BUF_800, 0);
    }

    win.set_bootp(Bootp::RUN.bits());

    let stat = win.stat();
    win.set_stat((stat & STAT_RESET_KEEP_MASK) | Stat::IRQ_ACK.bits());

    win.set_stat(STAT_RESET_IDLE);

    tracing::debug!("board reset complete");
}
