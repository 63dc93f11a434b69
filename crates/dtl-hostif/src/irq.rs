//! Interrupt service.
//!
//! The board raises its INTx line when the target has consumed a buffer or wants attention. The
//! handler logs the control registers, drops the high nibble of `STAT` and is done; it never
//! defers work and never allocates.

use core::fmt;

use crate::regs::STAT_IRQ_RETAIN_MASK;
use crate::window::RegisterWindow;

/// Result reported back to whatever dispatched the interrupt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqReturn {
    /// The board's condition was serviced.
    Handled,
    /// Nothing was serviced (the board is no longer attached).
    None,
}

/// The three control registers, captured for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegisterSnapshot {
    pub bootp: u8,
    pub stat: u8,
    pub dipsw: u8,
}

impl RegisterSnapshot {
    pub fn capture<W: RegisterWindow + ?Sized>(win: &mut W) -> Self {
        Self {
            bootp: win.bootp(),
            stat: win.stat(),
            dipsw: win.dipsw(),
        }
    }
}

impl fmt::Display for RegisterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[0]={:02x}h, [1]={:02x}h, [2]={:02x}h",
            self.bootp, self.stat, self.dipsw
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IrqOutcome {
    pub before: RegisterSnapshot,
    pub after: RegisterSnapshot,
    pub ret: IrqReturn,
}

/// Services one board interrupt.
pub fn service_interrupt<W: RegisterWindow + ?Sized>(win: &mut W) -> IrqOutcome {
    let before = RegisterSnapshot::capture(win);
    tracing::debug!("interrupt, {before}");

    let stat = win.stat();
    win.set_stat(stat & STAT_IRQ_RETAIN_MASK);

    let after = RegisterSnapshot::capture(win);
    tracing::debug!("handled, {after}");

    IrqOutcome {
        before,
        after,
        ret: IrqReturn::Handled,
    }
}
