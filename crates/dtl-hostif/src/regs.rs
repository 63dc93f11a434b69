//! DTL-H2500 BAR0 register layout.
//!
//! The board exposes a single 4 KiB memory BAR. Only a handful of offsets are
//! meaningful to the host:
//!
//! ```text
//! 0x000  BOOTP   u8   bit 0: RUN (target CPU released from reset)
//! 0x001  STAT    u8   bits 0..=3: interrupt cause, bit 2: IRQ ack, bits 5/7: channel B handshake
//! 0x002  DIPSW   u8   bit 3: EPROM boot mode
//! 0x800  BUF_800 1020 bytes, host interface buffer A ("eight")
//! 0xC00  BUF_C00 1020 bytes, host interface buffer B ("cee")
//! 0xFFE  FFE     u8   auxiliary control/status
//! 0xFFF  FFF     u8   doorbell, write 1 when a buffer has been filled
//! ```

use bitflags::bitflags;

pub const PCI_VENDOR_ID_SONY: u16 = 0x104d;
pub const PCI_DEVICE_ID_DTLH2500: u16 = 0x8004;

/// Size of the BAR0 register window in bytes.
pub const WINDOW_SIZE: usize = 0x1000;

/// Size of each host interface buffer. Transfers are always exactly this long.
pub const HOST_IF_BUFSIZE: usize = 0x3fc;

pub const REG_BOOTP: usize = 0x000;
pub const REG_STAT: usize = 0x001;
pub const REG_DIPSW: usize = 0x002;
pub const REG_BUF_800: usize = 0x800;
pub const REG_BUF_C00: usize = 0xc00;
pub const REG_FFE: usize = 0xffe;
pub const REG_FFF: usize = 0xfff;

/// Number of `BOOTP`/buffer-word write triples issued while holding the target in reset.
///
/// The board counts accesses, not time. This must stay a write loop.
pub const RESET_SETTLE_ITERATIONS: usize = 30_000;

/// Bits of `STAT` kept when channel B is armed.
pub const STAT_CHANNEL_B_PRECLEAR_MASK: u8 = 0xa0;
/// Bits of `STAT` kept while releasing the target from reset.
pub const STAT_RESET_KEEP_MASK: u8 = 0xf0;
/// Bits of `STAT` kept when an interrupt is acknowledged.
pub const STAT_IRQ_RETAIN_MASK: u8 = 0x0f;
/// Value `STAT` is left at once reset completes.
pub const STAT_RESET_IDLE: u8 = 0xa0;

/// Maximum number of boards tracked by a single registry.
pub const MAX_BOARDS: usize = 8;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Bootp: u8 {
        const RUN = 1 << 0;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Stat: u8 {
        const IRQ_ACK = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Dipsw: u8 {
        const EPROM = 1 << 3;
    }
}
