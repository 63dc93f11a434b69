//! Host interface for the DTL-H2500 PlayStation development board.
//!
//! The board is a PCI card exposing a 4 KiB register window (BAR0). The host talks to the
//! target CPU through two 1020-byte buffers and a handful of byte registers; this crate
//! implements that handshake:
//!
//! - [`window`]: ordered, single-access register I/O ([`RegisterWindow`]).
//! - [`transfer`]: filling a buffer and ringing the doorbell.
//! - [`reset`]: the power-on sequence that releases the target.
//! - [`irq`]: acknowledging the board interrupt.
//! - [`session`] / [`registry`]: per-board ownership, locking and the attach/detach lifecycle.
//!
//! None of the register sequences can fail. Errors are limited to rejected input and platform
//! resource failures while attaching a board.

pub mod attr;
pub mod error;
pub mod irq;
pub mod registry;
pub mod regs;
pub mod reset;
pub mod session;
pub mod transfer;
pub mod window;

pub use attr::{AttrMode, Attribute};
pub use error::{Error, PlatformError, Result};
pub use irq::{service_interrupt, IrqOutcome, IrqReturn, RegisterSnapshot};
pub use registry::{BoardConfig, BoardId, BoardRegistry, BootMode, IrqHandle, Platform};
pub use regs::HOST_IF_BUFSIZE;
pub use reset::reset;
pub use session::BoardSession;
pub use transfer::{read_buffer, transfer, Channel};
pub use window::{Access, MmioWindow, RamWindow, RecordingWindow, RegisterWindow};
