//! Register window access.
//!
//! Every protocol sequence in this crate is expressed against [`RegisterWindow`]. The board
//! latches state on each individual access, so implementations must perform exactly one device
//! access per call, in program order, without caching, merging or eliding anything.

use core::ptr::{self, NonNull};
use core::sync::atomic::{fence, Ordering};

use crate::regs::{REG_BOOTP, REG_DIPSW, REG_FFE, REG_FFF, REG_STAT, WINDOW_SIZE};

/// Byte-addressed view of the board's BAR0.
///
/// Reads take `&mut self`: on real hardware a read can have side effects.
pub trait RegisterWindow {
    fn read_u8(&mut self, offset: usize) -> u8;
    fn write_u8(&mut self, offset: usize, value: u8);
    fn read_u32(&mut self, offset: usize) -> u32;
    fn write_u32(&mut self, offset: usize, value: u32);

    fn bootp(&mut self) -> u8 {
        self.read_u8(REG_BOOTP)
    }

    fn set_bootp(&mut self, value: u8) {
        self.write_u8(REG_BOOTP, value);
    }

    fn stat(&mut self) -> u8 {
        self.read_u8(REG_STAT)
    }

    fn set_stat(&mut self, value: u8) {
        self.write_u8(REG_STAT, value);
    }

    fn dipsw(&mut self) -> u8 {
        self.read_u8(REG_DIPSW)
    }

    fn set_dipsw(&mut self, value: u8) {
        self.write_u8(REG_DIPSW, value);
    }

    fn ffe(&mut self) -> u8 {
        self.read_u8(REG_FFE)
    }

    fn set_ffe(&mut self, value: u8) {
        self.write_u8(REG_FFE, value);
    }

    fn fff(&mut self) -> u8 {
        self.read_u8(REG_FFF)
    }

    fn set_fff(&mut self, value: u8) {
        self.write_u8(REG_FFF, value);
    }
}

impl<W: RegisterWindow + ?Sized> RegisterWindow for &mut W {
    fn read_u8(&mut self, offset: usize) -> u8 {
        (**self).read_u8(offset)
    }

    fn write_u8(&mut self, offset: usize, value: u8) {
        (**self).write_u8(offset, value)
    }

    fn read_u32(&mut self, offset: usize) -> u32 {
        (**self).read_u32(offset)
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        (**self).write_u32(offset, value)
    }
}

impl<W: RegisterWindow + ?Sized> RegisterWindow for Box<W> {
    fn read_u8(&mut self, offset: usize) -> u8 {
        (**self).read_u8(offset)
    }

    fn write_u8(&mut self, offset: usize, value: u8) {
        (**self).write_u8(offset, value)
    }

    fn read_u32(&mut self, offset: usize) -> u32 {
        (**self).read_u32(offset)
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        (**self).write_u32(offset, value)
    }
}

fn check_u32_offset(offset: usize) {
    assert!(
        offset % 4 == 0 && offset + 4 <= WINDOW_SIZE,
        "32-bit register access at {offset:#x} is outside the window or unaligned"
    );
}

/// Register window backed by a live memory-mapped BAR.
///
/// Each access is a single volatile load/store of the exact width, followed by a full fence so
/// neither the compiler nor the CPU can move later device accesses ahead of it. 32-bit accesses
/// are little-endian, matching PCI byte order.
#[derive(Debug)]
pub struct MmioWindow {
    base: NonNull<u8>,
}

// SAFETY: the window is a plain device mapping; moving the handle to another thread does not
// change what it points at. Exclusive access is enforced by `&mut self` (and by the session lock).
unsafe impl Send for MmioWindow {}

impl MmioWindow {
    /// Wraps an already-mapped BAR.
    ///
    /// # Safety
    ///
    /// `base` must point at a device (or otherwise uncached) mapping of at least
    /// [`WINDOW_SIZE`] bytes that stays valid for the lifetime of the returned value, and no
    /// other code may access that mapping while it is wrapped.
    pub unsafe fn new(base: NonNull<u8>) -> Self {
        Self { base }
    }
}

impl RegisterWindow for MmioWindow {
    fn read_u8(&mut self, offset: usize) -> u8 {
        assert!(offset < WINDOW_SIZE, "register offset {offset:#x} outside window");
        // SAFETY: `offset` is inside the mapping guaranteed by `MmioWindow::new`.
        let value = unsafe { ptr::read_volatile(self.base.as_ptr().add(offset)) };
        fence(Ordering::SeqCst);
        value
    }

    fn write_u8(&mut self, offset: usize, value: u8) {
        assert!(offset < WINDOW_SIZE, "register offset {offset:#x} outside window");
        // SAFETY: `offset` is inside the mapping guaranteed by `MmioWindow::new`.
        unsafe { ptr::write_volatile(self.base.as_ptr().add(offset), value) };
        fence(Ordering::SeqCst);
    }

    fn read_u32(&mut self, offset: usize) -> u32 {
        check_u32_offset(offset);
        // SAFETY: aligned and in bounds (checked above); BAR mappings are page aligned.
        let value = unsafe { ptr::read_volatile(self.base.as_ptr().add(offset).cast::<u32>()) };
        fence(Ordering::SeqCst);
        u32::from_le(value)
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        check_u32_offset(offset);
        // SAFETY: aligned and in bounds (checked above); BAR mappings are page aligned.
        unsafe {
            ptr::write_volatile(
                self.base.as_ptr().add(offset).cast::<u32>(),
                value.to_le(),
            )
        };
        fence(Ordering::SeqCst);
    }
}

/// Register window backed by plain host memory.
///
/// Reads return whatever was last written, which makes it a stand-in for a board whose target
/// CPU never touches the shared window.
#[derive(Clone)]
pub struct RamWindow {
    bytes: Box<[u8; WINDOW_SIZE]>,
}

impl RamWindow {
    pub fn new() -> Self {
        Self {
            bytes: Box::new([0u8; WINDOW_SIZE]),
        }
    }

    pub fn bytes(&self) -> &[u8; WINDOW_SIZE] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; WINDOW_SIZE] {
        &mut self.bytes
    }
}

impl Default for RamWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for RamWindow {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RamWindow")
            .field("bootp", &self.bytes[REG_BOOTP])
            .field("stat", &self.bytes[REG_STAT])
            .field("dipsw", &self.bytes[REG_DIPSW])
            .finish_non_exhaustive()
    }
}

impl RegisterWindow for RamWindow {
    fn read_u8(&mut self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    fn write_u8(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = value;
    }

    fn read_u32(&mut self, offset: usize) -> u32 {
        check_u32_offset(offset);
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[offset..offset + 4]);
        u32::from_le_bytes(word)
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        check_u32_offset(offset);
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// A single register access as observed on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read8 { offset: usize, value: u8 },
    Write8 { offset: usize, value: u8 },
    Read32 { offset: usize, value: u32 },
    Write32 { offset: usize, value: u32 },
}

impl Access {
    pub fn offset(&self) -> usize {
        match *self {
            Access::Read8 { offset, .. }
            | Access::Write8 { offset, .. }
            | Access::Read32 { offset, .. }
            | Access::Write32 { offset, .. } => offset,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Access::Write8 { .. } | Access::Write32 { .. })
    }
}

/// Wraps another window and logs every access in order.
#[derive(Debug, Default)]
pub struct RecordingWindow<W> {
    inner: W,
    log: Vec<Access>,
}

impl<W: RegisterWindow> RecordingWindow<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            log: Vec::new(),
        }
    }

    pub fn accesses(&self) -> &[Access] {
        &self.log
    }

    pub fn take_accesses(&mut self) -> Vec<Access> {
        std::mem::take(&mut self.log)
    }
}

impl<W: RegisterWindow> RegisterWindow for RecordingWindow<W> {
    fn read_u8(&mut self, offset: usize) -> u8 {
        let value = self.inner.read_u8(offset);
        self.log.push(Access::Read8 { offset, value });
        value
    }

    fn write_u8(&mut self, offset: usize, value: u8) {
        self.inner.write_u8(offset, value);
        self.log.push(Access::Write8 { offset, value });
    }

    fn read_u32(&mut self, offset: usize) -> u32 {
        let value = self.inner.read_u32(offset);
        self.log.push(Access::Read32 { offset, value });
        value
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.inner.write_u32(offset, value);
        self.log.push(Access::Write32 { offset, value });
    }
}
