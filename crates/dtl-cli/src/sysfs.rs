//! Linux PCI sysfs backend.
//!
//! Boards are found under `/sys/bus/pci/devices/<DDDD:BB:DD.F>/`. BAR0 is mapped through the
//! `resource0` file and interrupts are taken from an optional UIO node (see [`crate::uio`]).

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use dtl_hostif::regs::{PCI_DEVICE_ID_DTLH2500, PCI_VENDOR_ID_SONY, WINDOW_SIZE};
use dtl_hostif::{
    Attribute, BoardId, IrqHandle, MmioWindow, Platform, PlatformError, RegisterWindow,
};

use crate::uio::{IrqMonitor, UioIrq};

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/bus/pci/devices";

/// A shared, read/write mapping of a BAR resource file.
#[derive(Debug)]
pub struct MappedBar {
    base: NonNull<u8>,
    len: usize,
    _file: File,
}

// SAFETY: the mapping is process-wide; the pointer stays valid on any thread until `Drop`.
unsafe impl Send for MappedBar {}

impl MappedBar {
    /// Maps the first [`WINDOW_SIZE`] bytes of `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        if size < WINDOW_SIZE as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} is {size} bytes, expected at least {WINDOW_SIZE}",
                    path.display()
                ),
            ));
        }

        let len = WINDOW_SIZE;
        // SAFETY: fresh shared mapping of an fd we own; the kernel picks the address.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let base = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;

        Ok(Self {
            base,
            len,
            _file: file,
        })
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for MappedBar {
    fn drop(&mut self) {
        // SAFETY: `base`/`len` describe the mapping created in `open` and nothing else unmaps it.
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast(), self.len) };
        if rc != 0 {
            tracing::warn!("munmap failed: {}", io::Error::last_os_error());
        }
    }
}

/// Register window over a mapped BAR0.
#[derive(Debug)]
pub struct BarWindow {
    mmio: MmioWindow,
    bar: MappedBar,
}

impl BarWindow {
    pub fn open(path: &Path) -> io::Result<Self> {
        let bar = MappedBar::open(path)?;
        // SAFETY: `bar` maps WINDOW_SIZE bytes and is owned alongside `mmio`, so the mapping
        // outlives every access made through it.
        let mmio = unsafe { MmioWindow::new(bar.base) };
        Ok(Self { mmio, bar })
    }

    pub fn mapped_len(&self) -> usize {
        self.bar.len()
    }
}

impl RegisterWindow for BarWindow {
    fn read_u8(&mut self, offset: usize) -> u8 {
        self.mmio.read_u8(offset)
    }

    fn write_u8(&mut self, offset: usize, value: u8) {
        self.mmio.write_u8(offset, value)
    }

    fn read_u32(&mut self, offset: usize) -> u32 {
        self.mmio.read_u32(offset)
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.mmio.write_u32(offset, value)
    }
}

fn read_hex_id(path: &Path) -> io::Result<u16> {
    let text = fs::read_to_string(path)?;
    let text = text.trim();
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u16::from_str_radix(digits, 16).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: malformed id {text:?}", path.display()),
        )
    })
}

/// True if the sysfs device directory identifies a DTL-H2500.
pub fn is_dtlh2500(dir: &Path) -> bool {
    matches!(
        (read_hex_id(&dir.join("vendor")), read_hex_id(&dir.join("device"))),
        (Ok(PCI_VENDOR_ID_SONY), Ok(PCI_DEVICE_ID_DTLH2500))
    )
}

/// All DTL-H2500 boards under `root`, in address order.
pub fn discover(root: &Path) -> io::Result<Vec<BoardId>> {
    let mut boards = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let Ok(id) = name.parse::<BoardId>() else {
            continue;
        };
        if is_dtlh2500(&entry.path()) {
            boards.push(id);
        }
    }
    boards.sort();
    Ok(boards)
}

/// [`Platform`] backed by PCI sysfs and (optionally) a UIO interrupt node.
#[derive(Debug)]
pub struct SysfsPlatform {
    root: PathBuf,
    uio: Option<PathBuf>,
    published: Vec<(BoardId, Attribute)>,
    irq_monitors: HashMap<BoardId, IrqMonitor>,
}

impl SysfsPlatform {
    pub fn new(root: impl Into<PathBuf>, uio: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            uio,
            published: Vec::new(),
            irq_monitors: HashMap::new(),
        }
    }

    pub fn device_dir(&self, id: BoardId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Attributes currently published for `id`, in registration order.
    pub fn attributes(&self, id: BoardId) -> Vec<Attribute> {
        self.published
            .iter()
            .filter(|(board, _)| *board == id)
            .map(|(_, attr)| *attr)
            .collect()
    }

    /// Interrupt service progress for `id`, if a UIO node was configured.
    pub fn irq_monitor(&self, id: BoardId) -> Option<IrqMonitor> {
        self.irq_monitors.get(&id).cloned()
    }
}

impl Platform for SysfsPlatform {
    type Window = BarWindow;
    type IrqBinding = Option<UioIrq>;

    fn map_window(&mut self, id: BoardId) -> Result<BarWindow, PlatformError> {
        let dir = self.device_dir(id);
        if !is_dtlh2500(&dir) {
            return Err(PlatformError::MapFailed(format!(
                "{} is not a DTL-H2500 ({:04x}:{:04x})",
                dir.display(),
                PCI_VENDOR_ID_SONY,
                PCI_DEVICE_ID_DTLH2500
            )));
        }

        let resource = dir.join("resource0");
        let window = BarWindow::open(&resource).map_err(|err| {
            PlatformError::MapFailed(format!("{}: {err}", resource.display()))
        })?;
        tracing::debug!(board = %id, len = window.mapped_len(), "BAR0 mapped");
        Ok(window)
    }

    fn unmap_window(&mut self, id: BoardId, window: BarWindow) {
        drop(window);
        tracing::debug!(board = %id, "BAR0 unmapped");
    }

    fn request_irq(
        &mut self,
        id: BoardId,
        handle: IrqHandle<BarWindow>,
    ) -> Result<Option<UioIrq>, PlatformError> {
        let Some(path) = self.uio.clone() else {
            tracing::info!(board = %id, "no UIO node configured; interrupts will not be serviced");
            return Ok(None);
        };

        let irq = UioIrq::spawn(&path, handle).map_err(|err| {
            PlatformError::IrqRequestFailed(format!("{}: {err}", path.display()))
        })?;
        self.irq_monitors.insert(id, irq.monitor());
        Ok(Some(irq))
    }

    fn free_irq(&mut self, id: BoardId, binding: Option<UioIrq>) {
        self.irq_monitors.remove(&id);
        // Dropping the binding stops and joins the interrupt thread.
        drop(binding);
    }

    fn register_attribute(&mut self, id: BoardId, attr: Attribute) -> Result<(), PlatformError> {
        if self.published.contains(&(id, attr)) {
            return Err(PlatformError::AttributeRegistration {
                attr,
                reason: "already registered".to_string(),
            });
        }
        self.published.push((id, attr));
        Ok(())
    }

    fn unregister_attribute(&mut self, id: BoardId, attr: Attribute) {
        self.published.retain(|entry| *entry != (id, attr));
    }
}
