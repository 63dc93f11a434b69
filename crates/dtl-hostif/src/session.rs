//! Per-board session.
//!
//! A [`BoardSession`] owns the register window of one attached board for as long as the board is
//! attached. All access goes through a single lock: attribute reads/writes, buffer transfers,
//! resets and the interrupt handler each hold it for their whole register sequence, since both
//! transfers and the interrupt path read-modify-write `STAT`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::attr::{parse_register_value, parse_reset_trigger, Attribute};
use crate::error::{Error, Result};
use crate::irq::{service_interrupt, IrqOutcome, RegisterSnapshot};
use crate::registry::{BoardConfig, BoardId, BootMode};
use crate::regs::{Dipsw, HOST_IF_BUFSIZE};
use crate::reset::reset;
use crate::transfer::{read_buffer, transfer, Channel};
use crate::window::RegisterWindow;

#[derive(Debug)]
pub struct BoardSession<W> {
    id: BoardId,
    config: BoardConfig,
    window: Mutex<W>,
}

impl<W: RegisterWindow> BoardSession<W> {
    pub fn new(id: BoardId, config: BoardConfig, window: W) -> Self {
        Self {
            id,
            config,
            window: Mutex::new(window),
        }
    }

    pub fn id(&self) -> BoardId {
        self.id
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// Gives the window back, e.g. so the platform can unmap it.
    pub fn into_window(self) -> W {
        self.window
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // Poisoning is ignored: register sequences have no failure path to resume from.
    fn lock(&self) -> MutexGuard<'_, W> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with exclusive access to the window.
    pub fn with_window<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn supports(&self, attr: Attribute) -> bool {
        attr != Attribute::ZeroPage || self.config.zero_page
    }

    fn check_supported(&self, attr: Attribute) -> Result<()> {
        if self.supports(attr) {
            Ok(())
        } else {
            Err(Error::UnsupportedAttribute(attr))
        }
    }

    pub fn read_register(&self, attr: Attribute) -> Result<u8> {
        let offset = attr.register_offset().ok_or(Error::PermissionDenied(attr))?;
        Ok(self.lock().read_u8(offset))
    }

    pub fn write_register(&self, attr: Attribute, value: u8) -> Result<()> {
        let offset = attr.register_offset().ok_or(Error::PermissionDenied(attr))?;
        self.lock().write_u8(offset, value);
        Ok(())
    }

    pub fn transfer(&self, channel: Channel, data: &[u8]) -> Result<()> {
        transfer(&mut *self.lock(), channel, data)
    }

    pub fn read_buffer(&self, channel: Channel) -> [u8; HOST_IF_BUFSIZE] {
        read_buffer(&mut *self.lock(), channel)
    }

    pub fn reset(&self) {
        reset(&mut *self.lock());
    }

    /// Raw dump of the first [`HOST_IF_BUFSIZE`] bytes of the window.
    pub fn zero_page(&self) -> Result<[u8; HOST_IF_BUFSIZE]> {
        self.check_supported(Attribute::ZeroPage)?;
        let mut win = self.lock();
        let mut out = [0u8; HOST_IF_BUFSIZE];
        for (offset, byte) in out.iter_mut().enumerate() {
            *byte = win.read_u8(offset);
        }
        Ok(out)
    }

    pub fn snapshot(&self) -> RegisterSnapshot {
        RegisterSnapshot::capture(&mut *self.lock())
    }

    /// Services a board interrupt under the session lock.
    pub fn handle_irq(&self) -> IrqOutcome {
        service_interrupt(&mut *self.lock())
    }

    /// Programs the boot-mode switch in `DIPSW` from the session config.
    pub fn apply_boot_mode(&self) {
        let mut win = self.lock();
        let dipsw = Dipsw::from_bits_retain(win.dipsw());
        let dipsw = match self.config.boot_mode {
            BootMode::Eprom => dipsw | Dipsw::EPROM,
            BootMode::Flash => dipsw - Dipsw::EPROM,
        };
        win.set_dipsw(dipsw.bits());
        tracing::debug!(
            board = %self.id,
            mode = %self.config.boot_mode,
            dipsw = dipsw.bits(),
            "boot mode set"
        );
    }

    /// Renders an attribute the way a read of its file returns it.
    pub fn show(&self, attr: Attribute) -> Result<Vec<u8>> {
        self.check_supported(attr)?;
        if !attr.mode().readable() {
            return Err(Error::PermissionDenied(attr));
        }

        let out = match attr {
            Attribute::BufferA | Attribute::BufferB => {
                let channel = attr.channel().ok_or(Error::PermissionDenied(attr))?;
                self.read_buffer(channel).to_vec()
            }
            Attribute::ZeroPage => self.zero_page()?.to_vec(),
            Attribute::BufferSize => format!("{HOST_IF_BUFSIZE}\n").into_bytes(),
            _ => format!("{}\n", self.read_register(attr)?).into_bytes(),
        };
        Ok(out)
    }

    /// Applies a write to an attribute, returning the number of input bytes consumed.
    ///
    /// Input is validated completely before the board is touched.
    pub fn store(&self, attr: Attribute, input: &[u8]) -> Result<usize> {
        self.check_supported(attr)?;
        if !attr.mode().writable() {
            return Err(Error::PermissionDenied(attr));
        }

        match attr {
            Attribute::BufferA | Attribute::BufferB => {
                let channel = attr.channel().ok_or(Error::PermissionDenied(attr))?;
                self.transfer(channel, input)?;
            }
            Attribute::Reset => {
                parse_reset_trigger(input)?;
                tracing::info!(board = %self.id, "reset requested");
                self.reset();
            }
            _ => {
                let value = parse_register_value(attr, input)?;
                self.write_register(attr, value)?;
            }
        }
        Ok(input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{REG_DIPSW, REG_STAT};
    use crate::window::{RamWindow, RecordingWindow};

    fn session() -> BoardSession<RamWindow> {
        BoardSession::new(BoardId::new(0, 1, 0, 0), BoardConfig::default(), RamWindow::new())
    }

    #[test]
    fn numeric_attributes_render_with_newline() {
        let s = session();
        s.store(Attribute::Stat, b"160\n").unwrap();
        assert_eq!(s.show(Attribute::Stat).unwrap(), b"160\n");
        assert_eq!(s.show(Attribute::BufferSize).unwrap(), b"1020\n");
    }

    #[test]
    fn write_only_and_read_only_are_enforced() {
        let s = session();
        assert!(matches!(
            s.show(Attribute::Reset),
            Err(Error::PermissionDenied(Attribute::Reset))
        ));
        assert!(matches!(
            s.store(Attribute::BufferSize, b"1020"),
            Err(Error::PermissionDenied(Attribute::BufferSize))
        ));
        assert!(matches!(
            s.store(Attribute::ZeroPage, b"1"),
            Err(Error::PermissionDenied(Attribute::ZeroPage))
        ));
    }

    #[test]
    fn zero_page_disabled_by_config() {
        let s = BoardSession::new(
            BoardId::new(0, 1, 0, 0),
            BoardConfig {
                zero_page: false,
                ..BoardConfig::default()
            },
            RamWindow::new(),
        );
        assert!(matches!(
            s.show(Attribute::ZeroPage),
            Err(Error::UnsupportedAttribute(Attribute::ZeroPage))
        ));
    }

    #[test]
    fn zero_page_dumps_window_start() {
        let s = session();
        s.write_register(Attribute::Bootp, 1).unwrap();
        s.write_register(Attribute::Stat, 0xa0).unwrap();
        s.write_register(Attribute::Dipsw, 0x08).unwrap();
        let page = s.show(Attribute::ZeroPage).unwrap();
        assert_eq!(page.len(), HOST_IF_BUFSIZE);
        assert_eq!(&page[..4], &[1, 0xa0, 0x08, 0]);
    }

    #[test]
    fn rejected_store_leaves_window_untouched() {
        let s = BoardSession::new(
            BoardId::new(0, 1, 0, 0),
            BoardConfig::default(),
            RecordingWindow::new(RamWindow::new()),
        );
        for (attr, input) in [
            (Attribute::Stat, &b"256"[..]),
            (Attribute::Fff, &b"abc"[..]),
            (Attribute::Reset, &b"2"[..]),
            (Attribute::BufferA, &b"short"[..]),
            (Attribute::BufferB, &[0u8; HOST_IF_BUFSIZE + 1][..]),
        ] {
            let err = s.store(attr, input).unwrap_err();
            assert!(err.is_invalid_argument(), "{attr}: {err}");
        }
        s.with_window(|w| assert!(w.accesses().is_empty()));
    }

    #[test]
    fn boot_mode_toggles_only_the_eprom_bit() {
        let s = session();
        s.with_window(|w| w.write_u8(REG_DIPSW, 0x71));
        s.apply_boot_mode();
        assert_eq!(s.read_register(Attribute::Dipsw).unwrap(), 0x79);

        let flash = BoardSession::new(
            BoardId::new(0, 1, 0, 0),
            BoardConfig {
                boot_mode: BootMode::Flash,
                ..BoardConfig::default()
            },
            RamWindow::new(),
        );
        flash.with_window(|w| w.write_u8(REG_DIPSW, 0xff));
        flash.apply_boot_mode();
        assert_eq!(flash.read_register(Attribute::Dipsw).unwrap(), 0xf7);
    }

    #[test]
    fn store_reset_runs_sequence() {
        let s = session();
        assert_eq!(s.store(Attribute::Reset, b"1\n").unwrap(), 2);
        assert_eq!(s.read_register(Attribute::Bootp).unwrap(), 1);
        s.with_window(|w| assert_eq!(w.read_u8(REG_STAT), 0xa0));
    }
}
