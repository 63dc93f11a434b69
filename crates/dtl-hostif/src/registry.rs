//! Board attach/detach lifecycle.
//!
//! The registry is the only owner of attached sessions. Platform glue (PCI enumeration, BAR
//! mapping, interrupt routing, attribute files) sits behind [`Platform`]; the registry drives it in
//! a fixed order and unwinds in reverse when a step fails.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use crate::attr::Attribute;
use crate::error::{Error, PlatformError, Result};
use crate::irq::IrqReturn;
use crate::regs::MAX_BOARDS;
use crate::session::BoardSession;
use crate::window::RegisterWindow;

/// PCI location of a board, in sysfs `DDDD:BB:DD.F` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoardId {
    pub domain: u16,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl BoardId {
    /// The caller is responsible for `device < 32` and `function < 8`.
    pub const fn new(domain: u16, bus: u8, device: u8, function: u8) -> Self {
        Self {
            domain,
            bus,
            device,
            function,
        }
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

impl FromStr for BoardId {
    type Err = Error;

    /// Accepts `DDDD:BB:DD.F` or the short `BB:DD.F` form (domain 0).
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidBoardId(s.to_string());

        let (head, function) = s.rsplit_once('.').ok_or_else(invalid)?;
        let mut parts = head.split(':').collect::<Vec<_>>();
        let domain = match parts.len() {
            3 => parts.remove(0),
            2 => "0",
            _ => return Err(invalid()),
        };

        let domain = u16::from_str_radix(domain, 16).map_err(|_| invalid())?;
        let bus = u8::from_str_radix(parts[0], 16).map_err(|_| invalid())?;
        let device = u8::from_str_radix(parts[1], 16).map_err(|_| invalid())?;
        let function = u8::from_str_radix(function, 16).map_err(|_| invalid())?;
        if device >= 32 || function >= 8 {
            return Err(invalid());
        }
        Ok(Self::new(domain, bus, device, function))
    }
}

/// Boot source selected through `DIPSW` bit 3 at attach time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BootMode {
    #[default]
    Eprom,
    Flash,
}

impl FromStr for BootMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eprom" => Ok(BootMode::Eprom),
            "flash" => Ok(BootMode::Flash),
            other => Err(format!("unknown boot mode {other:?} (expected eprom or flash)")),
        }
    }
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BootMode::Eprom => "eprom",
            BootMode::Flash => "flash",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoardConfig {
    pub boot_mode: BootMode,
    /// Expose the read-only `zeropage` diagnostic attribute.
    pub zero_page: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            boot_mode: BootMode::Eprom,
            zero_page: true,
        }
    }
}

/// Handle the platform invokes when a board raises its interrupt line.
///
/// The handle does not keep the session alive. Once a board is detached, [`IrqHandle::fire`]
/// reports [`IrqReturn::None`] without touching any registers.
pub struct IrqHandle<W> {
    id: BoardId,
    session: Weak<BoardSession<W>>,
}

impl<W> Clone for IrqHandle<W> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            session: self.session.clone(),
        }
    }
}

impl<W> fmt::Debug for IrqHandle<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqHandle").field("id", &self.id).finish()
    }
}

impl<W: RegisterWindow> IrqHandle<W> {
    pub fn new(session: &Arc<BoardSession<W>>) -> Self {
        Self {
            id: session.id(),
            session: Arc::downgrade(session),
        }
    }

    pub fn id(&self) -> BoardId {
        self.id
    }

    pub fn fire(&self) -> IrqReturn {
        match self.session.upgrade() {
            Some(session) => session.handle_irq().ret,
            None => IrqReturn::None,
        }
    }
}

/// Resources the host environment provides for a board.
///
/// `free_irq` must not return while the handler may still be running, matching the usual
/// interrupt-controller contract; detach relies on this to reclaim the window.
pub trait Platform {
    type Window: RegisterWindow;
    type IrqBinding;

    fn map_window(&mut self, id: BoardId) -> std::result::Result<Self::Window, PlatformError>;
    fn unmap_window(&mut self, id: BoardId, window: Self::Window);

    fn request_irq(
        &mut self,
        id: BoardId,
        handle: IrqHandle<Self::Window>,
    ) -> std::result::Result<Self::IrqBinding, PlatformError>;
    fn free_irq(&mut self, id: BoardId, binding: Self::IrqBinding);

    fn register_attribute(
        &mut self,
        id: BoardId,
        attr: Attribute,
    ) -> std::result::Result<(), PlatformError>;
    fn unregister_attribute(&mut self, id: BoardId, attr: Attribute);
}

struct AttachedBoard<P: Platform> {
    session: Arc<BoardSession<P::Window>>,
    // `None` once released by a detach that could not reclaim the window.
    irq: Option<P::IrqBinding>,
    attrs: Vec<Attribute>,
}

/// All boards currently attached through one platform.
pub struct BoardRegistry<P: Platform> {
    platform: P,
    boards: HashMap<BoardId, AttachedBoard<P>>,
    limit: usize,
}

impl<P: Platform> BoardRegistry<P> {
    pub fn new(platform: P) -> Self {
        Self::with_limit(platform, MAX_BOARDS)
    }

    pub fn with_limit(platform: P, limit: usize) -> Self {
        Self {
            platform,
            boards: HashMap::new(),
            limit,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    pub fn contains(&self, id: BoardId) -> bool {
        self.boards.contains_key(&id)
    }

    /// Attached board ids in ascending order.
    pub fn ids(&self) -> Vec<BoardId> {
        let mut ids: Vec<_> = self.boards.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn session(&self, id: BoardId) -> Option<&BoardSession<P::Window>> {
        self.boards.get(&id).map(|board| &*board.session)
    }

    /// Brings a board up: map BAR0, hook the interrupt, program the boot mode, reset the target
    /// and finally publish the attribute surface.
    pub fn attach(&mut self, id: BoardId, config: BoardConfig) -> Result<&BoardSession<P::Window>> {
        self.attach_with(id, config, true)
    }

    /// Like [`BoardRegistry::attach`] but leaves the board as found: no `DIPSW` write and no
    /// reset, so buffer and register contents from earlier sessions stay readable.
    pub fn attach_running(
        &mut self,
        id: BoardId,
        config: BoardConfig,
    ) -> Result<&BoardSession<P::Window>> {
        self.attach_with(id, config, false)
    }

    fn attach_with(
        &mut self,
        id: BoardId,
        config: BoardConfig,
        bring_up: bool,
    ) -> Result<&BoardSession<P::Window>> {
        if self.boards.contains_key(&id) {
            return Err(Error::AlreadyAttached(id));
        }
        if self.boards.len() >= self.limit {
            return Err(Error::TooManyBoards { limit: self.limit });
        }

        tracing::info!(board = %id, bring_up, "attaching board");

        let window = self
            .platform
            .map_window(id)
            .map_err(|source| Error::Platform { id, source })?;
        let session = Arc::new(BoardSession::new(id, config, window));

        let irq = match self.platform.request_irq(id, IrqHandle::new(&session)) {
            Ok(irq) => irq,
            Err(source) => {
                tracing::warn!(board = %id, "failed requesting IRQ: {source}");
                self.release_or_leak(id, session);
                return Err(Error::Platform { id, source });
            }
        };

        if bring_up {
            session.apply_boot_mode();
            session.reset();

            let snap = session.snapshot();
            tracing::info!(
                board = %id,
                bootp = snap.bootp,
                stat = snap.stat,
                dipsw = snap.dipsw,
                "board reset"
            );
        }

        let surface = Attribute::surface(&config);
        let mut attrs = Vec::with_capacity(surface.len());
        for attr in surface {
            if let Err(source) = self.platform.register_attribute(id, attr) {
                tracing::warn!(board = %id, %attr, "failed registering attribute: {source}");
                for registered in attrs.iter().rev() {
                    self.platform.unregister_attribute(id, *registered);
                }
                self.platform.free_irq(id, irq);
                self.release_or_leak(id, session);
                return Err(Error::Platform { id, source });
            }
            attrs.push(attr);
        }

        let board = self.boards.entry(id).or_insert(AttachedBoard {
            session,
            irq: Some(irq),
            attrs,
        });
        Ok(&*board.session)
    }

    /// Tears a board down in the reverse order of [`BoardRegistry::attach`].
    ///
    /// If the window cannot be reclaimed because the session is still referenced (a platform
    /// returned from `free_irq` with its handler still running), this fails with
    /// [`Error::SessionBusy`]. Attributes and the interrupt are already released at that point;
    /// the board stays registered so a later `detach` can unmap the window.
    pub fn detach(&mut self, id: BoardId) -> Result<()> {
        let mut board = self.boards.remove(&id).ok_or(Error::NotAttached(id))?;
        tracing::info!(board = %id, "detaching board");

        for attr in board.attrs.drain(..) {
            self.platform.unregister_attribute(id, attr);
        }
        if let Some(irq) = board.irq.take() {
            self.platform.free_irq(id, irq);
        }

        match Arc::try_unwrap(board.session) {
            Ok(session) => {
                self.platform.unmap_window(id, session.into_window());
                Ok(())
            }
            Err(session) => {
                tracing::warn!(board = %id, "session still referenced, BAR0 left mapped");
                board.session = session;
                self.boards.insert(id, board);
                Err(Error::SessionBusy(id))
            }
        }
    }

    /// Detaches every board, continuing past failures.
    pub fn detach_all(&mut self) -> Vec<(BoardId, Error)> {
        let mut failures = Vec::new();
        for id in self.ids() {
            if let Err(err) = self.detach(id) {
                failures.push((id, err));
            }
        }
        failures
    }

    /// Hands the window of a half-attached board back to the platform.
    fn release_or_leak(&mut self, id: BoardId, session: Arc<BoardSession<P::Window>>) {
        match Arc::try_unwrap(session) {
            Ok(session) => self.platform.unmap_window(id, session.into_window()),
            Err(_) => tracing::error!(board = %id, "session still referenced, BAR0 left mapped"),
        }
    }
}

impl<P: Platform> Drop for BoardRegistry<P> {
    fn drop(&mut self) {
        for (id, err) in self.detach_all() {
            tracing::error!(board = %id, "detach failed: {err}");
        }
    }
}
