//! Interrupt delivery through a Linux UIO node.
//!
//! With the board bound to `uio_pci_generic`, `/dev/uioN` reports interrupts as a 4-byte event
//! counter per `read`. The line stays masked after each event until `1u32` is written back.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use dtl_hostif::{IrqHandle, IrqReturn, RegisterWindow};

/// How long the service thread blocks before rechecking its stop flag.
const POLL_INTERVAL_MS: libc::c_int = 100;

/// Shared view of a service thread's progress.
#[derive(Clone, Debug)]
pub struct IrqMonitor {
    pub(crate) serviced: Arc<AtomicU64>,
    pub(crate) running: Arc<AtomicBool>,
}

impl IrqMonitor {
    pub(crate) fn new() -> Self {
        Self {
            serviced: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Number of interrupts serviced so far.
    pub fn serviced(&self) -> u64 {
        self.serviced.load(Ordering::Acquire)
    }

    /// False once the service thread has exited, for whatever reason.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

struct ClearOnExit(Arc<AtomicBool>);

impl Drop for ClearOnExit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A running interrupt service thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct UioIrq {
    stop: Arc<AtomicBool>,
    monitor: IrqMonitor,
    thread: Option<JoinHandle<()>>,
}

impl UioIrq {
    pub fn spawn<W>(path: &Path, handle: IrqHandle<W>) -> io::Result<Self>
    where
        W: RegisterWindow + Send + 'static,
    {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::with_file(file, handle)
    }

    /// Services interrupts read from an already-open UIO descriptor.
    pub fn with_file<W>(file: File, handle: IrqHandle<W>) -> io::Result<Self>
    where
        W: RegisterWindow + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let monitor = IrqMonitor::new();

        let thread = {
            let stop = Arc::clone(&stop);
            let monitor = monitor.clone();
            let id = handle.id();
            thread::Builder::new()
                .name(format!("dtl-irq-{id}"))
                .spawn(move || {
                    let _exit = ClearOnExit(Arc::clone(&monitor.running));
                    if let Err(err) = service_loop(file, &handle, &stop, &monitor.serviced) {
                        tracing::error!(board = %id, "interrupt thread stopped: {err}");
                    }
                })?
        };

        Ok(Self {
            stop,
            monitor,
            thread: Some(thread),
        })
    }

    pub fn monitor(&self) -> IrqMonitor {
        self.monitor.clone()
    }
}

impl Drop for UioIrq {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("interrupt thread panicked");
            }
        }
    }
}

fn unmask(file: &mut File) -> io::Result<()> {
    file.write_all(&1u32.to_ne_bytes())
}

fn wait_readable(file: &File) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pfd` is a single valid pollfd for the duration of the call.
    let rc = unsafe { libc::poll(&mut pfd, 1, POLL_INTERVAL_MS) };
    match rc {
        0 => Ok(false),
        n if n > 0 => Ok(true),
        _ => {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                Ok(false)
            } else {
                Err(err)
            }
        }
    }
}

fn service_loop<W: RegisterWindow>(
    mut file: File,
    handle: &IrqHandle<W>,
    stop: &AtomicBool,
    serviced: &AtomicU64,
) -> io::Result<()> {
    unmask(&mut file)?;

    let mut events = [0u8; 4];
    while !stop.load(Ordering::Acquire) {
        if !wait_readable(&file)? {
            continue;
        }
        file.read_exact(&mut events)?;

        let ret = handle.fire();
        serviced.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(
            board = %handle.id(),
            events = u32::from_ne_bytes(events),
            ?ret,
            "uio interrupt"
        );
        if ret == IrqReturn::None {
            break;
        }
        unmask(&mut file)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixStream;
    use std::time::{Duration, Instant};

    use dtl_hostif::{Attribute, BoardConfig, BoardId, BoardSession, RamWindow};

    /// Socket pair standing in for `/dev/uioN`: the test end plays the kernel.
    fn uio_pair() -> (UnixStream, File) {
        let (kernel, driver) = UnixStream::pair().unwrap();
        kernel
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        (kernel, File::from(OwnedFd::from(driver)))
    }

    fn session() -> Arc<BoardSession<RamWindow>> {
        Arc::new(BoardSession::new(
            BoardId::new(0, 1, 0, 0),
            BoardConfig::default(),
            RamWindow::new(),
        ))
    }

    fn read_word(kernel: &mut UnixStream) -> u32 {
        let mut word = [0u8; 4];
        kernel.read_exact(&mut word).unwrap();
        u32::from_ne_bytes(word)
    }

    fn raise(kernel: &mut UnixStream, count: u32) {
        kernel.write_all(&count.to_ne_bytes()).unwrap();
    }

    fn wait_stopped(monitor: &IrqMonitor) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while monitor.is_running() {
            assert!(Instant::now() < deadline, "interrupt thread did not exit");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn acknowledges_and_unmasks_each_interrupt() {
        let (mut kernel, driver) = uio_pair();
        let session = session();
        session.write_register(Attribute::Stat, 0xa5).unwrap();

        let irq = UioIrq::with_file(driver, IrqHandle::new(&session)).unwrap();
        let monitor = irq.monitor();
        assert_eq!(read_word(&mut kernel), 1, "line unmasked before the first wait");

        raise(&mut kernel, 1);
        assert_eq!(read_word(&mut kernel), 1, "line unmasked after servicing");
        assert_eq!(monitor.serviced(), 1);
        assert_eq!(session.read_register(Attribute::Stat).unwrap(), 0x05);

        session.write_register(Attribute::Stat, 0xf3).unwrap();
        raise(&mut kernel, 2);
        assert_eq!(read_word(&mut kernel), 1);
        assert_eq!(monitor.serviced(), 2);
        assert_eq!(session.read_register(Attribute::Stat).unwrap(), 0x03);
        assert!(monitor.is_running());

        drop(irq);
        assert!(!monitor.is_running());
    }

    #[test]
    fn exits_once_the_session_is_gone() {
        let (mut kernel, driver) = uio_pair();
        let session = session();

        let irq = UioIrq::with_file(driver, IrqHandle::new(&session)).unwrap();
        let monitor = irq.monitor();
        assert_eq!(read_word(&mut kernel), 1);

        drop(session);
        raise(&mut kernel, 1);

        // No re-unmask: the thread closes its end instead.
        let mut rest = Vec::new();
        kernel.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
        wait_stopped(&monitor);
        assert_eq!(monitor.serviced(), 1);
    }

    #[test]
    fn stop_flag_ends_an_idle_loop() {
        let (mut kernel, driver) = uio_pair();
        let session = session();

        let irq = UioIrq::with_file(driver, IrqHandle::new(&session)).unwrap();
        let monitor = irq.monitor();
        assert_eq!(read_word(&mut kernel), 1);

        let started = Instant::now();
        drop(irq);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!monitor.is_running());
        assert_eq!(monitor.serviced(), 0);
    }

    #[test]
    fn dead_descriptor_marks_thread_stopped() {
        let (kernel, driver) = uio_pair();
        let session = session();

        let irq = UioIrq::with_file(driver, IrqHandle::new(&session)).unwrap();
        let monitor = irq.monitor();
        drop(kernel);

        wait_stopped(&monitor);
        assert_eq!(monitor.serviced(), 0);
        drop(irq);
    }
}
