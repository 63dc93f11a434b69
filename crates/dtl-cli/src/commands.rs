use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use dtl_hostif::{
    AttrMode, Attribute, BoardId, BoardRegistry, BoardSession, RegisterWindow, HOST_IF_BUFSIZE,
};
use serde::Serialize;

use crate::config::{CliConfig, Command};
use crate::sysfs::{discover, BarWindow, SysfsPlatform};
use crate::uio::IrqMonitor;

const WATCH_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize)]
struct StatusReport {
    board: String,
    boot_mode: String,
    bootp: u8,
    stat: u8,
    dipsw: u8,
    ffe: u8,
    fff: u8,
    buffer_size: usize,
}

/// Runs one command. Data goes to `out`; diagnostics go through `tracing`.
pub fn run(config: &CliConfig, command: &Command, out: &mut dyn Write) -> Result<()> {
    if let Command::List = command {
        let boards = discover(&config.sysfs_root)
            .with_context(|| format!("scanning {}", config.sysfs_root.display()))?;
        if boards.is_empty() {
            tracing::warn!("no DTL-H2500 boards under {}", config.sysfs_root.display());
        }
        for id in boards {
            writeln!(out, "{id}")?;
        }
        return Ok(());
    }

    let id = resolve_device(config)?;
    let platform = SysfsPlatform::new(&config.sysfs_root, config.uio.clone());
    let mut registry = BoardRegistry::new(platform);
    // Only `reset` brings the board up; everything else works on the state left behind.
    let attached = match command {
        Command::Reset => registry.attach(id, config.board),
        _ => registry.attach_running(id, config.board),
    };
    attached.with_context(|| format!("attaching board {id}"))?;

    let result = run_attached(&registry, id, command, out);
    registry
        .detach(id)
        .with_context(|| format!("detaching board {id}"))?;
    result
}

fn resolve_device(config: &CliConfig) -> Result<BoardId> {
    if let Some(id) = config.device {
        return Ok(id);
    }
    let boards = discover(&config.sysfs_root)
        .with_context(|| format!("scanning {}", config.sysfs_root.display()))?;
    match boards.as_slice() {
        [id] => Ok(*id),
        [] => bail!(
            "no DTL-H2500 found under {}",
            config.sysfs_root.display()
        ),
        _ => bail!(
            "{} boards found, pick one with --device: {}",
            boards.len(),
            boards
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn run_attached(
    registry: &BoardRegistry<SysfsPlatform>,
    id: BoardId,
    command: &Command,
    out: &mut dyn Write,
) -> Result<()> {
    let session = registry
        .session(id)
        .ok_or_else(|| anyhow!("board {id} is not attached"))?;

    match command {
        Command::List => unreachable!("handled before attaching"),
        Command::Attrs => {
            for attr in registry.platform().attributes(id) {
                let mode = match attr.mode() {
                    AttrMode::ReadOnly => "r",
                    AttrMode::WriteOnly => "w",
                    AttrMode::ReadWrite => "rw",
                };
                writeln!(out, "{attr:<16} {mode:<2} {:o}", attr.mode().permissions())?;
            }
        }
        Command::Get { attr } => {
            let data = session.show(*attr)?;
            out.write_all(&data)?;
        }
        Command::Set { attr, value } => {
            if attr.is_binary() {
                bail!("{attr} holds raw bytes; use `write` instead");
            }
            session.store(*attr, value.as_bytes())?;
        }
        Command::Write { attr, input } => {
            if attr.channel().is_none() {
                bail!("{attr} is not a buffer attribute (expected eight or cee)");
            }
            let data = read_input(input)?;
            session.store(*attr, &data).with_context(|| {
                format!(
                    "{} is {} bytes, buffers take exactly {HOST_IF_BUFSIZE}",
                    input.display(),
                    data.len()
                )
            })?;
        }
        Command::Read { attr, output } => {
            if !attr.is_binary() {
                bail!("{attr} is a register; use `get` instead");
            }
            let data = session.show(*attr)?;
            write_output(output, &data, out)?;
        }
        Command::Reset => {
            writeln!(out, "{}", session.snapshot())?;
        }
        Command::Status { json } => {
            let report = status(session)?;
            if *json {
                serde_json::to_writer_pretty(&mut *out, &report)?;
                writeln!(out)?;
            } else {
                writeln!(out, "board      {}", report.board)?;
                writeln!(out, "boot mode  {}", report.boot_mode)?;
                writeln!(out, "bootp      0x{:02x}", report.bootp)?;
                writeln!(out, "stat       0x{:02x}", report.stat)?;
                writeln!(out, "dipsw      0x{:02x}", report.dipsw)?;
                writeln!(out, "ffe        0x{:02x}", report.ffe)?;
                writeln!(out, "fff        0x{:02x}", report.fff)?;
            }
        }
        Command::Watch { count } => {
            let monitor = registry
                .platform()
                .irq_monitor(id)
                .ok_or_else(|| anyhow!("watch needs an interrupt source; pass --uio"))?;
            watch(&monitor, session, *count, out)
                .with_context(|| format!("watching board {id}"))?;
        }
    }
    Ok(())
}

fn status(session: &BoardSession<BarWindow>) -> Result<StatusReport> {
    let snap = session.snapshot();
    Ok(StatusReport {
        board: session.id().to_string(),
        boot_mode: session.config().boot_mode.to_string(),
        bootp: snap.bootp,
        stat: snap.stat,
        dipsw: snap.dipsw,
        ffe: session.read_register(Attribute::Ffe)?,
        fff: session.read_register(Attribute::Fff)?,
        buffer_size: HOST_IF_BUFSIZE,
    })
}

fn watch<W: RegisterWindow>(
    monitor: &IrqMonitor,
    session: &BoardSession<W>,
    limit: Option<u64>,
    out: &mut dyn Write,
) -> Result<()> {
    let mut seen = 0;
    loop {
        // Liveness first: once the thread is gone its count is final.
        let running = monitor.is_running();
        let serviced = monitor.serviced();
        if serviced != seen {
            seen = serviced;
            writeln!(out, "irq #{seen}: {}", session.snapshot())?;
            out.flush()?;
        }
        if limit.is_some_and(|limit| seen >= limit) {
            return Ok(());
        }
        if !running {
            bail!(
                "interrupt thread for board {} exited after {seen} interrupt(s)",
                session.id()
            );
        }
        thread::sleep(WATCH_POLL);
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut data = Vec::new();
        io::stdin().lock().read_to_end(&mut data)?;
        return Ok(data);
    }
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn write_output(path: &Path, data: &[u8], out: &mut dyn Write) -> Result<()> {
    if path == Path::new("-") {
        out.write_all(data)?;
        return Ok(());
    }
    fs::write(path, data).with_context(|| format!("writing {}", path.display()))
}
