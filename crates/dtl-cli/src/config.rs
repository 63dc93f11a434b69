use std::env;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dtl_hostif::{Attribute, BoardConfig, BoardId, BootMode};

use crate::sysfs::DEFAULT_SYSFS_ROOT;

#[derive(Debug, Parser)]
#[command(
    name = "dtlh2500",
    version,
    about = "Host-side control for the DTL-H2500 PlayStation development board"
)]
pub struct Args {
    /// PCI address of the board (`DDDD:BB:DD.F`).
    ///
    /// Defaults to the only DTL-H2500 found under the sysfs root.
    ///
    /// Environment variable: `DTLH2500_DEVICE`.
    #[arg(long, env = "DTLH2500_DEVICE")]
    pub device: Option<BoardId>,

    /// Directory holding PCI device entries.
    ///
    /// Environment variable: `DTLH2500_SYSFS_ROOT`.
    #[arg(long, env = "DTLH2500_SYSFS_ROOT", default_value = DEFAULT_SYSFS_ROOT)]
    pub sysfs_root: PathBuf,

    /// Boot source programmed into DIPSW by `reset` (`eprom` or `flash`).
    ///
    /// Environment variable: `DTLH2500_BOOT_MODE`.
    #[arg(long, env = "DTLH2500_BOOT_MODE", default_value_t = BootMode::Eprom)]
    pub boot_mode: BootMode,

    /// Do not expose the `zeropage` diagnostic attribute.
    #[arg(long)]
    pub no_zero_page: bool,

    /// UIO node delivering the board's interrupts (e.g. `/dev/uio0`).
    ///
    /// Environment variable: `DTLH2500_UIO`.
    #[arg(long, env = "DTLH2500_UIO", global = true)]
    pub uio: Option<PathBuf>,

    /// Log filter (tracing-subscriber EnvFilter syntax). Falls back to `RUST_LOG`, then `info`.
    ///
    /// Environment variable: `DTLH2500_LOG`.
    #[arg(long, env = "DTLH2500_LOG")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List DTL-H2500 boards found under the sysfs root.
    List,
    /// List the attributes the board exposes.
    Attrs,
    /// Print an attribute. Buffer attributes are written to stdout as raw bytes.
    Get { attr: Attribute },
    /// Write a decimal value to a register attribute (`preset` only accepts 1).
    Set { attr: Attribute, value: String },
    /// Transfer a 1020-byte file into `eight` or `cee` (`-` reads stdin).
    Write { attr: Attribute, input: PathBuf },
    /// Save a buffer attribute (`eight`, `cee`, `zeropage`) to a file (`-` for stdout).
    Read { attr: Attribute, output: PathBuf },
    /// Program the boot mode and run the board reset sequence. Other commands leave the board
    /// as they find it.
    Reset,
    /// Show the control registers.
    Status {
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Keep the board attached and service its interrupts.
    Watch {
        /// Exit after this many interrupts.
        #[arg(long)]
        count: Option<u64>,
    },
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub device: Option<BoardId>,
    pub sysfs_root: PathBuf,
    pub uio: Option<PathBuf>,
    pub board: BoardConfig,
    pub log_filter: String,
}

impl CliConfig {
    pub fn from_args(args: &Args) -> Self {
        let log_filter = args
            .log_level
            .clone()
            .or_else(|| env::var("RUST_LOG").ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "info".to_string());

        Self {
            device: args.device,
            sysfs_root: args.sysfs_root.clone(),
            uio: args.uio.clone(),
            board: BoardConfig {
                boot_mode: args.boot_mode,
                zero_page: !args.no_zero_page,
            },
            log_filter,
        }
    }
}
