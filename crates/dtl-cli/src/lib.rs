//! Userspace driver for the DTL-H2500 built on `dtl-hostif`.
//!
//! The board's BAR0 is mapped from PCI sysfs, interrupts are optionally taken from a UIO node,
//! and the host-interface attributes are exposed as subcommands of the `dtlh2500` binary.

pub mod commands;
pub mod config;
pub mod sysfs;
pub mod uio;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber. Logs go to stderr so stdout stays clean for data.
pub fn init_tracing(filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_new(filter).with_context(|| format!("invalid log filter {filter:?}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}
