use std::io::{self, Write};

use anyhow::Result;
use clap::Parser;
use dtl_cli::commands;
use dtl_cli::config::{Args, CliConfig};

fn main() -> Result<()> {
    let args = Args::parse();
    let config = CliConfig::from_args(&args);
    dtl_cli::init_tracing(&config.log_filter)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    commands::run(&config, &args.command, &mut out)?;
    out.flush()?;
    Ok(())
}
