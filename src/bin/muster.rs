//! Muster CLI Binary
//!
//! Command-line interface for the disk ingestion pipeline.

use anyhow::Context;
use clap::Parser;
use diskmuster::concurrency::CancellationFlag;
use diskmuster::tooling::cli::{Cli, CliContext};
use std::process;

fn run(cli: Cli) -> anyhow::Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let cancel = CancellationFlag::new();
    let context = CliContext::new(&cli, cancel.clone()).context("Error initializing")?;

    // Ctrl-C stops the run between disks.
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received, finishing the current disk...");
            cancel.cancel();
        }
    });

    let output = runtime.block_on(context.execute(&cli.command))?;
    println!("{}", output.text);
    Ok(output.exit_code)
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}
