//! sift - interactive client for the sift file service

use anyhow::{Context, Result};
use clap::Parser;

use sift::cli::ClientOpts;

fn main() -> Result<()> {
    let opts = ClientOpts::parse();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    rt.block_on(sift::client::run(&opts))
}
