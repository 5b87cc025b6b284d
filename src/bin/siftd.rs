use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use sift::cli::DaemonOpts;
use sift::logger::{Logger, NoopLogger, TextLogger};
use sift::server::{self, RedirectTarget};

fn main() -> Result<()> {
    let opts = DaemonOpts::parse();

    let root = match opts.root.clone().or_else(dirs::home_dir) {
        Some(root) => root,
        None => anyhow::bail!("Error: no --root given and no home directory found"),
    };
    if !root.exists() {
        anyhow::bail!("Error: Root directory does not exist: {}", root.display());
    }
    if !root.is_dir() {
        anyhow::bail!("Error: Root path is not a directory: {}", root.display());
    }

    // Canonicalize the path for better logging
    let canonical_root = std::fs::canonicalize(&root)
        .with_context(|| format!("Failed to canonicalize root path: {}", root.display()))?;

    let mirror = match opts.mirror.as_deref() {
        Some(spec) => Some(
            RedirectTarget::parse(spec)
                .with_context(|| format!("invalid --mirror '{}', expected host:port", spec))?,
        ),
        None => None,
    };

    println!("Starting sift daemon:");
    println!("  Root: {}", canonical_root.display());
    println!("  Bind: {}", opts.bind);
    match &mirror {
        Some(target) => println!(
            "  Mirror: {}:{} (bulk transfers are redirected)",
            target.host, target.port
        ),
        None => println!("  Mirror: none (serving everything locally)"),
    }

    let logger: Arc<dyn Logger> = match &opts.log {
        Some(path) => Arc::new(TextLogger::new(path).context("open activity log")?),
        None => Arc::new(NoopLogger),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    rt.block_on(server::serve(&opts.bind, &canonical_root, mirror, logger))
}
