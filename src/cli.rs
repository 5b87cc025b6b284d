//! Shared CLI helpers and small reusable Clap fragments

use clap::Parser;
use std::path::PathBuf;

/// Daemon options used by siftd (primary and mirror are the same binary;
/// a primary is one started with --mirror)
#[derive(Clone, Debug, Parser)]
pub struct DaemonOpts {
    /// Bind address (host:port)
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Root directory to serve (defaults to the home directory)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Mirror to redirect bulk transfers to (host:port); leave unset on
    /// the mirror itself
    #[arg(long)]
    pub mirror: Option<String>,

    /// Append an activity log to this file
    #[arg(long)]
    pub log: Option<PathBuf>,
}

/// Options for the interactive client
#[derive(Clone, Debug, Parser)]
pub struct ClientOpts {
    /// Server address (host:port)
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub server: String,

    /// Directory received archives are saved into
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Suppress the download progress bar
    #[arg(long)]
    pub quiet: bool,
}
