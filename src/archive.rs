//! Compressed archive construction from an explicit path list
//!
//! Matched paths are handed to the tar builder one at a time - nothing is
//! ever interpolated into a shell command line. The archive is written to
//! a uniquely named temp file that is unlinked when the handle drops,
//! whether the transfer afterwards succeeds or not.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// zstd compression level for outgoing archives
pub const ZSTD_LEVEL: i32 = 3;

/// Build a `.tar.zst` containing exactly `files`, each stored under its
/// path relative to `root` (falling back to the bare file name for a path
/// outside the root). Returns the temp file handle and the archive's byte
/// length.
pub fn build_archive(root: &Path, files: &[PathBuf]) -> Result<(NamedTempFile, u64)> {
    let tmp = tempfile::Builder::new()
        .prefix("sift-")
        .suffix(".tar.zst")
        .tempfile()
        .context("create temporary archive")?;
    let writer = tmp.reopen().context("reopen temporary archive")?;

    let mut encoder = zstd::Encoder::new(writer, ZSTD_LEVEL).context("start zstd stream")?;
    {
        let mut builder = tar::Builder::new(&mut encoder);
        for path in files {
            builder
                .append_path_with_name(path, entry_name(root, path))
                .with_context(|| format!("append {} to archive", path.display()))?;
        }
        builder.finish().context("finish archive")?;
    }
    encoder.finish().context("finish zstd stream")?;

    let len = tmp
        .as_file()
        .metadata()
        .context("stat temporary archive")?
        .len();
    Ok((tmp, len))
}

fn entry_name(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
        _ => PathBuf::from(path.file_name().unwrap_or(path.as_os_str())),
    }
}
