//! Recursive file search over the served subtree
//!
//! Depth-first traversal via walkdir. Directories that cannot be read
//! (permissions, deleted mid-walk) are skipped and traversal continues
//! with their siblings; partial inaccessibility is never an error here.
//! Sibling order is whatever the filesystem enumerates - callers must not
//! assume sorting. Metadata is read fresh on every walk, never cached
//! across requests.

use std::ffi::OsStr;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use chrono::{Days, Local, NaiveDate, TimeZone};
use walkdir::WalkDir;

use crate::command::DateArg;

/// Predicate for the bulk searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Byte length within [min,max], both inclusive
    SizeRange { min: u64, max: u64 },
    /// Modification time in [from,to_exclusive) epoch seconds
    ModifiedRange { from: i64, to_exclusive: i64 },
    /// Name suffix after the last `.` equals one of these, case-sensitively
    Extensions(Vec<String>),
}

impl Filter {
    /// Build the mtime filter from two calendar dates: from the start of
    /// `from`'s day up to (exclusively) the start of the day after `to`,
    /// so files modified any time on `to`'s calendar day are included.
    pub fn from_dates(from: &DateArg, to: &DateArg) -> Filter {
        Filter::ModifiedRange {
            from: day_start_epoch(from),
            to_exclusive: day_end_epoch(to),
        }
    }

    fn matches(&self, name: &OsStr, md: &Metadata) -> bool {
        match self {
            Filter::SizeRange { min, max } => {
                let len = md.len();
                len >= *min && len <= *max
            }
            Filter::ModifiedRange { from, to_exclusive } => {
                let mtime = mtime_epoch(md);
                mtime >= *from && mtime < *to_exclusive
            }
            Filter::Extensions(exts) => {
                let name = name.to_string_lossy();
                match name.rfind('.') {
                    Some(pos) => {
                        let suffix = &name[pos + 1..];
                        exts.iter().any(|e| e == suffix)
                    }
                    None => false,
                }
            }
        }
    }
}

/// Locate the first regular file named exactly `name`, stopping the walk
/// at the first hit.
pub fn find_by_name(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == OsStr::new(name))
        .map(|e| e.into_path())
}

/// Collect every regular file under `root` matching `filter`, up to `cap`
/// entries. Hitting the cap stops the walk early and the truncated set is
/// returned as-is.
pub fn collect_matching(root: &Path, filter: &Filter, cap: usize) -> Vec<PathBuf> {
    let mut matched = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let md = match entry.metadata() {
            Ok(md) => md,
            Err(_) => continue,
        };
        if filter.matches(entry.file_name(), &md) {
            matched.push(entry.into_path());
            if matched.len() >= cap {
                break;
            }
        }
    }
    matched
}

fn mtime_epoch(md: &Metadata) -> i64 {
    md.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Epoch seconds at local midnight of the given date. Day values past the
/// month's end roll into the following month, mirroring mktime
/// normalization for the loosely validated inputs.
pub fn day_start_epoch(d: &DateArg) -> i64 {
    day_offset_epoch(d, d.day.saturating_sub(1) as u64)
}

/// Epoch seconds at local midnight of the day *after* the given date -
/// the exclusive upper bound covering all of `d`'s calendar day.
pub fn day_end_epoch(d: &DateArg) -> i64 {
    day_offset_epoch(d, d.day as u64)
}

fn day_offset_epoch(d: &DateArg, days_from_month_start: u64) -> i64 {
    let first = match NaiveDate::from_ymd_opt(d.year, d.month, 1) {
        Some(f) => f,
        None => return 0,
    };
    let date = first
        .checked_add_days(Days::new(days_from_month_start))
        .unwrap_or(first);
    let midnight = match date.and_hms_opt(0, 0, 0) {
        Some(m) => m,
        None => return 0,
    };
    match Local.from_local_datetime(&midnight).earliest() {
        Some(t) => t.timestamp(),
        None => midnight.and_utc().timestamp(),
    }
}
