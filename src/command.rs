//! Command grammar and eager validation
//!
//! Both ends run the same `parse`: the client as a pre-flight check to avoid
//! a wasted round trip, the server as the authoritative gate (it never
//! trusts the client's copy). Validation happens before any network or disk
//! side effect.

use thiserror::Error;

/// Maximum number of extensions one `getfiles` may request
pub const MAX_EXTENSIONS: usize = 6;

/// Maximum length of a single extension argument
pub const MAX_EXTENSION_LEN: usize = 10;

/// A validated request, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `findfile <name>` - locate a single file by exact name
    FindFile { name: String },
    /// `getftar <name>` - locate a single file and transfer it archived
    GetFileTar { name: String },
    /// `sgetfiles <min> <max>` - archive of files with size in [min,max]
    GetFilesBySize { min: u64, max: u64 },
    /// `dgetfiles <from> <to>` - archive of files modified in [from,to]
    GetFilesByDate { from: DateArg, to: DateArg },
    /// `getfiles <ext>...` - archive of files matching any extension
    GetFilesByExt { extensions: Vec<String> },
    /// `quit` - end the session, no response
    Quit,
}

/// A calendar date as the grammar accepts it. Kept as raw fields because
/// the day bound is deliberately loose ([1,31] for every month, no leap
/// check) and e.g. 02-30 has no chrono representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateArg {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("syntax: {0}")]
    Syntax(&'static str),
    #[error("file name '{0}' must not contain a path separator")]
    NameHasSeparator(String),
    #[error("size '{0}' is not a non-negative integer")]
    BadSize(String),
    #[error("size range is inverted: {min} > {max}")]
    InvertedSizeRange { min: u64, max: u64 },
    #[error("date '{0}' is not in YYYY-MM-DD form")]
    BadDate(String),
    #[error("date '{0}' is outside the supported range")]
    DateOutOfRange(String),
    #[error("extension '{0}' must be 1-10 alphanumeric characters")]
    BadExtension(String),
}

/// Parse one line of text into a [`Command`].
///
/// Tokenizes on whitespace; the first token selects the command kind and
/// the rest are positional arguments. Every rule is checked here, eagerly.
pub fn parse(line: &str) -> Result<Command, ValidationError> {
    let mut tokens = line.split_whitespace();
    let keyword = tokens.next().ok_or(ValidationError::Empty)?;
    let args: Vec<&str> = tokens.collect();

    match keyword {
        "findfile" => {
            let name = single_file_name(&args, "findfile <filename>")?;
            Ok(Command::FindFile { name })
        }
        "getftar" => {
            let name = single_file_name(&args, "getftar <filename>")?;
            Ok(Command::GetFileTar { name })
        }
        "sgetfiles" => {
            if args.len() != 2 {
                return Err(ValidationError::Syntax("sgetfiles <size1> <size2>"));
            }
            let min = parse_size(args[0])?;
            let max = parse_size(args[1])?;
            if min > max {
                return Err(ValidationError::InvertedSizeRange { min, max });
            }
            Ok(Command::GetFilesBySize { min, max })
        }
        "dgetfiles" => {
            if args.len() != 2 {
                return Err(ValidationError::Syntax("dgetfiles <date1> <date2>"));
            }
            let from = parse_date(args[0])?;
            let to = parse_date(args[1])?;
            Ok(Command::GetFilesByDate { from, to })
        }
        "getfiles" => {
            if args.is_empty() || args.len() > MAX_EXTENSIONS {
                return Err(ValidationError::Syntax("getfiles <ext1> [ext2] ... [ext6]"));
            }
            let mut extensions = Vec::with_capacity(args.len());
            for ext in &args {
                if ext.is_empty()
                    || ext.len() > MAX_EXTENSION_LEN
                    || !ext.bytes().all(|b| b.is_ascii_alphanumeric())
                {
                    return Err(ValidationError::BadExtension(ext.to_string()));
                }
                extensions.push(ext.to_string());
            }
            Ok(Command::GetFilesByExt { extensions })
        }
        "quit" => {
            if !args.is_empty() {
                return Err(ValidationError::Syntax("quit"));
            }
            Ok(Command::Quit)
        }
        other => Err(ValidationError::UnknownCommand(other.to_string())),
    }
}

fn single_file_name(args: &[&str], usage: &'static str) -> Result<String, ValidationError> {
    if args.len() != 1 {
        return Err(ValidationError::Syntax(usage));
    }
    let name = args[0];
    if name.contains('/') {
        return Err(ValidationError::NameHasSeparator(name.to_string()));
    }
    Ok(name.to_string())
}

fn parse_size(s: &str) -> Result<u64, ValidationError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::BadSize(s.to_string()));
    }
    s.parse::<u64>()
        .map_err(|_| ValidationError::BadSize(s.to_string()))
}

/// YYYY-MM-DD with digits at positions 0-3, 5-6, 8-9 and literal `-` at
/// 4 and 7. Year in [1900,2100], month in [1,12], day in [1,31]. The day
/// bound is intentionally not tightened per month: 2023-02-30 validates.
fn parse_date(s: &str) -> Result<DateArg, ValidationError> {
    let b = s.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return Err(ValidationError::BadDate(s.to_string()));
    }
    for (i, &c) in b.iter().enumerate() {
        if i == 4 || i == 7 {
            continue;
        }
        if !c.is_ascii_digit() {
            return Err(ValidationError::BadDate(s.to_string()));
        }
    }
    let year: i32 = s[0..4].parse().map_err(|_| ValidationError::BadDate(s.to_string()))?;
    let month: u32 = s[5..7].parse().map_err(|_| ValidationError::BadDate(s.to_string()))?;
    let day: u32 = s[8..10].parse().map_err(|_| ValidationError::BadDate(s.to_string()))?;
    if !(1900..=2100).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(ValidationError::DateOutOfRange(s.to_string()));
    }
    Ok(DateArg { year, month, day })
}

impl Command {
    /// Bulk commands are the ones that stream an archive back; the redirect
    /// policy only ever offloads these.
    pub fn is_bulk(&self) -> bool {
        matches!(
            self,
            Command::GetFileTar { .. }
                | Command::GetFilesBySize { .. }
                | Command::GetFilesByDate { .. }
                | Command::GetFilesByExt { .. }
        )
    }

    /// File name the client saves a received archive under.
    pub fn archive_name(&self) -> Option<&'static str> {
        match self {
            Command::GetFileTar { .. } => Some("file.tar.zst"),
            Command::GetFilesBySize { .. } => Some("sizefiles.tar.zst"),
            Command::GetFilesByDate { .. } => Some("datefiles.tar.zst"),
            Command::GetFilesByExt { .. } => Some("files.tar.zst"),
            Command::FindFile { .. } | Command::Quit => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_findfile() {
        assert_eq!(
            parse("findfile notes.txt"),
            Ok(Command::FindFile { name: "notes.txt".into() })
        );
    }

    #[test]
    fn findfile_rejects_path_separators() {
        assert_eq!(
            parse("findfile dir/notes.txt"),
            Err(ValidationError::NameHasSeparator("dir/notes.txt".into()))
        );
    }

    #[test]
    fn findfile_rejects_wrong_arity() {
        assert!(matches!(parse("findfile"), Err(ValidationError::Syntax(_))));
        assert!(matches!(parse("findfile a b"), Err(ValidationError::Syntax(_))));
    }

    #[test]
    fn parses_sgetfiles() {
        assert_eq!(
            parse("sgetfiles 100 2048"),
            Ok(Command::GetFilesBySize { min: 100, max: 2048 })
        );
        // inclusive degenerate range is fine
        assert_eq!(
            parse("sgetfiles 7 7"),
            Ok(Command::GetFilesBySize { min: 7, max: 7 })
        );
    }

    #[test]
    fn sgetfiles_rejects_inverted_range() {
        assert_eq!(
            parse("sgetfiles 10 5"),
            Err(ValidationError::InvertedSizeRange { min: 10, max: 5 })
        );
    }

    #[test]
    fn sgetfiles_rejects_non_numeric() {
        assert_eq!(parse("sgetfiles -1 5"), Err(ValidationError::BadSize("-1".into())));
        assert_eq!(parse("sgetfiles 1 5x"), Err(ValidationError::BadSize("5x".into())));
    }

    #[test]
    fn parses_dgetfiles() {
        assert_eq!(
            parse("dgetfiles 2023-01-01 2023-12-31"),
            Ok(Command::GetFilesByDate {
                from: DateArg { year: 2023, month: 1, day: 1 },
                to: DateArg { year: 2023, month: 12, day: 31 },
            })
        );
    }

    #[test]
    fn date_validation_is_deliberately_loose_on_day() {
        // no month-length or leap check: Feb 30 passes
        assert!(parse("dgetfiles 2023-02-30 2023-02-30").is_ok());
    }

    #[test]
    fn date_validation_rejects_bad_shapes() {
        assert_eq!(
            parse("dgetfiles 23-01-01 2023-01-02"),
            Err(ValidationError::BadDate("23-01-01".into()))
        );
        assert_eq!(
            parse("dgetfiles 2023/01/01 2023-01-02"),
            Err(ValidationError::BadDate("2023/01/01".into()))
        );
        assert_eq!(
            parse("dgetfiles 2023-13-01 2023-12-31"),
            Err(ValidationError::DateOutOfRange("2023-13-01".into()))
        );
        assert_eq!(
            parse("dgetfiles 1899-01-01 2023-12-31"),
            Err(ValidationError::DateOutOfRange("1899-01-01".into()))
        );
    }

    #[test]
    fn parses_getfiles_up_to_six_extensions() {
        assert_eq!(
            parse("getfiles txt pdf jpg"),
            Ok(Command::GetFilesByExt {
                extensions: vec!["txt".into(), "pdf".into(), "jpg".into()]
            })
        );
        assert!(parse("getfiles a b c d e f").is_ok());
        assert!(matches!(parse("getfiles a b c d e f g"), Err(ValidationError::Syntax(_))));
        assert!(matches!(parse("getfiles"), Err(ValidationError::Syntax(_))));
    }

    #[test]
    fn getfiles_rejects_bad_extensions() {
        assert_eq!(
            parse("getfiles tar.gz"),
            Err(ValidationError::BadExtension("tar.gz".into()))
        );
        assert_eq!(
            parse("getfiles abcdefghijk"),
            Err(ValidationError::BadExtension("abcdefghijk".into()))
        );
    }

    #[test]
    fn parses_quit() {
        assert_eq!(parse("quit"), Ok(Command::Quit));
        assert!(matches!(parse("quit now"), Err(ValidationError::Syntax(_))));
    }

    #[test]
    fn rejects_unknown_and_empty() {
        assert_eq!(
            parse("frobnicate x"),
            Err(ValidationError::UnknownCommand("frobnicate".into()))
        );
        assert_eq!(parse("   "), Err(ValidationError::Empty));
    }

    #[test]
    fn bulk_classification() {
        assert!(!parse("findfile a").unwrap().is_bulk());
        assert!(!parse("quit").unwrap().is_bulk());
        assert!(parse("getftar a").unwrap().is_bulk());
        assert!(parse("sgetfiles 0 1").unwrap().is_bulk());
        assert!(parse("dgetfiles 2023-01-01 2023-01-02").unwrap().is_bulk());
        assert!(parse("getfiles txt").unwrap().is_bulk());
    }

    #[test]
    fn archive_names_follow_the_command_kind() {
        assert_eq!(parse("getftar a").unwrap().archive_name(), Some("file.tar.zst"));
        assert_eq!(parse("sgetfiles 0 1").unwrap().archive_name(), Some("sizefiles.tar.zst"));
        assert_eq!(
            parse("dgetfiles 2023-01-01 2023-01-02").unwrap().archive_name(),
            Some("datefiles.tar.zst")
        );
        assert_eq!(parse("getfiles txt").unwrap().archive_name(), Some("files.tar.zst"));
        assert_eq!(parse("findfile a").unwrap().archive_name(), None);
    }
}
