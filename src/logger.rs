//! Session log.
//!
//! A MedLayers session writes one plain-text file, truncated at start-up, with
//! one line per event:
//!
//! ```text
//! 2026-10-17T09:30:12.345Z WARN  medlayers::inference: Dropping threshold result for removed record …
//! ```
//!
//! The `log_info!` / `log_warn!` / `log_err!` macros tag each line with the
//! calling module. They do nothing until [`init`] has opened a session, so
//! library users and tests never touch the file system through them.
//! `MEDLAYERS_LOG=warn` (or `error`) keeps only the more severe lines.
//!
//! Default location:
//!   Windows:  `%APPDATA%\MedLayers\medlayers.log`
//!   Linux:    `$XDG_DATA_HOME/MedLayers/medlayers.log` (else `~/.local/share/…`)
//!   macOS:    `~/Library/Application Support/MedLayers/medlayers.log`

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, Local, SecondsFormat, Utc};

/// Environment variable holding the minimum level written to the log.
pub const LEVEL_ENV: &str = "MEDLAYERS_LOG";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    /// Fixed-width tag, so messages line up.
    pub fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO ",
            Level::Warn => "WARN ",
            Level::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Level> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" | "err" => Some(Level::Error),
            _ => None,
        }
    }
}

struct Session {
    file: Mutex<File>,
    path: PathBuf,
    min_level: Level,
}

static SESSION: OnceLock<Session> = OnceLock::new();

/// Path of the open session log, if any.
pub fn log_path() -> Option<&'static Path> {
    SESSION.get().map(|s| s.path.as_path())
}

/// Backend of the logging macros.
pub fn record(level: Level, target: &str, args: fmt::Arguments<'_>) {
    let Some(session) = SESSION.get() else { return };
    if level < session.min_level {
        return;
    }
    let line = format_line(Utc::now(), level, target, &args.to_string());
    append(session, &line);
}

/// One log line, without the trailing newline. Multi-line messages are
/// indented so every event still starts at column 0.
pub fn format_line(time: DateTime<Utc>, level: Level, target: &str, msg: &str) -> String {
    format!(
        "{} {} {}: {}",
        time.to_rfc3339_opts(SecondsFormat::Millis, true),
        level.tag(),
        target,
        msg.replace('\n', "\n    ")
    )
}

fn append(session: &Session, line: &str) {
    // A full disk must not take the model down with it.
    if let Ok(mut file) = session.file.lock() {
        let _ = writeln!(file, "{}", line);
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::record($crate::logger::Level::Info, module_path!(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::record($crate::logger::Level::Warn, module_path!(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::record($crate::logger::Level::Error, module_path!(), format_args!($($arg)*))
    };
}

/// Open the session log at the default location.
pub fn init() {
    init_at(&default_log_path());
}

/// Open (truncate) the session log at `path` and route panics into it.
/// Later calls in the same process are ignored.
pub fn init_at(path: &Path) {
    if SESSION.get().is_some() {
        return;
    }
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[medlayers] session log '{}' unavailable: {}", path.display(), e);
            return;
        }
    };

    let min_level = std::env::var(LEVEL_ENV)
        .ok()
        .and_then(|v| Level::parse(&v))
        .unwrap_or(Level::Info);
    let session = SESSION.get_or_init(|| Session {
        file: Mutex::new(file),
        path: path.to_path_buf(),
        min_level,
    });
    append(
        session,
        &format!(
            "# MedLayers {} session, started {} (minimum level {})",
            env!("CARGO_PKG_VERSION"),
            Local::now().format("%Y-%m-%d %H:%M:%S %:z"),
            min_level.tag().trim_end()
        ),
    );

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(session) = SESSION.get() {
            let thread = std::thread::current();
            let target = thread.name().unwrap_or("unnamed thread");
            append(session, &format_line(Utc::now(), Level::Error, target, &format!("panic: {}", info)));
        }
        previous(info);
    }));
}

fn default_log_path() -> PathBuf {
    data_dir().join("MedLayers").join("medlayers.log")
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".local").join("share")))
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn lines_carry_time_level_and_module() {
        let t = Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 12).unwrap();
        let line = format_line(t, Level::Warn, "medlayers::inference", "two\nlines");
        assert_eq!(line, "2026-10-17T09:30:12.000Z WARN  medlayers::inference: two\n    lines");
    }

    #[test]
    fn levels_parse_loosely_and_order_by_severity() {
        assert_eq!(Level::parse(" Warning "), Some(Level::Warn));
        assert_eq!(Level::parse("ERR"), Some(Level::Error));
        assert_eq!(Level::parse("debug"), None);
        assert!(Level::Error > Level::Warn && Level::Warn > Level::Info);
        assert_eq!(Level::Info.tag().len(), Level::Error.tag().len());
    }
}
