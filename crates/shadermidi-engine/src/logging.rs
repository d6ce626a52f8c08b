//! Timestamped tag logging.
//!
//! Lines look like `<timestamp> [TAG][thread] message` and always go to
//! stderr. [`init`] may add an append-only file sink and reads the minimum
//! level from `SHADERMIDI_LOG` (`info`, `warn`, `error`).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};

use time::format_description::{self, OwnedFormatItem};
use time::OffsetDateTime;

static FILE_SINK: Mutex<Option<File>> = Mutex::new(None);
static RUN_ID: OnceLock<String> = OnceLock::new();
static TS_FORMAT: OnceLock<Option<OwnedFormatItem>> = OnceLock::new();
static MIN_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info = 0,
    Warn = 1,
    Error = 2,
}

impl Level {
    pub fn parse(s: &str) -> Option<Level> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" | "debug" | "trace" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            _ => None,
        }
    }
}

/// Set up sinks once at startup. Returns a short run id.
pub fn init(log_file: Option<PathBuf>) -> String {
    let rid = RUN_ID
        .get_or_init(|| {
            let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() as u64;
            format!("{:08x}", (nanos ^ u64::from(std::process::id())) as u32)
        })
        .clone();

    if let Some(level) = std::env::var("SHADERMIDI_LOG").ok().as_deref().and_then(Level::parse) {
        set_min_level(level);
    }

    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => {
                if let Ok(mut sink) = FILE_SINK.lock() {
                    *sink = Some(f);
                }
            }
            Err(e) => log_line(Level::Warn, "INIT", &format!("cannot open log file {}: {e}", path.display())),
        }
    }

    rid
}

pub fn set_min_level(level: Level) {
    MIN_LEVEL.store(level as u8, Ordering::Relaxed);
}

fn enabled(level: Level) -> bool {
    level as u8 >= MIN_LEVEL.load(Ordering::Relaxed)
}

/// Local time when the offset can be determined, UTC otherwise.
pub fn log_timestamp() -> String {
    let fmt = TS_FORMAT.get_or_init(|| {
        format_description::parse_owned::<1>("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]").ok()
    });
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    fmt.as_ref()
        .and_then(|f| now.format(f).ok())
        .unwrap_or_else(|| now.unix_timestamp().to_string())
}

pub fn log_thread_name() -> String {
    std::thread::current().name().unwrap_or("main").to_string()
}

pub fn format_line(timestamp: &str, tag: &str, thread: &str, msg: &str) -> String {
    format!("{timestamp} [{tag}][{thread}] {msg}")
}

#[doc(hidden)]
pub fn log_line(level: Level, tag: &str, msg: &str) {
    if !enabled(level) {
        return;
    }
    let line = format_line(&log_timestamp(), tag, &log_thread_name(), msg);
    eprintln!("{line}");

    if let Ok(mut sink) = FILE_SINK.lock() {
        if let Some(f) = sink.as_mut() {
            let _ = writeln!(f, "{line}");
        }
    }
}

#[macro_export]
macro_rules! logi {
    ($tag:expr, $($arg:tt)*) => {
        $crate::logging::log_line($crate::logging::Level::Info, $tag, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! logw {
    ($tag:expr, $($arg:tt)*) => {
        $crate::logging::log_line($crate::logging::Level::Warn, $tag, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! loge {
    ($tag:expr, $($arg:tt)*) => {
        $crate::logging::log_line($crate::logging::Level::Error, $tag, &format!($($arg)*))
    };
}
