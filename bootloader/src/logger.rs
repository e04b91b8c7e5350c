//! Boot log backend
//!
//! Records go to a fixed ring buffer so the last few kilobytes of a failed
//! boot can be written to the variable store before halting.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Write};
use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;
use verdict_api::{VarAttributes, VarNamespace, VarStore};

use crate::error::{BootError, Result};
use crate::vars;

pub const LOG_BUFFER_SIZE: usize = 4096;

struct LogRing {
    buf: [u8; LOG_BUFFER_SIZE],
    head: usize,
    len: usize,
}

impl LogRing {
    const fn new() -> Self {
        Self {
            buf: [0; LOG_BUFFER_SIZE],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.buf[self.head] = *b;
            self.head = (self.head + 1) % LOG_BUFFER_SIZE;
            self.len = (self.len + 1).min(LOG_BUFFER_SIZE);
        }
    }

    fn snapshot(&self) -> Vec<u8> {
        let start = (self.head + LOG_BUFFER_SIZE - self.len) % LOG_BUFFER_SIZE;
        (0..self.len)
            .map(|i| self.buf[(start + i) % LOG_BUFFER_SIZE])
            .collect()
    }
}

impl Write for LogRing {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push(s.as_bytes());
        Ok(())
    }
}

fn tag(level: Level) -> &'static str {
    match level {
        Level::Error => "[E]",
        Level::Warn => "[W]",
        Level::Info => "[I]",
        Level::Debug => "[D]",
        Level::Trace => "[T]",
    }
}

pub struct BootLogger {
    ring: Mutex<LogRing>,
}

impl BootLogger {
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(LogRing::new()),
        }
    }

    /// Captured text, oldest first
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.ring.lock().snapshot()).into_owned()
    }

    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.head = 0;
        ring.len = 0;
    }

    /// Save the captured log to the non-volatile log variable
    pub fn persist(&self, store: &dyn VarStore) -> Result<()> {
        let data = self.ring.lock().snapshot();
        store
            .set(
                VarNamespace::Loader,
                vars::LOG_VAR,
                &data,
                VarAttributes::for_var(true, false),
            )
            .map_err(BootError::VariableAccess)
    }
}

impl Default for BootLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Log for BootLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut ring = self.ring.lock();
        let _ = writeln!(ring, "{} {}", tag(record.level()), record.args());
    }

    fn flush(&self) {}
}

pub static LOGGER: BootLogger = BootLogger::new();

/// Install [`LOGGER`] as the global logger
///
/// `verbose_logging` builds capture debug records.
pub fn init() -> core::result::Result<(), log::SetLoggerError> {
    let level = if cfg!(feature = "verbose_logging") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    init_with_level(level)
}

pub fn init_with_level(level: LevelFilter) -> core::result::Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}
