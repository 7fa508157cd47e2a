//! # Injectable logging
//!
//! Sessions, decoder tables and pipelines log through a [`Logger`] handed to
//! them at construction instead of a process-wide callback. A logger wraps
//! any [`log::Log`] implementation, so the usual `log` backends plug in
//! unchanged:
//!
//! ```rust
//! use avpipe::logging::Logger;
//! use log::{Level, LevelFilter, Log, Metadata, Record};
//! use std::sync::Arc;
//!
//! struct Stderr;
//!
//! impl Log for Stderr {
//!     fn enabled(&self, _: &Metadata<'_>) -> bool {
//!         true
//!     }
//!     fn log(&self, record: &Record<'_>) {
//!         eprintln!("{} {}", record.level(), record.args());
//!     }
//!     fn flush(&self) {}
//! }
//!
//! let logger = Logger::new(Arc::new(Stderr)).with_level(LevelFilter::Debug);
//! assert!(logger.enabled(Level::Info));
//! assert!(!logger.enabled(Level::Trace));
//!
//! // Forward to whatever logger the application installed. Records are
//! // dropped while no backend is installed.
//! let app = Logger::global().with_level(LevelFilter::Debug);
//! assert_eq!(app.level(), LevelFilter::Debug);
//!
//! // Or drop everything.
//! let quiet = Logger::discard();
//! assert!(!quiet.enabled(Level::Error));
//! ```

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fmt;
use std::sync::Arc;

/// A cloneable handle to a log sink with its own level filter and target.
#[derive(Clone)]
pub struct Logger {
    sink: Option<Arc<dyn Log>>,
    level: LevelFilter,
    target: &'static str,
}

struct GlobalSink;

impl Log for GlobalSink {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        log::logger().log(record)
    }

    fn flush(&self) {
        log::logger().flush()
    }
}

impl Logger {
    /// Wraps a sink. The level defaults to `Info`.
    pub fn new(sink: Arc<dyn Log>) -> Self {
        Self {
            sink: Some(sink),
            level: LevelFilter::Info,
            target: "avpipe",
        }
    }

    /// Forwards to the logger installed with the `log` crate.
    pub fn global() -> Self {
        Self::new(Arc::new(GlobalSink))
    }

    /// A logger that drops every record.
    pub fn discard() -> Self {
        Self {
            sink: None,
            level: LevelFilter::Off,
            target: "avpipe",
        }
    }

    /// Sets the maximum level passed to the sink.
    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Sets the record target.
    pub fn with_target(mut self, target: &'static str) -> Self {
        self.target = target;
        self
    }

    /// Current level filter.
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Returns true if a record at `level` would reach the sink.
    pub fn enabled(&self, level: Level) -> bool {
        match &self.sink {
            Some(sink) => {
                level <= self.level
                    && sink.enabled(&Metadata::builder().level(level).target(self.target).build())
            }
            None => false,
        }
    }

    /// Emits a record. Prefer the crate's logging macros at call sites.
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.log(
                &Record::builder()
                    .args(args)
                    .level(level)
                    .target(self.target)
                    .build(),
            );
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Logger::global()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level)
            .field("target", &self.target)
            .field("discard", &self.sink.is_none())
            .finish()
    }
}

macro_rules! av_log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log($level, format_args!($($arg)+))
    };
}

macro_rules! av_debug {
    ($logger:expr, $($arg:tt)+) => { $crate::logging::av_log!($logger, ::log::Level::Debug, $($arg)+) };
}

macro_rules! av_info {
    ($logger:expr, $($arg:tt)+) => { $crate::logging::av_log!($logger, ::log::Level::Info, $($arg)+) };
}

macro_rules! av_warn {
    ($logger:expr, $($arg:tt)+) => { $crate::logging::av_log!($logger, ::log::Level::Warn, $($arg)+) };
}

macro_rules! av_trace {
    ($logger:expr, $($arg:tt)+) => { $crate::logging::av_log!($logger, ::log::Level::Trace, $($arg)+) };
}

pub(crate) use {av_debug, av_info, av_log, av_trace, av_warn};

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Sink that keeps every record, for assertions on log output.
    #[derive(Default)]
    pub(crate) struct Capture {
        pub(crate) records: Mutex<Vec<(Level, String)>>,
    }

    impl Log for Capture {
        fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &Record<'_>) {
            self.records
                .lock()
                .push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }

    #[test]
    fn test_level_filter() {
        let capture = Arc::new(Capture::default());
        let logger = Logger::new(capture.clone()).with_level(LevelFilter::Warn);
        av_info!(logger, "dropped {}", 1);
        av_warn!(logger, "kept {}", 2);
        let records = capture.records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], (Level::Warn, "kept 2".to_string()));
    }

    #[test]
    fn test_global_defers_to_installed_backend() {
        // No backend is installed in unit tests, so the `log` facade drops everything.
        let logger = Logger::global().with_level(LevelFilter::Debug);
        assert_eq!(logger.level(), LevelFilter::Debug);
        assert!(!logger.enabled(Level::Info));
    }

    #[test]
    fn test_discard() {
        let logger = Logger::discard().with_level(LevelFilter::Trace);
        assert!(!logger.enabled(Level::Error));
        av_debug!(logger, "nothing happens");
    }
}
