use std::sync::{Arc, OnceLock};

/// Trait representing a logger that can log messages at various levels.
///
/// Implement it to receive the log records emitted by the sqlworker crates,
/// for instance to route them into a host application's own logging.
///
/// # Examples
///
/// ```rust
/// use sqlworker_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    fn log(&self, level: LogLevel, message: String);
}

/// Enumeration of possible log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Designates very low priority, often extremely detailed messages.
    Trace,
    /// Designates lower priority debugging information.
    Debug,
    /// Designates informational messages that highlight the progress of the application.
    Info,
    /// Designates potentially harmful situations.
    Warn,
    /// Designates error events that might still allow the application to continue running.
    Error,
}

/// Forwards `log` records to the installed [`Logger`].
struct ForwardingLogger;

impl log::Log for ForwardingLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let is_record_from_sqlworker = record
            .module_path()
            .is_some_and(|module_path| module_path.starts_with("sqlworker"));

        let is_debug_or_trace_level =
            record.level() == log::Level::Debug || record.level() == log::Level::Trace;

        // Debug and trace chatter from dependencies is dropped.
        if is_debug_or_trace_level && !is_record_from_sqlworker {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Sets the global logger.
///
/// Installs a `log` backend that forwards every record to `logger`. Only the
/// first call has an effect; later calls report that a logger is already set.
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
        return;
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

/// # Errors
///
/// Returns a `log::SetLoggerError` if another `log` backend was already installed.
fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForwardingLogger = ForwardingLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(LogLevel, String)>>);

    impl Logger for Recorder {
        fn log(&self, level: LogLevel, message: String) {
            self.0
                .lock()
                .expect("recorder lock")
                .push((level, message));
        }
    }

    #[test]
    fn test_forwards_crate_records_and_filters_foreign_debug() {
        let recorder = Arc::new(Recorder::default());
        set_logger(recorder.clone());

        log::warn!("visible warning");
        log::logger().log(
            &log::Record::builder()
                .level(log::Level::Debug)
                .module_path(Some("hyper::proto"))
                .args(format_args!("foreign debug"))
                .build(),
        );

        let seen = recorder.0.lock().expect("recorder lock");
        assert!(seen
            .iter()
            .any(|(level, msg)| *level == LogLevel::Warn && msg == "visible warning"));
        assert!(!seen.iter().any(|(_, msg)| msg == "foreign debug"));
    }
}
