//! Destination for supervisor log lines.
use log::Level;

/// Receives the operator facing log lines of the supervisor.
///
/// Any `Fn(Level, &str, Option<&str>)` closure is a sink.
pub trait LogSink: Send + Sync {
    /// Record a message with an optional detail such as a backtrace.
    fn log(&self, level: Level, message: &str, detail: Option<&str>);
}

impl<F> LogSink for F
where
    F: Fn(Level, &str, Option<&str>) + Send + Sync,
{
    fn log(&self, level: Level, message: &str, detail: Option<&str>) {
        (self)(level, message, detail)
    }
}

/// Sink that forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn log(&self, level: Level, message: &str, detail: Option<&str>) {
        match detail {
            Some(detail) => {
                log::log!(target: "clustervisor", level, "{}\n{}", message, detail)
            }
            None => log::log!(target: "clustervisor", level, "{}", message),
        }
    }
}
