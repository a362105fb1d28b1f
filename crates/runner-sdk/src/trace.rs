use std::io::Write;
use std::sync::Arc;

/// Diagnostic output handed to plugin helpers.
///
/// Only `info` and `verbose` are required; warnings and errors default to
/// protocol-formatted info lines.
pub trait TraceWriter: Send + Sync {
    fn info(&self, message: &str);

    fn verbose(&self, message: &str);

    fn warning(&self, message: &str) {
        self.info(&format!("##[warning]{message}"));
    }

    fn error(&self, message: &str) {
        self.info(&format!("##[error]{message}"));
    }
}

/// Destination for fully formatted protocol lines.
///
/// Implementations receive one complete line per call, without the trailing
/// newline. The execution context serializes calls, so a sink never sees two
/// writers at once.
pub trait OutputSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Writes protocol lines to the process's standard output, where the runner
/// reads them.
#[derive(Debug, Clone, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_line(&self, line: &str) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        if let Err(e) = writeln!(handle, "{line}").and_then(|_| handle.flush()) {
            tracing::error!("Failed to write to stdout: {}", e);
        }
    }
}

/// Forwards protocol lines to a [`TraceWriter`] at info level instead of
/// standard output.
#[derive(Clone)]
pub struct TraceWriterSink {
    trace: Arc<dyn TraceWriter>,
}

impl TraceWriterSink {
    pub fn new(trace: Arc<dyn TraceWriter>) -> Self {
        Self { trace }
    }
}

impl OutputSink for TraceWriterSink {
    fn write_line(&self, line: &str) {
        self.trace.info(line);
    }
}

/// Severity of a message captured by [`CollectingTraceWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceLevel {
    Info,
    Verbose,
    Warning,
    Error,
}

/// In-memory trace writer for tests and for plugins that post-process their
/// own output. Pair it with [`TraceWriterSink`] to capture protocol lines.
#[derive(Debug, Default)]
pub struct CollectingTraceWriter {
    records: parking_lot::Mutex<Vec<(TraceLevel, String)>>,
}

impl CollectingTraceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, level: TraceLevel, message: &str) {
        self.records.lock().push((level, message.to_owned()));
    }

    /// Everything captured so far, in arrival order.
    pub fn messages(&self) -> Vec<(TraceLevel, String)> {
        self.records.lock().clone()
    }

    /// Info-level text only; this is where [`TraceWriterSink`] puts lines.
    pub fn lines(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter_map(|(level, m)| (*level == TraceLevel::Info).then(|| m.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl TraceWriter for CollectingTraceWriter {
    fn info(&self, message: &str) {
        self.record(TraceLevel::Info, message);
    }

    fn verbose(&self, message: &str) {
        self.record(TraceLevel::Verbose, message);
    }

    fn warning(&self, message: &str) {
        self.record(TraceLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.record(TraceLevel::Error, message);
    }
}
