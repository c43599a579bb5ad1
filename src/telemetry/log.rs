use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::Level;

/// A single structured key/value pair attached to a log call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: &'static str,
    pub value: String,
}

impl Field {
    pub fn new(key: &'static str, value: impl fmt::Display) -> Self {
        Self { key, value: value.to_string() }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Leveled structured logger.
///
/// `with` returns a derived logger that prepends the given fields to every later call.
pub trait Logger: Send + Sync + fmt::Debug {
    fn log(&self, level: Level, message: &str, fields: &[Field]);

    fn with(&self, fields: Vec<Field>) -> Arc<dyn Logger>;

    fn debug(&self, message: &str, fields: &[Field]) {
        self.log(Level::DEBUG, message, fields);
    }

    fn info(&self, message: &str, fields: &[Field]) {
        self.log(Level::INFO, message, fields);
    }

    fn warn(&self, message: &str, fields: &[Field]) {
        self.log(Level::WARN, message, fields);
    }

    fn error(&self, message: &str, fields: &[Field]) {
        self.log(Level::ERROR, message, fields);
    }
}

/// Logger that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: Level, _message: &str, _fields: &[Field]) {}

    fn with(&self, _fields: Vec<Field>) -> Arc<dyn Logger> {
        Arc::new(NoopLogger)
    }
}

fn render(prefix: &[Field], fields: &[Field]) -> String {
    let mut out = String::new();
    for field in prefix.iter().chain(fields) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&field.to_string());
    }
    out
}

/// Logger that forwards to `tracing`, rendering fields into a single `fields` value.
#[derive(Debug, Default, Clone)]
pub struct TracingLogger {
    prefix: Vec<Field>,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str, fields: &[Field]) {
        let fields = render(&self.prefix, fields);
        if level == Level::ERROR {
            tracing::error!(target: "restline", fields = %fields, "{message}");
        } else if level == Level::WARN {
            tracing::warn!(target: "restline", fields = %fields, "{message}");
        } else if level == Level::INFO {
            tracing::info!(target: "restline", fields = %fields, "{message}");
        } else if level == Level::DEBUG {
            tracing::debug!(target: "restline", fields = %fields, "{message}");
        } else {
            tracing::trace!(target: "restline", fields = %fields, "{message}");
        }
    }

    fn with(&self, fields: Vec<Field>) -> Arc<dyn Logger> {
        let mut prefix = self.prefix.clone();
        prefix.extend(fields);
        Arc::new(TracingLogger { prefix })
    }
}

/// One captured log call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub fields: Vec<Field>,
}

impl LogRecord {
    /// Value of the first field named `key`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.iter().find(|f| f.key == key).map(|f| f.value.as_str())
    }
}

#[derive(Debug)]
struct MemoryLog {
    records: Mutex<VecDeque<LogRecord>>,
    capacity: usize,
    evicted: AtomicU64,
}

/// A logger that stores records in memory.
///
/// Bounded (default cap: 10,000); the oldest records are evicted first. Derived loggers from
/// [`Logger::with`] write into the same buffer.
#[derive(Debug, Clone)]
pub struct MemoryLogger {
    log: Arc<MemoryLog>,
    prefix: Vec<Field>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            log: Arc::new(MemoryLog {
                records: Mutex::new(VecDeque::new()),
                capacity: capacity.max(1),
                evicted: AtomicU64::new(0),
            }),
            prefix: Vec::new(),
        }
    }

    /// Snapshot of all records.
    pub fn records(&self) -> Vec<LogRecord> {
        self.log.records.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }

    /// Records whose message equals `message`.
    pub fn find(&self, message: &str) -> Vec<LogRecord> {
        self.records().into_iter().filter(|r| r.message == message).collect()
    }

    pub fn clear(&self) {
        self.log.records.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Number of records dropped to respect the capacity.
    pub fn evicted(&self) -> u64 {
        self.log.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemoryLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, message: &str, fields: &[Field]) {
        let mut all = self.prefix.clone();
        all.extend_from_slice(fields);
        let mut guard = self.log.records.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.len() >= self.log.capacity {
            guard.pop_front();
            self.log.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push_back(LogRecord { level, message: message.to_owned(), fields: all });
    }

    fn with(&self, fields: Vec<Field>) -> Arc<dyn Logger> {
        let mut prefix = self.prefix.clone();
        prefix.extend(fields);
        Arc::new(MemoryLogger { log: self.log.clone(), prefix })
    }
}
