//! Queued, level-filtered log stream for batch runs.
//!
//! The [`AsyncLogger`] is the user-facing record of what a batch did: one line
//! per event, written to up to three targets.
//!
//! | Target | Receives |
//! |---|---|
//! | log file (append) | every entry at or above the minimum level |
//! | console callback | every entry at or above the minimum level |
//! | listeners | only entries logged with `notify = true` |
//!
//! ## Threading
//!
//! ```text
//! caller ──try_send──▶ bounded queue ──▶ consumer thread ──▶ file / callback / listeners
//!    │ (queue full)
//!    └──────────── write synchronously on the calling thread
//! ```
//!
//! `log()` never blocks on a slow sink: when the queue is full the caller does
//! the write itself. [`AsyncLogger::shutdown`] closes the queue, lets the
//! consumer drain what is left, and joins it. Entries logged after shutdown are
//! written synchronously.
//!
//! Every entry is also mirrored into `tracing`, so developer diagnostics
//! installed through [`init_tracing`] see the same stream.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default capacity of the entry queue.
pub const DEFAULT_QUEUE_SIZE: usize = 1000;

/// Severity of a log entry, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Success = 2,
    Warning = 3,
    Error = 4,
}

impl LogLevel {
    pub fn name(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Success,
            3 => LogLevel::Warning,
            _ => LogLevel::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One accepted log event.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
    pub notify: bool,
}

impl LogEntry {
    /// `[2024-05-01 09:30:00] WARNING: message`
    pub fn formatted(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Callback invoked with the formatted line and its level.
pub type ConsoleCallback = Box<dyn Fn(&str, LogLevel) + Send + Sync>;

/// Listener invoked with the raw message and its level.
pub type Listener = Arc<dyn Fn(&str, LogLevel) + Send + Sync>;

/// Handle returned by [`AsyncLogger::add_listener`], used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Construction parameters for [`AsyncLogger`].
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Append-only log file. `None` disables the file target.
    pub log_file: Option<PathBuf>,
    pub min_level: LogLevel,
    pub queue_size: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            min_level: LogLevel::Info,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

enum Message {
    Entry(LogEntry),
    Flush(SyncSender<()>),
}

/// Output targets shared between callers and the consumer thread.
struct Sinks {
    log_file: Option<PathBuf>,
    console: RwLock<Option<ConsoleCallback>>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
}

impl Sinks {
    fn write(&self, entry: &LogEntry) {
        let line = entry.formatted();
        mirror_to_tracing(entry);

        if let Some(path) = &self.log_file {
            let written = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| writeln!(file, "{line}"));
            if let Err(e) = written {
                tracing::warn!("failed to append to log file {}: {e}", path.display());
            }
        }

        if let Ok(console) = self.console.read()
            && let Some(callback) = console.as_ref()
        {
            callback(&line, entry.level);
        }

        if entry.notify {
            // Snapshot so a listener may add/remove listeners without deadlocking.
            let listeners: Vec<Listener> = match self.listeners.read() {
                Ok(guard) => guard.iter().map(|(_, l)| Arc::clone(l)).collect(),
                Err(_) => Vec::new(),
            };
            for listener in listeners {
                listener(&entry.message, entry.level);
            }
        }
    }
}

fn mirror_to_tracing(entry: &LogEntry) {
    let msg = entry.message.as_str();
    match entry.level {
        LogLevel::Debug => tracing::debug!(target: "tiftiff::log", "{msg}"),
        LogLevel::Info | LogLevel::Success => tracing::info!(target: "tiftiff::log", "{msg}"),
        LogLevel::Warning => tracing::warn!(target: "tiftiff::log", "{msg}"),
        LogLevel::Error => tracing::error!(target: "tiftiff::log", "{msg}"),
    }
}

/// Queued logger with a single background consumer.
///
/// Construct one per application run and share it by `Arc`; there is no
/// process-wide instance.
pub struct AsyncLogger {
    sinks: Arc<Sinks>,
    min_level: AtomicU8,
    next_listener: AtomicU64,
    sender: RwLock<Option<SyncSender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncLogger {
    /// Start a logger and its consumer thread.
    ///
    /// Creates the log file's parent directory when a file target is set.
    pub fn new(config: LoggerConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.log_file.as_deref().and_then(|p| p.parent())
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let sinks = Arc::new(Sinks {
            log_file: config.log_file,
            console: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
        });

        let (tx, rx) = mpsc::sync_channel(config.queue_size);
        let worker_sinks = Arc::clone(&sinks);
        let worker = std::thread::Builder::new()
            .name("tiftiff-log".into())
            .spawn(move || consume(rx, &worker_sinks))?;

        Ok(Self {
            sinks,
            min_level: AtomicU8::new(config.min_level as u8),
            next_listener: AtomicU64::new(0),
            sender: RwLock::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// A logger with no file target and default settings.
    pub fn console_only() -> std::io::Result<Self> {
        Self::new(LoggerConfig::default())
    }

    pub fn set_min_level(&self, level: LogLevel) {
        self.min_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn min_level(&self) -> LogLevel {
        LogLevel::from_u8(self.min_level.load(Ordering::Relaxed))
    }

    pub fn set_console_callback(&self, callback: Option<ConsoleCallback>) {
        if let Ok(mut console) = self.sinks.console.write() {
            *console = callback;
        }
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&str, LogLevel) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.sinks.listeners.write() {
            listeners.push((id, Arc::new(listener)));
        }
        id
    }

    /// Returns `false` if the listener was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        match self.sinks.listeners.write() {
            Ok(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|(lid, _)| *lid != id);
                listeners.len() != before
            }
            Err(_) => false,
        }
    }

    /// Record a message. Entries below the minimum level are dropped here,
    /// before they reach the queue.
    pub fn log(&self, message: impl Into<String>, level: LogLevel, notify: bool) {
        if level < self.min_level() {
            return;
        }
        let entry = LogEntry {
            timestamp: Local::now(),
            level,
            message: message.into(),
            notify,
        };

        let pending = match self.sender.read() {
            Ok(guard) => match guard.as_ref() {
                Some(tx) => match tx.try_send(Message::Entry(entry)) {
                    Ok(()) => None,
                    Err(TrySendError::Full(Message::Entry(e)))
                    | Err(TrySendError::Disconnected(Message::Entry(e))) => Some(e),
                    Err(_) => None,
                },
                None => Some(entry),
            },
            Err(_) => Some(entry),
        };

        // Backpressure: the caller pays for the write instead of blocking.
        if let Some(entry) = pending {
            self.sinks.write(&entry);
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Debug, false);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Info, true);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Success, true);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Warning, true);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Error, true);
    }

    /// Block until every entry queued before this call has been written.
    pub fn flush(&self) {
        let tx = match self.sender.read() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        let Some(tx) = tx else { return };
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if tx.send(Message::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Close the queue, drain the remaining entries, and join the consumer.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.write() {
            sender.take();
        }
        let handle = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::error!("log consumer thread panicked");
        }
    }
}

impl Drop for AsyncLogger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn consume(rx: Receiver<Message>, sinks: &Sinks) {
    // recv() keeps returning buffered messages after the sender is dropped,
    // so the loop drains before exiting.
    while let Ok(message) = rx.recv() {
        match message {
            Message::Entry(entry) => sinks.write(&entry),
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

/// Install the `tracing` subscriber used by the binary.
///
/// Filtering follows `RUST_LOG`, defaulting to `info`. Returns `false` if a
/// global subscriber was already installed (e.g. by a test harness).
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .is_ok()
}
