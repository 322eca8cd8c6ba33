//! Non-blocking, ordered event log backed by SQLite.
//!
//! Any number of producers call [`EventLog::enqueue`] (or the `info` /
//! `warning` / `error` shorthands). Events go onto an unbounded channel and a
//! single background task writes them to the `logs` table, so producers
//! never wait on the database and the table has exactly one writer.
//!
//! # Ordering
//!
//! The channel is FIFO and there is one consumer, so events from a single
//! producer are stored in the order they were enqueued. Interleaving between
//! producers follows arrival order at the channel.
//!
//! # Shutdown
//!
//! [`EventLog::shutdown`] must be awaited before the process exits. It waits
//! until every event enqueued before the call has been written. Events
//! enqueued afterwards are dropped.
//!
//! Every event is also mirrored to `tracing`, which keeps a diagnostic trail
//! when the database itself is unavailable.

mod store;

pub use store::LogStore;
pub(crate) use store::LOGS_TABLE_DDL;

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Upper bound on events written per transaction.
const MAX_BATCH: usize = 256;

// ============================================================================
// Event Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown log level: {0}")]
pub struct UnknownLevel(String);

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(UnknownLevel(other.to_string())),
        }
    }
}

/// One diagnostic event. Never mutated once enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Unix milliseconds at enqueue time.
    pub timestamp: i64,
    pub level: LogLevel,
    pub message: String,
}

enum Command {
    Event(LogEvent),
    Shutdown,
}

// ============================================================================
// EventLog
// ============================================================================

/// Producer handle for the event log. Cheap to clone; all clones feed the
/// same background writer.
#[derive(Clone)]
pub struct EventLog {
    tx: mpsc::UnboundedSender<Command>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EventLog {
    /// Start the background writer on `store`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: LogStore) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_writer(store, rx));
        Self {
            tx,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Queue an event for writing. Returns immediately and never fails; after
    /// shutdown the event is dropped.
    pub fn enqueue(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(target: "event_log", "{}", message),
            LogLevel::Warning => tracing::warn!(target: "event_log", "{}", message),
            LogLevel::Error => tracing::error!(target: "event_log", "{}", message),
        }

        let event = LogEvent {
            timestamp: chrono::Utc::now().timestamp_millis(),
            level,
            message,
        };
        if self.tx.send(Command::Event(event)).is_err() {
            tracing::debug!(level = %level, "Event log already shut down, dropping event");
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.enqueue(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.enqueue(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.enqueue(LogLevel::Error, message);
    }

    /// Drain every event enqueued before this call, then stop the writer.
    ///
    /// Safe to call more than once and from any clone. Only the first caller
    /// waits for the drain; later calls return immediately.
    pub async fn shutdown(&self) {
        // Err only when the writer already stopped
        let _ = self.tx.send(Command::Shutdown);

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Event log writer terminated abnormally");
            }
        }
    }
}

async fn run_writer(store: LogStore, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut batch: Vec<LogEvent> = Vec::with_capacity(MAX_BATCH);

    // None: every producer handle was dropped without an explicit shutdown
    while let Some(command) = rx.recv().await {
        let mut stop = matches!(command, Command::Shutdown);
        if let Command::Event(event) = command {
            batch.push(event);
        }

        // Opportunistically take whatever else is already buffered
        while !stop && batch.len() < MAX_BATCH {
            match rx.try_recv() {
                Ok(Command::Event(event)) => batch.push(event),
                Ok(Command::Shutdown) => stop = true,
                Err(_) => break,
            }
        }

        write_batch(&store, &mut batch).await;

        if stop {
            break;
        }
    }

    rx.close();
    let mut dropped = 0usize;
    while let Ok(command) = rx.try_recv() {
        if matches!(command, Command::Event(_)) {
            dropped += 1;
        }
    }
    if dropped > 0 {
        tracing::debug!(dropped = dropped, "Discarded events enqueued after shutdown");
    }
    tracing::debug!("Event log writer stopped");
}

/// Write a batch in one transaction. If that fails, retry event by event so
/// one bad write only loses itself.
async fn write_batch(store: &LogStore, batch: &mut Vec<LogEvent>) {
    if batch.is_empty() {
        return;
    }

    if let Err(e) = store.append(batch.as_slice()).await {
        tracing::warn!(
            error = %e,
            events = batch.len(),
            "Batched log write failed, retrying individually"
        );
        for event in batch.iter() {
            if let Err(e) = store.append(std::slice::from_ref(event)).await {
                tracing::error!(
                    error = %e,
                    level = %event.level,
                    message = %event.message,
                    "Failed to log to database"
                );
            }
        }
    }

    batch.clear();
}
