use std::collections::{HashMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClusterClient, LogOptions};
use crate::error::AppError;
use crate::message::Observers;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub namespace: String,
    pub pod: String,
    pub container: Option<String>,
}

impl StreamKey {
    pub fn new(namespace: impl Into<String>, pod: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: None,
        }
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Label shown next to each line, `pod:container`.
    pub fn source_label(&self) -> String {
        match &self.container {
            Some(container) => format!("{}:{container}", self.pod),
            None => self.pod.clone(),
        }
    }
}

impl Display for StreamKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.source_label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            Self::Debug => "DBG",
            Self::Info => "INF",
            Self::Warn => "WRN",
            Self::Error => "ERR",
        }
    }
}

pub fn detect_level(text: &str) -> LogLevel {
    let lower = text.to_lowercase();

    if lower.contains("error")
        || lower.contains("fatal")
        || lower.contains("panic")
        || lower.contains("exception")
        || lower.contains("level=err")
    {
        return LogLevel::Error;
    }

    if lower.contains("warn") || lower.contains("deprecat") {
        return LogLevel::Warn;
    }

    if lower.contains("debug") || lower.contains("trace") {
        return LogLevel::Debug;
    }

    LogLevel::Info
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
    pub source: String,
}

impl LogEntry {
    /// Splits an optional RFC 3339 timestamp prefix off a raw log line.
    pub fn parse(line: &str, source: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let (timestamp, message) = match line.split_once(' ') {
            Some((prefix, rest)) => match DateTime::parse_from_rfc3339(prefix) {
                Ok(parsed) => (parsed.with_timezone(&Local), rest),
                Err(_) => (Local::now(), line),
            },
            None => (Local::now(), line),
        };

        Self {
            timestamp,
            level: detect_level(message),
            message: message.to_string(),
            source: source.to_string(),
        }
    }

    pub fn matches_filter(&self, pattern: &str) -> bool {
        let pattern = pattern.trim();
        pattern.is_empty()
            || self
                .message
                .to_lowercase()
                .contains(&pattern.to_lowercase())
    }
}

/// Fixed-capacity ring of the most recent entries.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = LogEntry>) {
        for entry in entries {
            self.push(entry);
        }
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogUpdate {
    Appended { key: StreamKey, count: usize },
    Ended { key: StreamKey },
    Failed { key: StreamKey, error: AppError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogStreamConfig {
    pub capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub tail_lines: i64,
    pub queue_capacity: usize,
}

impl Default for LogStreamConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            batch_size: 10,
            flush_interval: Duration::from_millis(100),
            tail_lines: 200,
            queue_capacity: 256,
        }
    }
}

pub struct StreamHandle {
    pub generation: u64,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl StreamHandle {
    fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[derive(Default)]
struct StreamRegistry {
    buffers: HashMap<StreamKey, LogBuffer>,
    handles: HashMap<StreamKey, StreamHandle>,
    next_generation: u64,
}

type SharedRegistry = Arc<Mutex<StreamRegistry>>;

fn lock(registry: &SharedRegistry) -> MutexGuard<'_, StreamRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct LogStreamService {
    client: Arc<dyn ClusterClient>,
    config: LogStreamConfig,
    registry: SharedRegistry,
    observers: Observers<LogUpdate>,
}

impl LogStreamService {
    pub fn new(client: Arc<dyn ClusterClient>, config: LogStreamConfig) -> Self {
        let observers = Observers::new(config.queue_capacity);
        Self {
            client,
            config,
            registry: Arc::new(Mutex::new(StreamRegistry::default())),
            observers,
        }
    }

    pub fn subscribe(&self) -> tokio::sync::mpsc::Receiver<LogUpdate> {
        self.observers.subscribe()
    }

    /// Starts tailing `key`, cancelling any stream already running for it.
    /// Returns the generation assigned to the new stream.
    pub fn start_streaming(&self, key: StreamKey) -> u64 {
        let mut registry = lock(&self.registry);
        if let Some(previous) = registry.handles.remove(&key) {
            info!(stream = %key, generation = previous.generation, "replacing log stream");
            previous.cancel();
        }

        registry.next_generation += 1;
        let generation = registry.next_generation;
        registry
            .buffers
            .insert(key.clone(), LogBuffer::new(self.config.capacity));

        let token = CancellationToken::new();
        let task = tokio::spawn(run_stream(StreamTask {
            client: Arc::clone(&self.client),
            key: key.clone(),
            generation,
            token: token.clone(),
            registry: Arc::clone(&self.registry),
            observers: self.observers.clone(),
            config: self.config.clone(),
        }));

        info!(stream = %key, generation, "log stream started");
        registry.handles.insert(
            key,
            StreamHandle {
                generation,
                token,
                task,
            },
        );
        generation
    }

    pub fn stop_streaming(&self, key: &StreamKey) -> bool {
        let mut registry = lock(&self.registry);
        registry.buffers.remove(key);
        match registry.handles.remove(key) {
            Some(handle) => {
                handle.cancel();
                info!(stream = %key, "log stream stopped");
                true
            }
            None => false,
        }
    }

    pub fn stop_all_streams(&self) -> usize {
        let mut registry = lock(&self.registry);
        registry.buffers.clear();
        let handles = registry.handles.drain().collect::<Vec<_>>();
        for (_, handle) in &handles {
            handle.cancel();
        }
        if !handles.is_empty() {
            info!(count = handles.len(), "stopped all log streams");
        }
        handles.len()
    }

    pub fn is_streaming(&self, key: &StreamKey) -> bool {
        lock(&self.registry)
            .handles
            .get(key)
            .is_some_and(|handle| !handle.is_finished())
    }

    #[cfg(test)]
    pub fn active_streams(&self) -> usize {
        lock(&self.registry).handles.len()
    }

    pub fn snapshot(&self, key: &StreamKey) -> Vec<LogEntry> {
        lock(&self.registry)
            .buffers
            .get(key)
            .map(LogBuffer::snapshot)
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn buffered(&self, key: &StreamKey) -> usize {
        lock(&self.registry)
            .buffers
            .get(key)
            .map(LogBuffer::len)
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn cancellation_token(&self, key: &StreamKey) -> Option<CancellationToken> {
        lock(&self.registry)
            .handles
            .get(key)
            .map(|handle| handle.token.clone())
    }
}

struct StreamTask {
    client: Arc<dyn ClusterClient>,
    key: StreamKey,
    generation: u64,
    token: CancellationToken,
    registry: SharedRegistry,
    observers: Observers<LogUpdate>,
    config: LogStreamConfig,
}

impl StreamTask {
    /// Appends the batch if this task still owns the key.
    fn commit(&self, batch: &mut Vec<LogEntry>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        {
            let mut registry = lock(&self.registry);
            let current = registry
                .handles
                .get(&self.key)
                .is_some_and(|handle| handle.generation == self.generation);
            if !current {
                batch.clear();
                return;
            }
            registry
                .buffers
                .entry(self.key.clone())
                .or_insert_with(|| LogBuffer::new(self.config.capacity))
                .extend(batch.drain(..));
        }
        self.observers.notify(LogUpdate::Appended {
            key: self.key.clone(),
            count,
        });
    }

    /// Terminal updates carry no buffered data, so they wait for queue room.
    async fn finish(&self, update: LogUpdate) {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {}
            _ = self.observers.deliver(update) => {}
        }
    }

    fn retire(&self) {
        let mut registry = lock(&self.registry);
        let current = registry
            .handles
            .get(&self.key)
            .is_some_and(|handle| handle.generation == self.generation);
        if current {
            registry.handles.remove(&self.key);
        }
    }
}

async fn run_stream(task: StreamTask) {
    let options = LogOptions {
        tail_lines: Some(task.config.tail_lines),
        ..LogOptions::default()
    };

    let opened = tokio::select! {
        biased;
        _ = task.token.cancelled() => {
            debug!(stream = %task.key, "log stream cancelled before open");
            return;
        }
        result = task.client.stream_logs(&task.key, &options) => result,
    };

    let mut lines = match opened {
        Ok(lines) => lines,
        Err(error) => {
            warn!(stream = %task.key, error = %error, "log stream failed to open");
            task.retire();
            task.finish(LogUpdate::Failed {
                key: task.key.clone(),
                error,
            })
            .await;
            return;
        }
    };

    let source = task.key.source_label();
    let batch_size = task.config.batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);
    let mut deadline: Option<Instant> = None;

    loop {
        let flush_timer = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = task.token.cancelled() => {
                debug!(stream = %task.key, generation = task.generation, "log stream cancelled");
                return;
            }
            _ = flush_timer => {
                task.commit(&mut batch);
                deadline = None;
            }
            next = lines.next() => match next {
                Some(Ok(line)) => {
                    batch.push(LogEntry::parse(&line, &source));
                    if batch.len() == 1 {
                        deadline = Some(Instant::now() + task.config.flush_interval);
                    }
                    if batch.len() >= batch_size {
                        task.commit(&mut batch);
                        deadline = None;
                    }
                }
                Some(Err(error)) => {
                    task.commit(&mut batch);
                    warn!(stream = %task.key, error = %error, "log stream failed");
                    task.retire();
                    task.finish(LogUpdate::Failed {
                        key: task.key.clone(),
                        error,
                    })
                    .await;
                    return;
                }
                None => {
                    task.commit(&mut batch);
                    info!(stream = %task.key, "log stream ended");
                    task.retire();
                    task.finish(LogUpdate::Ended {
                        key: task.key.clone(),
                    })
                    .await;
                    return;
                }
            },
        }
    }
}
