use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossterm::event::{KeyEvent, MouseEvent};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::client::{ClusterInfo, ResourceList};
use crate::error::{AppError, AppResult};
use crate::logs::{LogUpdate, StreamKey};
use crate::model::{NamespaceScope, ResourceTab, RowData};
use crate::watch::{ResourceEvent, WatchUpdate};

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_MAX_BATCH_AGE: Duration = Duration::from_millis(200);

/// Everything the runtime reacts to.
#[derive(Debug, Clone)]
pub enum Msg {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize { width: u16, height: u16 },
    Tick,
    Quit,
    Fatal(AppError),
    TableLoaded {
        tab: ResourceTab,
        scope: NamespaceScope,
        result: AppResult<ResourceList>,
    },
    DetailLoaded {
        tab: ResourceTab,
        result: AppResult<RowData>,
    },
    Resource(ResourceEvent),
    WatchFailed {
        tab: ResourceTab,
        generation: u64,
        error: AppError,
    },
    LogsAppended { key: StreamKey, count: usize },
    LogStreamEnded { key: StreamKey },
    LogStreamFailed { key: StreamKey, error: AppError },
    LogTargetResolved { result: AppResult<StreamKey> },
    OperationCompleted { status: String, refresh: bool },
    OperationFailed(AppError),
    ConnectionRestored { version: String },
    ClusterChanged(ClusterInfo),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub enum Priority {
    Low,
    Normal,
    Critical,
}

impl Msg {
    pub fn priority(&self) -> Priority {
        match self {
            Self::Quit | Self::Fatal(_) => Priority::Critical,
            Self::Tick | Self::Resource(_) | Self::LogsAppended { .. } => Priority::Low,
            _ => Priority::Normal,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Key(_) => "key",
            Self::Mouse(_) => "mouse",
            Self::Resize { .. } => "resize",
            Self::Tick => "tick",
            Self::Quit => "quit",
            Self::Fatal(_) => "fatal",
            Self::TableLoaded { .. } => "table-loaded",
            Self::DetailLoaded { .. } => "detail-loaded",
            Self::Resource(_) => "resource-event",
            Self::WatchFailed { .. } => "watch-failed",
            Self::LogsAppended { .. } => "logs-appended",
            Self::LogStreamEnded { .. } => "log-stream-ended",
            Self::LogStreamFailed { .. } => "log-stream-failed",
            Self::LogTargetResolved { .. } => "log-target",
            Self::OperationCompleted { .. } => "operation-completed",
            Self::OperationFailed(_) => "operation-failed",
            Self::ConnectionRestored { .. } => "connection-restored",
            Self::ClusterChanged(_) => "cluster-changed",
        }
    }
}

impl From<LogUpdate> for Msg {
    fn from(update: LogUpdate) -> Self {
        match update {
            LogUpdate::Appended { key, count } => Self::LogsAppended { key, count },
            LogUpdate::Ended { key } => Self::LogStreamEnded { key },
            LogUpdate::Failed { key, error } => Self::LogStreamFailed { key, error },
        }
    }
}

impl From<WatchUpdate> for Msg {
    fn from(update: WatchUpdate) -> Self {
        match update {
            WatchUpdate::Event(event) => Self::Resource(event),
            WatchUpdate::Failed {
                tab,
                generation,
                error,
            } => Self::WatchFailed {
                tab,
                generation,
                error,
            },
        }
    }
}

/// What the runtime should process next, in order.
#[derive(Debug, Clone)]
pub enum Dispatch {
    Critical(Msg),
    Batch(Vec<Msg>),
    Single(Msg),
}

#[derive(Debug)]
pub struct MessageHandler {
    pending: Vec<Msg>,
    oldest: Option<Instant>,
    batch_size: usize,
    max_batch_age: Duration,
}

impl Default for MessageHandler {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, DEFAULT_MAX_BATCH_AGE)
    }
}

impl MessageHandler {
    pub fn new(batch_size: usize, max_batch_age: Duration) -> Self {
        Self {
            pending: Vec::new(),
            oldest: None,
            batch_size: batch_size.max(1),
            max_batch_age,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn handle(&mut self, msg: Msg, now: Instant) -> Vec<Dispatch> {
        match msg.priority() {
            Priority::Critical => {
                debug!(message = msg.name(), pending = self.pending.len(), "critical message");
                vec![Dispatch::Critical(msg)]
            }
            Priority::Low => {
                if self.pending.is_empty() {
                    self.oldest = Some(now);
                }
                self.pending.push(msg);
                if self.pending.len() >= self.batch_size {
                    self.flush().into_iter().collect()
                } else {
                    Vec::new()
                }
            }
            Priority::Normal => {
                let mut out = self.flush().into_iter().collect::<Vec<_>>();
                out.push(Dispatch::Single(msg));
                out
            }
        }
    }

    /// Flushes a partial batch whose oldest message has waited too long.
    pub fn flush_due(&mut self, now: Instant) -> Option<Dispatch> {
        let oldest = self.oldest?;
        if now.saturating_duration_since(oldest) >= self.max_batch_age {
            self.flush()
        } else {
            None
        }
    }

    pub fn flush(&mut self) -> Option<Dispatch> {
        if self.pending.is_empty() {
            return None;
        }
        self.oldest = None;
        let batch = std::mem::take(&mut self.pending);
        trace!(size = batch.len(), "flushing batch");
        Some(Dispatch::Batch(batch))
    }
}

/// Bounded fan-out queues owned by a background service. `notify` drops the
/// update on a full queue, `deliver` waits for room. Closed queues are pruned.
pub struct Observers<T> {
    senders: Arc<Mutex<Vec<mpsc::Sender<T>>>>,
    capacity: usize,
}

impl<T> Clone for Observers<T> {
    fn clone(&self) -> Self {
        Self {
            senders: Arc::clone(&self.senders),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone + Send + 'static> Observers<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            senders: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Sends to every observer, waiting while a queue is full.
    pub async fn deliver(&self, update: T) {
        let senders = self
            .senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut closed = false;
        for tx in &senders {
            if tx.send(update.clone()).await.is_err() {
                closed = true;
            }
        }
        if closed {
            self.senders
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|tx| !tx.is_closed());
        }
    }

    /// Sends without waiting. Use only for updates whose data the sender keeps.
    pub fn notify(&self, update: T) {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        senders.retain(|tx| match tx.try_send(update.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!("observer queue full, dropping update");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{Dispatch, MessageHandler, Msg, Observers};
    use std::time::{Duration, Instant};

    fn batch_len(dispatch: &Dispatch) -> Option<usize> {
        match dispatch {
            Dispatch::Batch(batch) => Some(batch.len()),
            _ => None,
        }
    }

    #[test]
    fn five_ticks_flush_as_one_batch() {
        let mut handler = MessageHandler::default();
        let now = Instant::now();

        for _ in 0..4 {
            assert!(handler.handle(Msg::Tick, now).is_empty());
        }
        let out = handler.handle(Msg::Tick, now);
        assert_eq!(out.len(), 1);
        assert_eq!(batch_len(&out[0]), Some(5));
        assert_eq!(handler.pending_len(), 0);
    }

    #[test]
    fn quit_preempts_pending_batch() {
        let mut handler = MessageHandler::default();
        let now = Instant::now();

        handler.handle(Msg::Tick, now);
        handler.handle(Msg::Tick, now);
        let out = handler.handle(Msg::Quit, now);

        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Dispatch::Critical(Msg::Quit)));
        assert_eq!(handler.pending_len(), 2);
    }

    #[test]
    fn normal_message_flushes_pending_first() {
        let mut handler = MessageHandler::default();
        let now = Instant::now();

        handler.handle(Msg::Tick, now);
        let out = handler.handle(
            Msg::Resize {
                width: 80,
                height: 24,
            },
            now,
        );

        assert_eq!(out.len(), 2);
        assert_eq!(batch_len(&out[0]), Some(1));
        assert!(matches!(out[1], Dispatch::Single(Msg::Resize { .. })));
    }

    #[test]
    fn partial_batch_flushes_when_stale() {
        let mut handler = MessageHandler::new(5, Duration::from_millis(200));
        let now = Instant::now();

        handler.handle(Msg::Tick, now);
        assert!(handler.flush_due(now + Duration::from_millis(100)).is_none());
        let flushed = handler.flush_due(now + Duration::from_millis(250));
        assert_eq!(flushed.as_ref().and_then(batch_len), Some(1));
        assert!(handler.flush().is_none());
    }

    #[tokio::test]
    async fn observers_drop_when_full_and_prune_when_closed() {
        let observers = Observers::<u32>::new(2);
        let mut kept = observers.subscribe();
        let closed = observers.subscribe();
        drop(closed);

        observers.notify(1);
        observers.notify(2);
        observers.notify(3);

        assert_eq!(observers.len(), 1);
        assert_eq!(kept.recv().await, Some(1));
        assert_eq!(kept.recv().await, Some(2));
        assert!(kept.try_recv().is_err());
    }

    #[tokio::test]
    async fn deliver_waits_for_room_instead_of_dropping() {
        let observers = Observers::<u32>::new(1);
        let mut rx = observers.subscribe();
        let closed = observers.subscribe();
        drop(closed);

        let sender = observers.clone();
        let producer = tokio::spawn(async move {
            for value in 0..5 {
                sender.deliver(value).await;
            }
        });

        let mut received = Vec::new();
        while received.len() < 5 {
            match rx.recv().await {
                Some(value) => received.push(value),
                None => break,
            }
        }
        producer.await.expect("producer");

        assert_eq!(received, vec![0, 1, 2, 3, 4]);
        assert_eq!(observers.len(), 1);
    }
}
