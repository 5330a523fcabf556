use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClusterClient, ListFilters, ResourceEventStream};
use crate::error::{AppError, AppResult, RetryPolicy};
use crate::message::Observers;
use crate::model::{NamespaceScope, ResourceTab, RowData};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ResourceEventKind {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEvent {
    pub kind: ResourceEventKind,
    pub tab: ResourceTab,
    pub resource: RowData,
    pub timestamp: DateTime<Local>,
    /// Watch generation that produced the event.
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchUpdate {
    Event(ResourceEvent),
    Failed {
        tab: ResourceTab,
        generation: u64,
        error: AppError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub queue_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            queue_capacity: 1024,
        }
    }
}

struct WatchHandle {
    scope: NamespaceScope,
    generation: u64,
    polling: bool,
    token: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct WatchRegistry {
    handles: HashMap<ResourceTab, WatchHandle>,
    next_generation: u64,
}

type SharedRegistry = Arc<Mutex<WatchRegistry>>;

fn lock(registry: &SharedRegistry) -> MutexGuard<'_, WatchRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct WatchService {
    client: Arc<dyn ClusterClient>,
    config: WatchConfig,
    registry: SharedRegistry,
    observers: Observers<WatchUpdate>,
}

impl WatchService {
    pub fn new(client: Arc<dyn ClusterClient>, config: WatchConfig) -> Self {
        let observers = Observers::new(config.queue_capacity);
        Self {
            client,
            config,
            registry: Arc::new(Mutex::new(WatchRegistry::default())),
            observers,
        }
    }

    pub fn subscribe(&self) -> tokio::sync::mpsc::Receiver<WatchUpdate> {
        self.observers.subscribe()
    }

    /// Watches `tab` in `scope`, replacing any watch already running for the tab.
    pub fn start_watching(&self, tab: ResourceTab, scope: NamespaceScope) -> u64 {
        let mut registry = lock(&self.registry);
        if let Some(previous) = registry.handles.remove(&tab) {
            info!(
                tab = tab.title(),
                scope = %previous.scope,
                generation = previous.generation,
                "replacing watch"
            );
            previous.token.cancel();
        }

        registry.next_generation += 1;
        let generation = registry.next_generation;
        let token = CancellationToken::new();
        let task = tokio::spawn(run_watch(WatchTask {
            client: Arc::clone(&self.client),
            tab,
            scope: scope.clone(),
            generation,
            token: token.clone(),
            registry: Arc::clone(&self.registry),
            observers: self.observers.clone(),
            config: self.config.clone(),
        }));

        info!(tab = tab.title(), scope = %scope, generation, "watch started");
        registry.handles.insert(
            tab,
            WatchHandle {
                scope,
                generation,
                polling: false,
                token,
                task,
            },
        );
        generation
    }

    pub fn stop_watching(&self, tab: ResourceTab) -> bool {
        match lock(&self.registry).handles.remove(&tab) {
            Some(handle) => {
                handle.token.cancel();
                info!(tab = tab.title(), "watch stopped");
                true
            }
            None => false,
        }
    }

    pub fn stop_all_watchers(&self) -> usize {
        let handles = lock(&self.registry).handles.drain().collect::<Vec<_>>();
        for (_, handle) in &handles {
            handle.token.cancel();
        }
        if !handles.is_empty() {
            info!(count = handles.len(), "stopped all watches");
        }
        handles.len()
    }

    #[cfg(test)]
    pub fn is_watching(&self, tab: ResourceTab) -> bool {
        lock(&self.registry)
            .handles
            .get(&tab)
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// True while the live watch for `tab` runs on the polling fallback.
    pub fn is_polling(&self, tab: ResourceTab) -> bool {
        lock(&self.registry)
            .handles
            .get(&tab)
            .is_some_and(|handle| handle.polling && !handle.task.is_finished())
    }

    #[cfg(test)]
    pub fn active_watchers(&self) -> usize {
        lock(&self.registry).handles.len()
    }

    pub fn generation(&self, tab: ResourceTab) -> Option<u64> {
        lock(&self.registry)
            .handles
            .get(&tab)
            .map(|handle| handle.generation)
    }

    /// Re-lists `tab` and emits a Modified event for every item, in listing order.
    pub async fn refresh_resource(
        &self,
        tab: ResourceTab,
        scope: &NamespaceScope,
    ) -> AppResult<usize> {
        let generation = self.generation(tab).unwrap_or(0);
        emit_listing(self.client.as_ref(), &self.observers, tab, scope, generation).await
    }
}

async fn emit_listing(
    client: &dyn ClusterClient,
    observers: &Observers<WatchUpdate>,
    tab: ResourceTab,
    scope: &NamespaceScope,
    generation: u64,
) -> AppResult<usize> {
    let listing = client
        .list_resources(tab, scope, &ListFilters::default())
        .await?;
    let count = listing.rows.len();
    for row in listing.rows {
        observers
            .deliver(WatchUpdate::Event(ResourceEvent {
                kind: ResourceEventKind::Modified,
                tab,
                resource: row,
                timestamp: Local::now(),
                generation,
            }))
            .await;
    }
    debug!(tab = tab.title(), count, "polled listing");
    Ok(count)
}

struct WatchTask {
    client: Arc<dyn ClusterClient>,
    tab: ResourceTab,
    scope: NamespaceScope,
    generation: u64,
    token: CancellationToken,
    registry: SharedRegistry,
    observers: Observers<WatchUpdate>,
    config: WatchConfig,
}

impl WatchTask {
    async fn forward(&self, mut events: ResourceEventStream, attempt: &mut u32) -> AppResult<()> {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(()),
                next = events.next() => next,
            };
            match next {
                Some(Ok(event)) => {
                    *attempt = 0;
                    let update = WatchUpdate::Event(ResourceEvent {
                        kind: event.kind,
                        tab: self.tab,
                        resource: event.row,
                        timestamp: Local::now(),
                        generation: self.generation,
                    });
                    tokio::select! {
                        biased;
                        _ = self.token.cancelled() => return Ok(()),
                        _ = self.observers.deliver(update) => {}
                    }
                }
                Some(Err(error)) => return Err(error),
                None => return Ok(()),
            }
        }
    }

    async fn poll(&self, attempt: &mut u32) -> AppResult<()> {
        loop {
            let listed = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(()),
                listed = emit_listing(
                    self.client.as_ref(),
                    &self.observers,
                    self.tab,
                    &self.scope,
                    self.generation,
                ) => listed,
            };
            listed?;
            *attempt = 0;

            tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    fn mark_polling(&self) {
        let mut registry = lock(&self.registry);
        if let Some(handle) = registry.handles.get_mut(&self.tab)
            && handle.generation == self.generation
        {
            handle.polling = true;
        }
    }

    fn retire(&self) {
        let mut registry = lock(&self.registry);
        let current = registry
            .handles
            .get(&self.tab)
            .is_some_and(|handle| handle.generation == self.generation);
        if current {
            registry.handles.remove(&self.tab);
        }
    }
}

async fn run_watch(task: WatchTask) {
    let mut attempt = 0u32;
    loop {
        let opened = tokio::select! {
            biased;
            _ = task.token.cancelled() => return,
            opened = task.client.watch(task.tab, &task.scope) => opened,
        };

        let result = match opened {
            Ok(Some(events)) => {
                debug!(tab = task.tab.title(), "native watch opened");
                task.forward(events, &mut attempt).await
            }
            Ok(None) => {
                debug!(tab = task.tab.title(), "native watch unsupported, polling");
                task.mark_polling();
                task.poll(&mut attempt).await
            }
            Err(error) => Err(error),
        };

        if task.token.is_cancelled() {
            debug!(tab = task.tab.title(), generation = task.generation, "watch cancelled");
            return;
        }

        let delay = match result {
            Ok(()) => {
                debug!(tab = task.tab.title(), "watch stream closed, reconnecting");
                task.config.retry.initial_delay
            }
            Err(error) => {
                attempt += 1;
                if !error.is_retryable() || attempt >= task.config.retry.max_attempts.max(1) {
                    warn!(tab = task.tab.title(), attempt, error = %error, "watch failed");
                    task.retire();
                    let update = WatchUpdate::Failed {
                        tab: task.tab,
                        generation: task.generation,
                        error,
                    };
                    tokio::select! {
                        biased;
                        _ = task.token.cancelled() => {}
                        _ = task.observers.deliver(update) => {}
                    }
                    return;
                }
                let delay = task.config.retry.delay_for(attempt - 1);
                warn!(
                    tab = task.tab.title(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "watch error, reconnecting"
                );
                delay
            }
        };

        tokio::select! {
            biased;
            _ = task.token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
