use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::{StreamExt, stream};

use crate::client::{
    ClusterClient, ClusterInfo, LineStream, ListFilters, LogOptions, ResourceEventStream,
    ResourceList, WatchEvent,
};
use crate::error::{AppError, AppResult};
use crate::logs::StreamKey;
use crate::model::{ClusterFlavor, NamespaceScope, ResourceTab, RowData};

pub fn row(namespace: &str, name: &str) -> RowData {
    RowData {
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
        columns: vec![name.to_string(), "Running".to_string()],
        detail: format!("name: {name}\nnamespace: {namespace}\n"),
    }
}

/// Scripted in-memory cluster.
pub struct FakeClusterClient {
    info: Mutex<ClusterInfo>,
    listings: Mutex<HashMap<ResourceTab, Vec<RowData>>>,
    list_failures: Mutex<VecDeque<AppError>>,
    log_lines: Vec<String>,
    log_never_ends: bool,
    log_error: Option<AppError>,
    native_watch: bool,
    watch_events: Vec<AppResult<WatchEvent>>,
    connectivity_error: Option<AppError>,
    connectivity_hangs: bool,
    deleted: Mutex<Vec<(ResourceTab, String)>>,
    list_calls: AtomicUsize,
    watch_calls: AtomicUsize,
}

impl Default for FakeClusterClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeClusterClient {
    pub fn new() -> Self {
        Self {
            info: Mutex::new(ClusterInfo {
                cluster: "kind-test".to_string(),
                context: "kind-test".to_string(),
                user: "admin".to_string(),
                namespace: "default".to_string(),
                flavor: ClusterFlavor::Kubernetes,
            }),
            listings: Mutex::new(HashMap::new()),
            list_failures: Mutex::new(VecDeque::new()),
            log_lines: Vec::new(),
            log_never_ends: false,
            log_error: None,
            native_watch: false,
            watch_events: Vec::new(),
            connectivity_error: None,
            connectivity_hangs: false,
            deleted: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            watch_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_flavor(self, flavor: ClusterFlavor) -> Self {
        self.info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flavor = flavor;
        self
    }

    pub fn with_rows(self, tab: ResourceTab, rows: Vec<RowData>) -> Self {
        self.set_rows(tab, rows);
        self
    }

    pub fn with_log_lines(mut self, lines: Vec<String>, never_ends: bool) -> Self {
        self.log_lines = lines;
        self.log_never_ends = never_ends;
        self
    }

    pub fn with_log_error(mut self, error: AppError) -> Self {
        self.log_error = Some(error);
        self
    }

    pub fn with_native_watch(mut self, events: Vec<AppResult<WatchEvent>>) -> Self {
        self.native_watch = true;
        self.watch_events = events;
        self
    }

    pub fn with_list_failures(self, failures: Vec<AppError>) -> Self {
        self.list_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(failures);
        self
    }

    pub fn with_connectivity_error(mut self, error: AppError) -> Self {
        self.connectivity_error = Some(error);
        self
    }

    /// Connectivity checks never answer.
    pub fn with_hanging_connectivity(mut self) -> Self {
        self.connectivity_hangs = true;
        self
    }

    pub fn set_rows(&self, tab: ResourceTab, rows: Vec<RowData>) {
        self.listings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tab, rows);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<(ResourceTab, String)> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn rows(&self, tab: ResourceTab) -> Vec<RowData> {
        self.listings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tab)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    fn info(&self) -> ClusterInfo {
        self.info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn list_resources(
        &self,
        tab: ResourceTab,
        scope: &NamespaceScope,
        _filters: &ListFilters,
    ) -> AppResult<ResourceList> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self
            .list_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            return Err(error);
        }

        let rows = self
            .rows(tab)
            .into_iter()
            .filter(|row| match scope {
                NamespaceScope::All => true,
                NamespaceScope::Named(namespace) => {
                    row.namespace.as_deref().is_none_or(|ns| ns == namespace)
                }
            })
            .collect();
        Ok(ResourceList {
            headers: vec!["Name".to_string(), "Status".to_string()],
            rows,
        })
    }

    async fn get_resource(
        &self,
        tab: ResourceTab,
        namespace: Option<&str>,
        name: &str,
    ) -> AppResult<RowData> {
        self.rows(tab)
            .into_iter()
            .find(|row| row.name == name && row.namespace.as_deref() == namespace)
            .ok_or_else(|| AppError::not_found(format!("{} {name} not found", tab.kind())))
    }

    async fn delete_resource(
        &self,
        tab: ResourceTab,
        namespace: Option<&str>,
        name: &str,
    ) -> AppResult<()> {
        let mut rows = self.rows(tab);
        let before = rows.len();
        rows.retain(|row| !(row.name == name && row.namespace.as_deref() == namespace));
        if rows.len() == before {
            return Err(AppError::not_found(format!("{} {name} not found", tab.kind())));
        }
        self.set_rows(tab, rows);
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((tab, name.to_string()));
        Ok(())
    }

    async fn resolve_log_target(&self, tab: ResourceTab, row: &RowData) -> AppResult<StreamKey> {
        if !tab.supports_logs() {
            return Err(AppError::general(format!("{} has no logs", tab.title())));
        }
        Ok(StreamKey::new(
            row.namespace.clone().unwrap_or_else(|| "default".to_string()),
            row.name.clone(),
        ))
    }

    async fn stream_logs(&self, _key: &StreamKey, _options: &LogOptions) -> AppResult<LineStream> {
        if let Some(error) = &self.log_error {
            return Err(error.clone());
        }
        let lines = stream::iter(self.log_lines.clone().into_iter().map(Ok));
        if self.log_never_ends {
            Ok(lines.chain(stream::pending()).boxed())
        } else {
            Ok(lines.boxed())
        }
    }

    async fn watch(
        &self,
        _tab: ResourceTab,
        _scope: &NamespaceScope,
    ) -> AppResult<Option<ResourceEventStream>> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        if !self.native_watch {
            return Ok(None);
        }
        let events = stream::iter(self.watch_events.clone());
        Ok(Some(events.chain(stream::pending()).boxed()))
    }

    async fn check_connectivity(&self) -> AppResult<String> {
        if self.connectivity_hangs {
            return std::future::pending().await;
        }
        match &self.connectivity_error {
            Some(error) => Err(error.clone()),
            None => Ok("v1.31.0".to_string()),
        }
    }

    async fn reload_credentials(&self) -> AppResult<ClusterInfo> {
        Ok(self.info())
    }

    async fn switch_context(&self, context: &str) -> AppResult<ClusterInfo> {
        let mut info = self.info.lock().unwrap_or_else(PoisonError::into_inner);
        info.context = context.to_string();
        Ok(info.clone())
    }
}
