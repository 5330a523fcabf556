use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::AppResult;
use crate::logs::StreamKey;
use crate::model::{ClusterFlavor, NamespaceScope, ResourceTab, RowData};
use crate::watch::ResourceEventKind;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterInfo {
    pub cluster: String,
    pub context: String,
    pub user: String,
    pub namespace: String,
    pub flavor: ClusterFlavor,
}

impl ClusterInfo {
    pub fn summary(&self) -> String {
        format!(
            "{} | {} | {} | ns:{}",
            self.context,
            self.cluster,
            self.flavor.label(),
            self.namespace
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilters {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    /// Page size; listings follow continue tokens until the last page.
    pub limit: Option<u32>,
}

impl Default for ListFilters {
    fn default() -> Self {
        Self {
            label_selector: None,
            field_selector: None,
            limit: Some(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub follow: bool,
    pub timestamps: bool,
    pub tail_lines: Option<i64>,
    pub previous: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            follow: true,
            timestamps: true,
            tail_lines: Some(200),
            previous: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceList {
    pub headers: Vec<String>,
    pub rows: Vec<RowData>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: ResourceEventKind,
    pub row: RowData,
}

/// Log lines and stream failures merged into one source.
pub type LineStream = BoxStream<'static, AppResult<String>>;
pub type ResourceEventStream = BoxStream<'static, AppResult<WatchEvent>>;

/// Cluster operations the runtime depends on.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    fn info(&self) -> ClusterInfo;

    fn current_namespace(&self) -> String {
        self.info().namespace
    }

    fn current_context(&self) -> String {
        self.info().context
    }

    async fn list_resources(
        &self,
        tab: ResourceTab,
        scope: &NamespaceScope,
        filters: &ListFilters,
    ) -> AppResult<ResourceList>;

    async fn get_resource(
        &self,
        tab: ResourceTab,
        namespace: Option<&str>,
        name: &str,
    ) -> AppResult<RowData>;

    async fn delete_resource(
        &self,
        tab: ResourceTab,
        namespace: Option<&str>,
        name: &str,
    ) -> AppResult<()>;

    /// Picks the pod (and container) whose logs represent `row`.
    async fn resolve_log_target(&self, tab: ResourceTab, row: &RowData) -> AppResult<StreamKey>;

    async fn stream_logs(&self, key: &StreamKey, options: &LogOptions) -> AppResult<LineStream>;

    /// `Ok(None)` means the kind has no native change notification.
    async fn watch(
        &self,
        tab: ResourceTab,
        scope: &NamespaceScope,
    ) -> AppResult<Option<ResourceEventStream>>;

    /// Returns the server version on success.
    async fn check_connectivity(&self) -> AppResult<String>;

    async fn reload_credentials(&self) -> AppResult<ClusterInfo>;

    async fn switch_context(&self, context: &str) -> AppResult<ClusterInfo>;
}
