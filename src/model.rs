use chrono::{DateTime, Local};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum ClusterFlavor {
    #[default]
    Kubernetes,
    OpenShift,
}

impl ClusterFlavor {
    pub fn label(self) -> &'static str {
        match self {
            Self::Kubernetes => "k8s",
            Self::OpenShift => "openshift",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ResourceTab {
    Pods,
    Deployments,
    StatefulSets,
    DaemonSets,
    Jobs,
    Services,
    Ingresses,
    ConfigMaps,
    Secrets,
    Nodes,
    Namespaces,
    Events,
    Routes,
    Projects,
    DeploymentConfigs,
}

impl ResourceTab {
    pub const KUBERNETES: [Self; 12] = [
        Self::Pods,
        Self::Deployments,
        Self::StatefulSets,
        Self::DaemonSets,
        Self::Jobs,
        Self::Services,
        Self::Ingresses,
        Self::ConfigMaps,
        Self::Secrets,
        Self::Nodes,
        Self::Namespaces,
        Self::Events,
    ];

    pub const OPENSHIFT_ONLY: [Self; 3] = [Self::Routes, Self::Projects, Self::DeploymentConfigs];

    pub fn for_flavor(flavor: ClusterFlavor) -> Vec<Self> {
        let mut tabs = Self::KUBERNETES.to_vec();
        if flavor == ClusterFlavor::OpenShift {
            tabs.extend(Self::OPENSHIFT_ONLY);
        }
        tabs
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Pods => "Pods",
            Self::Deployments => "Deployments",
            Self::StatefulSets => "StatefulSets",
            Self::DaemonSets => "DaemonSets",
            Self::Jobs => "Jobs",
            Self::Services => "Services",
            Self::Ingresses => "Ingresses",
            Self::ConfigMaps => "ConfigMaps",
            Self::Secrets => "Secrets",
            Self::Nodes => "Nodes",
            Self::Namespaces => "Namespaces",
            Self::Events => "Events",
            Self::Routes => "Routes",
            Self::Projects => "Projects",
            Self::DeploymentConfigs => "DeploymentConfigs",
        }
    }

    /// Singular kind, used in prompts and status lines.
    pub fn kind(self) -> &'static str {
        match self {
            Self::Pods => "Pod",
            Self::Deployments => "Deployment",
            Self::StatefulSets => "StatefulSet",
            Self::DaemonSets => "DaemonSet",
            Self::Jobs => "Job",
            Self::Services => "Service",
            Self::Ingresses => "Ingress",
            Self::ConfigMaps => "ConfigMap",
            Self::Secrets => "Secret",
            Self::Nodes => "Node",
            Self::Namespaces => "Namespace",
            Self::Events => "Event",
            Self::Routes => "Route",
            Self::Projects => "Project",
            Self::DeploymentConfigs => "DeploymentConfig",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "po" | "pod" | "pods" => Some(Self::Pods),
            "deploy" | "deployment" | "deployments" | "dp" => Some(Self::Deployments),
            "sts" | "statefulset" | "statefulsets" => Some(Self::StatefulSets),
            "ds" | "daemonset" | "daemonsets" | "daemon-set" | "daemon-sets" => {
                Some(Self::DaemonSets)
            }
            "job" | "jobs" => Some(Self::Jobs),
            "svc" | "service" | "services" => Some(Self::Services),
            "ing" | "ingress" | "ingresses" => Some(Self::Ingresses),
            "cm" | "configmap" | "configmaps" | "config-map" | "config-maps" => {
                Some(Self::ConfigMaps)
            }
            "secret" | "secrets" => Some(Self::Secrets),
            "node" | "nodes" | "no" => Some(Self::Nodes),
            "ns" | "namespace" | "namespaces" => Some(Self::Namespaces),
            "event" | "events" | "ev" => Some(Self::Events),
            "route" | "routes" => Some(Self::Routes),
            "project" | "projects" | "proj" => Some(Self::Projects),
            "dc" | "deploymentconfig" | "deploymentconfigs" => Some(Self::DeploymentConfigs),
            _ => None,
        }
    }

    pub fn is_namespaced(self) -> bool {
        !matches!(self, Self::Nodes | Self::Namespaces | Self::Projects)
    }

    /// Tabs whose rows can be resolved to a pod for log tailing.
    pub fn supports_logs(self) -> bool {
        matches!(
            self,
            Self::Pods | Self::Deployments | Self::StatefulSets | Self::DaemonSets | Self::Jobs
        )
    }

    pub fn supports_delete(self) -> bool {
        !matches!(self, Self::Events | Self::Nodes)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NamespaceScope {
    All,
    Named(String),
}

impl Display for NamespaceScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Named(namespace) => write!(f, "{namespace}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowData {
    pub name: String,
    pub namespace: Option<String>,
    pub columns: Vec<String>,
    pub detail: String,
}

impl RowData {
    pub fn same_identity(&self, other: &RowData) -> bool {
        self.name == other.name && self.namespace == other.namespace
    }

    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}/{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn matches_filter(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return true;
        }

        let query_lower = query.to_ascii_lowercase();

        if self.name.to_ascii_lowercase().contains(&query_lower) {
            return true;
        }

        if let Some(namespace) = &self.namespace
            && namespace.to_ascii_lowercase().contains(&query_lower)
        {
            return true;
        }

        self.columns
            .iter()
            .any(|column| column.to_ascii_lowercase().contains(&query_lower))
    }

    fn sort_key(&self) -> (Option<&str>, &str) {
        (self.namespace.as_deref(), self.name.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<RowData>,
    pub selected: usize,
    pub last_refreshed: Option<DateTime<Local>>,
    pub error: Option<String>,
}

impl TableData {
    pub fn set_rows(
        &mut self,
        headers: Vec<String>,
        rows: Vec<RowData>,
        refreshed_at: DateTime<Local>,
    ) {
        self.headers = headers;
        self.rows = rows;
        sort_rows(&mut self.rows);
        self.last_refreshed = Some(refreshed_at);
        self.error = None;
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
    }

    pub fn set_error(&mut self, error: impl Into<String>, refreshed_at: DateTime<Local>) {
        self.rows.clear();
        self.error = Some(error.into());
        self.last_refreshed = Some(refreshed_at);
        self.selected = 0;
    }

    /// Inserts or replaces the row with the same identity, keeping rows sorted.
    pub fn upsert(&mut self, row: RowData) {
        if let Some(existing) = self.rows.iter_mut().find(|item| item.same_identity(&row)) {
            *existing = row;
            return;
        }

        let position = self
            .rows
            .partition_point(|item| item.sort_key() < row.sort_key());
        self.rows.insert(position, row);
    }

    pub fn remove(&mut self, row: &RowData) -> bool {
        let before = self.rows.len();
        self.rows.retain(|item| !item.same_identity(row));
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
        self.rows.len() != before
    }
}

fn sort_rows(rows: &mut [RowData]) {
    rows.sort_by(|left, right| {
        left.namespace
            .cmp(&right.namespace)
            .then_with(|| left.name.cmp(&right.name))
    });
}

#[cfg(test)]
mod tests {
    use super::{ClusterFlavor, ResourceTab, RowData, TableData};
    use chrono::Local;

    fn row(namespace: &str, name: &str) -> RowData {
        RowData {
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            columns: vec![name.to_string()],
            detail: String::new(),
        }
    }

    #[test]
    fn resource_aliases_map_to_expected_tabs() {
        assert_eq!(ResourceTab::from_token("po"), Some(ResourceTab::Pods));
        assert_eq!(
            ResourceTab::from_token("daemonsets"),
            Some(ResourceTab::DaemonSets)
        );
        assert_eq!(ResourceTab::from_token("svc"), Some(ResourceTab::Services));
        assert_eq!(ResourceTab::from_token("cm"), Some(ResourceTab::ConfigMaps));
        assert_eq!(
            ResourceTab::from_token("dc"),
            Some(ResourceTab::DeploymentConfigs)
        );
        assert_eq!(ResourceTab::from_token("bogus"), None);
    }

    #[test]
    fn openshift_flavor_adds_openshift_tabs() {
        let kube = ResourceTab::for_flavor(ClusterFlavor::Kubernetes);
        let openshift = ResourceTab::for_flavor(ClusterFlavor::OpenShift);
        assert!(!kube.contains(&ResourceTab::Routes));
        assert!(openshift.contains(&ResourceTab::Routes));
        assert_eq!(openshift.len(), kube.len() + 3);
    }

    #[test]
    fn upsert_keeps_rows_sorted_and_replaces_by_identity() {
        let mut table = TableData::default();
        table.set_rows(
            vec!["Name".to_string()],
            vec![row("default", "d"), row("default", "b")],
            Local::now(),
        );

        table.upsert(row("default", "c"));
        table.upsert(row("default", "a"));
        let mut replacement = row("default", "d");
        replacement.columns = vec!["updated".to_string()];
        table.upsert(replacement);

        let names = table
            .rows
            .iter()
            .map(|row| row.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert_eq!(table.rows[3].columns, vec!["updated".to_string()]);
    }

    #[test]
    fn remove_clamps_selection() {
        let mut table = TableData::default();
        table.set_rows(
            vec!["Name".to_string()],
            vec![row("default", "a"), row("default", "b")],
            Local::now(),
        );
        table.selected = 1;

        assert!(table.remove(&row("default", "b")));
        assert_eq!(table.selected, 0);
        assert!(!table.remove(&row("default", "missing")));
    }

    #[test]
    fn filter_matches_namespace_and_columns() {
        let mut item = row("kube-system", "coredns");
        item.columns.push("Running".to_string());
        assert!(item.matches_filter("KUBE"));
        assert!(item.matches_filter("running"));
        assert!(!item.matches_filter("pending"));
        assert!(item.matches_filter("  "));
    }
}
