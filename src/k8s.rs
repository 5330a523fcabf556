use std::collections::{BTreeMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{AsyncBufReadExt, StreamExt, TryStreamExt, future};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMap, Event, Namespace, Node, Pod, PodStatus, Secret, Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, Time};
use kube::api::{DeleteParams, ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::runtime::watcher;
use kube::{Api, Client, Config, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::{
    ClusterClient, ClusterInfo, LineStream, ListFilters, LogOptions, ResourceEventStream,
    ResourceList, WatchEvent,
};
use crate::error::{AppError, AppResult, ErrorCategory};
use crate::logs::StreamKey;
use crate::model::{ClusterFlavor, NamespaceScope, ResourceTab, RowData};
use crate::watch::ResourceEventKind;

const FLAVOR_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const OPENSHIFT_GROUPS: [&str; 2] = ["route.openshift.io", "project.openshift.io"];

/// kube-rs backed cluster client. The connection is rebuilt in place on
/// context switches and credential reloads.
pub struct KubeGateway {
    kubeconfig: Option<PathBuf>,
    connection: Mutex<Connection>,
}

#[derive(Clone)]
struct Connection {
    client: Client,
    info: ClusterInfo,
}

impl KubeGateway {
    pub async fn connect(kubeconfig: Option<PathBuf>, context: Option<String>) -> AppResult<Self> {
        let connection = Self::open(kubeconfig.as_ref(), context).await?;
        info!(
            context = %connection.info.context,
            cluster = %connection.info.cluster,
            flavor = connection.info.flavor.label(),
            "connected"
        );
        Ok(Self {
            kubeconfig,
            connection: Mutex::new(connection),
        })
    }

    pub fn available_contexts(&self) -> Vec<String> {
        let mut contexts = self
            .read_kubeconfig()
            .map(|config| {
                config
                    .contexts
                    .into_iter()
                    .map(|named| named.name)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        contexts.sort();
        contexts.dedup();
        contexts
    }

    fn read_kubeconfig(&self) -> Option<Kubeconfig> {
        match &self.kubeconfig {
            Some(path) => Kubeconfig::read_from(path).ok(),
            None => Kubeconfig::read().ok(),
        }
    }

    fn client(&self) -> Client {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .client
            .clone()
    }

    fn replace(&self, connection: Connection) -> ClusterInfo {
        let info = connection.info.clone();
        *self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = connection;
        info
    }

    fn namespace_or_default(&self, namespace: Option<&str>) -> String {
        namespace
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.current_namespace())
    }

    async fn open(
        kubeconfig_path: Option<&PathBuf>,
        context: Option<String>,
    ) -> AppResult<Connection> {
        let kubeconfig = match kubeconfig_path {
            Some(path) => Some(Kubeconfig::read_from(path)?),
            None => Kubeconfig::read().ok(),
        };

        let config = if let Some(kubeconfig_value) = kubeconfig.clone() {
            let options = KubeConfigOptions {
                context: context.clone(),
                cluster: None,
                user: None,
            };
            Config::from_custom_kubeconfig(kubeconfig_value, &options).await?
        } else {
            if context.is_some() {
                return Err(AppError::configuration(
                    "kubeconfig not found; context switching is unavailable in this environment",
                ));
            }
            Config::infer().await.map_err(|error| {
                AppError::configuration(format!(
                    "failed to infer Kubernetes configuration: {error}"
                ))
            })?
        };

        let cluster = config.cluster_url.to_string();
        let namespace = config.default_namespace.clone();
        let client = Client::try_from(config)?;

        let context = context
            .or_else(|| {
                kubeconfig
                    .as_ref()
                    .and_then(|cfg| cfg.current_context.clone())
            })
            .unwrap_or_else(|| "in-cluster".to_string());
        let user = kubeconfig
            .as_ref()
            .and_then(|cfg| cfg.contexts.iter().find(|named| named.name == context))
            .and_then(|named| named.context.as_ref())
            .and_then(|ctx| ctx.user.clone())
            .unwrap_or_else(|| "-".to_string());
        let flavor = detect_flavor(&client).await;

        Ok(Connection {
            client,
            info: ClusterInfo {
                cluster,
                context,
                user,
                namespace,
                flavor,
            },
        })
    }

    async fn list_dynamic(
        &self,
        tab: ResourceTab,
        scope: &NamespaceScope,
        filters: &ListFilters,
    ) -> AppResult<Vec<RowData>> {
        let Some(resource) = openshift_resource(tab) else {
            return Err(AppError::general(format!("{} is not a dynamic kind", tab.title())));
        };
        let api: Api<DynamicObject> = match scope {
            NamespaceScope::Named(namespace) if tab.is_namespaced() => {
                Api::namespaced_with(self.client(), namespace, &resource)
            }
            _ => Api::all_with(self.client(), &resource),
        };
        collect_pages(list_params(filters), |params| {
            let api = api.clone();
            async move {
                let page = api.list(&params).await?;
                let next = page.metadata.continue_.clone();
                let rows = page
                    .items
                    .into_iter()
                    .map(|object| dynamic_row(tab, object))
                    .collect();
                Ok((rows, next))
            }
        })
        .await
    }

    async fn resolve_pod(&self, namespace: &str, pod_name: &str) -> AppResult<StreamKey> {
        let pods: Api<Pod> = Api::namespaced(self.client(), namespace);
        let pod = pods.get(pod_name).await?;
        let key = StreamKey::new(namespace, pod_name);
        Ok(match first_pod_container(&pod) {
            Some(container) => key.with_container(container),
            None => key,
        })
    }

    async fn workload_selector(
        &self,
        tab: ResourceTab,
        namespace: &str,
        name: &str,
    ) -> AppResult<String> {
        let client = self.client();
        let selector = match tab {
            ResourceTab::Deployments => Api::<Deployment>::namespaced(client, namespace)
                .get(name)
                .await?
                .spec
                .map(|spec| spec.selector),
            ResourceTab::StatefulSets => Api::<StatefulSet>::namespaced(client, namespace)
                .get(name)
                .await?
                .spec
                .map(|spec| spec.selector),
            ResourceTab::DaemonSets => Api::<DaemonSet>::namespaced(client, namespace)
                .get(name)
                .await?
                .spec
                .map(|spec| spec.selector),
            ResourceTab::Jobs => Api::<Job>::namespaced(client, namespace)
                .get(name)
                .await?
                .spec
                .and_then(|spec| spec.selector)
                .or_else(|| Some(job_name_selector(name))),
            _ => None,
        };

        selector
            .as_ref()
            .map(label_selector_query)
            .filter(|query| !query.is_empty())
            .ok_or_else(|| {
                AppError::general(format!(
                    "{} {namespace}/{name} has no pod selector",
                    tab.kind()
                ))
            })
    }
}

#[async_trait]
impl ClusterClient for KubeGateway {
    fn info(&self) -> ClusterInfo {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .info
            .clone()
    }

    async fn list_resources(
        &self,
        tab: ResourceTab,
        scope: &NamespaceScope,
        filters: &ListFilters,
    ) -> AppResult<ResourceList> {
        let client = self.client();
        let mut rows = match tab {
            ResourceTab::Pods => {
                list_typed(scoped_api::<Pod>(client, scope), filters, pod_row).await?
            }
            ResourceTab::Deployments => {
                list_typed(scoped_api::<Deployment>(client, scope), filters, deployment_row).await?
            }
            ResourceTab::StatefulSets => {
                list_typed(scoped_api::<StatefulSet>(client, scope), filters, statefulset_row)
                    .await?
            }
            ResourceTab::DaemonSets => {
                list_typed(scoped_api::<DaemonSet>(client, scope), filters, daemonset_row).await?
            }
            ResourceTab::Jobs => {
                list_typed(scoped_api::<Job>(client, scope), filters, job_row).await?
            }
            ResourceTab::Services => {
                list_typed(scoped_api::<Service>(client, scope), filters, service_row).await?
            }
            ResourceTab::Ingresses => {
                list_typed(scoped_api::<Ingress>(client, scope), filters, ingress_row).await?
            }
            ResourceTab::ConfigMaps => {
                list_typed(scoped_api::<ConfigMap>(client, scope), filters, configmap_row).await?
            }
            ResourceTab::Secrets => {
                list_typed(scoped_api::<Secret>(client, scope), filters, secret_row).await?
            }
            ResourceTab::Events => {
                list_typed(scoped_api::<Event>(client, scope), filters, event_row).await?
            }
            ResourceTab::Nodes => list_typed(Api::<Node>::all(client), filters, node_row).await?,
            ResourceTab::Namespaces => {
                list_typed(Api::<Namespace>::all(client), filters, namespace_row).await?
            }
            ResourceTab::Routes | ResourceTab::Projects | ResourceTab::DeploymentConfigs => {
                self.list_dynamic(tab, scope, filters).await?
            }
        };

        rows.sort_by(|left, right| {
            left.namespace
                .cmp(&right.namespace)
                .then_with(|| left.name.cmp(&right.name))
        });
        debug!(tab = tab.title(), scope = %scope, count = rows.len(), "listed resources");

        Ok(ResourceList {
            headers: headers(tab),
            rows,
        })
    }

    async fn get_resource(
        &self,
        tab: ResourceTab,
        namespace: Option<&str>,
        name: &str,
    ) -> AppResult<RowData> {
        let client = self.client();
        let ns = self.namespace_or_default(namespace);
        let row = match tab {
            ResourceTab::Pods => pod_row(Api::<Pod>::namespaced(client, &ns).get(name).await?),
            ResourceTab::Deployments => {
                deployment_row(Api::<Deployment>::namespaced(client, &ns).get(name).await?)
            }
            ResourceTab::StatefulSets => {
                statefulset_row(Api::<StatefulSet>::namespaced(client, &ns).get(name).await?)
            }
            ResourceTab::DaemonSets => {
                daemonset_row(Api::<DaemonSet>::namespaced(client, &ns).get(name).await?)
            }
            ResourceTab::Jobs => job_row(Api::<Job>::namespaced(client, &ns).get(name).await?),
            ResourceTab::Services => {
                service_row(Api::<Service>::namespaced(client, &ns).get(name).await?)
            }
            ResourceTab::Ingresses => {
                ingress_row(Api::<Ingress>::namespaced(client, &ns).get(name).await?)
            }
            ResourceTab::ConfigMaps => {
                configmap_row(Api::<ConfigMap>::namespaced(client, &ns).get(name).await?)
            }
            ResourceTab::Secrets => {
                secret_row(Api::<Secret>::namespaced(client, &ns).get(name).await?)
            }
            ResourceTab::Events => {
                event_row(Api::<Event>::namespaced(client, &ns).get(name).await?)
            }
            ResourceTab::Nodes => node_row(Api::<Node>::all(client).get(name).await?),
            ResourceTab::Namespaces => {
                namespace_row(Api::<Namespace>::all(client).get(name).await?)
            }
            ResourceTab::Routes | ResourceTab::Projects | ResourceTab::DeploymentConfigs => {
                let Some(resource) = openshift_resource(tab) else {
                    return Err(AppError::not_found(format!("{} is unavailable", tab.title())));
                };
                let api: Api<DynamicObject> = if tab.is_namespaced() {
                    Api::namespaced_with(client, &ns, &resource)
                } else {
                    Api::all_with(client, &resource)
                };
                dynamic_row(tab, api.get(name).await?)
            }
        };
        Ok(row)
    }

    async fn delete_resource(
        &self,
        tab: ResourceTab,
        namespace: Option<&str>,
        name: &str,
    ) -> AppResult<()> {
        if !tab.supports_delete() {
            return Err(AppError::new(
                ErrorCategory::Permission,
                format!("delete is not supported for {}", tab.title()),
            ));
        }

        let client = self.client();
        let ns = self.namespace_or_default(namespace);
        let params = DeleteParams::default();
        match tab {
            ResourceTab::Pods => {
                let _ = Api::<Pod>::namespaced(client, &ns).delete(name, &params).await?;
            }
            ResourceTab::Deployments => {
                let _ = Api::<Deployment>::namespaced(client, &ns)
                    .delete(name, &params)
                    .await?;
            }
            ResourceTab::StatefulSets => {
                let _ = Api::<StatefulSet>::namespaced(client, &ns)
                    .delete(name, &params)
                    .await?;
            }
            ResourceTab::DaemonSets => {
                let _ = Api::<DaemonSet>::namespaced(client, &ns)
                    .delete(name, &params)
                    .await?;
            }
            ResourceTab::Jobs => {
                let _ = Api::<Job>::namespaced(client, &ns).delete(name, &params).await?;
            }
            ResourceTab::Services => {
                let _ = Api::<Service>::namespaced(client, &ns)
                    .delete(name, &params)
                    .await?;
            }
            ResourceTab::Ingresses => {
                let _ = Api::<Ingress>::namespaced(client, &ns)
                    .delete(name, &params)
                    .await?;
            }
            ResourceTab::ConfigMaps => {
                let _ = Api::<ConfigMap>::namespaced(client, &ns)
                    .delete(name, &params)
                    .await?;
            }
            ResourceTab::Secrets => {
                let _ = Api::<Secret>::namespaced(client, &ns)
                    .delete(name, &params)
                    .await?;
            }
            ResourceTab::Namespaces => {
                let _ = Api::<Namespace>::all(client).delete(name, &params).await?;
            }
            ResourceTab::Routes | ResourceTab::Projects | ResourceTab::DeploymentConfigs => {
                if let Some(resource) = openshift_resource(tab) {
                    let api: Api<DynamicObject> = if tab.is_namespaced() {
                        Api::namespaced_with(client, &ns, &resource)
                    } else {
                        Api::all_with(client, &resource)
                    };
                    let _ = api.delete(name, &params).await?;
                }
            }
            ResourceTab::Events | ResourceTab::Nodes => {}
        }

        info!(kind = tab.kind(), namespace = %ns, name, "deleted resource");
        Ok(())
    }

    async fn resolve_log_target(&self, tab: ResourceTab, row: &RowData) -> AppResult<StreamKey> {
        if !tab.supports_logs() {
            return Err(AppError::general(format!(
                "Logs are not available for {}",
                tab.title()
            )));
        }
        let namespace = self.namespace_or_default(row.namespace.as_deref());

        if tab == ResourceTab::Pods {
            return self.resolve_pod(&namespace, &row.name).await;
        }

        let selector = self.workload_selector(tab, &namespace, &row.name).await?;
        let pods: Api<Pod> = Api::namespaced(self.client(), &namespace);
        let list = pods.list(&ListParams::default().labels(&selector)).await?;
        let Some(pod) = select_best_pod(&list.items) else {
            return Err(AppError::not_found(format!(
                "No pods found for {} {namespace}/{}",
                tab.kind(),
                row.name
            )));
        };

        let key = StreamKey::new(namespace.as_str(), pod.name_any());
        debug!(kind = tab.kind(), name = %row.name, pod = %key.pod, "resolved log target");
        Ok(match first_pod_container(pod) {
            Some(container) => key.with_container(container),
            None => key,
        })
    }

    async fn stream_logs(&self, key: &StreamKey, options: &LogOptions) -> AppResult<LineStream> {
        let pods: Api<Pod> = Api::namespaced(self.client(), &key.namespace);
        let params = LogParams {
            container: key.container.clone(),
            follow: options.follow,
            previous: options.previous,
            tail_lines: options.tail_lines,
            timestamps: options.timestamps,
            ..LogParams::default()
        };

        let reader = pods.log_stream(&key.pod, &params).await?;
        let source = key.to_string();
        let lines = reader.lines().map_err(move |error| {
            AppError::connection(format!("log stream for {source} failed: {error}"))
        });
        Ok(lines.boxed())
    }

    async fn watch(
        &self,
        tab: ResourceTab,
        scope: &NamespaceScope,
    ) -> AppResult<Option<ResourceEventStream>> {
        let client = self.client();
        let stream = match tab {
            ResourceTab::Pods => watch_typed(scoped_api::<Pod>(client, scope), pod_row),
            ResourceTab::Deployments => {
                watch_typed(scoped_api::<Deployment>(client, scope), deployment_row)
            }
            ResourceTab::StatefulSets => {
                watch_typed(scoped_api::<StatefulSet>(client, scope), statefulset_row)
            }
            ResourceTab::DaemonSets => {
                watch_typed(scoped_api::<DaemonSet>(client, scope), daemonset_row)
            }
            ResourceTab::Jobs => watch_typed(scoped_api::<Job>(client, scope), job_row),
            ResourceTab::Services => watch_typed(scoped_api::<Service>(client, scope), service_row),
            ResourceTab::Ingresses => {
                watch_typed(scoped_api::<Ingress>(client, scope), ingress_row)
            }
            ResourceTab::ConfigMaps => {
                watch_typed(scoped_api::<ConfigMap>(client, scope), configmap_row)
            }
            ResourceTab::Secrets => watch_typed(scoped_api::<Secret>(client, scope), secret_row),
            ResourceTab::Events => watch_typed(scoped_api::<Event>(client, scope), event_row),
            ResourceTab::Nodes => watch_typed(Api::<Node>::all(client), node_row),
            ResourceTab::Namespaces => watch_typed(Api::<Namespace>::all(client), namespace_row),
            ResourceTab::Routes | ResourceTab::Projects | ResourceTab::DeploymentConfigs => {
                return Ok(None);
            }
        };
        Ok(Some(stream))
    }

    async fn check_connectivity(&self) -> AppResult<String> {
        let version = self.client().apiserver_version().await?;
        Ok(version.git_version)
    }

    async fn reload_credentials(&self) -> AppResult<ClusterInfo> {
        let context = self.current_context();
        let context = (context != "in-cluster").then_some(context);
        let connection = Self::open(self.kubeconfig.as_ref(), context).await?;
        info!(context = %connection.info.context, "credentials reloaded");
        Ok(self.replace(connection))
    }

    async fn switch_context(&self, context: &str) -> AppResult<ClusterInfo> {
        let connection = Self::open(self.kubeconfig.as_ref(), Some(context.to_string())).await?;
        info!(context, "switched context");
        Ok(self.replace(connection))
    }
}

async fn detect_flavor(client: &Client) -> ClusterFlavor {
    match tokio::time::timeout(FLAVOR_PROBE_TIMEOUT, client.list_api_groups()).await {
        Ok(Ok(groups)) => flavor_from_groups(groups.groups.iter().map(|group| group.name.as_str())),
        Ok(Err(error)) => {
            warn!(error = %error, "api group discovery failed, assuming Kubernetes");
            ClusterFlavor::Kubernetes
        }
        Err(_) => {
            warn!("api group discovery timed out, assuming Kubernetes");
            ClusterFlavor::Kubernetes
        }
    }
}

fn flavor_from_groups<'a>(groups: impl IntoIterator<Item = &'a str>) -> ClusterFlavor {
    let openshift = groups
        .into_iter()
        .any(|group| OPENSHIFT_GROUPS.contains(&group));
    if openshift {
        ClusterFlavor::OpenShift
    } else {
        ClusterFlavor::Kubernetes
    }
}

fn scoped_api<K>(client: Client, scope: &NamespaceScope) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match scope {
        NamespaceScope::All => Api::all(client),
        NamespaceScope::Named(namespace) => Api::namespaced(client, namespace),
    }
}

async fn list_typed<K>(
    api: Api<K>,
    filters: &ListFilters,
    to_row: fn(K) -> RowData,
) -> AppResult<Vec<RowData>>
where
    K: Clone + DeserializeOwned + Debug,
{
    collect_pages(list_params(filters), |params| {
        let api = api.clone();
        async move {
            let page = api.list(&params).await?;
            let next = page.metadata.continue_.clone();
            Ok((page.items.into_iter().map(to_row).collect(), next))
        }
    })
    .await
}

/// Follows `continue` tokens until the server reports the last page.
async fn collect_pages<T, F, Fut>(mut params: ListParams, mut fetch: F) -> AppResult<Vec<T>>
where
    F: FnMut(ListParams) -> Fut,
    Fut: Future<Output = AppResult<(Vec<T>, Option<String>)>>,
{
    let mut items = Vec::new();
    loop {
        let (page, next) = fetch(params.clone()).await?;
        items.extend(page);
        match next.filter(|token| !token.is_empty()) {
            Some(token) => {
                debug!(fetched = items.len(), "fetching next page");
                params.continue_token = Some(token);
            }
            None => return Ok(items),
        }
    }
}

/// Adapts a kube-runtime watcher into row events. Objects seen for the first
/// time are reported as Added, later applies as Modified.
fn watch_typed<K>(api: Api<K>, to_row: fn(K) -> RowData) -> ResourceEventStream
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let mut seen = HashSet::new();
    watcher(api, watcher::Config::default())
        .filter_map(move |event| {
            let mapped = match event {
                Ok(watcher::Event::Apply(object)) | Ok(watcher::Event::InitApply(object)) => {
                    let row = to_row(object);
                    let kind = if seen.insert(row.qualified_name()) {
                        ResourceEventKind::Added
                    } else {
                        ResourceEventKind::Modified
                    };
                    Some(Ok(WatchEvent { kind, row }))
                }
                Ok(watcher::Event::Delete(object)) => {
                    let row = to_row(object);
                    seen.remove(&row.qualified_name());
                    Some(Ok(WatchEvent {
                        kind: ResourceEventKind::Deleted,
                        row,
                    }))
                }
                Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => None,
                Err(error) => Some(Err(AppError::connection(format!("watch failed: {error}")))),
            };
            future::ready(mapped)
        })
        .boxed()
}

fn list_params(filters: &ListFilters) -> ListParams {
    let mut params = ListParams::default();
    if let Some(limit) = filters.limit {
        params = params.limit(limit);
    }
    if let Some(labels) = filters.label_selector.as_deref() {
        params = params.labels(labels);
    }
    if let Some(fields) = filters.field_selector.as_deref() {
        params = params.fields(fields);
    }
    params
}

fn openshift_resource(tab: ResourceTab) -> Option<ApiResource> {
    let (group, kind, plural) = match tab {
        ResourceTab::Routes => ("route.openshift.io", "Route", "routes"),
        ResourceTab::Projects => ("project.openshift.io", "Project", "projects"),
        ResourceTab::DeploymentConfigs => {
            ("apps.openshift.io", "DeploymentConfig", "deploymentconfigs")
        }
        _ => return None,
    };
    let gvk = GroupVersionKind::gvk(group, "v1", kind);
    Some(ApiResource::from_gvk_with_plural(&gvk, plural))
}

pub fn headers(tab: ResourceTab) -> Vec<String> {
    let names: &[&str] = match tab {
        ResourceTab::Pods => &["Name", "Namespace", "Node", "Ready", "Status", "Restarts", "Age"],
        ResourceTab::Deployments | ResourceTab::DaemonSets => {
            &["Name", "Namespace", "Ready", "Updated", "Available", "Age"]
        }
        ResourceTab::StatefulSets => &["Name", "Namespace", "Ready", "Current", "Age"],
        ResourceTab::Jobs => &["Name", "Namespace", "Completions", "Active", "Failed", "Age"],
        ResourceTab::Services => &["Name", "Namespace", "Type", "Cluster IP", "Ports", "Age"],
        ResourceTab::Ingresses => &["Name", "Namespace", "Class", "Hosts", "Address", "Age"],
        ResourceTab::ConfigMaps => &["Name", "Namespace", "Data", "Age"],
        ResourceTab::Secrets => &["Name", "Namespace", "Type", "Data", "Age"],
        ResourceTab::Nodes => &["Name", "Ready", "Roles", "Version", "Age"],
        ResourceTab::Namespaces => &["Name", "Status", "Labels", "Age"],
        ResourceTab::Events => &["Namespace", "Kind", "Object", "Reason", "Type", "Message", "Age"],
        ResourceTab::Routes => &["Name", "Namespace", "Host", "Service", "Age"],
        ResourceTab::Projects => &["Name", "Status", "Age"],
        ResourceTab::DeploymentConfigs => &["Name", "Namespace", "Desired", "Current", "Age"],
    };
    names.iter().map(|name| name.to_string()).collect()
}

fn namespace_column(namespace: &Option<String>) -> String {
    namespace.clone().unwrap_or_else(|| "-".to_string())
}

fn pod_row(pod: Pod) -> RowData {
    let name = pod.name_any();
    let namespace = pod.namespace();
    let status = pod
        .status
        .as_ref()
        .and_then(|value| value.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let node = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.node_name.clone())
        .unwrap_or_else(|| "-".to_string());
    let (ready, total, restarts) = pod.status.as_ref().map(pod_readiness).unwrap_or((0, 0, 0));
    let age = human_age(pod.metadata.creation_timestamp.as_ref());

    RowData {
        columns: vec![
            name.clone(),
            namespace_column(&namespace),
            node,
            format!("{ready}/{total}"),
            status,
            restarts.to_string(),
            age,
        ],
        detail: yaml_detail(&pod),
        name,
        namespace,
    }
}

fn deployment_row(deployment: Deployment) -> RowData {
    let name = deployment.name_any();
    let namespace = deployment.namespace();
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let status = deployment.status.as_ref();
    let ready = status.and_then(|status| status.ready_replicas).unwrap_or(0);
    let updated = status.and_then(|status| status.updated_replicas).unwrap_or(0);
    let available = status.and_then(|status| status.available_replicas).unwrap_or(0);
    let age = human_age(deployment.metadata.creation_timestamp.as_ref());

    RowData {
        columns: vec![
            name.clone(),
            namespace_column(&namespace),
            format!("{ready}/{desired}"),
            updated.to_string(),
            available.to_string(),
            age,
        ],
        detail: yaml_detail(&deployment),
        name,
        namespace,
    }
}

fn statefulset_row(statefulset: StatefulSet) -> RowData {
    let name = statefulset.name_any();
    let namespace = statefulset.namespace();
    let desired = statefulset
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let status = statefulset.status.as_ref();
    let ready = status.and_then(|status| status.ready_replicas).unwrap_or(0);
    let current = status.and_then(|status| status.current_replicas).unwrap_or(0);
    let age = human_age(statefulset.metadata.creation_timestamp.as_ref());

    RowData {
        columns: vec![
            name.clone(),
            namespace_column(&namespace),
            format!("{ready}/{desired}"),
            current.to_string(),
            age,
        ],
        detail: yaml_detail(&statefulset),
        name,
        namespace,
    }
}

fn daemonset_row(daemonset: DaemonSet) -> RowData {
    let name = daemonset.name_any();
    let namespace = daemonset.namespace();
    let status = daemonset.status.as_ref();
    let desired = status.map(|status| status.desired_number_scheduled).unwrap_or(0);
    let ready = status.map(|status| status.number_ready).unwrap_or(0);
    let updated = status
        .and_then(|status| status.updated_number_scheduled)
        .unwrap_or(0);
    let available = status.and_then(|status| status.number_available).unwrap_or(0);
    let age = human_age(daemonset.metadata.creation_timestamp.as_ref());

    RowData {
        columns: vec![
            name.clone(),
            namespace_column(&namespace),
            format!("{ready}/{desired}"),
            updated.to_string(),
            available.to_string(),
            age,
        ],
        detail: yaml_detail(&daemonset),
        name,
        namespace,
    }
}

fn job_row(job: Job) -> RowData {
    let name = job.name_any();
    let namespace = job.namespace();
    let desired = job
        .spec
        .as_ref()
        .and_then(|spec| spec.completions)
        .unwrap_or(1);
    let status = job.status.as_ref();
    let succeeded = status.and_then(|status| status.succeeded).unwrap_or(0);
    let active = status.and_then(|status| status.active).unwrap_or(0);
    let failed = status.and_then(|status| status.failed).unwrap_or(0);
    let age = human_age(job.metadata.creation_timestamp.as_ref());

    RowData {
        columns: vec![
            name.clone(),
            namespace_column(&namespace),
            format!("{succeeded}/{desired}"),
            active.to_string(),
            failed.to_string(),
            age,
        ],
        detail: yaml_detail(&job),
        name,
        namespace,
    }
}

fn service_row(service: Service) -> RowData {
    let name = service.name_any();
    let namespace = service.namespace();
    let spec = service.spec.as_ref();
    let service_type = spec
        .and_then(|spec| spec.type_.clone())
        .unwrap_or_else(|| "ClusterIP".to_string());
    let cluster_ip = spec
        .and_then(|spec| spec.cluster_ip.clone())
        .unwrap_or_else(|| "-".to_string());
    let age = human_age(service.metadata.creation_timestamp.as_ref());

    RowData {
        columns: vec![
            name.clone(),
            namespace_column(&namespace),
            service_type,
            cluster_ip,
            service_ports_summary(&service),
            age,
        ],
        detail: yaml_detail(&service),
        name,
        namespace,
    }
}

fn ingress_row(ingress: Ingress) -> RowData {
    let name = ingress.name_any();
    let namespace = ingress.namespace();
    let class = ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.ingress_class_name.clone())
        .unwrap_or_else(|| "-".to_string());
    let hosts = ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.rules.as_ref())
        .map(|rules| {
            rules
                .iter()
                .filter_map(|rule| rule.host.clone())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let hosts = if hosts.is_empty() {
        "-".to_string()
    } else {
        truncate(&hosts.join(","), 28)
    };
    let address = ingress
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.ip.clone().or_else(|| entry.hostname.clone()))
        .unwrap_or_else(|| "-".to_string());
    let age = human_age(ingress.metadata.creation_timestamp.as_ref());

    RowData {
        columns: vec![
            name.clone(),
            namespace_column(&namespace),
            class,
            hosts,
            truncate(&address, 20),
            age,
        ],
        detail: yaml_detail(&ingress),
        name,
        namespace,
    }
}

fn configmap_row(configmap: ConfigMap) -> RowData {
    let name = configmap.name_any();
    let namespace = configmap.namespace();
    let data = configmap.data.as_ref().map(|entries| entries.len()).unwrap_or(0)
        + configmap
            .binary_data
            .as_ref()
            .map(|entries| entries.len())
            .unwrap_or(0);
    let age = human_age(configmap.metadata.creation_timestamp.as_ref());

    RowData {
        columns: vec![name.clone(), namespace_column(&namespace), data.to_string(), age],
        detail: yaml_detail(&configmap),
        name,
        namespace,
    }
}

fn secret_row(secret: Secret) -> RowData {
    let name = secret.name_any();
    let namespace = secret.namespace();
    let kind = secret.type_.clone().unwrap_or_else(|| "Opaque".to_string());
    let data_count = secret.data.as_ref().map(|map| map.len()).unwrap_or(0);
    let age = human_age(secret.metadata.creation_timestamp.as_ref());

    RowData {
        columns: vec![
            name.clone(),
            namespace_column(&namespace),
            truncate(&kind, 20),
            data_count.to_string(),
            age,
        ],
        detail: yaml_detail(&secret),
        name,
        namespace,
    }
}

fn node_row(node: Node) -> RowData {
    let name = node.name_any();
    let ready = node
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|condition| condition.type_ == "Ready"))
        .map(|condition| match condition.status.as_str() {
            "True" => "Ready",
            "False" => "NotReady",
            _ => "Unknown",
        })
        .unwrap_or("Unknown")
        .to_string();
    let version = node
        .status
        .as_ref()
        .and_then(|status| status.node_info.as_ref())
        .map(|info| info.kubelet_version.clone())
        .unwrap_or_else(|| "-".to_string());
    let age = human_age(node.metadata.creation_timestamp.as_ref());

    RowData {
        columns: vec![name.clone(), ready, node_roles(&node), version, age],
        detail: yaml_detail(&node),
        name,
        namespace: None,
    }
}

fn namespace_row(namespace: Namespace) -> RowData {
    let name = namespace.name_any();
    let phase = namespace
        .status
        .as_ref()
        .and_then(|status| status.phase.clone())
        .unwrap_or_else(|| "Active".to_string());
    let labels = namespace
        .metadata
        .labels
        .as_ref()
        .map(|map| map.len())
        .unwrap_or(0);
    let age = human_age(namespace.metadata.creation_timestamp.as_ref());

    RowData {
        columns: vec![name.clone(), phase, labels.to_string(), age],
        detail: yaml_detail(&namespace),
        name,
        namespace: None,
    }
}

fn event_row(event: Event) -> RowData {
    let name = event.name_any();
    let namespace = event.namespace();
    let kind = event
        .involved_object
        .kind
        .clone()
        .unwrap_or_else(|| "-".to_string());
    let object_name = event
        .involved_object
        .name
        .clone()
        .unwrap_or_else(|| "-".to_string());
    let reason = event.reason.clone().unwrap_or_else(|| "-".to_string());
    let event_type = event.type_.clone().unwrap_or_else(|| "-".to_string());
    let message = event.message.clone().unwrap_or_else(|| "-".to_string());
    let age = event_age(&event);

    RowData {
        columns: vec![
            namespace_column(&namespace),
            kind,
            object_name,
            reason,
            event_type,
            truncate(&message, 72),
            age,
        ],
        detail: yaml_detail(&event),
        name,
        namespace,
    }
}

fn dynamic_row(tab: ResourceTab, object: DynamicObject) -> RowData {
    let name = object.name_any();
    let namespace = if tab.is_namespaced() {
        object.namespace()
    } else {
        None
    };
    let age = human_age(object.metadata.creation_timestamp.as_ref());
    let field = |path: &[&str]| -> String {
        path.iter()
            .try_fold(&object.data, |value, key| value.get(key))
            .map(|value| match value {
                Value::String(text) => text.clone(),
                Value::Null => "-".to_string(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "-".to_string())
    };

    let columns = match tab {
        ResourceTab::Routes => vec![
            name.clone(),
            namespace_column(&namespace),
            field(&["spec", "host"]),
            field(&["spec", "to", "name"]),
            age,
        ],
        ResourceTab::Projects => vec![name.clone(), field(&["status", "phase"]), age],
        _ => vec![
            name.clone(),
            namespace_column(&namespace),
            field(&["spec", "replicas"]),
            field(&["status", "replicas"]),
            age,
        ],
    };

    RowData {
        columns,
        detail: yaml_detail(&object),
        name,
        namespace,
    }
}

fn select_best_pod(pods: &[Pod]) -> Option<&Pod> {
    pods.iter().max_by_key(|pod| pod_running_score(pod))
}

fn pod_running_score(pod: &Pod) -> u64 {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .map(|phase| {
            if phase.eq_ignore_ascii_case("Running") {
                48
            } else if phase.eq_ignore_ascii_case("Pending") {
                18
            } else {
                6
            }
        })
        .unwrap_or(0)
}

fn first_pod_container(pod: &Pod) -> Option<String> {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.containers.first())
        .map(|container| container.name.clone())
}

fn job_name_selector(name: &str) -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([("job-name".to_string(), name.to_string())])),
        ..LabelSelector::default()
    }
}

/// Only `matchLabels` are translated; expression-based selectors are ignored.
fn label_selector_query(selector: &LabelSelector) -> String {
    selector
        .match_labels
        .as_ref()
        .map(selector_query)
        .unwrap_or_default()
}

fn selector_query(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn service_ports_summary(service: &Service) -> String {
    let ports = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.clone())
        .unwrap_or_default();
    if ports.is_empty() {
        return "-".to_string();
    }

    ports
        .into_iter()
        .map(|port| {
            let protocol = port.protocol.unwrap_or_else(|| "TCP".to_string());
            format!("{}/{}", port.port, protocol)
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn pod_readiness(status: &PodStatus) -> (usize, usize, i32) {
    let container_statuses = status.container_statuses.as_deref().unwrap_or(&[]);
    let total = container_statuses.len();
    let ready = container_statuses
        .iter()
        .filter(|container| container.ready)
        .count();
    let restarts = container_statuses
        .iter()
        .map(|container| container.restart_count)
        .sum();

    (ready, total, restarts)
}

fn node_roles(node: &Node) -> String {
    let Some(labels) = node.metadata.labels.as_ref() else {
        return "-".to_string();
    };

    let mut roles = labels
        .keys()
        .filter_map(|key| key.strip_prefix("node-role.kubernetes.io/"))
        .map(|role| {
            if role.is_empty() {
                "worker".to_string()
            } else {
                role.to_string()
            }
        })
        .collect::<Vec<_>>();

    if roles.is_empty()
        && let Some(role) = labels.get("kubernetes.io/role")
    {
        roles.push(role.clone());
    }

    if roles.is_empty() {
        "-".to_string()
    } else {
        roles.sort();
        roles.dedup();
        roles.join(",")
    }
}

fn event_age(event: &Event) -> String {
    if let Some(event_time) = event.event_time.as_ref() {
        return human_age_timestamp(event_time.0);
    }
    human_age(
        event
            .last_timestamp
            .as_ref()
            .or(event.first_timestamp.as_ref())
            .or(event.metadata.creation_timestamp.as_ref()),
    )
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }

    let mut out = value
        .chars()
        .take(max.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn human_age(timestamp: Option<&Time>) -> String {
    let Some(timestamp) = timestamp else {
        return "-".to_string();
    };

    human_age_timestamp(timestamp.0)
}

fn human_age_timestamp(ts: k8s_openapi::jiff::Timestamp) -> String {
    let elapsed_seconds = (k8s_openapi::jiff::Timestamp::now().as_second() - ts.as_second()).max(0);
    format_elapsed_seconds(elapsed_seconds)
}

fn format_elapsed_seconds(seconds: i64) -> String {
    if seconds >= 86_400 {
        return format!("{}d", seconds / 86_400);
    }

    if seconds >= 3_600 {
        return format!("{}h", seconds / 3_600);
    }

    if seconds >= 60 {
        return format!("{}m", seconds / 60);
    }

    format!("{seconds}s")
}

fn yaml_detail<T>(value: &T) -> String
where
    T: Serialize,
{
    serde_yaml::to_string(value).unwrap_or_else(|error| format!("failed to format detail: {error}"))
}

#[cfg(test)]
mod tests {
    use super::{
        collect_pages, dynamic_row, flavor_from_groups, format_elapsed_seconds, headers,
        job_name_selector, label_selector_query, list_params, node_roles, openshift_resource,
        pod_row, select_best_pod, truncate,
    };
    use crate::error::AppError;
    use crate::client::ListFilters;
    use crate::model::{ClusterFlavor, ResourceTab};
    use k8s_openapi::api::core::v1::{
        Container, ContainerStatus, Node, Pod, PodSpec, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::core::DynamicObject;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn pod(name: &str, phase: &str, ready: &[bool]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("shop".to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(PodSpec {
                node_name: Some("node-a".to_string()),
                containers: vec![Container {
                    name: "app".to_string(),
                    ..Container::default()
                }],
                ..PodSpec::default()
            }),
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                container_statuses: Some(
                    ready
                        .iter()
                        .map(|ready| ContainerStatus {
                            ready: *ready,
                            restart_count: 2,
                            ..ContainerStatus::default()
                        })
                        .collect(),
                ),
                ..PodStatus::default()
            }),
        }
    }

    #[test]
    fn pod_row_matches_headers() {
        let row = pod_row(pod("api-0", "Running", &[true, false]));
        assert_eq!(row.name, "api-0");
        assert_eq!(row.namespace.as_deref(), Some("shop"));
        assert_eq!(row.columns.len(), headers(ResourceTab::Pods).len());
        assert_eq!(row.columns[2], "node-a");
        assert_eq!(row.columns[3], "1/2");
        assert_eq!(row.columns[4], "Running");
        assert_eq!(row.columns[5], "4");
        assert_eq!(row.columns[6], "-");
        assert!(row.detail.contains("name: api-0"));
    }

    #[test]
    fn running_pods_win_log_target_selection() {
        let pods = vec![
            pod("api-a", "Pending", &[false]),
            pod("api-b", "Running", &[true]),
            pod("api-c", "Failed", &[false]),
        ];
        let best = select_best_pod(&pods).map(|pod| pod.metadata.name.clone());
        assert_eq!(best, Some(Some("api-b".to_string())));
        assert!(select_best_pod(&[]).is_none());
    }

    #[test]
    fn openshift_groups_select_flavor() {
        assert_eq!(
            flavor_from_groups(["apps", "route.openshift.io"]),
            ClusterFlavor::OpenShift
        );
        assert_eq!(
            flavor_from_groups(["apps", "batch"]),
            ClusterFlavor::Kubernetes
        );
    }

    #[test]
    fn dynamic_routes_read_spec_fields() {
        let resource = openshift_resource(ResourceTab::Routes).expect("route resource");
        assert_eq!(resource.plural, "routes");
        assert_eq!(resource.group, "route.openshift.io");
        assert!(openshift_resource(ResourceTab::Pods).is_none());

        let mut object = DynamicObject::new("web", &resource).within("shop");
        object.data = json!({"spec": {"host": "web.apps.example.com", "to": {"name": "web"}}});
        let row = dynamic_row(ResourceTab::Routes, object);
        assert_eq!(
            row.columns,
            vec!["web", "shop", "web.apps.example.com", "web", "-"]
        );
        assert_eq!(row.columns.len(), headers(ResourceTab::Routes).len());
    }

    #[test]
    fn projects_are_cluster_scoped_rows() {
        let resource = openshift_resource(ResourceTab::Projects).expect("project resource");
        let mut object = DynamicObject::new("team-a", &resource);
        object.data = json!({"status": {"phase": "Active"}});
        let row = dynamic_row(ResourceTab::Projects, object);
        assert_eq!(row.namespace, None);
        assert_eq!(row.columns, vec!["team-a", "Active", "-"]);
    }

    #[test]
    fn job_selector_falls_back_to_job_name_label() {
        assert_eq!(label_selector_query(&job_name_selector("nightly")), "job-name=nightly");
    }

    #[test]
    fn node_roles_from_labels() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("cp-1".to_string()),
                labels: Some(BTreeMap::from([
                    ("node-role.kubernetes.io/control-plane".to_string(), String::new()),
                    ("node-role.kubernetes.io/master".to_string(), String::new()),
                ])),
                ..ObjectMeta::default()
            },
            ..Node::default()
        };
        assert_eq!(node_roles(&node), "control-plane,master");
        assert_eq!(node_roles(&Node::default()), "-");
    }

    #[test]
    fn list_params_carry_filters() {
        let params = list_params(&ListFilters {
            label_selector: Some("app=web".to_string()),
            field_selector: None,
            limit: Some(50),
        });
        assert_eq!(params.label_selector.as_deref(), Some("app=web"));
        assert_eq!(params.field_selector, None);
        assert_eq!(params.limit, Some(50));
    }

    #[tokio::test]
    async fn listing_follows_continue_tokens_to_the_last_page() {
        let mut seen_tokens = Vec::new();
        let rows = collect_pages(list_params(&ListFilters::default()), |params| {
            seen_tokens.push(params.continue_token.clone());
            let page = match params.continue_token.as_deref() {
                None => (vec![1, 2], Some("page-2".to_string())),
                Some("page-2") => (vec![3, 4], Some("page-3".to_string())),
                _ => (vec![5], Some(String::new())),
            };
            async move { Ok::<_, AppError>(page) }
        })
        .await
        .expect("pages");

        assert_eq!(rows, vec![1, 2, 3, 4, 5]);
        assert_eq!(
            seen_tokens,
            vec![None, Some("page-2".to_string()), Some("page-3".to_string())]
        );
    }

    #[tokio::test]
    async fn listing_stops_on_page_error() {
        let result = collect_pages(list_params(&ListFilters::default()), |params| {
            let outcome = match params.continue_token {
                None => Ok((vec![1], Some("next".to_string()))),
                Some(_) => Err(AppError::connection("connection reset")),
            };
            async move { outcome }
        })
        .await;
        assert_eq!(result, Err(AppError::connection("connection reset")));
    }

    #[test]
    fn elapsed_formatting_and_truncation() {
        assert_eq!(format_elapsed_seconds(42), "42s");
        assert_eq!(format_elapsed_seconds(120), "2m");
        assert_eq!(format_elapsed_seconds(7_200), "2h");
        assert_eq!(format_elapsed_seconds(172_800), "2d");
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
