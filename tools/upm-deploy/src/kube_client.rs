use std::collections::BTreeMap;
use std::env::set_var;
use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::{
    core::v1::{Node, Pod},
    storage::v1::StorageClass,
};
use kube::{
    api::{ListParams, Patch, PatchParams},
    runtime::reflector::Lookup,
    Api, Client,
};
use serde_json::json;

use crate::{
    error::DeployError,
    k8s::{
        conditions::{all_pods_ready, is_node_ready},
        wait_until, POLL_INTERVAL,
    },
    topology::LabelAssignment,
};

const FIELD_MANAGER: &str = "upm-deploy";

pub struct KubeClient {
    client: Client,
    nodes: Api<Node>,
    storage_classes: Api<StorageClass>,
}

impl KubeClient {
    /// Connects using `kubeconfig_path` if given, otherwise the default
    /// kubeconfig resolution. The path is also exported as `KUBECONFIG` so
    /// that helm talks to the same cluster.
    pub async fn new(kubeconfig_path: &Option<impl AsRef<Path>>) -> anyhow::Result<Self> {
        if let Some(kubeconfig_path) = kubeconfig_path {
            set_var("KUBECONFIG", kubeconfig_path.as_ref().as_os_str());
        }

        let client = Client::try_default().await?;

        Ok(Self {
            nodes: Api::all(client.clone()),
            storage_classes: Api::all(client.clone()),
            client,
        })
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub async fn api_reachable(&self) -> anyhow::Result<()> {
        let version = self.client.apiserver_version().await.map_err(|e| {
            DeployError::precondition("k8s", format!("Kubernetes API is not reachable: {e}"))
        })?;

        tracing::info!("Connected to Kubernetes {}", version.git_version);
        Ok(())
    }

    pub async fn list_nodes(&self) -> anyhow::Result<Vec<Node>> {
        Ok(self.nodes.list(&ListParams::default()).await?.items)
    }

    pub async fn node_names(&self) -> anyhow::Result<Vec<String>> {
        let names = self
            .list_nodes()
            .await?
            .iter()
            .filter_map(|node| node.name().map(|name| name.to_string()))
            .collect();

        Ok(names)
    }

    /// Names of nodes carrying `key=value`.
    pub async fn nodes_labelled(&self, key: &str, value: &str) -> anyhow::Result<Vec<String>> {
        let lp = ListParams::default().labels(&format!("{key}={value}"));

        let names = self
            .nodes
            .list(&lp)
            .await?
            .items
            .iter()
            .filter_map(|node| node.name().map(|name| name.to_string()))
            .collect();

        Ok(names)
    }

    pub async fn label_node(&self, assignment: &LabelAssignment) -> anyhow::Result<()> {
        let labels: BTreeMap<String, String> = assignment.labels();
        let patch = json!({ "metadata": { "labels": labels } });

        self.nodes
            .patch(
                &assignment.node,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| {
                DeployError::command_failed(
                    format!("label node {}", assignment.node),
                    e.to_string(),
                )
            })?;

        tracing::info!(
            "Labelled {} as {:?}: {:?}",
            assignment.node,
            assignment.role,
            labels
        );
        Ok(())
    }

    pub async fn storage_class_exists(&self, name: &str) -> anyhow::Result<bool> {
        Ok(self.storage_classes.get_opt(name).await?.is_some())
    }

    pub async fn wait_for_nodes_ready(&self, limit: Duration) -> anyhow::Result<()> {
        wait_until("all cluster nodes", limit, POLL_INTERVAL, || async move {
            let nodes = self.list_nodes().await?;
            let not_ready: Vec<_> = nodes
                .iter()
                .filter(|node| !is_node_ready(node))
                .filter_map(|node| node.name())
                .collect();

            if !not_ready.is_empty() {
                tracing::info!("Waiting for nodes {:?}", not_ready);
            }

            Ok::<_, anyhow::Error>(!nodes.is_empty() && not_ready.is_empty())
        })
        .await
    }

    pub async fn wait_for_namespace_ready(
        &self,
        namespace: &str,
        limit: Duration,
    ) -> anyhow::Result<()> {
        let pods = &self.pods(namespace);

        wait_until(
            &format!("pods in namespace {namespace}"),
            limit,
            POLL_INTERVAL,
            || async move {
                let pods = pods.list(&ListParams::default()).await?.items;
                Ok::<_, anyhow::Error>(all_pods_ready(&pods))
            },
        )
        .await
    }
}
