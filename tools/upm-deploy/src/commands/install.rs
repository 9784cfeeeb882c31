use std::path::Path;

use crate::{
    cli::InstallArgs,
    components::{
        Component, InstallOption, InstallSettings, DATABASE_OPERATOR_NAMESPACE,
        DATABASE_OPERATOR_RELEASE,
    },
    confirm::{ask_user_to_confirm, AssumeYes},
    error::DeployError,
    helm,
    k8s::{wait_until, POLL_INTERVAL},
    kube_client::KubeClient,
    topology::{ClusterTopology, NodeRole},
    vagrant::VagrantProject,
    vagrant_config::VagrantConfig,
};

const ROLE_LABEL: &str = "upm.io/node-role";

/// Expected nodes of `role` that are missing from `labelled`.
fn unlabelled_nodes(topology: &ClusterTopology, role: NodeRole, labelled: &[String]) -> Vec<String> {
    let range = match role {
        NodeRole::Master => return vec![],
        NodeRole::Control => topology.control_range(),
        NodeRole::Worker => topology.worker_range(),
    };

    range
        .map(|index| topology.node_name(index))
        .filter(|name| !labelled.contains(name))
        .collect()
}

async fn check_precondition(
    component: Component,
    topology: &ClusterTopology,
    kube: &KubeClient,
    settings: &InstallSettings,
) -> anyhow::Result<()> {
    let unit = match component {
        Component::K8s => "k8s",
        Component::Storage => "storage",
        Component::Monitoring => "monitoring",
        Component::DatabaseOperator => "database-operator",
        Component::Platform => "platform",
    };

    match component {
        Component::K8s => kube.api_reachable().await?,
        Component::Storage => {
            for (role, value) in [(NodeRole::Control, "control"), (NodeRole::Worker, "worker")] {
                let labelled = kube.nodes_labelled(ROLE_LABEL, value).await?;
                let missing = unlabelled_nodes(topology, role, &labelled);
                if !missing.is_empty() {
                    return Err(DeployError::precondition(
                        unit,
                        format!(
                            "nodes {missing:?} lack {ROLE_LABEL}={value}, run `install --k8s` first"
                        ),
                    )
                    .into());
                }
            }
        }
        Component::Monitoring | Component::DatabaseOperator | Component::Platform => {
            if !kube.storage_class_exists(&settings.storage_class).await? {
                return Err(DeployError::precondition(
                    unit,
                    format!(
                        "storage class '{}' does not exist, run `install --storage` first",
                        settings.storage_class
                    ),
                )
                .into());
            }

            if component == Component::Platform
                && !helm::release_deployed(DATABASE_OPERATOR_RELEASE, DATABASE_OPERATOR_NAMESPACE)
                    .await?
            {
                return Err(DeployError::precondition(
                    unit,
                    "the CloudNativePG release is not deployed, run `install --database-operator` first",
                )
                .into());
            }
        }
    }

    Ok(())
}

async fn label_nodes(
    topology: &ClusterTopology,
    kube: &KubeClient,
    settings: &InstallSettings,
) -> anyhow::Result<()> {
    kube.wait_for_nodes_ready(settings.ready_timeout).await?;

    let names = kube.node_names().await?;
    let plan = topology.label_plan(names.iter().map(String::as_str))?;

    for assignment in &plan {
        kube.label_node(assignment).await?;
    }

    tracing::info!("Labelled {} nodes", plan.len());
    Ok(())
}

async fn install_chart(
    component: Component,
    kube: &KubeClient,
    settings: &InstallSettings,
) -> anyhow::Result<()> {
    let (Some(repo), Some(release)) = (component.repo(settings), component.release(settings)) else {
        return Ok(());
    };

    helm::add_repo(&repo).await?;
    helm::update_repo(&repo).await?;
    helm::upgrade_install(&release, settings.helm_timeout).await?;

    kube.wait_for_namespace_ready(release.namespace, settings.ready_timeout)
        .await?;

    if component == Component::Storage {
        let storage_class = &settings.storage_class;
        wait_until(
            &format!("storage class {storage_class}"),
            settings.ready_timeout,
            POLL_INTERVAL,
            || async move { kube.storage_class_exists(storage_class).await },
        )
        .await?;
    }

    Ok(())
}

async fn install_component(
    component: Component,
    topology: &ClusterTopology,
    kube: &KubeClient,
    settings: &InstallSettings,
    assume_yes: AssumeYes,
) -> anyhow::Result<()> {
    check_precondition(component, topology, kube, settings).await?;

    ask_user_to_confirm(&format!("Install {component}?"), assume_yes)?;
    tracing::info!("Installing {component}");

    match component {
        Component::K8s => label_nodes(topology, kube, settings).await?,
        _ => install_chart(component, kube, settings).await?,
    }

    tracing::info!("Finished installing {component}");
    Ok(())
}

pub async fn install(
    args: &InstallArgs,
    vagrant_dir: &Path,
    assume_yes: AssumeYes,
) -> anyhow::Result<()> {
    let option = InstallOption::try_from(&args.selector)?;

    let project = VagrantProject::new(vagrant_dir)?;
    let topology = VagrantConfig::load(project.config_path())?.topology()?;

    let settings = InstallSettings {
        storage_class: args.storage_class.clone(),
        helm_timeout: args.helm_timeout,
        ready_timeout: args.ready_timeout,
        upm_repo_url: args.upm_chart_repo.clone(),
    };

    let kube = KubeClient::new(&args.kubeconfig).await?;
    kube.api_reachable().await?;

    // Every node must be one of ours and every configured node must exist
    let names = kube.node_names().await?;
    let nodes = topology.resolve_nodes(names.iter().map(String::as_str))?;
    tracing::info!(
        "Cluster has all {} nodes of fleet '{}'",
        nodes.len(),
        topology.prefix()
    );

    for component in option.components() {
        install_component(component, &topology, &kube, &settings, assume_yes).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_nodes_missing_their_role_label() {
        // masters 1, control 2..=3, workers 4..=5
        let topology = ClusterTopology::new("k8s", 5, 1, 2).unwrap();

        let labelled = vec!["k8s-2".to_string()];
        assert_eq!(
            unlabelled_nodes(&topology, NodeRole::Control, &labelled),
            vec!["k8s-3".to_string()]
        );

        let labelled = vec!["k8s-4".to_string(), "k8s-5".to_string()];
        assert!(unlabelled_nodes(&topology, NodeRole::Worker, &labelled).is_empty());
        assert!(unlabelled_nodes(&topology, NodeRole::Master, &[]).is_empty());
    }

    #[test]
    fn no_control_nodes_means_nothing_to_check() {
        let topology = ClusterTopology::new("k8s", 3, 1, 0).unwrap();
        assert!(unlabelled_nodes(&topology, NodeRole::Control, &[]).is_empty());
        assert_eq!(unlabelled_nodes(&topology, NodeRole::Worker, &[]).len(), 2);
    }
}
