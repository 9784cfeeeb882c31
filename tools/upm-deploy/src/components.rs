//! The installable units and the charts behind them.

use std::time::Duration;

use strum::Display;

use crate::{
    helm::{HelmRelease, HelmRepo},
    topology::CONTROL_LABELS,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum Component {
    #[strum(serialize = "Kubernetes node setup")]
    K8s,
    #[strum(serialize = "storage (OpenEBS)")]
    Storage,
    #[strum(serialize = "monitoring (kube-prometheus-stack)")]
    Monitoring,
    #[strum(serialize = "database operator (CloudNativePG)")]
    DatabaseOperator,
    #[strum(serialize = "UPM platform")]
    Platform,
}

/// What a single `install` invocation was asked to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallOption {
    Only(Component),
    All,
}

impl InstallOption {
    /// Order matters, each unit's pre-condition is met by the ones before it.
    pub const ALL_SEQUENCE: [Component; 5] = [
        Component::K8s,
        Component::Storage,
        Component::Monitoring,
        Component::DatabaseOperator,
        Component::Platform,
    ];

    pub fn components(&self) -> Vec<Component> {
        match self {
            InstallOption::Only(component) => vec![*component],
            InstallOption::All => Self::ALL_SEQUENCE.to_vec(),
        }
    }
}

pub const OPENEBS_REPO_URL: &str = "https://openebs.github.io/openebs";
pub const PROMETHEUS_REPO_URL: &str = "https://prometheus-community.github.io/helm-charts";
pub const CNPG_REPO_URL: &str = "https://cloudnative-pg.github.io/charts";
pub const UPM_REPO_URL: &str = "https://upmio.github.io/helm-charts";

pub const DEFAULT_STORAGE_CLASS: &str = "openebs-hostpath";

const STORAGE_NAMESPACE: &str = "openebs";
const MONITORING_NAMESPACE: &str = "monitoring";
pub const DATABASE_OPERATOR_NAMESPACE: &str = "cnpg-system";
const PLATFORM_NAMESPACE: &str = "upm-system";

pub const DATABASE_OPERATOR_RELEASE: &str = "cloudnative-pg";

/// Settings shared by every helm backed unit.
#[derive(Clone, Debug)]
pub struct InstallSettings {
    pub storage_class: String,
    pub helm_timeout: Duration,
    pub ready_timeout: Duration,
    pub upm_repo_url: String,
}

/// Escapes dots so helm `--set` treats a label key as a single map key.
fn set_key(key: &str) -> String {
    key.replace('.', "\\.")
}

impl Component {
    pub fn repo(&self, settings: &InstallSettings) -> Option<HelmRepo> {
        let (name, url) = match self {
            Component::K8s => return None,
            Component::Storage => ("openebs", OPENEBS_REPO_URL.to_string()),
            Component::Monitoring => ("prometheus-community", PROMETHEUS_REPO_URL.to_string()),
            Component::DatabaseOperator => ("cnpg", CNPG_REPO_URL.to_string()),
            Component::Platform => ("upm", settings.upm_repo_url.clone()),
        };

        Some(HelmRepo { name, url })
    }

    pub fn release(&self, settings: &InstallSettings) -> Option<HelmRelease> {
        let sc = &settings.storage_class;

        let release = match self {
            Component::K8s => return None,
            Component::Storage => HelmRelease {
                name: "openebs",
                namespace: STORAGE_NAMESPACE,
                chart: "openebs/openebs".to_string(),
                version: Some("4.1.1"),
                values: vec![
                    ("engines.replicated.mayastor.enabled".into(), "false".into()),
                    ("engines.local.zfs.enabled".into(), "false".into()),
                    ("engines.local.lvm.enabled".into(), "false".into()),
                    ("localpv-provisioner.hostpathClass.name".into(), sc.clone()),
                    (
                        "localpv-provisioner.hostpathClass.isDefaultClass".into(),
                        "true".into(),
                    ),
                ],
            },
            Component::Monitoring => HelmRelease {
                name: "kube-prometheus-stack",
                namespace: MONITORING_NAMESPACE,
                chart: "prometheus-community/kube-prometheus-stack".to_string(),
                version: Some("65.1.0"),
                values: vec![
                    ("grafana.persistence.enabled".into(), "true".into()),
                    ("grafana.persistence.storageClassName".into(), sc.clone()),
                    (
                        "prometheus.prometheusSpec.storageSpec.volumeClaimTemplate.spec.storageClassName"
                            .into(),
                        sc.clone(),
                    ),
                    (
                        "prometheus.prometheusSpec.storageSpec.volumeClaimTemplate.spec.resources.requests.storage"
                            .into(),
                        "20Gi".into(),
                    ),
                ],
            },
            Component::DatabaseOperator => HelmRelease {
                name: DATABASE_OPERATOR_RELEASE,
                namespace: DATABASE_OPERATOR_NAMESPACE,
                chart: "cnpg/cloudnative-pg".to_string(),
                version: Some("0.22.1"),
                values: vec![],
            },
            Component::Platform => {
                let mut values = vec![("global.storageClassName".to_string(), sc.clone())];
                values.extend(CONTROL_LABELS.iter().map(|(key, value)| {
                    (
                        format!("global.nodeSelector.{}", set_key(key)),
                        value.to_string(),
                    )
                }));

                HelmRelease {
                    name: "upm-engine",
                    namespace: PLATFORM_NAMESPACE,
                    chart: "upm/upm-engine".to_string(),
                    version: None,
                    values,
                }
            }
        };

        Some(release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> InstallSettings {
        InstallSettings {
            storage_class: "fast".to_string(),
            helm_timeout: Duration::from_secs(600),
            ready_timeout: Duration::from_secs(600),
            upm_repo_url: "https://charts.example.com/upm".to_string(),
        }
    }

    #[test]
    fn all_expands_in_dependency_order() {
        assert_eq!(
            InstallOption::All.components(),
            vec![
                Component::K8s,
                Component::Storage,
                Component::Monitoring,
                Component::DatabaseOperator,
                Component::Platform,
            ]
        );
        assert_eq!(
            InstallOption::Only(Component::Monitoring).components(),
            vec![Component::Monitoring]
        );
    }

    #[test]
    fn only_k8s_has_no_helm_release() {
        let settings = settings();

        for component in InstallOption::ALL_SEQUENCE {
            let has_chart = component != Component::K8s;
            assert_eq!(component.repo(&settings).is_some(), has_chart);
            assert_eq!(component.release(&settings).is_some(), has_chart);
        }
    }

    #[test]
    fn releases_use_the_configured_storage_class() {
        let settings = settings();

        for component in [Component::Monitoring, Component::Platform] {
            let release = component.release(&settings).unwrap();
            assert!(
                release
                    .values
                    .iter()
                    .any(|(key, value)| key.ends_with("storageClassName") && value == "fast"),
                "{component} does not use the storage class"
            );
        }
    }

    #[test]
    fn platform_is_pinned_to_control_nodes() {
        let settings = settings();

        let release = Component::Platform.release(&settings).unwrap();
        assert!(release.values.contains(&(
            "global.nodeSelector.upm\\.io/node-role".to_string(),
            "control".to_string()
        )));
        assert_eq!(
            Component::Platform.repo(&settings).unwrap().url,
            "https://charts.example.com/upm"
        );
    }
}
