//! Thin wrapper over the `helm` binary.

use std::time::Duration;

use serde::Deserialize;

use crate::{
    error::DeployError,
    retry::{retry_fixed, RetryPolicy},
    subprocess::{run_command, run_command_checked, run_streamed},
};

const REPO_TIMEOUT: Duration = Duration::from_secs(120);
const STATUS_TIMEOUT: Duration = Duration::from_secs(60);
/// Slack on top of helm's own `--timeout` before we kill it
const HELM_GRACE: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelmRepo {
    pub name: &'static str,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelmRelease {
    pub name: &'static str,
    pub namespace: &'static str,
    /// `<repo>/<chart>`
    pub chart: String,
    pub version: Option<&'static str>,
    pub values: Vec<(String, String)>,
}

impl HelmRelease {
    pub fn upgrade_install_args(&self, wait_timeout: Duration) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            self.name.to_string(),
            self.chart.clone(),
            "--namespace".to_string(),
            self.namespace.to_string(),
            "--create-namespace".to_string(),
            "--wait".to_string(),
            "--timeout".to_string(),
            format!("{}s", wait_timeout.as_secs()),
        ];

        if let Some(version) = self.version {
            args.push("--version".to_string());
            args.push(version.to_string());
        }

        for (key, value) in &self.values {
            args.push("--set".to_string());
            args.push(format!("{key}={value}"));
        }

        args
    }
}

/// Adds (or refreshes the URL of) a chart repository.
pub async fn add_repo(repo: &HelmRepo) -> anyhow::Result<()> {
    retry_fixed(
        &RetryPolicy::HELM_REPOSITORY,
        &format!("helm repo add {}", repo.name),
        || async move {
            run_command_checked(
                "helm",
                &["repo", "add", "--force-update", repo.name, &repo.url],
                REPO_TIMEOUT,
            )
            .await
        },
    )
    .await?;

    Ok(())
}

pub async fn update_repo(repo: &HelmRepo) -> anyhow::Result<()> {
    retry_fixed(
        &RetryPolicy::HELM_REPOSITORY,
        &format!("helm repo update {}", repo.name),
        || async move {
            run_command_checked("helm", &["repo", "update", repo.name], REPO_TIMEOUT).await
        },
    )
    .await?;

    Ok(())
}

/// Idempotent install, helm waits for the release's resources up to `wait_timeout`.
pub async fn upgrade_install(release: &HelmRelease, wait_timeout: Duration) -> anyhow::Result<()> {
    let args = release.upgrade_install_args(wait_timeout);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    run_streamed("helm", "helm", &args, None, wait_timeout + HELM_GRACE).await
}

#[derive(Debug, Deserialize)]
struct ReleaseStatus {
    info: ReleaseInfo,
}

#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    status: String,
}

fn parse_release_status(json: &str) -> anyhow::Result<String> {
    let status: ReleaseStatus = serde_json::from_str(json)?;
    Ok(status.info.status)
}

/// Reads `helm status` output. Only a missing release means "not deployed",
/// any other failure (unreachable cluster, bad kubeconfig) is an error.
fn interpret_status(success: bool, stdout: &str, stderr: &str) -> anyhow::Result<bool> {
    if !success {
        if stderr.contains("release: not found") {
            return Ok(false);
        }

        return Err(DeployError::command_failed("helm status", stderr.trim()).into());
    }

    Ok(parse_release_status(stdout)? == "deployed")
}

/// True if the release exists and its last revision deployed successfully.
pub async fn release_deployed(name: &str, namespace: &str) -> anyhow::Result<bool> {
    let output = run_command(
        "helm",
        &["status", name, "--namespace", namespace, "--output", "json"],
        STATUS_TIMEOUT,
    )
    .await?;

    interpret_status(
        output.status.success(),
        &String::from_utf8_lossy(&output.stdout),
        &String::from_utf8_lossy(&output.stderr),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_install_is_bounded_and_namespaced() {
        let release = HelmRelease {
            name: "kube-prometheus-stack",
            namespace: "monitoring",
            chart: "prometheus-community/kube-prometheus-stack".to_string(),
            version: Some("65.1.0"),
            values: vec![(
                "grafana.persistence.storageClassName".to_string(),
                "openebs-hostpath".to_string(),
            )],
        };

        let args = release.upgrade_install_args(Duration::from_secs(600));

        assert_eq!(
            args,
            vec![
                "upgrade",
                "--install",
                "kube-prometheus-stack",
                "prometheus-community/kube-prometheus-stack",
                "--namespace",
                "monitoring",
                "--create-namespace",
                "--wait",
                "--timeout",
                "600s",
                "--version",
                "65.1.0",
                "--set",
                "grafana.persistence.storageClassName=openebs-hostpath",
            ]
        );
    }

    #[test]
    fn reads_release_status() {
        let json = r#"{"name":"cloudnative-pg","info":{"status":"deployed","notes":""},"version":1}"#;
        assert_eq!(parse_release_status(json).unwrap(), "deployed");

        let json = r#"{"name":"cloudnative-pg","info":{"status":"failed"}}"#;
        assert_eq!(parse_release_status(json).unwrap(), "failed");
    }

    #[test]
    fn only_a_missing_release_is_not_deployed() {
        assert!(!interpret_status(false, "", "Error: release: not found\n").unwrap());

        let err = interpret_status(
            false,
            "",
            "Error: Kubernetes cluster unreachable: dial tcp 127.0.0.1:6443: connect: connection refused",
        )
        .unwrap_err();
        assert!(err.to_string().contains("cluster unreachable"));

        let deployed = r#"{"info":{"status":"deployed"}}"#;
        assert!(interpret_status(true, deployed, "").unwrap());
        let pending = r#"{"info":{"status":"pending-install"}}"#;
        assert!(!interpret_status(true, pending, "").unwrap());
    }
}
