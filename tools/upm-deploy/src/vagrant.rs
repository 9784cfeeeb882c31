use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    subprocess::{run_interactive, run_streamed},
    virt::ReconcileAction,
};

/// Provisioning runs kubespray on every VM, which is slow.
const PROVISION_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
const LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// A checkout containing the Vagrantfile and its `vagrant/config.rb`.
#[derive(Clone, Debug)]
pub struct VagrantProject {
    dir: PathBuf,
}

impl VagrantProject {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();

        if !dir.join("Vagrantfile").is_file() {
            anyhow::bail!("No Vagrantfile found in {}", dir.display());
        }

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join("vagrant").join("config.rb")
    }

    async fn run(&self, args: &[&str], limit: Duration) -> anyhow::Result<()> {
        run_streamed("vagrant", "vagrant", args, Some(&self.dir), limit).await
    }

    pub async fn up(&self, provision: bool) -> anyhow::Result<()> {
        let mut args = vec!["up", "--provider=libvirt"];
        if provision {
            args.push("--provision");
        }
        self.run(&args, PROVISION_TIMEOUT).await
    }

    pub async fn reload_and_provision(&self) -> anyhow::Result<()> {
        self.run(&["reload", "--provision"], PROVISION_TIMEOUT).await
    }

    pub async fn status(&self) -> anyhow::Result<()> {
        self.run(&["status"], LIFECYCLE_TIMEOUT).await
    }

    pub async fn halt(&self) -> anyhow::Result<()> {
        self.run(&["halt"], LIFECYCLE_TIMEOUT).await
    }

    pub async fn destroy(&self) -> anyhow::Result<()> {
        self.run(&["destroy", "--force"], LIFECYCLE_TIMEOUT).await
    }

    pub async fn ssh(&self, node: &str) -> anyhow::Result<()> {
        run_interactive("vagrant", &["ssh", node], &self.dir).await
    }

    /// Carries out a reconciliation decision. Destroying the old VMs is the
    /// caller's job since it needs the inventory.
    pub async fn apply(&self, action: ReconcileAction) -> anyhow::Result<()> {
        match action {
            ReconcileAction::Create | ReconcileAction::DestroyAndRecreate => self.up(false).await,
            ReconcileAction::RetainAndReprovision => self.up(true).await,
            ReconcileAction::RetainAndRedeploy => self.reload_and_provision().await,
            ReconcileAction::Abort => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn project_requires_a_vagrantfile() {
        let dir = tempfile::tempdir().unwrap();
        assert!(VagrantProject::new(dir.path()).is_err());

        fs::write(dir.path().join("Vagrantfile"), "Vagrant.configure(\"2\")\n").unwrap();
        let project = VagrantProject::new(dir.path()).unwrap();
        assert_eq!(
            project.config_path(),
            dir.path().join("vagrant").join("config.rb")
        );
    }
}
