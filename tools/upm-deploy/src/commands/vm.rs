use std::path::Path;

use crate::{
    cli::VmCommand,
    confirm::{ask_user_to_confirm, AssumeYes},
    vagrant::VagrantProject,
    vagrant_config::VagrantConfig,
    virt::{list_fleet_vms, VmState},
};

pub async fn vm(command: &VmCommand, vagrant_dir: &Path, assume_yes: AssumeYes) -> anyhow::Result<()> {
    let project = VagrantProject::new(vagrant_dir)?;

    match command {
        VmCommand::Status => {
            project.status().await?;

            // libvirt's view as well, it also shows domains Vagrant lost track of
            if let Ok(config) = VagrantConfig::load(project.config_path()) {
                let topology = config.topology()?;
                let records = list_fleet_vms(&topology).await?;
                let active = records
                    .iter()
                    .filter(|record| record.state == VmState::Running)
                    .count();

                tracing::info!(
                    "libvirt: {} of {} configured VMs defined, {active} active",
                    records.len(),
                    topology.total()
                );
            }
        }
        VmCommand::Ssh { node } => project.ssh(node).await?,
        VmCommand::Destroy => {
            ask_user_to_confirm(
                &format!(
                    "Destroy every VM managed from {}? Their disks are deleted",
                    project.dir().display()
                ),
                assume_yes,
            )?;
            project.destroy().await?;
        }
        VmCommand::Halt => project.halt().await?,
        VmCommand::Up => project.up(false).await?,
    }

    Ok(())
}
