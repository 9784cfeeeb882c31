use std::path::Path;

use crate::{
    cli::SetupArgs,
    confirm::{ask_user_to_choose, AssumeYes},
    deploy_home::DeployHome,
    error::DeployError,
    external_dependencies::{external_dependency_preflight_check, SETUP_DEPENDENCIES},
    host::{
        configure_libvirt, ensure_subscription, install_dependencies, OsRelease, RhsmCredentials,
        OS_RELEASE_PATH,
    },
    network::resolve_network_mode,
    topology::ClusterTopology,
    vagrant::VagrantProject,
    vagrant_config::{VagrantConfig, VagrantSettings},
    virt::{
        destroy_fleet, list_fleet_vms, reconcile_indices, Decision, InventoryOutcome,
        ReconcileAction, VmRecord,
    },
};

const SYS_CLASS_NET: &str = "/sys/class/net";

fn rhsm_credentials(args: &SetupArgs) -> anyhow::Result<Option<RhsmCredentials>> {
    match (&args.rhsm_username, &args.rhsm_password) {
        (Some(username), Some(password)) => Ok(Some(RhsmCredentials {
            username: username.clone(),
            password: password.clone(),
        })),
        (None, None) => Ok(None),
        _ => anyhow::bail!("--rhsm-username and --rhsm-password must be given together"),
    }
}

/// Picks what to do with the VMs already defined under our prefix.
fn choose_action(
    desired: u32,
    existing: &[VmRecord],
    assume_yes: AssumeYes,
) -> anyhow::Result<ReconcileAction> {
    let indices: Vec<u32> = existing.iter().map(|record| record.index).collect();

    let action = match reconcile_indices(desired, &indices, assume_yes) {
        Decision::Resolved(action) => action,
        Decision::Ask(choices) => {
            let found = indices.len();
            let message = match InventoryOutcome::classify_indices(desired, &indices) {
                InventoryOutcome::CountMismatch => format!(
                    "Found {found} existing VMs {indices:?} but 1..={desired} are configured, what should happen to them?"
                ),
                _ => format!("Found all {found} VMs already defined, what should happen to them?"),
            };
            ask_user_to_choose(&message, choices)?
        }
    };

    Ok(action)
}

/// Whether the existing VMs must go before `vagrant` runs. Aborting is a
/// cancellation and happens before anything is touched.
fn destroy_before_apply(action: ReconcileAction) -> anyhow::Result<bool> {
    if action == ReconcileAction::Abort {
        return Err(DeployError::Cancelled.into());
    }

    Ok(action.destroys())
}

pub async fn setup(
    args: &SetupArgs,
    vagrant_dir: &Path,
    deploy_home: &DeployHome,
    assume_yes: AssumeYes,
    skip_preflight_checks: bool,
) -> anyhow::Result<()> {
    let topology =
        ClusterTopology::new(&args.prefix, args.instances, args.masters, args.upm_nodes)?;
    let project = VagrantProject::new(vagrant_dir)?;

    let release = OsRelease::load(OS_RELEASE_PATH)?;
    let family = release.family()?;
    tracing::info!(
        "Detected {} ({family:?})",
        release.pretty_name.as_deref().unwrap_or(&release.id)
    );

    if args.skip_deps {
        tracing::info!("Skipping host dependency installation");
    } else {
        ensure_subscription(&release, rhsm_credentials(args)?.as_ref()).await?;
        install_dependencies(&release, project.dir()).await?;
    }

    if !skip_preflight_checks {
        external_dependency_preflight_check(deploy_home, &SETUP_DEPENDENCIES)?;
    }

    configure_libvirt().await?;

    let network = resolve_network_mode(&args.network_args(), assume_yes, Path::new(SYS_CLASS_NET))?;

    let settings = VagrantSettings {
        topology: topology.clone(),
        cpus: args.cpus,
        memory_mb: args.memory_mb,
        disk_gb: args.disk_gb,
        box_name: args.r#box.clone(),
        network,
    };
    settings.write(&project.config_path(), &deploy_home.tmp_dir()?)?;
    tracing::info!("Wrote {}", project.config_path().display());

    // Read back what Vagrant will see so both always agree on the topology
    let topology = VagrantConfig::load(project.config_path())?.topology()?;

    let existing = list_fleet_vms(&topology).await?;
    let action = choose_action(topology.total(), &existing, assume_yes)?;
    tracing::info!("Reconciling {} existing VMs: {action}", existing.len());

    if destroy_before_apply(action)? {
        destroy_fleet(&existing, &topology, project.dir()).await?;
    }

    project.apply(action).await?;

    let indices: Vec<u32> = list_fleet_vms(&topology)
        .await?
        .iter()
        .map(|record| record.index)
        .collect();
    let found = indices.len();
    if InventoryOutcome::classify_indices(topology.total(), &indices)
        != InventoryOutcome::CountMatches
    {
        return Err(DeployError::InventoryMismatch {
            prefix: topology.prefix().to_string(),
            expected: topology.total(),
            found,
        }
        .into());
    }

    tracing::info!(
        "Fleet '{}' is up with {} VMs, run `upm-deploy install --all` next",
        topology.prefix(),
        found
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cli::{Cli, Command},
        error::is_cancellation,
        virt::VmState,
    };
    use clap::Parser;

    fn fleet(indices: &[u32]) -> Vec<VmRecord> {
        indices
            .iter()
            .map(|index| VmRecord {
                name: format!("k8s-{index}"),
                index: *index,
                state: VmState::Running,
            })
            .collect()
    }

    #[test]
    fn auto_confirm_never_prompts() {
        assert_eq!(
            choose_action(3, &[], AssumeYes::DefaultYes).unwrap(),
            ReconcileAction::Create
        );
        assert_eq!(
            choose_action(3, &fleet(&[1, 2, 3]), AssumeYes::DefaultYes).unwrap(),
            ReconcileAction::RetainAndReprovision
        );
        assert_eq!(
            choose_action(3, &fleet(&[1, 2, 3, 4, 5]), AssumeYes::DefaultYes).unwrap(),
            ReconcileAction::DestroyAndRecreate
        );
        assert_eq!(
            choose_action(3, &fleet(&[1, 2, 5]), AssumeYes::DefaultYes).unwrap(),
            ReconcileAction::DestroyAndRecreate
        );
    }

    #[test]
    fn abort_cancels_before_anything_is_destroyed() {
        let err = destroy_before_apply(ReconcileAction::Abort).unwrap_err();
        assert!(is_cancellation(&err));

        assert!(destroy_before_apply(ReconcileAction::DestroyAndRecreate).unwrap());
        for action in [
            ReconcileAction::Create,
            ReconcileAction::RetainAndReprovision,
            ReconcileAction::RetainAndRedeploy,
        ] {
            assert!(!destroy_before_apply(action).unwrap());
        }
    }

    #[test]
    fn rhsm_credentials_come_in_pairs() {
        let parse = |extra: &[&str]| {
            let mut args = vec!["upm-deploy", "setup"];
            args.extend_from_slice(extra);
            match Cli::try_parse_from(args).unwrap().command {
                Command::Setup(setup) => setup,
                other => panic!("unexpected command {other:?}"),
            }
        };

        let both = parse(&["--rhsm-username", "ops", "--rhsm-password", "secret"]);
        let credentials = rhsm_credentials(&both).unwrap().unwrap();
        assert_eq!(credentials.username, "ops");

        let only_user = parse(&["--rhsm-username", "ops"]);
        if only_user.rhsm_password.is_none() {
            assert!(rhsm_credentials(&only_user).is_err());
        }
    }
}
