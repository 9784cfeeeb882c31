//! VM inventory as seen by libvirt.

mod reconcile;

use std::{fs, path::Path, time::Duration};

pub use reconcile::{reconcile_indices, Decision, InventoryOutcome, ReconcileAction};

use crate::{
    error::DeployError,
    subprocess::{run_command, run_command_checked},
    topology::ClusterTopology,
};

const VIRSH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VmState {
    /// Any active domain: running, paused, blocked, in shutdown, pmsuspended
    Running,
    /// `shut off` or `crashed`, nothing to destroy before undefining
    Stopped,
}

impl VmState {
    fn from_virsh(state: &str) -> Self {
        match state {
            "shut off" | "crashed" => VmState::Stopped,
            _ => VmState::Running,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmRecord {
    pub name: String,
    pub index: u32,
    pub state: VmState,
}

/// Parses the table printed by `virsh list --all`, keeping only domains
/// named `<prefix>-<index>`.
///
/// ```text
///  Id   Name     State
/// -------------------------
///  1    k8s-1    running
///  -    k8s-2    shut off
/// ```
pub fn parse_virsh_list(output: &str, topology: &ClusterTopology) -> Vec<VmRecord> {
    let mut records: Vec<VmRecord> = output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let _id = columns.next()?;
            let name = columns.next()?;
            let state = columns.collect::<Vec<_>>().join(" ");

            let index = topology.parse_index(name)?;
            let state = VmState::from_virsh(&state);

            Some(VmRecord {
                name: name.to_string(),
                index,
                state,
            })
        })
        .collect();

    records.sort_by_key(|record| record.index);
    records
}

pub async fn list_fleet_vms(topology: &ClusterTopology) -> anyhow::Result<Vec<VmRecord>> {
    let output =
        run_command_checked("virsh", &["--connect", "qemu:///system", "list", "--all"], VIRSH_TIMEOUT)
            .await?;

    let records = parse_virsh_list(&output, topology);
    tracing::debug!("Found {} VMs matching '{}-<index>'", records.len(), topology.prefix());

    Ok(records)
}

/// Destroys and undefines a single VM together with its volumes.
///
/// Refuses to touch anything whose name does not follow the fleet naming
/// convention.
pub async fn destroy_vm(record: &VmRecord, topology: &ClusterTopology) -> anyhow::Result<()> {
    if topology.parse_index(&record.name) != Some(record.index) {
        return Err(DeployError::command_failed(
            "virsh destroy",
            format!("refusing to destroy '{}', it is not part of the fleet", record.name),
        )
        .into());
    }

    tracing::info!("Destroying VM {}", record.name);

    if record.state == VmState::Running {
        run_command_checked(
            "virsh",
            &["--connect", "qemu:///system", "destroy", &record.name],
            VIRSH_TIMEOUT,
        )
        .await?;
    }

    run_command_checked(
        "virsh",
        &[
            "--connect",
            "qemu:///system",
            "undefine",
            &record.name,
            "--remove-all-storage",
        ],
        VIRSH_TIMEOUT,
    )
    .await?;

    Ok(())
}

/// Destroys all given VMs and drops the matching Vagrant machine state so the
/// next `vagrant up` does not try to reuse them.
pub async fn destroy_fleet(
    records: &[VmRecord],
    topology: &ClusterTopology,
    vagrant_dir: &Path,
) -> anyhow::Result<()> {
    for record in records {
        destroy_vm(record, topology).await?;
    }

    remove_machine_state(records, topology, vagrant_dir)
}

/// Removes `.vagrant/machines/<name>` for every fleet VM in `records`.
pub fn remove_machine_state(
    records: &[VmRecord],
    topology: &ClusterTopology,
    vagrant_dir: &Path,
) -> anyhow::Result<()> {
    let machines_dir = vagrant_dir.join(".vagrant").join("machines");

    for record in records {
        if topology.parse_index(&record.name) != Some(record.index) {
            continue;
        }

        let machine_dir = machines_dir.join(&record.name);
        if machine_dir.exists() {
            tracing::debug!("Removing {}", machine_dir.display());
            fs::remove_dir_all(&machine_dir)?;
        }
    }

    Ok(())
}

/// Returns true if libvirt answers at all, used as a preflight check.
pub async fn libvirt_reachable() -> bool {
    matches!(
        run_command("virsh", &["--connect", "qemu:///system", "version"], VIRSH_TIMEOUT).await,
        Ok(output) if output.status.success()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIRSH_LIST: &str = " Id   Name                State
------------------------------------------
 3    k8s-2               running
 4    k8s-1               running
 -    k8s-3               shut off
 -    k8s-build           shut off
 -    windows-10          shut off
 -    k8s-04              paused
";

    #[test]
    fn only_fleet_domains_are_listed() {
        let topology = ClusterTopology::new("k8s", 3, 1, 1).unwrap();

        let records = parse_virsh_list(VIRSH_LIST, &topology);

        assert_eq!(
            records,
            vec![
                VmRecord {
                    name: "k8s-1".to_string(),
                    index: 1,
                    state: VmState::Running
                },
                VmRecord {
                    name: "k8s-2".to_string(),
                    index: 2,
                    state: VmState::Running
                },
                VmRecord {
                    name: "k8s-3".to_string(),
                    index: 3,
                    state: VmState::Stopped
                },
            ]
        );
    }

    #[test]
    fn paused_and_shutting_down_domains_are_active() {
        let topology = ClusterTopology::new("k8s", 3, 1, 0).unwrap();
        let output = " Id   Name    State
------------------------------
 5    k8s-1   paused
 6    k8s-2   in shutdown
 -    k8s-3   crashed
";

        let states: Vec<VmState> = parse_virsh_list(output, &topology)
            .into_iter()
            .map(|record| record.state)
            .collect();

        assert_eq!(
            states,
            vec![VmState::Running, VmState::Running, VmState::Stopped]
        );
    }

    #[test]
    fn indices_beyond_the_topology_still_count() {
        let topology = ClusterTopology::new("k8s", 2, 1, 0).unwrap();

        let records = parse_virsh_list(VIRSH_LIST, &topology);

        assert_eq!(records.len(), 3);
        assert_eq!(
            InventoryOutcome::classify(topology.total(), records.len()),
            InventoryOutcome::CountMismatch
        );
    }

    #[test]
    fn empty_listing() {
        let topology = ClusterTopology::new("k8s", 2, 1, 0).unwrap();
        let output = " Id   Name   State\n--------------------\n\n";

        assert!(parse_virsh_list(output, &topology).is_empty());
    }

    #[tokio::test]
    async fn destroy_refuses_foreign_names() {
        let topology = ClusterTopology::new("k8s", 2, 1, 0).unwrap();
        let record = VmRecord {
            name: "windows-10".to_string(),
            index: 1,
            state: VmState::Running,
        };

        let err = destroy_vm(&record, &topology).await.unwrap_err();
        assert!(err.to_string().contains("refusing to destroy"));
    }

    #[test]
    fn machine_state_is_removed_for_fleet_vms_only() {
        let topology = ClusterTopology::new("k8s", 2, 1, 0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let machines = dir.path().join(".vagrant").join("machines");
        for name in ["k8s-1", "k8s-2", "k8s-build", "windows-10"] {
            fs::create_dir_all(machines.join(name).join("libvirt")).unwrap();
        }

        let records = vec![
            VmRecord {
                name: "k8s-1".to_string(),
                index: 1,
                state: VmState::Stopped,
            },
            VmRecord {
                name: "k8s-2".to_string(),
                index: 2,
                state: VmState::Running,
            },
            VmRecord {
                name: "windows-10".to_string(),
                index: 10,
                state: VmState::Stopped,
            },
        ];

        remove_machine_state(&records, &topology, dir.path()).unwrap();

        assert!(!machines.join("k8s-1").exists());
        assert!(!machines.join("k8s-2").exists());
        assert!(machines.join("k8s-build").exists());
        assert!(machines.join("windows-10").exists());
    }

    #[test]
    fn missing_machine_state_is_fine() {
        let topology = ClusterTopology::new("k8s", 1, 1, 0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let records = vec![VmRecord {
            name: "k8s-1".to_string(),
            index: 1,
            state: VmState::Stopped,
        }];

        remove_machine_state(&records, &topology, dir.path()).unwrap();
    }
}
