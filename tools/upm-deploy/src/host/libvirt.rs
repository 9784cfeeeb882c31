use std::{env, path::Path};

use crate::{error::DeployError, virt::libvirt_reachable};

use super::{is_root, run_privileged};

const KVM_DEVICE: &str = "/dev/kvm";
const LIBVIRT_GROUP: &str = "libvirt";

/// Enables libvirtd and gives the invoking user access to the system socket.
pub async fn configure_libvirt() -> anyhow::Result<()> {
    if !Path::new(KVM_DEVICE).exists() {
        return Err(DeployError::precondition(
            "libvirt",
            format!("{KVM_DEVICE} is missing, enable hardware virtualization in the BIOS or nested virtualization on the hypervisor"),
        )
        .into());
    }

    run_privileged("systemctl", "systemctl", &["enable", "--now", "libvirtd"]).await?;

    // Under sudo the invoking user is in SUDO_USER, plain root needs no group
    let user = match env::var("SUDO_USER") {
        Ok(user) => Some(user),
        Err(_) if !is_root() => Some(
            env::var("USER").map_err(|_| anyhow::anyhow!("Cannot work out the current user name"))?,
        ),
        Err(_) => None,
    };

    if let Some(user) = user {
        tracing::info!("Adding {user} to the {LIBVIRT_GROUP} group");
        run_privileged("usermod", "usermod", &["-aG", LIBVIRT_GROUP, &user]).await?;
    }

    if !libvirt_reachable().await {
        return Err(DeployError::precondition(
            "libvirt",
            "libvirtd is enabled but `virsh --connect qemu:///system version` fails, \
             you may need to log out and back in for the libvirt group to apply",
        )
        .into());
    }

    tracing::info!("libvirt is ready");
    Ok(())
}
