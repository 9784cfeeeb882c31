use std::{
    fmt::{self, Display},
    path::Path,
};

use clap::ValueEnum;
use lazy_static::lazy_static;
use regex::Regex;

use crate::confirm::{ask_user_for_value, ask_user_to_choose, AssumeYes};

pub const DEFAULT_SUBNET: &str = "192.168.121";

lazy_static! {
    static ref SUBNET_RE: Regex =
        Regex::new(r"^(25[0-5]|2[0-4]\d|1?\d?\d)(\.(25[0-5]|2[0-4]\d|1?\d?\d)){2}$").unwrap();
}

/// How the VMs reach the outside world, selected on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum NetworkKind {
    /// libvirt managed private network behind NAT
    Nat,
    /// VMs attached to a host NIC through a macvtap bridge
    Bridge,
}

impl Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkKind::Nat => f.write_str("NAT (private libvirt network)"),
            NetworkKind::Bridge => f.write_str("Bridge (attach VMs to a host NIC)"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkMode {
    Nat { subnet: String },
    Bridge { nic: String, subnet: String },
}

/// Answers given on the command line, anything missing is prompted for.
#[derive(Clone, Debug, Default)]
pub struct NetworkArgs {
    pub kind: Option<NetworkKind>,
    pub bridge_nic: Option<String>,
    pub subnet: Option<String>,
}

pub fn validate_subnet(subnet: &str) -> anyhow::Result<()> {
    if !SUBNET_RE.is_match(subnet) {
        anyhow::bail!("Subnet '{subnet}' should be the first three octets, e.g. {DEFAULT_SUBNET}");
    }
    Ok(())
}

pub fn validate_nic(sys_class_net: &Path, nic: &str) -> anyhow::Result<()> {
    if nic.is_empty() || nic.contains('/') || !sys_class_net.join(nic).exists() {
        anyhow::bail!(
            "Network interface '{nic}' not found under {}",
            sys_class_net.display()
        );
    }
    Ok(())
}

/// Resolves the network mode from flags, prompting for whatever is missing.
///
/// With auto-confirm a missing mode falls back to NAT on the default subnet,
/// but bridge mode without a NIC is an error since there is no sane default.
pub fn resolve_network_mode(
    args: &NetworkArgs,
    assume_yes: AssumeYes,
    sys_class_net: &Path,
) -> anyhow::Result<NetworkMode> {
    let kind = match (args.kind, assume_yes) {
        (Some(kind), _) => kind,
        (None, AssumeYes::DefaultYes) => NetworkKind::Nat,
        (None, AssumeYes::AlwaysAsk) => ask_user_to_choose(
            "Select the network mode for the VMs",
            &[NetworkKind::Nat, NetworkKind::Bridge],
        )?,
    };

    let subnet = match (&args.subnet, assume_yes) {
        (Some(subnet), _) => subnet.clone(),
        (None, AssumeYes::DefaultYes) => DEFAULT_SUBNET.to_string(),
        (None, AssumeYes::AlwaysAsk) => {
            ask_user_for_value("First three octets of the VM subnet", Some(DEFAULT_SUBNET))?
        }
    };
    validate_subnet(&subnet)?;

    let mode = match kind {
        NetworkKind::Nat => NetworkMode::Nat { subnet },
        NetworkKind::Bridge => {
            let nic = match (&args.bridge_nic, assume_yes) {
                (Some(nic), _) => nic.clone(),
                (None, AssumeYes::DefaultYes) => {
                    anyhow::bail!("Bridge networking needs --bridge-nic when running with -y")
                }
                (None, AssumeYes::AlwaysAsk) => {
                    ask_user_for_value("Host network interface to bridge", None)?
                }
            };
            validate_nic(sys_class_net, &nic)?;

            NetworkMode::Bridge { nic, subnet }
        }
    };

    tracing::info!("Using network mode {:?}", mode);
    Ok(mode)
}
