use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{
    components::{Component, InstallOption, DEFAULT_STORAGE_CLASS, UPM_REPO_URL},
    network::{NetworkArgs, NetworkKind},
};

#[derive(Parser, Debug)]
#[clap(
    name = "upm-deploy",
    about = "Bring up a Vagrant/libvirt Kubernetes fleet and install the UPM stack on it"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
    /// Checkout containing the Vagrantfile and `vagrant/config.rb`
    #[clap(long, env = "UPM_VAGRANT_DIR", global = true, default_value = "./kubespray")]
    pub vagrant_dir: PathBuf,
    /// Log file, defaults to `~/.upm-deploy/upm-deploy.log`
    #[clap(long, env = "UPM_LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,
    #[clap(long, global = true)]
    pub skip_preflight_checks: bool,
    /// Answer yes to every confirmation and take defaults instead of prompting
    #[clap(short = 'y', long = "yes", global = true)]
    pub assume_yes: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Prepare the host and create or reconcile the VM fleet
    Setup(SetupArgs),
    /// Lifecycle commands for the existing fleet
    Vm {
        #[clap(subcommand)]
        command: VmCommand,
    },
    /// Install one unit of the stack onto the running cluster
    Install(InstallArgs),
}

#[derive(Debug, Subcommand)]
pub enum VmCommand {
    /// Show the state of every VM
    Status,
    /// Open a shell on one node
    Ssh {
        /// Node name, e.g. `k8s-1`
        node: String,
    },
    /// Destroy every VM of the fleet
    Destroy,
    /// Stop every VM of the fleet
    Halt,
    /// Start every VM of the fleet
    Up,
}

#[derive(Debug, Args)]
pub struct SetupArgs {
    /// VM name prefix, VMs are named `<prefix>-<index>`
    #[clap(long, default_value = "k8s")]
    pub prefix: String,
    /// Total number of VMs
    #[clap(long, default_value_t = 3)]
    pub instances: u32,
    /// Number of Kubernetes master VMs
    #[clap(long, default_value_t = 1)]
    pub masters: u32,
    /// Number of VMs reserved for the UPM control plane
    #[clap(long, default_value_t = 0)]
    pub upm_nodes: u32,
    #[clap(long, default_value_t = 4)]
    pub cpus: u32,
    #[clap(long, default_value_t = 8192)]
    pub memory_mb: u32,
    #[clap(long, default_value_t = 100)]
    pub disk_gb: u32,
    #[clap(long, default_value = "generic/rocky9")]
    pub r#box: String,
    /// Prompted for if not given
    #[clap(long, value_enum)]
    pub network: Option<NetworkKind>,
    /// Host interface for bridge networking
    #[clap(long)]
    pub bridge_nic: Option<String>,
    /// First three octets of the VM subnet
    #[clap(long)]
    pub subnet: Option<String>,
    /// Skip installing host packages, Vagrant and its libvirt plugin
    #[clap(long)]
    pub skip_deps: bool,
    #[clap(long, env = "RHSM_USERNAME")]
    pub rhsm_username: Option<String>,
    #[clap(long, env = "RHSM_PASSWORD", hide_env_values = true)]
    pub rhsm_password: Option<String>,
}

impl SetupArgs {
    pub fn network_args(&self) -> NetworkArgs {
        NetworkArgs {
            kind: self.network,
            bridge_nic: self.bridge_nic.clone(),
            subnet: self.subnet.clone(),
        }
    }
}

/// Exactly one of these must be given.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct InstallSelector {
    /// Verify the cluster and label its nodes
    #[clap(long)]
    pub k8s: bool,
    /// OpenEBS local storage
    #[clap(long)]
    pub storage: bool,
    /// kube-prometheus-stack
    #[clap(long)]
    pub monitoring: bool,
    /// CloudNativePG operator
    #[clap(long)]
    pub database_operator: bool,
    /// UPM engine
    #[clap(long)]
    pub platform: bool,
    /// Everything above, in order
    #[clap(long)]
    pub all: bool,
}

impl TryFrom<&InstallSelector> for InstallOption {
    type Error = anyhow::Error;

    fn try_from(selector: &InstallSelector) -> Result<Self, Self::Error> {
        let selected: Vec<InstallOption> = [
            (selector.k8s, InstallOption::Only(Component::K8s)),
            (selector.storage, InstallOption::Only(Component::Storage)),
            (selector.monitoring, InstallOption::Only(Component::Monitoring)),
            (
                selector.database_operator,
                InstallOption::Only(Component::DatabaseOperator),
            ),
            (selector.platform, InstallOption::Only(Component::Platform)),
            (selector.all, InstallOption::All),
        ]
        .into_iter()
        .filter_map(|(flag, option)| flag.then_some(option))
        .collect();

        match selected.as_slice() {
            [option] => Ok(*option),
            [] => anyhow::bail!("No install option selected"),
            _ => anyhow::bail!("Only one install option can be selected at a time"),
        }
    }
}

#[derive(Debug, Args)]
pub struct InstallArgs {
    #[clap(flatten)]
    pub selector: InstallSelector,
    #[clap(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,
    #[clap(long, default_value = DEFAULT_STORAGE_CLASS)]
    pub storage_class: String,
    /// How long helm waits for a release, in seconds
    #[clap(long, default_value = "600", value_parser = parse_seconds)]
    pub helm_timeout: Duration,
    /// How long to wait for nodes and pods to become ready, in seconds
    #[clap(long, default_value = "600", value_parser = parse_seconds)]
    pub ready_timeout: Duration,
    #[clap(long, env = "UPM_CHART_REPO", default_value = UPM_REPO_URL)]
    pub upm_chart_repo: String,
}

/// Accepts `600` or `600s`.
fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs = value.strip_suffix('s').unwrap_or(value);
    secs.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| format!("'{value}' is not a number of seconds"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install_option(args: &[&str]) -> anyhow::Result<InstallOption> {
        let cli = Cli::try_parse_from(args)?;
        match cli.command {
            Command::Install(install) => InstallOption::try_from(&install.selector),
            other => anyhow::bail!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn install_requires_exactly_one_selector() {
        assert!(install_option(&["upm-deploy", "install"]).is_err());
        assert!(install_option(&["upm-deploy", "install", "--storage", "--monitoring"]).is_err());
        assert!(install_option(&["upm-deploy", "install", "--all", "--k8s"]).is_err());

        assert_eq!(
            install_option(&["upm-deploy", "install", "--database-operator"]).unwrap(),
            InstallOption::Only(Component::DatabaseOperator)
        );
        assert_eq!(
            install_option(&["upm-deploy", "install", "--all", "-y"]).unwrap(),
            InstallOption::All
        );
    }

    #[test]
    fn selector_conversion_rejects_ambiguity() {
        let selector = InstallSelector {
            k8s: true,
            storage: false,
            monitoring: false,
            database_operator: false,
            platform: true,
            all: false,
        };
        assert!(InstallOption::try_from(&selector).is_err());
    }

    #[test]
    fn global_flags_are_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "upm-deploy",
            "vm",
            "status",
            "--vagrant-dir",
            "/srv/kubespray",
            "-y",
        ])
        .unwrap();

        assert!(matches!(
            cli.command,
            Command::Vm {
                command: VmCommand::Status
            }
        ));
        assert_eq!(cli.vagrant_dir, PathBuf::from("/srv/kubespray"));
        assert!(cli.assume_yes);
    }

    #[test]
    fn install_timeouts_are_seconds() {
        let cli = Cli::try_parse_from([
            "upm-deploy",
            "install",
            "--platform",
            "--helm-timeout",
            "90s",
            "--ready-timeout",
            "30",
        ])
        .unwrap();

        let Command::Install(install) = cli.command else {
            panic!("expected install");
        };
        assert_eq!(install.helm_timeout, Duration::from_secs(90));
        assert_eq!(install.ready_timeout, Duration::from_secs(30));
        assert!(parse_seconds("ten").is_err());
    }

    #[test]
    fn setup_defaults() {
        let cli = Cli::try_parse_from(["upm-deploy", "setup", "--network", "nat"]).unwrap();

        let Command::Setup(setup) = cli.command else {
            panic!("expected setup");
        };
        assert_eq!(setup.prefix, "k8s");
        assert_eq!(setup.masters, 1);
        assert_eq!(setup.network_args().kind, Some(NetworkKind::Nat));
    }
}
