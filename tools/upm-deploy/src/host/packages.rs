use std::{path::Path, time::Duration};

use crate::{
    error::DeployError,
    external_dependencies::binary_on_path,
    subprocess::{run_command, run_command_checked, run_streamed},
};

use super::{is_root, privileged_argv, run_privileged, OsFamily, OsRelease};

const REDHAT_PACKAGES: &[&str] = &[
    "qemu-kvm",
    "libvirt",
    "libvirt-devel",
    "virt-install",
    "gcc",
    "make",
    "rsync",
    "python3-pip",
    "dnf-plugins-core",
];

const DEBIAN_PACKAGES: &[&str] = &[
    "qemu-kvm",
    "libvirt-daemon-system",
    "libvirt-clients",
    "libvirt-dev",
    "ebtables",
    "dnsmasq-base",
    "build-essential",
    "rsync",
    "python3-pip",
    "gnupg",
    "curl",
];

const HASHICORP_RHEL_REPO: &str = "https://rpm.releases.hashicorp.com/RHEL/hashicorp.repo";
const HASHICORP_FEDORA_REPO: &str = "https://rpm.releases.hashicorp.com/fedora/hashicorp.repo";
const HASHICORP_APT_SETUP: &str = "curl -fsSL https://apt.releases.hashicorp.com/gpg \
    | gpg --dearmor --yes -o /usr/share/keyrings/hashicorp-archive-keyring.gpg \
    && echo \"deb [signed-by=/usr/share/keyrings/hashicorp-archive-keyring.gpg] \
    https://apt.releases.hashicorp.com $(. /etc/os-release && echo $VERSION_CODENAME) main\" \
    > /etc/apt/sources.list.d/hashicorp.list";

const VAGRANT_LIBVIRT_PLUGIN: &str = "vagrant-libvirt";
const SUBSCRIPTION_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const PLUGIN_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Clone, Debug)]
pub struct RhsmCredentials {
    pub username: String,
    pub password: String,
}

/// On RHEL, makes sure the host is registered so dnf can reach its repositories.
pub async fn ensure_subscription(
    release: &OsRelease,
    credentials: Option<&RhsmCredentials>,
) -> anyhow::Result<()> {
    if !release.needs_subscription() {
        return Ok(());
    }

    let argv = privileged_argv(is_root(), "subscription-manager", &["status"]);
    let status = run_command(argv[0], &argv[1..], SUBSCRIPTION_TIMEOUT).await?;
    if status.status.success() {
        tracing::info!("Host is registered with subscription-manager");
        return Ok(());
    }

    let Some(credentials) = credentials else {
        return Err(DeployError::precondition(
            "host dependencies",
            "RHEL host is not registered, pass --rhsm-username and --rhsm-password \
             or run `subscription-manager register` first",
        )
        .into());
    };

    tracing::info!(
        "Registering host with subscription-manager as {}",
        credentials.username
    );

    let username = format!("--username={}", credentials.username);
    let password = format!("--password={}", credentials.password);
    let argv = privileged_argv(
        is_root(),
        "subscription-manager",
        &["register", &username, &password, "--auto-attach"],
    );

    // Not streamed so the password never ends up in the log
    run_command_checked(argv[0], &argv[1..], SUBSCRIPTION_TIMEOUT)
        .await
        .map_err(|_| {
            DeployError::command_failed("subscription-manager register", "registration failed")
        })?;

    Ok(())
}

pub fn system_packages(family: OsFamily) -> &'static [&'static str] {
    match family {
        OsFamily::RedHat => REDHAT_PACKAGES,
        OsFamily::Debian => DEBIAN_PACKAGES,
    }
}

async fn install_packages(family: OsFamily, packages: &[&str]) -> anyhow::Result<()> {
    match family {
        OsFamily::RedHat => {
            let mut args = vec!["install", "-y"];
            args.extend_from_slice(packages);
            run_privileged("dnf", "dnf", &args).await
        }
        OsFamily::Debian => {
            run_privileged("apt", "apt-get", &["update"]).await?;
            let mut args = vec!["install", "-y"];
            args.extend_from_slice(packages);
            run_privileged("apt", "apt-get", &args).await
        }
    }
}

async fn install_vagrant(release: &OsRelease, family: OsFamily) -> anyhow::Result<()> {
    tracing::info!("Vagrant not found, installing it from the HashiCorp repository");

    match family {
        OsFamily::RedHat => {
            let repo = if release.id == "fedora" {
                HASHICORP_FEDORA_REPO
            } else {
                HASHICORP_RHEL_REPO
            };
            run_privileged("dnf", "dnf", &["config-manager", "--add-repo", repo]).await?;
        }
        OsFamily::Debian => {
            run_privileged("hashicorp-repo", "sh", &["-c", HASHICORP_APT_SETUP]).await?;
            run_privileged("apt", "apt-get", &["update"]).await?;
        }
    }

    install_packages(family, &["vagrant"]).await
}

async fn ensure_vagrant_libvirt_plugin() -> anyhow::Result<()> {
    let plugins = run_command_checked("vagrant", &["plugin", "list"], PLUGIN_TIMEOUT).await?;

    if plugins
        .lines()
        .any(|line| line.trim_start().starts_with(VAGRANT_LIBVIRT_PLUGIN))
    {
        tracing::info!("{VAGRANT_LIBVIRT_PLUGIN} plugin already installed");
        return Ok(());
    }

    run_streamed(
        "vagrant-plugin",
        "vagrant",
        &["plugin", "install", VAGRANT_LIBVIRT_PLUGIN],
        None,
        PLUGIN_TIMEOUT,
    )
    .await
}

/// Installs everything the host needs to run the Vagrant/libvirt fleet.
pub async fn install_dependencies(release: &OsRelease, vagrant_dir: &Path) -> anyhow::Result<()> {
    let family = release.family()?;

    tracing::info!(
        "Installing host packages for {}",
        release.pretty_name.as_deref().unwrap_or(&release.id)
    );
    install_packages(family, system_packages(family)).await?;

    if !binary_on_path("vagrant")? {
        install_vagrant(release, family).await?;
    }

    ensure_vagrant_libvirt_plugin().await?;

    // The Vagrantfile drives kubespray through the ansible provisioner
    let requirements = vagrant_dir.join("requirements.txt");
    if requirements.exists() {
        let requirements = requirements.to_string_lossy();
        run_streamed(
            "pip",
            "python3",
            &["-m", "pip", "install", "--user", "-r", &requirements],
            Some(vagrant_dir),
            PLUGIN_TIMEOUT,
        )
        .await?;
    } else {
        tracing::warn!(
            "No requirements.txt in {}, skipping ansible requirements",
            vagrant_dir.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_families_get_libvirt_and_pip() {
        for family in [OsFamily::RedHat, OsFamily::Debian] {
            let packages = system_packages(family);
            assert!(packages.iter().any(|p| p.starts_with("libvirt")));
            assert!(packages.contains(&"qemu-kvm"));
            assert!(packages.contains(&"python3-pip"));
        }
    }

    #[tokio::test]
    async fn non_rhel_hosts_skip_subscription() {
        let release = OsRelease::parse("ID=ubuntu\nVERSION_ID=\"22.04\"\n");
        ensure_subscription(&release, None).await.unwrap();
    }
}
