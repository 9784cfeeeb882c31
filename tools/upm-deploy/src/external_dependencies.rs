use std::process::Command;

use crate::deploy_home::DeployHome;

#[derive(Hash)]
pub struct ExternalDependency {
    pub binary: &'static str,
    pub install_advice: &'static str,
}

impl ExternalDependency {
    pub const fn new(binary: &'static str, install_advice: &'static str) -> Self {
        Self {
            binary,
            install_advice,
        }
    }
}

pub const VAGRANT: ExternalDependency = ExternalDependency::new(
    "vagrant",
    "Run `upm-deploy setup` without --skip-deps, or follow https://developer.hashicorp.com/vagrant/install",
);

pub const VIRSH: ExternalDependency = ExternalDependency::new(
    "virsh",
    "Install the libvirt client tools for your distribution",
);

pub const HELM: ExternalDependency =
    ExternalDependency::new("helm", "Follow instructions on: https://helm.sh/docs/intro/install/");

/// The binaries one command needs. Each set is cached on its own so running
/// different commands does not invalidate the others.
#[derive(Hash)]
pub struct DependencySet {
    pub command: &'static str,
    pub dependencies: &'static [ExternalDependency],
}

/// Needed by `setup` once host packages are in place.
pub const SETUP_DEPENDENCIES: DependencySet = DependencySet {
    command: "setup",
    dependencies: &[VAGRANT, VIRSH],
};

pub const VM_DEPENDENCIES: DependencySet = DependencySet {
    command: "vm",
    dependencies: &[VAGRANT],
};

pub const INSTALL_DEPENDENCIES: DependencySet = DependencySet {
    command: "install",
    dependencies: &[HELM],
};

pub fn binary_on_path(binary: &str) -> anyhow::Result<bool> {
    let command = Command::new("which").arg(binary).output()?;
    Ok(command.status.success())
}

pub fn external_dependency_preflight_check(
    deploy_home: &DeployHome,
    dependencies: &DependencySet,
) -> anyhow::Result<()> {
    if deploy_home.cached_dependencies_file_exists(dependencies) {
        return Ok(());
    }

    let mut missing_dependency = false;
    for dep in dependencies.dependencies {
        if !binary_on_path(dep.binary)? {
            tracing::error!(
                "Binary '{}' not found or not executable. {}",
                dep.binary,
                dep.install_advice
            );
            missing_dependency = true;
        }
    }

    if missing_dependency {
        anyhow::bail!("One or more missing dependencies found.")
    }

    deploy_home.create_cached_dependencies_file(dependencies)?;

    Ok(())
}
