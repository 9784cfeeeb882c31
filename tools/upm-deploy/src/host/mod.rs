//! Preparing the hypervisor host: OS detection, packages and libvirt.

mod libvirt;
mod os_release;
mod packages;

use std::time::Duration;

pub use libvirt::configure_libvirt;
pub use os_release::{OsFamily, OsRelease, OS_RELEASE_PATH};
pub use packages::{ensure_subscription, install_dependencies, RhsmCredentials};

use crate::subprocess::run_streamed;

/// Package installs can take a while on a fresh host
const PRIVILEGED_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

/// Prepends `sudo` unless we are already root.
fn privileged_argv<'a>(root: bool, program: &'a str, args: &[&'a str]) -> Vec<&'a str> {
    let mut argv = Vec::with_capacity(args.len() + 2);
    if !root {
        argv.extend(["sudo", "--non-interactive"]);
    }
    argv.push(program);
    argv.extend_from_slice(args);
    argv
}

pub async fn run_privileged(name: &str, program: &str, args: &[&str]) -> anyhow::Result<()> {
    let argv = privileged_argv(is_root(), program, args);
    run_streamed(name, argv[0], &argv[1..], None, PRIVILEGED_TIMEOUT).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sudo_is_only_added_for_regular_users() {
        assert_eq!(
            privileged_argv(false, "dnf", &["install", "-y", "libvirt"]),
            vec!["sudo", "--non-interactive", "dnf", "install", "-y", "libvirt"]
        );
        assert_eq!(
            privileged_argv(true, "systemctl", &["enable", "--now", "libvirtd"]),
            vec!["systemctl", "enable", "--now", "libvirtd"]
        );
    }
}
