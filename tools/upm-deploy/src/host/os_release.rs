use std::{collections::HashMap, fs, path::Path};

use crate::error::DeployError;

pub const OS_RELEASE_PATH: &str = "/etc/os-release";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OsFamily {
    /// RHEL, CentOS Stream, Rocky, Alma, Oracle Linux, Fedora. Uses dnf.
    RedHat,
    /// Debian and Ubuntu. Uses apt.
    Debian,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OsRelease {
    pub id: String,
    pub id_like: Vec<String>,
    pub version_id: Option<String>,
    pub pretty_name: Option<String>,
}

impl OsRelease {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Ok(Self::parse(&contents))
    }

    pub fn parse(contents: &str) -> Self {
        let fields: HashMap<&str, String> = contents
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                (key.trim(), value.to_string())
            })
            .collect();

        Self {
            id: fields.get("ID").cloned().unwrap_or_default().to_lowercase(),
            id_like: fields
                .get("ID_LIKE")
                .map(|ids| ids.split_whitespace().map(str::to_lowercase).collect())
                .unwrap_or_default(),
            version_id: fields.get("VERSION_ID").cloned(),
            pretty_name: fields.get("PRETTY_NAME").cloned(),
        }
    }

    pub fn family(&self) -> Result<OsFamily, DeployError> {
        let ids = std::iter::once(self.id.as_str()).chain(self.id_like.iter().map(String::as_str));

        for id in ids {
            match id {
                "rhel" | "centos" | "rocky" | "almalinux" | "ol" | "fedora" => {
                    return Ok(OsFamily::RedHat)
                }
                "debian" | "ubuntu" => return Ok(OsFamily::Debian),
                _ => {}
            }
        }

        Err(DeployError::UnsupportedOs(
            self.pretty_name.clone().unwrap_or_else(|| self.id.clone()),
        ))
    }

    /// Only genuine RHEL needs a subscription to reach its package repositories.
    pub fn needs_subscription(&self) -> bool {
        self.id == "rhel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rocky() {
        let release = OsRelease::parse(
            r#"NAME="Rocky Linux"
VERSION="9.3 (Blue Onyx)"
ID="rocky"
ID_LIKE="rhel centos fedora"
VERSION_ID="9.3"
PRETTY_NAME="Rocky Linux 9.3 (Blue Onyx)"
"#,
        );

        assert_eq!(release.id, "rocky");
        assert_eq!(release.id_like, vec!["rhel", "centos", "fedora"]);
        assert_eq!(release.version_id.as_deref(), Some("9.3"));
        assert_eq!(release.family().unwrap(), OsFamily::RedHat);
        assert!(!release.needs_subscription());
    }

    #[test]
    fn falls_back_to_id_like() {
        let release = OsRelease::parse("ID=linuxmint\nID_LIKE=\"ubuntu debian\"\n");
        assert_eq!(release.family().unwrap(), OsFamily::Debian);
    }

    #[test]
    fn rhel_needs_subscription() {
        let release = OsRelease::parse("ID=\"rhel\"\nVERSION_ID=\"9.4\"\n");
        assert_eq!(release.family().unwrap(), OsFamily::RedHat);
        assert!(release.needs_subscription());
    }

    #[test]
    fn unknown_distributions_are_rejected() {
        let release = OsRelease::parse("ID=arch\nPRETTY_NAME=\"Arch Linux\"\n");
        assert!(matches!(
            release.family(),
            Err(DeployError::UnsupportedOs(name)) if name == "Arch Linux"
        ));
    }
}
