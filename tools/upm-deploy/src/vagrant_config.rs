//! The kubespray-style `config.rb` consumed by the Vagrantfile.
//!
//! The file is a list of `$key = value` assignments using Ruby literals.
//! We render it from [`VagrantSettings`] and scrape it back with a regex
//! rather than evaluating any Ruby.

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Write as _},
    fs,
    io::Write as _,
    path::{Path, PathBuf},
};

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::{
    network::NetworkMode,
    topology::{ClusterTopology, TopologyError},
};

lazy_static! {
    static ref ASSIGNMENT_RE: Regex =
        Regex::new(r#"^\s*\$([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*?)\s*$"#).unwrap();
}

pub const PREFIX_KEY: &str = "instance_name_prefix";
pub const INSTANCES_KEY: &str = "num_instances";
pub const MASTERS_KEY: &str = "kube_master_instances";
pub const UPM_KEY: &str = "upm_ctl_instances";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Missing ${0} in Vagrant config")]
    MissingKey(&'static str),
    #[error("${key} should be {expected}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
    },
    #[error("Invalid topology in Vagrant config: {0}")]
    Topology(#[from] TopologyError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RubyValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Nil,
    /// Anything we do not interpret, such as hashes, arrays or method calls
    Expr(String),
}

impl RubyValue {
    fn parse(raw: &str) -> Self {
        let raw = strip_trailing_comment(raw).trim();

        match raw {
            "true" => return RubyValue::Bool(true),
            "false" => return RubyValue::Bool(false),
            "nil" => return RubyValue::Nil,
            _ => {}
        }

        for quote in ['"', '\''] {
            if let Some(inner) = raw
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
            {
                return RubyValue::Str(inner.to_string());
            }
        }

        match raw.replace('_', "").parse() {
            Ok(n) => RubyValue::Int(n),
            Err(_) => RubyValue::Expr(raw.to_string()),
        }
    }
}

impl Display for RubyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RubyValue::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            RubyValue::Int(n) => write!(f, "{n}"),
            RubyValue::Bool(b) => write!(f, "{b}"),
            RubyValue::Nil => f.write_str("nil"),
            RubyValue::Expr(raw) => f.write_str(raw),
        }
    }
}

/// Drops a `# comment` that is not inside a quoted string.
fn strip_trailing_comment(raw: &str) -> &str {
    let mut quote = None;

    for (i, c) in raw.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '#') => return &raw[..i],
            _ => {}
        }
    }

    raw
}

/// Every `$key = value` assignment found in a config file, last one wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VagrantConfig {
    values: BTreeMap<String, RubyValue>,
}

impl VagrantConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;

        Ok(Self::parse(&contents))
    }

    /// Lines that are not simple assignments (blocks, method calls, ...) are ignored.
    pub fn parse(contents: &str) -> Self {
        let mut values = BTreeMap::new();

        for line in contents.lines() {
            let Some(captures) = ASSIGNMENT_RE.captures(line) else {
                continue;
            };

            values.insert(captures[1].to_string(), RubyValue::parse(&captures[2]));
        }

        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&RubyValue> {
        self.values.get(key)
    }

    fn require_u32(&self, key: &'static str) -> Result<u32, ConfigError> {
        match self.values.get(key) {
            Some(RubyValue::Int(n)) => u32::try_from(*n).map_err(|_| ConfigError::WrongType {
                key,
                expected: "a non-negative integer",
            }),
            Some(_) => Err(ConfigError::WrongType {
                key,
                expected: "an integer",
            }),
            None => Err(ConfigError::MissingKey(key)),
        }
    }

    fn require_str(&self, key: &'static str) -> Result<&str, ConfigError> {
        match self.values.get(key) {
            Some(RubyValue::Str(s)) => Ok(s),
            Some(_) => Err(ConfigError::WrongType {
                key,
                expected: "a string",
            }),
            None => Err(ConfigError::MissingKey(key)),
        }
    }

    /// The UPM node count is optional and defaults to zero.
    pub fn topology(&self) -> Result<ClusterTopology, ConfigError> {
        let prefix = self.require_str(PREFIX_KEY)?;
        let total = self.require_u32(INSTANCES_KEY)?;
        let masters = self.require_u32(MASTERS_KEY)?;
        let upm = match self.values.get(UPM_KEY) {
            None => 0,
            Some(_) => self.require_u32(UPM_KEY)?,
        };

        Ok(ClusterTopology::new(prefix, total, masters, upm)?)
    }
}

/// Everything `setup` writes into `config.rb`.
#[derive(Clone, Debug)]
pub struct VagrantSettings {
    pub topology: ClusterTopology,
    pub cpus: u32,
    pub memory_mb: u32,
    pub disk_gb: u32,
    pub box_name: String,
    pub network: NetworkMode,
}

impl VagrantSettings {
    pub fn render(&self) -> String {
        let mut entries: Vec<(&str, RubyValue)> = vec![
            (
                PREFIX_KEY,
                RubyValue::Str(self.topology.prefix().to_string()),
            ),
            (INSTANCES_KEY, RubyValue::Int(self.topology.total().into())),
            (MASTERS_KEY, RubyValue::Int(self.topology.masters().into())),
            ("kube_node_instances", RubyValue::Int(self.topology.total().into())),
            ("etcd_instances", RubyValue::Int(self.topology.masters().into())),
            (UPM_KEY, RubyValue::Int(self.topology.upm().into())),
            ("vm_cpus", RubyValue::Int(self.cpus.into())),
            ("vm_memory", RubyValue::Int(self.memory_mb.into())),
            ("provider", RubyValue::Str("libvirt".to_string())),
            ("box", RubyValue::Str(self.box_name.clone())),
            ("kube_node_instances_with_disks", RubyValue::Bool(true)),
            (
                "kube_node_instances_with_disks_size",
                RubyValue::Str(format!("{}G", self.disk_gb)),
            ),
            ("kube_node_instances_with_disks_number", RubyValue::Int(1)),
        ];

        match &self.network {
            NetworkMode::Nat { subnet } => {
                entries.push(("vm_network", RubyValue::Str("private_network".to_string())));
                entries.push(("subnet", RubyValue::Str(subnet.clone())));
            }
            NetworkMode::Bridge { nic, subnet } => {
                entries.push(("vm_network", RubyValue::Str("public_network".to_string())));
                entries.push(("bridge_nic", RubyValue::Str(nic.clone())));
                entries.push(("subnet", RubyValue::Str(subnet.clone())));
            }
        }

        let mut out = String::from(
            "# Generated by upm-deploy, changes are overwritten by `upm-deploy setup`\n",
        );
        for (key, value) in entries {
            // Writing into a String cannot fail
            _ = writeln!(out, "${key} = {value}");
        }
        out
    }

    /// Writes the rendered file via a temporary file in `tmp_dir`.
    pub fn write(&self, path: &Path, tmp_dir: &Path) -> anyhow::Result<()> {
        let mut staged = tempfile::Builder::new()
            .prefix("config.rb.")
            .tempfile_in(tmp_dir)?;
        staged.write_all(self.render().as_bytes())?;
        staged.flush()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(staged.path(), path)?;

        tracing::info!("Wrote Vagrant config to {}", path.display());
        Ok(())
    }
}
