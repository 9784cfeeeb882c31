//! Cluster topology arithmetic.
//!
//! Nodes are numbered from 1 and named `<prefix>-<index>`. The first
//! `masters` indices are Kubernetes masters, the next `upm` indices are UPM
//! control nodes and everything after that is a worker.

use std::{collections::BTreeMap, ops::RangeInclusive};

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    static ref PREFIX_RE: Regex = Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap();
}

pub const CONTROL_LABELS: [(&str, &str); 2] = [
    ("upm.io/node-role", "control"),
    ("upm.io/control-plane", "enable"),
];

pub const WORKER_LABELS: [(&str, &str); 2] = [
    ("upm.io/node-role", "worker"),
    ("openebs.io/engine", "enable"),
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Instance count must be at least 1")]
    NoInstances,
    #[error("At least one master is required")]
    NoMasters,
    #[error("{masters} masters and {upm} UPM nodes do not fit in {total} instances")]
    TooManyRoles { masters: u32, upm: u32, total: u32 },
    #[error("'{0}' is not a valid instance name prefix")]
    InvalidPrefix(String),
    #[error("Node '{name}' does not follow the '{prefix}-<index>' naming convention")]
    UnexpectedNodeName { name: String, prefix: String },
    #[error("Node '{name}' has index {index} outside of 1..={total}")]
    IndexOutOfRange { name: String, index: u32, total: u32 },
    #[error("Nodes '{first}' and '{second}' both resolve to index {index}")]
    DuplicateIndex {
        first: String,
        second: String,
        index: u32,
    },
    #[error("No node found for index {index} (expected '{prefix}-{index}')")]
    MissingNode { prefix: String, index: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Master,
    Control,
    Worker,
}

impl NodeRole {
    /// Labels applied to nodes of this role. Masters are left untouched.
    pub fn labels(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            NodeRole::Master => &[],
            NodeRole::Control => &CONTROL_LABELS,
            NodeRole::Worker => &WORKER_LABELS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterTopology {
    prefix: String,
    total: u32,
    masters: u32,
    upm: u32,
}

impl ClusterTopology {
    pub fn new(
        prefix: impl Into<String>,
        total: u32,
        masters: u32,
        upm: u32,
    ) -> Result<Self, TopologyError> {
        let prefix = prefix.into();

        if !PREFIX_RE.is_match(&prefix) {
            return Err(TopologyError::InvalidPrefix(prefix));
        }
        if total == 0 {
            return Err(TopologyError::NoInstances);
        }
        if masters == 0 {
            return Err(TopologyError::NoMasters);
        }
        if masters.checked_add(upm).map_or(true, |n| n > total) {
            return Err(TopologyError::TooManyRoles {
                masters,
                upm,
                total,
            });
        }

        Ok(Self {
            prefix,
            total,
            masters,
            upm,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn masters(&self) -> u32 {
        self.masters
    }

    pub fn upm(&self) -> u32 {
        self.upm
    }

    pub fn master_range(&self) -> RangeInclusive<u32> {
        1..=self.masters
    }

    pub fn control_range(&self) -> RangeInclusive<u32> {
        (self.masters + 1)..=(self.masters + self.upm)
    }

    pub fn worker_range(&self) -> RangeInclusive<u32> {
        (self.masters + self.upm + 1)..=self.total
    }

    pub fn role_of(&self, index: u32) -> Option<NodeRole> {
        if self.master_range().contains(&index) {
            Some(NodeRole::Master)
        } else if self.control_range().contains(&index) {
            Some(NodeRole::Control)
        } else if self.worker_range().contains(&index) {
            Some(NodeRole::Worker)
        } else {
            None
        }
    }

    pub fn node_name(&self, index: u32) -> String {
        format!("{}-{index}", self.prefix)
    }

    /// Extracts the index from a `<prefix>-<index>` name.
    ///
    /// Returns `None` for anything else, including a zero or zero-padded index
    /// since those never come out of [`Self::node_name`].
    pub fn parse_index(&self, name: &str) -> Option<u32> {
        let suffix = name.strip_prefix(&self.prefix)?.strip_prefix('-')?;

        if suffix.is_empty()
            || suffix.starts_with('0')
            || !suffix.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        suffix.parse().ok()
    }

    /// Maps every index in `1..=total` to the cluster node carrying it.
    ///
    /// Every name must follow the naming convention and the set must be
    /// exactly the configured topology, nothing is silently skipped.
    pub fn resolve_nodes<'a, I>(&self, names: I) -> Result<BTreeMap<u32, String>, TopologyError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut by_index = BTreeMap::new();

        for name in names {
            let index =
                self.parse_index(name)
                    .ok_or_else(|| TopologyError::UnexpectedNodeName {
                        name: name.to_string(),
                        prefix: self.prefix.clone(),
                    })?;

            if index > self.total {
                return Err(TopologyError::IndexOutOfRange {
                    name: name.to_string(),
                    index,
                    total: self.total,
                });
            }

            if let Some(first) = by_index.insert(index, name.to_string()) {
                return Err(TopologyError::DuplicateIndex {
                    first,
                    second: name.to_string(),
                    index,
                });
            }
        }

        if let Some(index) = (1..=self.total).find(|i| !by_index.contains_key(i)) {
            return Err(TopologyError::MissingNode {
                prefix: self.prefix.clone(),
                index,
            });
        }

        Ok(by_index)
    }

    /// Works out which labels go on which node. Masters get no labels.
    pub fn label_plan<'a, I>(&self, names: I) -> Result<Vec<LabelAssignment>, TopologyError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let nodes = self.resolve_nodes(names)?;

        let plan = nodes
            .into_iter()
            .filter_map(|(index, node)| {
                let role = self.role_of(index)?;
                (role != NodeRole::Master).then_some(LabelAssignment { node, role })
            })
            .collect();

        Ok(plan)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelAssignment {
    pub node: String,
    pub role: NodeRole,
}

impl LabelAssignment {
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.role
            .labels()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}
