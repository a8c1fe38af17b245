//! File system check options and findings.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::node::NodeId;

/// A kind of consistency check. Each kind is independent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileSystemCheckKind {
    /// Nodes left inconsistent for longer than the configured expiration.
    ExpiredInconsistent,
    /// Child-list rows pointing to a node without an own record.
    ReferenceNotFound,
    /// Node records whose parent is missing or does not list them.
    OrphanNode,
    /// Blob chunks filed under a node id without an own record.
    OrphanData,
    /// Dependency edges whose other endpoint has no own record.
    DanglingDependency,
}

impl FileSystemCheckKind {
    pub const ALL: [FileSystemCheckKind; 5] = [
        Self::ExpiredInconsistent,
        Self::ReferenceNotFound,
        Self::OrphanNode,
        Self::OrphanData,
        Self::DanglingDependency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExpiredInconsistent => "expired-inconsistent",
            Self::ReferenceNotFound => "reference-not-found",
            Self::OrphanNode => "orphan-node",
            Self::OrphanData => "orphan-data",
            Self::DanglingDependency => "dangling-dependency",
        }
    }
}

impl fmt::Display for FileSystemCheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileSystemCheckKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TypeError::UnknownCheckKind(s.to_string()))
    }
}

/// Parameters of a check pass: which kinds to run and whether to repair.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemCheckOptions {
    /// Inconsistent nodes last modified before this instant (epoch
    /// milliseconds) are reported as expired.
    pub inconsistent_expiration: Option<i64>,
    pub kinds: BTreeSet<FileSystemCheckKind>,
    pub repair: bool,
}

impl FileSystemCheckOptions {
    pub fn builder() -> FileSystemCheckOptionsBuilder {
        FileSystemCheckOptionsBuilder::default()
    }

    pub fn includes(&self, kind: FileSystemCheckKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// Builder for [`FileSystemCheckOptions`].
#[derive(Clone, Debug, Default)]
pub struct FileSystemCheckOptionsBuilder {
    inconsistent_expiration: Option<i64>,
    kinds: BTreeSet<FileSystemCheckKind>,
    repair: bool,
}

impl FileSystemCheckOptionsBuilder {
    /// Request the expired-inconsistent check with the given cutoff.
    pub fn drop_inconsistent_nodes_older_than(mut self, cutoff: DateTime<Utc>) -> Self {
        self.inconsistent_expiration = Some(cutoff.timestamp_millis());
        self.kinds.insert(FileSystemCheckKind::ExpiredInconsistent);
        self
    }

    pub fn kind(mut self, kind: FileSystemCheckKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = FileSystemCheckKind>) -> Self {
        self.kinds.extend(kinds);
        self
    }

    pub fn repair(mut self) -> Self {
        self.repair = true;
        self
    }

    /// Finish the options. The expired-inconsistent check needs a cutoff.
    pub fn build(self) -> Result<FileSystemCheckOptions, TypeError> {
        if self.kinds.contains(&FileSystemCheckKind::ExpiredInconsistent)
            && self.inconsistent_expiration.is_none()
        {
            return Err(TypeError::MissingField("inconsistent_expiration"));
        }
        Ok(FileSystemCheckOptions {
            inconsistent_expiration: self.inconsistent_expiration,
            kinds: self.kinds,
            repair: self.repair,
        })
    }
}

/// One finding of a check pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemCheckIssue {
    pub node_id: NodeId,
    pub node_name: Option<String>,
    pub kind: FileSystemCheckKind,
    pub description: String,
    pub repaired: bool,
    pub resolution_description: Option<String>,
}

impl FileSystemCheckIssue {
    pub fn new(
        node_id: NodeId,
        node_name: Option<String>,
        kind: FileSystemCheckKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            node_id,
            node_name,
            kind,
            description: description.into(),
            repaired: false,
            resolution_description: None,
        }
    }

    /// Mark the issue as repaired with a resolution note.
    pub fn mark_repaired(&mut self, resolution: impl Into<String>) {
        self.repaired = true;
        self.resolution_description = Some(resolution.into());
    }
}

impl fmt::Display for FileSystemCheckIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.node_id)?;
        if let Some(name) = &self.node_name {
            write!(f, " ({name})")?;
        }
        write!(f, ": {}", self.description)?;
        if let Some(resolution) = &self.resolution_description {
            write!(f, " -> {resolution}")?;
        }
        Ok(())
    }
}
