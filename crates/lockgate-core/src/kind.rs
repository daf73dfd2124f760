use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic category of a lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockKind {
    /// Mutual exclusion.
    Exclusive,
    /// Read side of a read/write group; shared with other readers.
    ReadShared,
    /// Write side of a read/write group; excludes readers and writers.
    WriteExclusive,
}

impl LockKind {
    pub const ALL: [LockKind; 3] = [
        LockKind::Exclusive,
        LockKind::ReadShared,
        LockKind::WriteExclusive,
    ];

    /// Whether handles of this kind are derived from a read/write group.
    pub fn is_read_write(self) -> bool {
        !matches!(self, LockKind::Exclusive)
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKind::Exclusive => write!(f, "exclusive"),
            LockKind::ReadShared => write!(f, "read-shared"),
            LockKind::WriteExclusive => write!(f, "write-exclusive"),
        }
    }
}

/// Cache identity of a single lock handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockIdentity {
    pub kind: LockKind,
    pub key: String,
    pub fair: bool,
}

impl LockIdentity {
    pub fn new(kind: LockKind, key: impl Into<String>, fair: bool) -> Self {
        Self {
            kind,
            key: key.into(),
            fair,
        }
    }

    /// Identity of the read/write group this handle would be derived from.
    ///
    /// Drops `kind` on purpose: the read and the write handle of one key must
    /// come out of the same group or they would not exclude each other.
    pub fn group(&self) -> GroupIdentity {
        GroupIdentity::new(self.key.clone(), self.fair)
    }
}

impl fmt::Display for LockIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-fair[{}]", self.kind, self.key, self.fair)
    }
}

/// Cache identity of a read/write group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupIdentity {
    pub key: String,
    pub fair: bool,
}

impl GroupIdentity {
    pub fn new(key: impl Into<String>, fair: bool) -> Self {
        Self {
            key: key.into(),
            fair,
        }
    }
}
