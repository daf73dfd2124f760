use std::fmt;

use lockgate_core::LockKind;

/// Node path of the lock for `key` under `root`.
///
/// Keys may contain `/` to nest locks, but every segment must be a legal
/// node name.
pub fn lock_path(root: &str, key: &str) -> Result<String, &'static str> {
    if key.starts_with('/') || key.ends_with('/') {
        return Err("key must not start or end with '/'");
    }
    for segment in key.split('/') {
        match segment {
            "" => return Err("key must not contain empty path segments"),
            "." | ".." => return Err("key must not contain relative path segments"),
            s if s.chars().any(char::is_control) => {
                return Err("key must not contain control characters")
            }
            _ => {}
        }
    }
    Ok(format!("{}/{}", root.trim_end_matches('/'), key))
}

/// Cache identity of an ensemble handle: the path it lives on plus its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeIdentity {
    pub path: String,
    pub kind: LockKind,
}

impl NodeIdentity {
    pub fn new(path: impl Into<String>, kind: LockKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.path, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_root_and_key() {
        assert_eq!(lock_path("/lockgate", "orders:42").unwrap(), "/lockgate/orders:42");
        assert_eq!(lock_path("/lockgate/", "a/b").unwrap(), "/lockgate/a/b");
        assert_eq!(lock_path("/", "k").unwrap(), "/k");
    }

    #[test]
    fn rejects_unaddressable_keys() {
        for key in ["/k", "k/", "a//b", "a/./b", "..", "a\nb"] {
            assert!(lock_path("/lockgate", key).is_err(), "{key:?}");
        }
    }

    #[test]
    fn identity_includes_kind() {
        let read = NodeIdentity::new("/lockgate/inventory", LockKind::ReadShared);
        let write = NodeIdentity::new("/lockgate/inventory", LockKind::WriteExclusive);
        assert_ne!(read, write);
        assert_eq!(read.to_string(), "/lockgate/inventory-read-shared");
    }
}
