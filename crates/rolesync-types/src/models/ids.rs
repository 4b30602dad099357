//! Identifier newtypes.
//!
//! Remote communities hand out opaque string identifiers (snowflakes); the
//! newtypes keep node, role and member ids from being mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a remote community.
    NodeId
);
string_id!(
    /// Identifier of a role, unique within its node.
    RoleId
);
string_id!(
    /// Identifier of a member; the same value names the member on every node.
    MemberId
);

/// Integer binding logically-equivalent roles across nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncId(pub u32);

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SyncId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_transparently() {
        let id = RoleId::from("123456789");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"123456789\"");
        assert_eq!(serde_json::to_string(&SyncId(5)).unwrap(), "5");
    }

    #[test]
    fn test_blank_id_is_empty() {
        assert!(NodeId::from("  ").is_empty());
        assert!(!NodeId::from("1").is_empty());
    }
}
