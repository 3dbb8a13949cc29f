use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single grant: `subject` holds `tag` within `tenant`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationTuple {
    pub tenant: TenantId,
    pub subject: String,
    pub tag: String,
}

impl RelationTuple {
    pub fn new(
        tenant: impl Into<TenantId>,
        subject: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            subject: subject.into(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for RelationTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.tenant, self.subject, self.tag)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SnapshotVersion(u64);

impl SnapshotVersion {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- TenantId ---

    #[test]
    fn tenant_id_display_matches_inner() {
        let tenant = TenantId::new("acme");

        assert_eq!(tenant.to_string(), "acme");
        assert_eq!(tenant.as_str(), "acme");
    }

    #[test]
    fn tenant_id_hash_consistent_with_equality() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(TenantId::from("acme"));
        assert!(set.contains(&TenantId::new("acme".to_string())));
    }

    #[test]
    fn tenant_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&TenantId::new("acme")).unwrap();

        assert_eq!(json, "\"acme\"");
    }

    // --- RelationTuple ---

    #[test]
    fn relation_tuple_display() {
        let tuple = RelationTuple::new("acme", "alice", "orders:read");

        assert_eq!(tuple.to_string(), "acme/alice#orders:read");
    }

    #[test]
    fn relation_tuple_uniqueness_is_on_the_triple() {
        use std::collections::BTreeSet;

        let mut set = BTreeSet::new();
        set.insert(RelationTuple::new("acme", "alice", "a"));
        set.insert(RelationTuple::new("acme", "alice", "a"));
        set.insert(RelationTuple::new("acme", "alice", "b"));
        set.insert(RelationTuple::new("other", "alice", "a"));

        assert_eq!(set.len(), 3);
    }

    #[test]
    fn relation_tuple_deserializes_from_json() {
        let tuple: RelationTuple =
            serde_json::from_str(r#"{"tenant":"acme","subject":"bob","tag":"admin"}"#).unwrap();

        assert_eq!(tuple, RelationTuple::new("acme", "bob", "admin"));
    }

    // --- SnapshotVersion ---

    #[test]
    fn snapshot_version_next_is_monotonic() {
        let v = SnapshotVersion::new(41);

        assert_eq!(v.next().value(), 42);
        assert!(v < v.next());
    }

    #[test]
    fn snapshot_version_display() {
        assert_eq!(SnapshotVersion::new(7).to_string(), "7");
    }
}
