use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::snapshot::CacheSnapshot;
use crate::tuple::TenantId;

/// How a subject's granted tags combine against a mapping's required tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclStrategy {
    /// At least one required tag must be granted.
    #[default]
    Any,
    /// Every required tag must be granted.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclCheck {
    pub allowed: bool,
    pub matched_tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AclEvaluator {
    strategy: AclStrategy,
}

impl AclEvaluator {
    pub fn new(strategy: AclStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> AclStrategy {
        self.strategy
    }

    pub fn check(
        &self,
        snapshot: &CacheSnapshot,
        tenant: &TenantId,
        subject: &str,
        required_tags: &BTreeSet<String>,
    ) -> AclCheck {
        if required_tags.is_empty() {
            return AclCheck {
                allowed: true,
                matched_tags: BTreeSet::new(),
            };
        }

        let matched_tags: BTreeSet<String> = match snapshot.granted_tags(tenant, subject) {
            Some(granted) => granted.intersection(required_tags).cloned().collect(),
            None => BTreeSet::new(),
        };

        let allowed = match self.strategy {
            AclStrategy::Any => !matched_tags.is_empty(),
            AclStrategy::All => matched_tags.len() == required_tags.len(),
        };

        AclCheck {
            allowed,
            matched_tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{RelationTuple, SnapshotVersion};

    fn snapshot(tuples: Vec<RelationTuple>) -> CacheSnapshot {
        CacheSnapshot::build(SnapshotVersion::new(1), vec![], tuples).unwrap()
    }

    fn tags(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|t| t.to_string()).collect()
    }

    fn acme() -> TenantId {
        TenantId::new("acme")
    }

    #[test]
    fn empty_requirement_is_open() {
        let snap = snapshot(vec![]);
        let result = AclEvaluator::default().check(&snap, &acme(), "nobody", &tags(&[]));

        assert!(result.allowed);
        assert!(result.matched_tags.is_empty());
    }

    #[test]
    fn any_strategy_passes_with_one_overlapping_tag() {
        let snap = snapshot(vec![RelationTuple::new("acme", "alice", "A")]);
        let result = AclEvaluator::new(AclStrategy::Any).check(
            &snap,
            &acme(),
            "alice",
            &tags(&["A", "B"]),
        );

        assert!(result.allowed);
        assert_eq!(result.matched_tags, tags(&["A"]));
    }

    #[test]
    fn any_strategy_fails_without_overlap() {
        let snap = snapshot(vec![RelationTuple::new("acme", "alice", "C")]);
        let result = AclEvaluator::new(AclStrategy::Any).check(
            &snap,
            &acme(),
            "alice",
            &tags(&["A", "B"]),
        );

        assert!(!result.allowed);
        assert!(result.matched_tags.is_empty());
    }

    #[test]
    fn all_strategy_requires_every_tag() {
        let snap = snapshot(vec![
            RelationTuple::new("acme", "alice", "A"),
            RelationTuple::new("acme", "bob", "A"),
            RelationTuple::new("acme", "bob", "B"),
        ]);
        let evaluator = AclEvaluator::new(AclStrategy::All);

        let alice = evaluator.check(&snap, &acme(), "alice", &tags(&["A", "B"]));
        assert!(!alice.allowed);
        assert_eq!(alice.matched_tags, tags(&["A"]));

        let bob = evaluator.check(&snap, &acme(), "bob", &tags(&["A", "B"]));
        assert!(bob.allowed);
        assert_eq!(bob.matched_tags, tags(&["A", "B"]));
    }

    #[test]
    fn grants_in_another_tenant_do_not_count() {
        let snap = snapshot(vec![RelationTuple::new("other", "alice", "A")]);
        let result = AclEvaluator::default().check(&snap, &acme(), "alice", &tags(&["A"]));

        assert!(!result.allowed);
    }

    #[test]
    fn matched_tags_exclude_grants_not_required() {
        let snap = snapshot(vec![
            RelationTuple::new("acme", "alice", "A"),
            RelationTuple::new("acme", "alice", "Z"),
        ]);
        let result = AclEvaluator::default().check(&snap, &acme(), "alice", &tags(&["A", "B"]));

        assert_eq!(result.matched_tags, tags(&["A"]));
    }

    #[test]
    fn strategy_deserializes_from_lowercase() {
        #[derive(Deserialize)]
        struct Holder {
            strategy: AclStrategy,
        }

        let any: Holder = serde_json::from_str(r#"{"strategy":"any"}"#).unwrap();
        let all: Holder = serde_json::from_str(r#"{"strategy":"all"}"#).unwrap();
        assert_eq!(any.strategy, AclStrategy::Any);
        assert_eq!(all.strategy, AclStrategy::All);
    }
}
