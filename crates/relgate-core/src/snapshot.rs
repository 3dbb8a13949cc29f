use std::collections::{BTreeSet, HashMap, HashSet};

use crate::mapping::{Mapping, MappingRecord};
use crate::tuple::{RelationTuple, SnapshotVersion, TenantId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("duplicate mapping id: {0}")]
    DuplicateMappingId(String),

    #[error("mapping '{mapping_id}' has an invalid path pattern: {reason}")]
    InvalidPattern { mapping_id: String, reason: String },
}

/// Immutable view of every mapping and relation tuple at one point in time.
///
/// Mappings are kept sorted by precedence so resolution is a first-match
/// scan; tuples are indexed by `(tenant, subject)`.
#[derive(Debug, Default)]
pub struct CacheSnapshot {
    version: SnapshotVersion,
    mappings: Vec<Mapping>,
    grants: HashMap<TenantId, HashMap<String, BTreeSet<String>>>,
    tuple_count: usize,
}

impl CacheSnapshot {
    pub fn build(
        version: SnapshotVersion,
        mappings: Vec<MappingRecord>,
        tuples: Vec<RelationTuple>,
    ) -> Result<Self, SnapshotError> {
        let mut seen = HashSet::with_capacity(mappings.len());
        let mut compiled = Vec::with_capacity(mappings.len());
        for record in mappings {
            if !seen.insert(record.id.clone()) {
                return Err(SnapshotError::DuplicateMappingId(record.id));
            }
            compiled.push(Mapping::try_from(record)?);
        }
        compiled.sort_by(Mapping::precedence);

        let mut grants: HashMap<TenantId, HashMap<String, BTreeSet<String>>> = HashMap::new();
        let mut tuple_count = 0;
        for tuple in tuples {
            let inserted = grants
                .entry(tuple.tenant)
                .or_default()
                .entry(tuple.subject)
                .or_default()
                .insert(tuple.tag);
            if inserted {
                tuple_count += 1;
            }
        }

        Ok(Self {
            version,
            mappings: compiled,
            grants,
            tuple_count,
        })
    }

    pub fn empty(version: SnapshotVersion) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }

    pub fn tuple_count(&self) -> usize {
        self.tuple_count
    }

    pub fn granted_tags(&self, tenant: &TenantId, subject: &str) -> Option<&BTreeSet<String>> {
        self.grants.get(tenant).and_then(|by_subject| by_subject.get(subject))
    }
}
