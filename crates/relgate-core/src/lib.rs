pub mod acl;
pub mod credential;
pub mod decision;
pub mod mapping;
pub mod snapshot;
pub mod tuple;

pub use acl::{AclCheck, AclEvaluator, AclStrategy};
pub use credential::{Claims, CredentialExtractor, ExtractorConfig, RawCredential};
pub use decision::{
    Decision, DecisionContext, DecisionStatus, EvaluationError, Headers, events,
};
pub use mapping::{Mapping, MappingRecord, MethodMatcher, PathPattern};
pub use snapshot::{CacheSnapshot, SnapshotError};
pub use tuple::{RelationTuple, SnapshotVersion, TenantId};
