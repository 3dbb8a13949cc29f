use relgate_core::TenantId;

/// Builds every key this service reads or writes in the shared store. An
/// optional prefix lets several deployments share one store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn acl_tuples(&self) -> String {
        format!("{}acl:tuples", self.prefix)
    }

    pub fn mappings(&self) -> String {
        format!("{}acl:mappings", self.prefix)
    }

    pub fn invalidation_marker(&self) -> String {
        format!("{}acl:refresh-marker", self.prefix)
    }

    pub fn credential_revocation(&self, tenant: &TenantId, credential_id: &str) -> String {
        format!("{}revoked:credential:{tenant}:{credential_id}", self.prefix)
    }

    pub fn subject_revocation(&self, tenant: &TenantId, subject_id: &str) -> String {
        format!("{}revoked:subject:{tenant}:{subject_id}", self.prefix)
    }
}
