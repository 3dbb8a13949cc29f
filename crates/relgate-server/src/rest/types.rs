use std::collections::HashMap;

use indexmap::IndexMap;
use relgate_core::{Decision, DecisionContext, Headers};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
}

impl CheckRequest {
    pub fn into_context(self) -> DecisionContext {
        let headers: Headers = self.headers.into_iter().collect();
        let mut ctx = DecisionContext::new(self.method, self.path, headers);
        if let Some(tenant) = self.tenant.filter(|t| !t.is_empty()) {
            ctx = ctx.with_tenant(tenant);
        }
        if let Some(subject) = self.subject.filter(|s| !s.is_empty()) {
            ctx = ctx.with_subject(subject);
        }
        ctx
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub status: String,
    pub code: i32,
    pub allowed_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub events: IndexMap<String, String>,
    pub mappings_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_mapping_id: Option<String>,
}

impl From<Decision> for CheckResponse {
    fn from(d: Decision) -> Self {
        Self {
            allowed: d.allowed,
            status: d.status.to_string(),
            code: d.status.code(),
            allowed_tags: d.allowed_tags,
            tenant: d.tenant.map(|t| t.as_str().to_string()),
            trace_id: d.trace_id,
            events: d.events,
            mappings_present: d.mappings_present,
            rejected_mapping_id: d.rejected_mapping_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CredentialRevokedResponse {
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SubjectRevokedResponse {
    pub revoked: bool,
    pub ttl_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct SubjectUnrevokedResponse {
    pub removed: bool,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub marker: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
