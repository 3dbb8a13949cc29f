use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::tuple::TenantId;

pub const TRACE_HEADER: &str = "traceparent";

/// Names of the diagnostic events attached to a [`Decision`].
pub mod events {
    pub const JWT_PRESENT: &str = "jwtPresent";
    pub const NO_MAPPINGS: &str = "NO MAPPINGS found";
    pub const REJECTED_BY_MAPPING: &str = "REJECTED by mapping id";
    pub const REVOKED: &str = "REVOKED";
    pub const EXCEPTION: &str = "Exception";
    pub const TRACE: &str = "Trace";
}

/// Request headers keyed by lowercased name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// Canonical form of one inbound call, independent of the transport it
/// arrived on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionContext {
    pub method: String,
    pub path: String,
    pub headers: Headers,
    pub tenant: Option<TenantId>,
    pub subject: Option<String>,
    pub trace_id: Option<String>,
}

impl DecisionContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>, headers: Headers) -> Self {
        let trace_id = headers.get(TRACE_HEADER).map(str::to_string);
        Self {
            method: method.into(),
            path: path.into(),
            headers,
            tenant: None,
            subject: None,
            trace_id,
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<TenantId>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Ok,
    PermissionDenied,
    Unauthorized,
}

impl DecisionStatus {
    /// Numeric code as understood by the calling proxy (gRPC status codes).
    pub fn code(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::PermissionDenied => 7,
            Self::Unauthorized => 16,
        }
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Unauthorized => "UNAUTHORIZED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub status: DecisionStatus,
    pub allowed_tags: Vec<String>,
    pub tenant: Option<TenantId>,
    pub trace_id: Option<String>,
    pub events: IndexMap<String, String>,
    pub mappings_present: bool,
    pub rejected_mapping_id: Option<String>,
}

impl Decision {
    pub fn allow(allowed_tags: Vec<String>) -> Self {
        Self {
            allowed: true,
            status: DecisionStatus::Ok,
            allowed_tags,
            tenant: None,
            trace_id: None,
            events: IndexMap::new(),
            mappings_present: true,
            rejected_mapping_id: None,
        }
    }

    pub fn deny(status: DecisionStatus) -> Self {
        Self {
            allowed: false,
            status,
            allowed_tags: Vec::new(),
            tenant: None,
            trace_id: None,
            events: IndexMap::new(),
            mappings_present: false,
            rejected_mapping_id: None,
        }
    }

    pub fn with_event(mut self, name: impl Into<String>, detail: impl Into<String>) -> Self {
        self.record(name, detail);
        self
    }

    pub fn record(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.events.insert(name.into(), detail.into());
    }

    /// Value for the `x-allowed-tags` response header.
    pub fn allowed_tags_header(&self) -> String {
        self.allowed_tags.join(",")
    }
}

/// Unexpected failure while evaluating a request; always converted into a
/// deny decision before leaving the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("evaluation panicked: {0}")]
    Panicked(String),
}
