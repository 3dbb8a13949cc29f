use std::cmp::{Ordering, Reverse};
use std::collections::BTreeSet;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::snapshot::{CacheSnapshot, SnapshotError};
use crate::tuple::TenantId;

/// Stored form of a mapping rule, as written by the administrative side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub id: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<TenantId>,
    #[serde(default)]
    pub specificity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodMatcher {
    Any,
    Exact(String),
}

impl MethodMatcher {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed == "*" || trimmed.eq_ignore_ascii_case("any") {
            Self::Any
        } else {
            Self::Exact(trimmed.to_ascii_uppercase())
        }
    }

    pub fn matches(&self, method: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected.eq_ignore_ascii_case(method),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Exact(_) => 0,
            Self::Any => 1,
        }
    }
}

impl fmt::Display for MethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(m) => f.write_str(m),
        }
    }
}

/// Path pattern syntax: `~<regex>` is a fully anchored regex, a trailing `*`
/// makes a prefix match, anything else must match exactly.
#[derive(Debug, Clone)]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
    Regex(Regex),
}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self, regex::Error> {
        if let Some(expr) = raw.strip_prefix('~') {
            let anchored = format!("^(?:{expr})$");
            return Ok(Self::Regex(Regex::new(&anchored)?));
        }
        if let Some(prefix) = raw.strip_suffix('*') {
            return Ok(Self::Prefix(prefix.to_string()));
        }
        Ok(Self::Exact(raw.to_string()))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == path,
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Regex(re) => re.is_match(path),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Exact(_) => 0,
            Self::Prefix(_) => 1,
            Self::Regex(_) => 2,
        }
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) | (Self::Prefix(a), Self::Prefix(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl Eq for PathPattern {}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(p) => f.write_str(p),
            Self::Prefix(p) => write!(f, "{p}*"),
            Self::Regex(re) => write!(f, "~{}", re.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub id: String,
    pub method: MethodMatcher,
    pub path: PathPattern,
    pub required_tags: BTreeSet<String>,
    pub tenant: Option<TenantId>,
    pub specificity: i32,
}

impl Mapping {
    pub fn matches(&self, tenant: Option<&TenantId>, method: &str, path: &str) -> bool {
        if let Some(ref scope) = self.tenant
            && Some(scope) != tenant
        {
            return false;
        }
        self.method.matches(method) && self.path.matches(path)
    }

    /// Total order used to pick among several matching mappings; the
    /// preferred mapping sorts first.
    pub fn precedence(&self, other: &Self) -> Ordering {
        let key = |m: &Self| {
            (
                Reverse(m.specificity),
                m.method.rank(),
                m.path.rank(),
            )
        };
        key(self)
            .cmp(&key(other))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl TryFrom<MappingRecord> for Mapping {
    type Error = SnapshotError;

    fn try_from(record: MappingRecord) -> Result<Self, Self::Error> {
        let path = PathPattern::parse(&record.path).map_err(|e| SnapshotError::InvalidPattern {
            mapping_id: record.id.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            method: MethodMatcher::parse(&record.method),
            path,
            required_tags: record.tags.into_iter().collect(),
            tenant: record.tenant,
            specificity: record.specificity,
            id: record.id,
        })
    }
}

/// Strips the query string and fragment from a request target.
pub fn request_path(target: &str) -> &str {
    let end = target.find(['?', '#']).unwrap_or(target.len());
    &target[..end]
}

/// Finds the mapping governing `method` + `path` in `snapshot`.
pub fn resolve<'a>(
    snapshot: &'a CacheSnapshot,
    tenant: Option<&TenantId>,
    method: &str,
    path: &str,
) -> Option<&'a Mapping> {
    let path = request_path(path);
    snapshot
        .mappings()
        .iter()
        .find(|m| m.matches(tenant, method, path))
}
