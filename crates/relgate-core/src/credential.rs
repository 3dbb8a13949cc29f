//! Bearer credential extraction and unverified claim decoding.
//!
//! Signatures are not checked here: the proxy in front of this service
//! verifies credentials, and decoded claims are trusted as-is.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

use crate::decision::DecisionContext;
use crate::tuple::TenantId;

const AUTH_HEADER: &str = "authorization";
const COOKIE_HEADER: &str = "cookie";
const BEARER_PREFIX: &str = "Bearer ";
const REALMS_SEGMENT: &str = "/realms/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCredential(String);

impl RawCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Which request locations besides the `Authorization` header may carry a
/// credential. `None` disables that location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub query_param: Option<String>,
    pub cookie: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub credential_id: Option<String>,
    pub issued_at: Option<i64>,
    pub expires_at: Option<i64>,
}

impl Claims {
    /// Tenant named by the issuer URL, e.g. `https://idp/realms/acme` → `acme`.
    pub fn tenant(&self) -> Option<TenantId> {
        self.issuer.as_deref().and_then(tenant_from_issuer)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CredentialExtractor {
    config: ExtractorConfig,
}

impl CredentialExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Header first, then the query parameter if no header credential was
    /// found. A cookie credential, when enabled and present, replaces
    /// whichever of the two was selected.
    pub fn extract(&self, ctx: &DecisionContext) -> Option<RawCredential> {
        let mut token = ctx.headers.get(AUTH_HEADER).and_then(bearer_token);

        if token.is_none()
            && let Some(ref param) = self.config.query_param
        {
            token = query_token(&ctx.path, param);
        }

        if let Some(ref name) = self.config.cookie
            && let Some(cookie_token) = ctx
                .headers
                .get(COOKIE_HEADER)
                .and_then(|raw| cookie_token(raw, name))
        {
            token = Some(cookie_token);
        }

        token.map(RawCredential)
    }

    pub fn claims(&self, ctx: &DecisionContext) -> Option<Claims> {
        self.extract(ctx).and_then(|raw| decode_claims(&raw))
    }
}

fn bearer_token(header: &str) -> Option<String> {
    header
        .strip_prefix(BEARER_PREFIX)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn query_token(target: &str, param: &str) -> Option<String> {
    let (_, query) = target.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == param)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

fn cookie_token(raw: &str, name: &str) -> Option<String> {
    raw.split(';').find_map(|cookie| {
        let parts: Vec<&str> = cookie.split('=').collect();
        if parts.len() != 2 || parts[0].trim() != name || parts[1].is_empty() {
            return None;
        }
        Some(parts[1].to_string())
    })
}

/// Structurally decodes the payload segment of a compact JWS. Anything that
/// does not decode to a JSON object yields `None`.
pub fn decode_claims(raw: &RawCredential) -> Option<Claims> {
    let mut parts = raw.as_str().split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let value: Value = serde_json::from_slice(&bytes).ok()?;
    if !value.is_object() {
        return None;
    }

    Some(Claims {
        subject: string_claim(&value, "sub"),
        issuer: string_claim(&value, "iss"),
        credential_id: string_claim(&value, "jti"),
        issued_at: timestamp_claim(&value, "iat"),
        expires_at: timestamp_claim(&value, "exp"),
    })
}

fn string_claim(claims: &Value, name: &str) -> Option<String> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn timestamp_claim(claims: &Value, name: &str) -> Option<i64> {
    let value = claims.get(name)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
}

pub fn tenant_from_issuer(issuer: &str) -> Option<TenantId> {
    let idx = issuer.rfind(REALMS_SEGMENT)?;
    let tenant = &issuer[idx + REALMS_SEGMENT.len()..];
    if tenant.is_empty() {
        return None;
    }
    Some(TenantId::new(tenant))
}
