use std::collections::HashMap;
use std::sync::Arc;

use relgate_core::{Decision, DecisionContext, Headers};
use tonic::{Request, Response, Status};

use crate::proto::relgate::v1::{self, decision_service_server::DecisionService};
use crate::rest::ALLOWED_TAGS_HEADER;
use crate::service::{Backend, RelgateService};

/// Proxy-facing adapter. A decision is always an `Ok` response; the verdict
/// travels in `code`.
pub struct DecisionServiceImpl<B> {
    service: Arc<RelgateService<B>>,
}

impl<B: Backend> DecisionServiceImpl<B> {
    pub fn new(service: Arc<RelgateService<B>>) -> Self {
        Self { service }
    }
}

fn request_to_context(req: v1::CheckRequest) -> DecisionContext {
    let headers: Headers = req.headers.into_iter().collect();
    let mut ctx = DecisionContext::new(req.method, req.path, headers);
    if let Some(tenant) = req.tenant.filter(|t| !t.is_empty()) {
        ctx = ctx.with_tenant(tenant);
    }
    if let Some(subject) = req.subject.filter(|s| !s.is_empty()) {
        ctx = ctx.with_subject(subject);
    }
    ctx
}

fn decision_to_response(decision: Decision) -> v1::CheckResponse {
    let mut response_headers = HashMap::new();
    if decision.allowed {
        response_headers.insert(
            ALLOWED_TAGS_HEADER.to_string(),
            decision.allowed_tags_header(),
        );
    }

    v1::CheckResponse {
        code: decision.status.code(),
        allowed: decision.allowed,
        allowed_tags: decision.allowed_tags,
        response_headers,
        events: decision
            .events
            .into_iter()
            .map(|(name, detail)| v1::DecisionEvent { name, detail })
            .collect(),
        trace_id: decision.trace_id.unwrap_or_default(),
        mappings_present: decision.mappings_present,
        rejected_mapping_id: decision.rejected_mapping_id.unwrap_or_default(),
        tenant: decision
            .tenant
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
    }
}

#[tonic::async_trait]
impl<B: Backend> DecisionService for DecisionServiceImpl<B> {
    async fn check(
        &self,
        request: Request<v1::CheckRequest>,
    ) -> Result<Response<v1::CheckResponse>, Status> {
        let ctx = request_to_context(request.into_inner());
        let decision = self.service.check(&ctx).await;
        Ok(Response::new(decision_to_response(decision)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_core::{DecisionStatus, TenantId, events};

    #[test]
    fn request_headers_become_case_insensitive_context() {
        let req = v1::CheckRequest {
            method: "GET".to_string(),
            path: "/orders".to_string(),
            headers: HashMap::from([
                ("Authorization".to_string(), "Bearer t".to_string()),
                ("TraceParent".to_string(), "00-abc-01".to_string()),
            ]),
            tenant: Some("acme".to_string()),
            subject: None,
        };

        let ctx = request_to_context(req);

        assert_eq!(ctx.headers.get("authorization"), Some("Bearer t"));
        assert_eq!(ctx.trace_id.as_deref(), Some("00-abc-01"));
        assert_eq!(ctx.tenant, Some(TenantId::new("acme")));
        assert!(ctx.subject.is_none());
    }

    #[test]
    fn empty_identity_fields_are_treated_as_absent() {
        let req = v1::CheckRequest {
            method: "GET".to_string(),
            path: "/".to_string(),
            headers: HashMap::new(),
            tenant: Some(String::new()),
            subject: Some(String::new()),
        };

        let ctx = request_to_context(req);
        assert!(ctx.tenant.is_none());
        assert!(ctx.subject.is_none());
    }

    #[test]
    fn allow_carries_allowed_tags_header() {
        let mut decision = Decision::allow(vec!["a".to_string(), "b".to_string()]);
        decision.tenant = Some(TenantId::new("acme"));

        let resp = decision_to_response(decision);

        assert_eq!(resp.code, 0);
        assert!(resp.allowed);
        assert_eq!(
            resp.response_headers.get(ALLOWED_TAGS_HEADER).map(String::as_str),
            Some("a,b")
        );
        assert_eq!(resp.tenant, "acme");
    }

    #[test]
    fn deny_keeps_event_order_and_omits_header() {
        let mut decision = Decision::deny(DecisionStatus::PermissionDenied)
            .with_event(events::REJECTED_BY_MAPPING, "m-1")
            .with_event("later", "x");
        decision.rejected_mapping_id = Some("m-1".to_string());

        let resp = decision_to_response(decision);

        assert_eq!(resp.code, 7);
        assert!(resp.response_headers.is_empty());
        assert_eq!(resp.rejected_mapping_id, "m-1");
        let names: Vec<&str> = resp.events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![events::REJECTED_BY_MAPPING, "later"]);
    }

    #[test]
    fn unauthorized_maps_to_code_16() {
        let resp = decision_to_response(Decision::deny(DecisionStatus::Unauthorized));
        assert_eq!(resp.code, 16);
        assert!(!resp.allowed);
    }
}
