use relgate_core::TenantId;

pub fn audit_credential_revoked(tenant: &TenantId, credential_id: &str, ttl_secs: u64) {
    tracing::info!(
        target: "audit",
        event = "credential_revoked",
        tenant = %tenant,
        credential_id = credential_id,
        ttl_secs = ttl_secs,
        "credential revoked"
    );
}

pub fn audit_subject_revoked(tenant: &TenantId, subject_id: &str, ttl_secs: u64) {
    tracing::info!(
        target: "audit",
        event = "subject_revoked",
        tenant = %tenant,
        subject_id = subject_id,
        ttl_secs = ttl_secs,
        "subject revoked"
    );
}

pub fn audit_subject_unrevoked(tenant: &TenantId, subject_id: &str, removed: bool) {
    tracing::info!(
        target: "audit",
        event = "subject_unrevoked",
        tenant = %tenant,
        subject_id = subject_id,
        removed = removed,
        "subject revocation lifted"
    );
}

pub fn audit_cache_refresh(marker: u64) {
    tracing::info!(
        target: "audit",
        event = "cache_refresh",
        marker = marker,
        "cache refresh triggered"
    );
}

pub fn audit_auth_failure(reason: &str, path: &str) {
    tracing::warn!(
        target: "audit",
        event = "auth_failure",
        reason = reason,
        path = path,
        "admin authentication failed"
    );
}
