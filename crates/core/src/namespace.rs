//! Tenant id <-> namespace mapping.
//!
//! `default` belongs to tenant 1. Every other tenant lives in `tenant-N`;
//! `org-N` is accepted as a synonym when parsing.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{ConvertError, Result, TenantId, DEFAULT_TENANT};

pub const DEFAULT_NAMESPACE: &str = "default";

static TENANT_NS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:org|tenant)-([0-9]+)$").expect("static regex"));

/// Derive the tenant id from a namespace string.
pub fn tenant_from_namespace(namespace: &str) -> Result<TenantId> {
    if namespace == DEFAULT_NAMESPACE {
        return Ok(DEFAULT_TENANT);
    }
    let invalid = |reason| ConvertError::InvalidNamespace { namespace: namespace.to_string(), reason };
    let caps = TENANT_NS
        .captures(namespace)
        .ok_or_else(|| invalid("expected org|tenant-${#}"))?;
    let id: TenantId = caps[1].parse().map_err(|_| invalid("tenant id out of range"))?;
    if id < 1 {
        return Err(invalid("tenant id must be >= 1"));
    }
    Ok(id)
}

/// Namespace a tenant's objects are exposed under.
pub fn namespace_for_tenant(tenant: TenantId) -> String {
    if tenant == DEFAULT_TENANT {
        DEFAULT_NAMESPACE.to_string()
    } else {
        format!("tenant-{}", tenant)
    }
}
