//! Global resource names: the tenant-scoped identity used by the backing store.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ResourceKey, Result, TenantId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grn {
    pub tenant_id: TenantId,
    pub resource_kind: String,
    pub resource_identifier: String,
}

impl Grn {
    pub fn new(tenant_id: TenantId, resource_kind: impl Into<String>, resource_identifier: impl Into<String>) -> Self {
        Self { tenant_id, resource_kind: resource_kind.into(), resource_identifier: resource_identifier.into() }
    }

    /// Convert a raw key string to a GRN (parse, then derive the tenant).
    pub fn from_key_str(key: &str, kind: &str) -> Result<Self> {
        ResourceKey::parse(key)?.to_grn(kind)
    }
}

impl fmt::Display for Grn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grn:{}/{}/{}", self.tenant_id, self.resource_kind, self.resource_identifier)
    }
}
