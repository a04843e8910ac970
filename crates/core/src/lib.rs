//! Tessera core types: resource keys, tenants, global resource names and the
//! entity record persisted by the backing content store.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod error;
pub mod grn;
pub mod key;
pub mod namespace;

pub use error::ConvertError;
pub use grn::Grn;
pub use key::ResourceKey;
pub use namespace::{namespace_for_tenant, tenant_from_namespace};

/// Tenant (org) identifier embedded in a namespace. Always >= 1.
pub type TenantId = i64;

/// Tenant owning the `default` namespace.
pub const DEFAULT_TENANT: TenantId = 1;

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;

/// Provenance of an entity that was imported from somewhere else.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityOrigin {
    pub source: String,
    pub key: String,
    /// Epoch milliseconds.
    pub time: i64,
}

/// Record persisted by the backing content store.
///
/// `meta`, `body` and `status` are opaque JSON payloads; an empty vector means
/// the payload is absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    pub grn: Option<Grn>,
    pub name: String,
    pub guid: String,
    /// Store-assigned, used for optimistic concurrency.
    pub version: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds; zero when never updated.
    pub updated_at: i64,
    pub created_by: String,
    pub updated_by: String,
    pub folder: String,
    pub slug: String,
    pub labels: BTreeMap<String, String>,
    pub origin: Option<EntityOrigin>,
    pub meta: Vec<u8>,
    pub body: Vec<u8>,
    pub status: Vec<u8>,
}

impl Entity {
    /// GRN of this entity, or `MissingIdentity` when the store handed back a
    /// record without one.
    pub fn grn(&self) -> Result<&Grn> {
        self.grn.as_ref().ok_or(ConvertError::MissingIdentity)
    }
}
