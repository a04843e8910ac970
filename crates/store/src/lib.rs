//! Tessera store: the backing entity store interface, an in-RAM reference
//! store, and the adapter that serves generic resource objects on top of it.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use tessera_auth::Principal;
use tessera_core::{ConvertError, Entity, Grn, TenantId};

mod memory;
mod resource;

pub use memory::MemoryEntityStore;
pub use resource::ResourceStorage;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not_found: {0}")]
    NotFound(Grn),
    #[error("already_exists: {0}")]
    AlreadyExists(Grn),
    #[error("conflict: {grn} is at version {actual:?}, write expected {expected:?}")]
    Conflict { grn: Grn, expected: String, actual: String },
    #[error("forbidden: principal in org {org_id} cannot act on {grn}")]
    TenantMismatch { org_id: TenantId, grn: Grn },
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Change notification emitted by a store after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityEvent {
    Put(Entity),
    Deleted(Grn),
}

/// Backing content store. Every call runs under the given principal.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get(&self, who: &Principal, grn: &Grn) -> StoreResult<Entity>;

    /// Insert a new entity. The store assigns guid, version and audit fields.
    async fn create(&self, who: &Principal, entity: Entity) -> StoreResult<Entity>;

    /// Replace an existing entity. A non-empty `entity.version` must match
    /// the stored version.
    async fn update(&self, who: &Principal, entity: Entity) -> StoreResult<Entity>;

    /// Remove an entity, returning its last state.
    async fn delete(&self, who: &Principal, grn: &Grn) -> StoreResult<Entity>;

    /// All entities of `kind` owned by `tenant`, ordered by GRN. An empty kind
    /// matches every kind.
    async fn list(&self, who: &Principal, tenant: TenantId, kind: &str) -> StoreResult<Vec<Entity>>;
}
