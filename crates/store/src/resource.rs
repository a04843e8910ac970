use serde_json::Value;
use tessera_auth::{Principal, PrincipalConfig, RequestContext};
use tessera_convert::{entity_to_value, resource_to_entity};
use tessera_core::{tenant_from_namespace, Grn};
use tracing::info;

use crate::{EntityStore, StoreResult};

/// Serves generic resource objects from an [`EntityStore`].
///
/// Each call synthesizes the request principal once, derives the GRN from
/// the key and converts on the way in and out. Writes that fail conversion
/// never reach the store.
pub struct ResourceStorage<S> {
    store: S,
    cfg: PrincipalConfig,
}

impl<S: EntityStore> ResourceStorage<S> {
    pub fn new(store: S, cfg: PrincipalConfig) -> Self { Self { store, cfg } }

    pub fn store(&self) -> &S { &self.store }

    fn principal(&self, ctx: &RequestContext) -> StoreResult<Principal> {
        Ok(ctx.principal(&self.cfg)?)
    }

    pub async fn get(&self, ctx: &RequestContext, key: &str, kind: &str) -> StoreResult<Value> {
        let who = self.principal(ctx)?;
        let grn = Grn::from_key_str(key, kind)?;
        let entity = self.store.get(&who, &grn).await?;
        Ok(entity_to_value(&entity)?)
    }

    pub async fn create(&self, ctx: &RequestContext, key: &str, obj: &Value) -> StoreResult<Value> {
        let who = self.principal(ctx)?;
        let entity = resource_to_entity(key, obj)?;
        let stored = self.store.create(&who, entity).await?;
        info!(key, version = %stored.version, "resource created");
        Ok(entity_to_value(&stored)?)
    }

    pub async fn update(&self, ctx: &RequestContext, key: &str, obj: &Value) -> StoreResult<Value> {
        let who = self.principal(ctx)?;
        let entity = resource_to_entity(key, obj)?;
        let stored = self.store.update(&who, entity).await?;
        info!(key, version = %stored.version, "resource updated");
        Ok(entity_to_value(&stored)?)
    }

    pub async fn delete(&self, ctx: &RequestContext, key: &str, kind: &str) -> StoreResult<Value> {
        let who = self.principal(ctx)?;
        let grn = Grn::from_key_str(key, kind)?;
        let removed = self.store.delete(&who, &grn).await?;
        info!(key, "resource deleted");
        Ok(entity_to_value(&removed)?)
    }

    /// Every object of `kind` in `namespace`. A single entity that fails
    /// conversion fails the whole listing.
    pub async fn list(&self, ctx: &RequestContext, namespace: &str, kind: &str) -> StoreResult<Vec<Value>> {
        let who = self.principal(ctx)?;
        let tenant = tenant_from_namespace(namespace)?;
        let entities = self.store.list(&who, tenant, kind).await?;
        let mut out = Vec::with_capacity(entities.len());
        for e in &entities {
            out.push(entity_to_value(e)?);
        }
        Ok(out)
    }
}
