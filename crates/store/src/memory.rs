use std::sync::{Arc, Mutex};
use std::time::Instant;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;
use tessera_auth::Principal;
use tessera_core::{Entity, Grn, TenantId};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::{EntityEvent, EntityStore, StoreError, StoreResult};

type Table = FxHashMap<Grn, Entity>;

/// In-RAM entity store.
///
/// Readers load the current table snapshot without locking; writers are
/// serialized by `write` and publish a new snapshot per mutation.
pub struct MemoryEntityStore {
    snap: ArcSwap<Table>,
    write: Mutex<u64>,
    events: broadcast::Sender<EntityEvent>,
}

impl Default for MemoryEntityStore {
    fn default() -> Self { Self::with_capacity(1024) }
}

impl MemoryEntityStore {
    /// `cap` bounds the change feed; slow subscribers observe `Lagged`.
    pub fn with_capacity(cap: usize) -> Self {
        let (events, _) = broadcast::channel(cap.max(1));
        Self { snap: ArcSwap::from_pointee(Table::default()), write: Mutex::new(0), events }
    }

    /// Change feed capacity from `TESSERA_WATCH_CAP` (default 1024).
    pub fn from_env() -> Self {
        let cap = std::env::var("TESSERA_WATCH_CAP").ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(1024);
        Self::with_capacity(cap)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EntityEvent> { self.events.subscribe() }

    pub fn len(&self) -> usize { self.snap.load().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Run `f` against a private copy of the table while holding the writer
    /// lock, then publish it. `f` receives the next version number.
    fn mutate<T>(&self, f: impl FnOnce(&mut Table, u64) -> StoreResult<(T, EntityEvent)>) -> StoreResult<T> {
        let mut version = self.write.lock().unwrap_or_else(|e| e.into_inner());
        let mut table: Table = (**self.snap.load()).clone();
        let (out, event) = f(&mut table, *version + 1)?;
        *version += 1;
        self.snap.store(Arc::new(table));
        // no subscribers is fine
        let _ = self.events.send(event);
        Ok(out)
    }
}

fn check_tenant(who: &Principal, grn: &Grn) -> StoreResult<()> {
    if who.org_id != grn.tenant_id {
        return Err(StoreError::TenantMismatch { org_id: who.org_id, grn: grn.clone() });
    }
    Ok(())
}

fn actor(who: &Principal) -> String { format!("user:{}", who.user_id) }

fn now_ms() -> i64 { chrono::Utc::now().timestamp_millis() }

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn get(&self, who: &Principal, grn: &Grn) -> StoreResult<Entity> {
        let started = Instant::now();
        check_tenant(who, grn)?;
        let out = self.snap.load().get(grn).cloned().ok_or_else(|| StoreError::NotFound(grn.clone()));
        histogram!("store_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        out
    }

    async fn create(&self, who: &Principal, mut entity: Entity) -> StoreResult<Entity> {
        let grn = entity.grn()?.clone();
        check_tenant(who, &grn)?;
        let out = self.mutate(|table, version| {
            if table.contains_key(&grn) {
                return Err(StoreError::AlreadyExists(grn.clone()));
            }
            if entity.guid.is_empty() {
                entity.guid = Uuid::new_v4().to_string();
            }
            entity.version = version.to_string();
            entity.created_at = now_ms();
            entity.created_by = actor(who);
            entity.updated_at = entity.created_at;
            entity.updated_by = entity.created_by.clone();
            table.insert(grn.clone(), entity.clone());
            Ok((entity.clone(), EntityEvent::Put(entity)))
        })?;
        debug!(grn = %grn, version = %out.version, "entity created");
        counter!("store_put_total", 1u64);
        Ok(out)
    }

    async fn update(&self, who: &Principal, mut entity: Entity) -> StoreResult<Entity> {
        let grn = entity.grn()?.clone();
        check_tenant(who, &grn)?;
        let out = self.mutate(|table, version| {
            let current = table.get(&grn).ok_or_else(|| StoreError::NotFound(grn.clone()))?;
            if !entity.version.is_empty() && entity.version != current.version {
                return Err(StoreError::Conflict {
                    grn: grn.clone(),
                    expected: entity.version.clone(),
                    actual: current.version.clone(),
                });
            }
            entity.guid = current.guid.clone();
            entity.created_at = current.created_at;
            entity.created_by = current.created_by.clone();
            entity.version = version.to_string();
            entity.updated_at = now_ms();
            entity.updated_by = actor(who);
            table.insert(grn.clone(), entity.clone());
            Ok((entity.clone(), EntityEvent::Put(entity)))
        })?;
        debug!(grn = %grn, version = %out.version, "entity updated");
        counter!("store_put_total", 1u64);
        Ok(out)
    }

    async fn delete(&self, who: &Principal, grn: &Grn) -> StoreResult<Entity> {
        check_tenant(who, grn)?;
        let out = self.mutate(|table, _| {
            let removed = table.remove(grn).ok_or_else(|| StoreError::NotFound(grn.clone()))?;
            Ok((removed, EntityEvent::Deleted(grn.clone())))
        })?;
        debug!(grn = %grn, "entity deleted");
        counter!("store_delete_total", 1u64);
        Ok(out)
    }

    async fn list(&self, who: &Principal, tenant: TenantId, kind: &str) -> StoreResult<Vec<Entity>> {
        let started = Instant::now();
        if who.org_id != tenant {
            return Err(StoreError::TenantMismatch { org_id: who.org_id, grn: Grn::new(tenant, kind, "") });
        }
        let snap = self.snap.load();
        let mut out: Vec<Entity> = snap
            .iter()
            .filter(|(g, _)| g.tenant_id == tenant && (kind.is_empty() || g.resource_kind == kind))
            .map(|(_, e)| e.clone())
            .collect();
        out.sort_by(|a, b| a.grn.cmp(&b.grn));
        histogram!("store_list_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }
}
