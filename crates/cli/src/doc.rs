//! On-disk entity document: an `Entity` whose payloads are inline JSON
//! instead of opaque bytes, so it can be written and read by hand.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_core::{Entity, EntityOrigin, Grn};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EntityDoc {
    pub grn: Option<Grn>,
    pub name: String,
    pub guid: String,
    pub version: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub created_by: String,
    pub updated_by: String,
    pub folder: String,
    pub slug: String,
    pub labels: BTreeMap<String, String>,
    pub origin: Option<EntityOrigin>,
    pub meta: Option<Value>,
    pub body: Option<Value>,
    pub status: Option<Value>,
}

fn to_bytes(v: Option<Value>, what: &str) -> Result<Vec<u8>> {
    match v {
        None => Ok(Vec::new()),
        Some(v) => serde_json::to_vec(&v).with_context(|| format!("encoding {}", what)),
    }
}

fn from_bytes(b: &[u8], what: &str) -> Result<Option<Value>> {
    if b.is_empty() {
        return Ok(None);
    }
    match serde_json::from_slice(b).with_context(|| format!("decoding {}", what))? {
        Value::Null => Ok(None),
        v => Ok(Some(v)),
    }
}

impl EntityDoc {
    pub fn into_entity(self) -> Result<Entity> {
        Ok(Entity {
            grn: self.grn,
            name: self.name,
            guid: self.guid,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            created_by: self.created_by,
            updated_by: self.updated_by,
            folder: self.folder,
            slug: self.slug,
            labels: self.labels,
            origin: self.origin,
            meta: to_bytes(self.meta, "meta")?,
            body: to_bytes(self.body, "body")?,
            status: to_bytes(self.status, "status")?,
        })
    }

    pub fn from_entity(e: Entity) -> Result<Self> {
        Ok(Self {
            meta: from_bytes(&e.meta, "meta")?,
            body: from_bytes(&e.body, "body")?,
            status: from_bytes(&e.status, "status")?,
            grn: e.grn,
            name: e.name,
            guid: e.guid,
            version: e.version,
            created_at: e.created_at,
            updated_at: e.updated_at,
            created_by: e.created_by,
            updated_by: e.updated_by,
            folder: e.folder,
            slug: e.slug,
            labels: e.labels,
            origin: e.origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_payloads_become_bytes() {
        let doc: EntityDoc = serde_json::from_value(serde_json::json!({
            "grn": {"tenant_id": 2, "resource_kind": "Playlist", "resource_identifier": "p1"},
            "created_at": 1521118800000i64,
            "body": {"interval": "5m"}
        }))
        .unwrap();
        let e = doc.into_entity().unwrap();
        assert_eq!(e.grn, Some(Grn::new(2, "Playlist", "p1")));
        assert_eq!(e.body, br#"{"interval":"5m"}"#.to_vec());
        assert!(e.meta.is_empty());
    }

    #[test]
    fn null_payloads_read_back_as_absent() {
        let e = Entity { meta: b"null".to_vec(), body: b"{\"a\":1}".to_vec(), ..Default::default() };
        let doc = EntityDoc::from_entity(e).unwrap();
        assert_eq!(doc.meta, None);
        assert_eq!(doc.body, Some(serde_json::json!({"a": 1})));
        assert_eq!(doc.status, None);
    }
}
