//! Tessera convert: entity records <-> generic resource objects.
//!
//! The generic object is a plain JSON tree (`kind`, `metadata`, `spec`,
//! `status`). Entity fields without a slot in that model travel through the
//! reserved annotations in [`annotations`].

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use metrics::counter;
use serde::Deserialize;
use serde_json::{Map, Value};
use tessera_core::{namespace_for_tenant, ConvertError, Entity, Grn, Result};
use tracing::debug;

pub mod annotations;

pub use annotations::ExtendedFields;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payload {
    Metadata,
    Body,
    Status,
}

impl Payload {
    fn error(self, detail: impl Into<String>) -> ConvertError {
        let detail = detail.into();
        match self {
            Payload::Metadata => ConvertError::MalformedMetadata { detail },
            Payload::Body => ConvertError::MalformedBody { detail },
            Payload::Status => ConvertError::MalformedStatus { detail },
        }
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode an entity payload. Empty bytes and a JSON `null` both mean "absent".
fn decode_payload(bytes: &[u8], which: Payload) -> Result<Option<Map<String, Value>>> {
    if bytes.is_empty() {
        return Ok(None);
    }
    match serde_json::from_slice::<Value>(bytes).map_err(|e| which.error(e.to_string()))? {
        Value::Null => Ok(None),
        Value::Object(m) => Ok(Some(m)),
        other => Err(which.error(format!("expected a JSON object, found {}", type_name(&other)))),
    }
}

fn encode_payload(v: Option<&Value>, which: Payload) -> Result<Vec<u8>> {
    serde_json::to_vec(v.unwrap_or(&Value::Null)).map_err(|e| which.error(e.to_string()))
}

fn set_or_remove(map: &mut Map<String, Value>, key: &str, value: &str) {
    if value.is_empty() {
        map.remove(key);
    } else {
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn string_map(v: Option<&Value>, field: &str) -> Result<BTreeMap<String, String>> {
    match v {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(v) => BTreeMap::<String, String>::deserialize(v)
            .map_err(|e| ConvertError::MalformedMetadata { detail: format!("{}: {}", field, e) }),
    }
}

/// Check the metadata fields the mapper reads, so a bad value is reported
/// under its own path instead of as an opaque `ObjectMeta` decode failure.
fn check_metadata(v: &Value) -> Result<()> {
    let meta = match v {
        Value::Object(m) => m,
        other => {
            return Err(ConvertError::MalformedMetadata {
                detail: format!("metadata: expected an object, found {}", type_name(other)),
            })
        }
    };
    for field in ["name", "namespace", "uid", "resourceVersion"] {
        match meta.get(field) {
            None | Some(Value::Null) | Some(Value::String(_)) => {}
            Some(other) => {
                return Err(ConvertError::MalformedMetadata {
                    detail: format!("metadata.{}: expected a string, found {}", field, type_name(other)),
                })
            }
        }
    }
    string_map(meta.get("labels"), "metadata.labels")?;
    string_map(meta.get("annotations"), "metadata.annotations")?;
    match meta.get("creationTimestamp") {
        None | Some(Value::Null) => {}
        Some(Value::String(ts)) => {
            annotations::parse_millis("metadata.creationTimestamp", ts)?;
        }
        Some(other) => {
            return Err(ConvertError::MalformedMetadata {
                detail: format!("metadata.creationTimestamp: expected a string, found {}", type_name(other)),
            })
        }
    }
    Ok(())
}

fn string_to_json_map(m: &BTreeMap<String, String>) -> Value {
    Value::Object(m.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect())
}

fn build_resource(entity: &Entity, mut obj: Map<String, Value>) -> Result<Map<String, Value>> {
    let grn = entity.grn()?;

    // The stored metadata blob goes in first; identity fields below override it.
    let mut metadata = match decode_payload(&entity.meta, Payload::Metadata)? {
        Some(meta) => meta,
        None => match obj.remove("metadata") {
            Some(Value::Object(m)) => m,
            _ => Map::new(),
        },
    };

    obj.insert("kind".to_string(), Value::String(grn.resource_kind.clone()));

    set_or_remove(&mut metadata, "name", &grn.resource_identifier);
    set_or_remove(&mut metadata, "namespace", &namespace_for_tenant(grn.tenant_id));
    set_or_remove(&mut metadata, "uid", &entity.guid);
    set_or_remove(&mut metadata, "resourceVersion", &entity.version);
    metadata.insert(
        "creationTimestamp".to_string(),
        Value::String(annotations::format_millis("metadata.creationTimestamp", entity.created_at)?),
    );

    let mut annos = string_map(metadata.get("annotations"), "metadata.annotations")?;
    ExtendedFields::from_entity(entity).encode(&mut annos)?;
    metadata.insert("annotations".to_string(), string_to_json_map(&annos));

    // Empty labels are never written, and stale blob labels are dropped.
    if entity.labels.is_empty() {
        metadata.remove("labels");
    } else {
        metadata.insert("labels".to_string(), string_to_json_map(&entity.labels));
    }
    obj.insert("metadata".to_string(), Value::Object(metadata));

    if let Some(spec) = decode_payload(&entity.body, Payload::Body)? {
        obj.insert("spec".to_string(), Value::Object(spec));
    }
    if let Some(status) = decode_payload(&entity.status, Payload::Status)? {
        obj.insert("status".to_string(), Value::Object(status));
    }
    Ok(obj)
}

/// Populate `target` from an entity.
///
/// `target` must be `null` or a JSON object; existing top-level fields not
/// owned by the entity are kept. The target is only written when the whole
/// conversion succeeds.
pub fn entity_to_resource(entity: &Entity, target: &mut Value) -> Result<()> {
    let base = match target {
        Value::Null => Map::new(),
        Value::Object(m) => m.clone(),
        other => return Err(record_err(ConvertError::UnsupportedObjectType { found: type_name(other) })),
    };
    let obj = build_resource(entity, base).map_err(record_err)?;
    debug!(grn = ?entity.grn, version = %entity.version, "entity -> resource");
    counter!("convert_to_resource_total", 1u64);
    *target = Value::Object(obj);
    Ok(())
}

/// Convenience wrapper building a fresh object.
pub fn entity_to_value(entity: &Entity) -> Result<Value> {
    let mut v = Value::Null;
    entity_to_resource(entity, &mut v)?;
    Ok(v)
}

fn build_entity(key: &str, obj: &Map<String, Value>) -> Result<Entity> {
    let kind = match obj.get("kind") {
        None | Some(Value::Null) => "",
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            return Err(ConvertError::MalformedMetadata {
                detail: format!("kind: expected a string, found {}", type_name(other)),
            })
        }
    };
    let grn = Grn::from_key_str(key, kind)?;

    let raw_meta = obj.get("metadata");
    let meta = match raw_meta {
        None | Some(Value::Null) => ObjectMeta::default(),
        Some(v) => {
            check_metadata(v)?;
            ObjectMeta::deserialize(v)
                .map_err(|e| ConvertError::MalformedMetadata { detail: format!("metadata: {}", e) })?
        }
    };
    let ext = ExtendedFields::decode(meta.annotations.as_ref().unwrap_or(&BTreeMap::new()))?;

    Ok(Entity {
        grn: Some(grn),
        name: meta.name.unwrap_or_default(),
        guid: meta.uid.unwrap_or_default(),
        version: meta.resource_version.unwrap_or_default(),
        created_at: meta.creation_timestamp.map(|t| t.0.timestamp_millis()).unwrap_or(0),
        updated_at: ext.updated_at,
        created_by: ext.created_by,
        updated_by: ext.updated_by,
        folder: ext.folder,
        slug: ext.slug,
        labels: meta.labels.unwrap_or_default(),
        origin: ext.origin,
        meta: encode_payload(raw_meta, Payload::Metadata)?,
        body: encode_payload(obj.get("spec"), Payload::Body)?,
        status: encode_payload(obj.get("status"), Payload::Status)?,
    })
}

/// Convert a generic object stored under `key` into an entity record.
///
/// The GRN's kind is the object's `kind` verbatim (possibly empty); the
/// tenant comes from the key's namespace, not from `metadata.namespace`.
pub fn resource_to_entity(key: &str, source: &Value) -> Result<Entity> {
    let obj = source
        .as_object()
        .ok_or_else(|| record_err(ConvertError::UnsupportedObjectType { found: type_name(source) }))?;
    let entity = build_entity(key, obj).map_err(record_err)?;
    debug!(key, grn = ?entity.grn, name = %entity.name, "resource -> entity");
    counter!("convert_to_entity_total", 1u64);
    Ok(entity)
}

fn record_err(e: ConvertError) -> ConvertError {
    counter!("convert_err_total", 1u64, "kind" => e.kind());
    debug!(error = %e, "conversion failed");
    e
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_payload_treats_null_as_absent() {
        assert!(decode_payload(b"", Payload::Body).unwrap().is_none());
        assert!(decode_payload(b"null", Payload::Body).unwrap().is_none());
        assert!(decode_payload(b"{}", Payload::Body).unwrap().is_some());
    }

    #[test]
    fn decode_payload_names_the_stage() {
        assert!(matches!(decode_payload(b"{", Payload::Metadata), Err(ConvertError::MalformedMetadata { .. })));
        assert!(matches!(decode_payload(b"[1]", Payload::Body), Err(ConvertError::MalformedBody { .. })));
        assert!(matches!(decode_payload(b"\"x\"", Payload::Status), Err(ConvertError::MalformedStatus { .. })));
    }

    #[test]
    fn set_or_remove_drops_empty_values() {
        let mut m = Map::new();
        m.insert("uid".into(), Value::String("old".into()));
        set_or_remove(&mut m, "uid", "");
        assert!(!m.contains_key("uid"));
        set_or_remove(&mut m, "uid", "new");
        assert_eq!(m["uid"], "new");
    }
}
