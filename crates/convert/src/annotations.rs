//! Reserved annotations carrying entity fields the object model has no slot for.
//!
//! All keys live under [`ANNOTATION_PREFIX`]. `ExtendedFields::encode` and
//! `ExtendedFields::decode` are the only places that touch them.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use tessera_core::{ConvertError, Entity, EntityOrigin, Result};

pub const ANNOTATION_PREFIX: &str = "grafana.com/";

pub const FOLDER: &str = "grafana.com/folder";
pub const CREATED_BY: &str = "grafana.com/createdBy";
pub const UPDATED_BY: &str = "grafana.com/updatedBy";
pub const UPDATED_TIMESTAMP: &str = "grafana.com/updatedTimestamp";
pub const SLUG: &str = "grafana.com/slug";
pub const ORIGIN_NAME: &str = "grafana.com/originName";
pub const ORIGIN_KEY: &str = "grafana.com/originKey";
pub const ORIGIN_TIME: &str = "grafana.com/originTime";
pub const ORIGIN_PATH: &str = "grafana.com/originPath";

/// Every reserved key, in the order they are written.
pub const RESERVED_KEYS: [&str; 9] = [
    FOLDER,
    CREATED_BY,
    UPDATED_BY,
    UPDATED_TIMESTAMP,
    SLUG,
    ORIGIN_NAME,
    ORIGIN_KEY,
    ORIGIN_TIME,
    ORIGIN_PATH,
];

/// Entity fields that travel through annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedFields {
    pub folder: String,
    pub created_by: String,
    pub updated_by: String,
    /// Epoch milliseconds; zero means "never updated" and is not written.
    pub updated_at: i64,
    pub slug: String,
    pub origin: Option<EntityOrigin>,
}

impl ExtendedFields {
    pub fn from_entity(entity: &Entity) -> Self {
        Self {
            folder: entity.folder.clone(),
            created_by: entity.created_by.clone(),
            updated_by: entity.updated_by.clone(),
            updated_at: entity.updated_at,
            slug: entity.slug.clone(),
            origin: entity.origin.clone(),
        }
    }

    /// Merge into `annotations`, leaving unrelated keys untouched. Every
    /// reserved key is owned here: one whose field is empty is removed, so a
    /// stale value already present in `annotations` never survives.
    pub fn encode(&self, annotations: &mut BTreeMap<String, String>) -> Result<()> {
        set_non_empty(annotations, FOLDER, &self.folder);
        set_non_empty(annotations, CREATED_BY, &self.created_by);
        set_non_empty(annotations, UPDATED_BY, &self.updated_by);
        if self.updated_at != 0 {
            annotations.insert(UPDATED_TIMESTAMP.to_string(), format_millis(UPDATED_TIMESTAMP, self.updated_at)?);
        } else {
            annotations.remove(UPDATED_TIMESTAMP);
        }
        annotations.insert(SLUG.to_string(), self.slug.clone());
        match &self.origin {
            Some(origin) => {
                annotations.insert(ORIGIN_NAME.to_string(), origin.source.clone());
                annotations.insert(ORIGIN_KEY.to_string(), origin.key.clone());
                annotations.insert(ORIGIN_TIME.to_string(), format_millis(ORIGIN_TIME, origin.time)?);
            }
            None => {
                for key in [ORIGIN_NAME, ORIGIN_KEY, ORIGIN_TIME] {
                    annotations.remove(key);
                }
            }
        }
        // origin path is not tracked on entities
        annotations.insert(ORIGIN_PATH.to_string(), String::new());
        Ok(())
    }

    /// Read the reserved keys back. The origin is always present; its time
    /// stays zero unless `originTime` carries a value.
    pub fn decode(annotations: &BTreeMap<String, String>) -> Result<Self> {
        let get = |k: &str| annotations.get(k).cloned().unwrap_or_default();
        let updated_at = match annotations.get(UPDATED_TIMESTAMP) {
            Some(v) if !v.is_empty() => parse_millis(UPDATED_TIMESTAMP, v)?,
            _ => 0,
        };
        let origin_time = match annotations.get(ORIGIN_TIME) {
            Some(v) if !v.is_empty() => parse_millis(ORIGIN_TIME, v)?,
            _ => 0,
        };
        Ok(Self {
            folder: get(FOLDER),
            created_by: get(CREATED_BY),
            updated_by: get(UPDATED_BY),
            updated_at,
            slug: get(SLUG),
            origin: Some(EntityOrigin { source: get(ORIGIN_NAME), key: get(ORIGIN_KEY), time: origin_time }),
        })
    }
}

fn set_non_empty(annotations: &mut BTreeMap<String, String>, key: &str, value: &str) {
    if value.is_empty() {
        annotations.remove(key);
    } else {
        annotations.insert(key.to_string(), value.to_string());
    }
}

/// RFC3339 in UTC. Sub-second digits are only emitted when the value has them,
/// so whole-second timestamps keep the plain `2018-03-15T13:00:00Z` form.
pub fn format_millis(field: &str, millis: i64) -> Result<String> {
    let dt = Utc.timestamp_millis_opt(millis).single().ok_or_else(|| ConvertError::MalformedTimestamp {
        field: field.to_string(),
        value: millis.to_string(),
        detail: "epoch milliseconds out of range".to_string(),
    })?;
    Ok(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

pub fn parse_millis(field: &str, value: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| ConvertError::MalformedTimestamp {
            field: field.to_string(),
            value: value.to_string(),
            detail: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_skips_empty_audit_fields_but_keeps_slug_and_path() {
        let mut annos = BTreeMap::new();
        ExtendedFields::default().encode(&mut annos).unwrap();
        assert_eq!(annos.len(), 2);
        assert_eq!(annos.get(SLUG).map(String::as_str), Some(""));
        assert_eq!(annos.get(ORIGIN_PATH).map(String::as_str), Some(""));
    }

    #[test]
    fn encode_clears_stale_reserved_keys() {
        let mut annos: BTreeMap<String, String> = RESERVED_KEYS
            .iter()
            .map(|k| (k.to_string(), "2020-01-01T00:00:00Z".to_string()))
            .collect();
        annos.insert("example.com/owner".to_string(), "team-a".to_string());
        ExtendedFields::default().encode(&mut annos).unwrap();
        assert_eq!(
            annos.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["example.com/owner", ORIGIN_PATH, SLUG]
        );
        assert_eq!(ExtendedFields::decode(&annos).unwrap(), ExtendedFields {
            origin: Some(EntityOrigin::default()),
            ..Default::default()
        });
    }

    #[test]
    fn encode_preserves_foreign_annotations() {
        let mut annos = BTreeMap::from([("example.com/owner".to_string(), "team-a".to_string())]);
        let ext = ExtendedFields { folder: "f1".into(), ..Default::default() };
        ext.encode(&mut annos).unwrap();
        assert_eq!(annos.get("example.com/owner").map(String::as_str), Some("team-a"));
        assert_eq!(annos.get(FOLDER).map(String::as_str), Some("f1"));
    }

    #[test]
    fn decode_is_inverse_of_encode() {
        let ext = ExtendedFields {
            folder: "general".into(),
            created_by: "user:1".into(),
            updated_by: "user:2".into(),
            updated_at: 1_521_118_800_123,
            slug: "my-dash".into(),
            origin: Some(EntityOrigin { source: "git".into(), key: "abc".into(), time: 1_521_118_800_000 }),
        };
        let mut annos = BTreeMap::new();
        ext.encode(&mut annos).unwrap();
        assert_eq!(annos.get(UPDATED_TIMESTAMP).map(String::as_str), Some("2018-03-15T13:00:00.123Z"));
        assert_eq!(annos.get(ORIGIN_TIME).map(String::as_str), Some("2018-03-15T13:00:00Z"));
        assert_eq!(ExtendedFields::decode(&annos).unwrap(), ext);
    }

    #[test]
    fn decode_rejects_bad_timestamps() {
        let annos = BTreeMap::from([(UPDATED_TIMESTAMP.to_string(), "yesterday".to_string())]);
        match ExtendedFields::decode(&annos).unwrap_err() {
            ConvertError::MalformedTimestamp { field, value, .. } => {
                assert_eq!(field, UPDATED_TIMESTAMP);
                assert_eq!(value, "yesterday");
            }
            other => panic!("unexpected error: {other}"),
        }
        let annos = BTreeMap::from([(ORIGIN_TIME.to_string(), "2020-13-01T00:00:00Z".to_string())]);
        assert!(matches!(ExtendedFields::decode(&annos), Err(ConvertError::MalformedTimestamp { .. })));
    }

    #[test]
    fn decode_without_annotations_yields_empty_origin() {
        let ext = ExtendedFields::decode(&BTreeMap::new()).unwrap();
        assert_eq!(ext.origin, Some(EntityOrigin::default()));
        assert_eq!(ext.updated_at, 0);
    }

    #[test]
    fn reserved_keys_share_prefix() {
        assert!(RESERVED_KEYS.iter().all(|k| k.starts_with(ANNOTATION_PREFIX)));
    }
}
