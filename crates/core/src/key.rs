//! Compound resource keys: `/<group>/<kind plural lowercase>/<namespace>/<name>`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{tenant_from_namespace, ConvertError, Grn, Result, TenantId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self { group: group.into(), kind: kind.into(), namespace: namespace.into(), name: name.into() }
    }

    /// Parse a key. Exactly four non-empty segments must follow the leading `/`.
    pub fn parse(key: &str) -> Result<Self> {
        let parts: Vec<&str> = key.split('/').collect();
        match parts.as_slice() {
            ["", group, kind, namespace, name]
                if !group.is_empty() && !kind.is_empty() && !namespace.is_empty() && !name.is_empty() =>
            {
                Ok(Self::new(*group, *kind, *namespace, *name))
            }
            _ => Err(ConvertError::MalformedKey { key: key.to_string() }),
        }
    }

    /// Tenant owning this key's namespace.
    pub fn tenant_id(&self) -> Result<TenantId> {
        tenant_from_namespace(&self.namespace)
    }

    /// Store identity for this key. `kind` is the object's type name, which is
    /// not necessarily the plural lowercase form carried in the key itself.
    pub fn to_grn(&self, kind: &str) -> Result<Grn> {
        Ok(Grn {
            resource_kind: kind.to_string(),
            resource_identifier: self.name.clone(),
            tenant_id: self.tenant_id()?,
        })
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}/{}/{}", self.group, self.kind, self.namespace, self.name)
    }
}

impl FromStr for ResourceKey {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_segments() {
        let k = ResourceKey::parse("/playlist.grafana.app/playlists/org-3/abc").unwrap();
        assert_eq!(k, ResourceKey::new("playlist.grafana.app", "playlists", "org-3", "abc"));
        assert_eq!(k.tenant_id().unwrap(), 3);
    }

    #[test]
    fn parse_rejects_wrong_shape() {
        for key in [
            "",
            "/",
            "/a/b/c",
            "/a/b/c/d/e",
            "a/b/c/d/e",
            "//b/c/d",
            "/a/b/c/",
            "/a//c/d",
        ] {
            assert!(matches!(ResourceKey::parse(key), Err(ConvertError::MalformedKey { .. })), "{key:?}");
        }
    }
}
