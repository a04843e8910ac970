//! Tessera auth: the internal principal store operations run under.
//!
//! The principal is synthesized from the inbound authentication context
//! (`UserInfo`) and the namespace the request targets. Nothing here checks
//! that the caller is entitled to that tenant; the caller's authorization
//! layer must do that before touching the store.

#![forbid(unsafe_code)]

use k8s_openapi::api::authentication::v1::UserInfo;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tessera_core::{tenant_from_namespace, ConvertError, Result, TenantId, DEFAULT_TENANT};
use tracing::{debug, warn};

/// Well-known name of the service-to-service identity.
pub const SERVICE_IDENTITY: &str = "system:apiserver";
pub const EXTRA_USER_ID: &str = "user-id";
pub const EXTRA_ORG_ID: &str = "org-id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: i64,
    /// Same value space as [`TenantId`].
    pub org_id: TenantId,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalConfig {
    pub service_identity: String,
}

impl Default for PrincipalConfig {
    fn default() -> Self {
        Self { service_identity: SERVICE_IDENTITY.to_string() }
    }
}

impl PrincipalConfig {
    /// `TESSERA_SERVICE_IDENTITY` overrides the service identity name.
    pub fn from_env() -> Self {
        let service_identity = std::env::var("TESSERA_SERVICE_IDENTITY")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| SERVICE_IDENTITY.to_string());
        Self { service_identity }
    }
}

fn extra_id(user: &UserInfo, key: &str) -> Result<Option<i64>> {
    let Some(first) = user.extra.as_ref().and_then(|m| m.get(key)).and_then(|v| v.first()) else {
        return Ok(None);
    };
    first.parse::<i64>().map(Some).map_err(|source| ConvertError::InvalidPrincipalExtra {
        key: key.to_string(),
        value: first.clone(),
        source,
    })
}

/// Build the principal for one request.
pub fn synthesize(user: Option<&UserInfo>, requested_namespace: &str, cfg: &PrincipalConfig) -> Result<Principal> {
    let user = user.ok_or(ConvertError::MissingAuthContext)?;
    let mut p = Principal {
        user_id: -1,
        org_id: -1,
        display_name: user.username.clone().unwrap_or_default(),
    };
    if p.display_name == cfg.service_identity {
        p.user_id = 1;
        p.org_id = DEFAULT_TENANT;
    }
    if let Some(id) = extra_id(user, EXTRA_USER_ID)? {
        p.user_id = id;
    }
    if let Some(id) = extra_id(user, EXTRA_ORG_ID)? {
        p.org_id = id;
    }

    if p.user_id < 0 || p.org_id < 0 {
        // Aggregated identity with nothing to map it to; run as the default user.
        warn!(user = %p.display_name, user_id = p.user_id, org_id = p.org_id, "incomplete identity, falling back to user 1 / org 1");
        counter!("principal_fallback_total", 1u64);
        p.user_id = 1;
        p.org_id = DEFAULT_TENANT;
    }

    if !requested_namespace.is_empty() {
        p.org_id = tenant_from_namespace(requested_namespace)?;
    }
    debug!(user = %p.display_name, user_id = p.user_id, org_id = p.org_id, "principal synthesized");
    Ok(p)
}

/// Request-scoped values passed explicitly down the call chain.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    user: Option<UserInfo>,
    namespace: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self { Self::default() }

    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn user(&self) -> Option<&UserInfo> { self.user.as_ref() }

    pub fn namespace(&self) -> Option<&str> { self.namespace.as_deref() }

    pub fn principal(&self, cfg: &PrincipalConfig) -> Result<Principal> {
        synthesize(self.user(), self.namespace().unwrap_or(""), cfg)
    }
}

/// Convenience constructor for a `UserInfo` with a name and extras.
pub fn user_info<'a>(name: &str, extras: impl IntoIterator<Item = (&'a str, &'a str)>) -> UserInfo {
    let mut extra = std::collections::BTreeMap::<String, Vec<String>>::new();
    for (k, v) in extras {
        extra.entry(k.to_string()).or_default().push(v.to_string());
    }
    UserInfo {
        username: Some(name.to_string()),
        extra: if extra.is_empty() { None } else { Some(extra) },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PrincipalConfig { PrincipalConfig::default() }

    #[test]
    fn missing_user_is_an_error() {
        assert!(matches!(synthesize(None, "", &cfg()), Err(ConvertError::MissingAuthContext)));
    }

    #[test]
    fn service_identity_maps_to_user_and_org_one() {
        let p = synthesize(Some(&user_info("system:apiserver", [])), "", &cfg()).unwrap();
        assert_eq!(p, Principal { user_id: 1, org_id: 1, display_name: "system:apiserver".into() });
    }

    #[test]
    fn extras_override_ids() {
        let u = user_info("alice", [("user-id", "7"), ("org-id", "3")]);
        let p = synthesize(Some(&u), "", &cfg()).unwrap();
        assert_eq!((p.user_id, p.org_id), (7, 3));
    }

    #[test]
    fn only_first_extra_value_counts() {
        let u = user_info("alice", [("user-id", "7"), ("user-id", "oops"), ("org-id", "3")]);
        let p = synthesize(Some(&u), "", &cfg()).unwrap();
        assert_eq!(p.user_id, 7);
    }

    #[test]
    fn namespace_overrides_extras() {
        let u = user_info("alice", [("user-id", "7"), ("org-id", "3")]);
        let p = synthesize(Some(&u), "tenant-9", &cfg()).unwrap();
        assert_eq!((p.user_id, p.org_id), (7, 9));
        let p = synthesize(Some(&u), "default", &cfg()).unwrap();
        assert_eq!(p.org_id, 1);
    }

    #[test]
    fn bad_namespace_propagates() {
        let u = user_info("alice", [("user-id", "7"), ("org-id", "3")]);
        assert!(matches!(synthesize(Some(&u), "team-9", &cfg()), Err(ConvertError::InvalidNamespace { .. })));
    }

    #[test]
    fn non_integer_extra_is_an_error() {
        let u = user_info("alice", [("org-id", "three")]);
        match synthesize(Some(&u), "", &cfg()).unwrap_err() {
            ConvertError::InvalidPrincipalExtra { key, value, .. } => {
                assert_eq!(key, "org-id");
                assert_eq!(value, "three");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn partial_identity_falls_back_to_one() {
        // only a user id: org stays negative, so both are forced to 1
        let u = user_info("bob", [("user-id", "12")]);
        let p = synthesize(Some(&u), "", &cfg()).unwrap();
        assert_eq!((p.user_id, p.org_id), (1, 1));

        let p = synthesize(Some(&user_info("bob", [])), "", &cfg()).unwrap();
        assert_eq!((p.user_id, p.org_id), (1, 1));
        assert_eq!(p.display_name, "bob");
    }

    #[test]
    fn empty_extra_list_is_ignored() {
        let mut u = user_info("alice", [("org-id", "4")]);
        u.extra.as_mut().unwrap().insert("user-id".into(), Vec::new());
        let p = synthesize(Some(&u), "", &cfg()).unwrap();
        assert_eq!((p.user_id, p.org_id), (1, 1));
    }

    #[test]
    fn custom_service_identity() {
        let cfg = PrincipalConfig { service_identity: "svc:gateway".into() };
        let p = synthesize(Some(&user_info("svc:gateway", [])), "", &cfg).unwrap();
        assert_eq!((p.user_id, p.org_id), (1, 1));
    }

    #[test]
    fn request_context_carries_user_and_namespace() {
        let ctx = RequestContext::new()
            .with_user(user_info("alice", [("user-id", "7"), ("org-id", "3")]))
            .with_namespace("org-5");
        assert_eq!(ctx.namespace(), Some("org-5"));
        assert_eq!(ctx.principal(&cfg()).unwrap().org_id, 5);
        assert!(matches!(RequestContext::new().principal(&cfg()), Err(ConvertError::MissingAuthContext)));
    }
}
