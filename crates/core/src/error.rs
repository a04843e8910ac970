use std::num::ParseIntError;

/// Failure of a single key, conversion or principal operation.
///
/// Every variant names the sub-field or stage that failed. None of them are
/// retried here; the caller's request handling decides what to do.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("invalid key (expecting 4 parts): {key:?}")]
    MalformedKey { key: String },
    #[error("invalid namespace {namespace:?}: {reason}")]
    InvalidNamespace { namespace: String, reason: &'static str },
    #[error("invalid entity, missing GRN")]
    MissingIdentity,
    #[error("unsupported object type: expected a JSON object, found {found}")]
    UnsupportedObjectType { found: &'static str },
    #[error("malformed metadata: {detail}")]
    MalformedMetadata { detail: String },
    #[error("malformed body: {detail}")]
    MalformedBody { detail: String },
    #[error("malformed status: {detail}")]
    MalformedStatus { detail: String },
    #[error("malformed timestamp in {field}: {value:?} ({detail})")]
    MalformedTimestamp { field: String, value: String, detail: String },
    #[error("could not find user info in request context")]
    MissingAuthContext,
    #[error("couldn't determine {key} from extras map: {value:?}")]
    InvalidPrincipalExtra {
        key: String,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

impl ConvertError {
    /// Short stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertError::MalformedKey { .. } => "malformed_key",
            ConvertError::InvalidNamespace { .. } => "invalid_namespace",
            ConvertError::MissingIdentity => "missing_identity",
            ConvertError::UnsupportedObjectType { .. } => "unsupported_object_type",
            ConvertError::MalformedMetadata { .. } => "malformed_metadata",
            ConvertError::MalformedBody { .. } => "malformed_body",
            ConvertError::MalformedStatus { .. } => "malformed_status",
            ConvertError::MalformedTimestamp { .. } => "malformed_timestamp",
            ConvertError::MissingAuthContext => "missing_auth_context",
            ConvertError::InvalidPrincipalExtra { .. } => "invalid_principal_extra",
        }
    }
}
