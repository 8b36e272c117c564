//! Error types for catalog, registry, conversion and negotiation

use thiserror::Error;

/// Result type for hub/spoke operations
pub type Result<T> = std::result::Result<T, HubError>;

/// Errors raised across the hub/spoke pipeline.
///
/// Configuration and generation errors are fatal for the pipeline that
/// produced them. Request errors are recoverable and carry enough detail to
/// fix the request.
#[derive(Error, Debug)]
pub enum HubError {
    #[error("invalid API configuration at {context}: {reason}")]
    Config { context: String, reason: String },

    #[error("type '{type_name}' not found in catalog package '{package}'; must be declared via an explicit import{hint}")]
    CatalogLookup {
        package: String,
        type_name: String,
        hint: String,
    },

    #[error("cannot generate conversion for {gvk}: {reason}")]
    ConversionGeneration { gvk: String, reason: String },

    #[error("unsupported API version '{requested}' for group '{group}'")]
    RequestVersion { group: String, requested: String },

    #[error("request body does not match {api_version} {kind}: {reason}")]
    RequestDecode {
        api_version: String,
        kind: String,
        reason: String,
    },

    #[error("conversion failed for {gvk}: {reason}")]
    RuntimeConversion { gvk: String, reason: String },

    #[error("{kind} '{uid}' not found")]
    NotFound { kind: String, uid: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("Invalid module tag: {0}")]
    InvalidModuleTag(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),
}

impl HubError {
    /// Build a configuration error scoped to one API group.
    pub fn group_config(index: usize, name: &str, reason: impl Into<String>) -> Self {
        HubError::Config {
            context: format!("groups[{}] '{}'", index, name),
            reason: reason.into(),
        }
    }

    /// Whether the caller can fix this error by changing the request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            HubError::RequestVersion { .. } | HubError::RequestDecode { .. } | HubError::NotFound { .. }
        )
    }

    /// HTTP status the negotiation layer reports for this error
    pub fn status_code(&self) -> u16 {
        match self {
            HubError::RequestVersion { .. } | HubError::RequestDecode { .. } => 400,
            HubError::NotFound { .. } => 404,
            HubError::Cancelled => 499,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_errors_are_client_errors() {
        let err = HubError::RequestVersion {
            group: "infra.example.io".to_string(),
            requested: "v9".to_string(),
        };
        assert!(err.is_client_error());
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_runtime_conversion_is_server_error() {
        let err = HubError::RuntimeConversion {
            gvk: "infra.example.io/v1/Device".to_string(),
            reason: "spec is not an object".to_string(),
        };
        assert!(!err.is_client_error());
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_group_config_names_group() {
        let err = HubError::group_config(2, "infra.example.io", "storageVersion is empty");
        let msg = err.to_string();
        assert!(msg.contains("groups[2]"));
        assert!(msg.contains("infra.example.io"));
    }
}
