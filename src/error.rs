use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Join parse error: {0}")]
    JoinParse(String),

    #[error("Validator error: {0}")]
    Validator(String),

    #[error("Validator timed out after {0} ms")]
    ValidatorTimeout(u64),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Concept catalog error: {0}")]
    Catalog(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ResolutionError {
    /// Stable, machine-readable name of the error category
    pub fn kind(&self) -> &'static str {
        match self {
            ResolutionError::UpstreamUnavailable(_) => "upstream_unavailable",
            ResolutionError::JoinParse(_) => "join_parse_error",
            ResolutionError::Validator(_) => "validator_error",
            ResolutionError::ValidatorTimeout(_) => "validator_timeout",
            ResolutionError::CacheUnavailable(_) => "cache_unavailable",
            ResolutionError::InvalidInput(_) => "invalid_input",
            ResolutionError::Config(_) => "config_error",
            ResolutionError::Catalog(_) => "catalog_error",
            ResolutionError::Io(_) => "io_error",
            ResolutionError::Json(_) => "json_error",
            ResolutionError::Yaml(_) => "yaml_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ResolutionError>;

/// Serializable error payload carried by a failed stage response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
}

impl From<&ResolutionError> for ErrorInfo {
    fn from(err: &ResolutionError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Structured `{success, error, data}` envelope returned by every pipeline stage.
///
/// Stage failures never cross the pipeline boundary as `Err`; they are folded
/// into `success = false` with the error payload attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResponse<T> {
    pub success: bool,
    pub error: Option<ErrorInfo>,
    pub data: Option<T>,
}

impl<T> StageResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn failed(err: &ResolutionError) -> Self {
        Self {
            success: false,
            error: Some(ErrorInfo::from(err)),
            data: None,
        }
    }

    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failed(&e),
        }
    }

    pub fn into_result(self) -> std::result::Result<T, ErrorInfo> {
        match (self.data, self.error) {
            (Some(data), _) => Ok(data),
            (None, Some(err)) => Err(err),
            (None, None) => Err(ErrorInfo {
                kind: "empty_response".to_string(),
                message: "stage produced neither data nor error".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_response_failure_carries_kind() {
        let err = ResolutionError::UpstreamUnavailable("search index offline".to_string());
        let response: StageResponse<Vec<String>> = StageResponse::failed(&err);

        assert!(!response.success);
        assert!(response.data.is_none());
        let info = response.error.unwrap();
        assert_eq!(info.kind, "upstream_unavailable");
        assert!(info.message.contains("search index offline"));
    }

    #[test]
    fn test_stage_response_serializes_envelope() {
        let response = StageResponse::ok(vec!["users".to_string()]);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["success"], true);
        assert!(json["error"].is_null());
        assert_eq!(json["data"][0], "users");
    }
}
