use axum::http::StatusCode;

/// Server-wide result type.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Top-level error type for sibyl-server.
///
/// Covers transport, startup, and configuration failures. Business
/// failures inside a resolution turn are not errors at this level — the
/// `/ask` contract reports them in a 200 payload with a `source` tag.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("catalog error: {0}")]
    Catalog(#[from] sibyl_core::catalog::CatalogError),
    #[error("collaborator error: {0}")]
    Agent(#[from] sibyl_core::agents::AgentError),
    #[error("llm client error: {0}")]
    Llm(#[from] sibyl_agents::llm::LlmError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Map error to HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidConfig(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Catalog(_) | Self::Agent(_) | Self::Llm(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Map error to a stable error code for clients.
    pub fn error_code(&self) -> String {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG".to_string(),
            Self::BadRequest(_) => "INVALID_REQUEST".to_string(),
            Self::NotFound(_) => "NOT_FOUND".to_string(),
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE".to_string(),
            Self::Catalog(_) | Self::Agent(_) | Self::Llm(_) | Self::Io(_) | Self::Internal(_) => {
                "INTERNAL".to_string()
            }
        }
    }
}
