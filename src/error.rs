use std::io;
use thiserror::Error;

/// Diagnostic attached to a `Data == false` reply. The dashboard answers this
/// way when the credentials or the request itself were rejected.
pub const AUTH_OR_REQUEST_MESSAGE: &str =
    "The request was rejected by the server. Check the credentials and the host in your configuration.";

/// Error type for the Statwolf client
#[derive(Debug, Error)]
pub enum StatwolfError {
    /// The client configuration lacks a mandatory parameter
    #[error("Invalid config: the following parameters are mandatory.\n* host\n* username\n* password ({0})")]
    InvalidConfig(String),

    /// A query definition refers to something that does not exist
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The server replied with the `false` sentinel
    #[error("Authentication or request error: {0}")]
    AuthenticationOrRequest(String),

    /// The server executed the query and reported an error
    #[error("Remote query error: {0}")]
    RemoteQuery(String),

    /// The reply does not have the expected shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Errors related to network operations
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Errors related to serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A pipeline definition names a stage that is not registered
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// A transform stage failed
    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    /// Errors related to IO operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl StatwolfError {
    /// Builds the error raised for a `Data == false` reply
    pub fn authentication_or_request() -> Self {
        StatwolfError::AuthenticationOrRequest(AUTH_OR_REQUEST_MESSAGE.to_string())
    }

    /// Builds a stage failure for use inside transform handlers
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        StatwolfError::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for StatwolfError {
    fn from(error: serde_json::Error) -> Self {
        StatwolfError::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for StatwolfError {
    fn from(error: toml::de::Error) -> Self {
        StatwolfError::Serialization(error.to_string())
    }
}

impl From<reqwest::Error> for StatwolfError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => StatwolfError::Http {
                status: status.as_u16(),
                message: error.to_string(),
            },
            None => StatwolfError::Network(error.to_string()),
        }
    }
}

/// Result type alias for operations that can result in a StatwolfError
pub type StatwolfResult<T> = Result<T, StatwolfError>;
