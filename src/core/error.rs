use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollatorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Buffer capacity must be a non-zero power of two, got {0}")]
    InvalidCapacity(usize),

    #[error("Channel is closed")]
    ChannelClosed,

    #[error("Client is closed")]
    ClientClosed,

    #[error("No Tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unsuccessful request: response status: {status}, error: {body:?}")]
    HttpStatus { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Annotation must have name")]
    MissingAnnotationName,

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for collator operations
pub type Result<T> = std::result::Result<T, CollatorError>;

impl CollatorError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a new parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Returns true if a later attempt of the same operation could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Http(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::InvalidCapacity(_) => "config",
            Self::ChannelClosed | Self::ClientClosed => "closed",
            Self::NoRuntime(_) | Self::Join(_) => "async",
            Self::Transport(_) | Self::HttpStatus { .. } | Self::Http(_) => "transport",
            Self::MissingAnnotationName => "validation",
            Self::Parse { .. } | Self::Serialization(_) | Self::Yaml(_) => "serialization",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CollatorError::transport("connection reset");
        assert_eq!(err.to_string(), "Transport error: connection reset");
        assert_eq!(err.category(), "transport");
    }

    #[test]
    fn test_error_recoverability() {
        assert!(CollatorError::transport("connection failed").is_recoverable());
        assert!(!CollatorError::config("invalid config").is_recoverable());
        assert!(!CollatorError::ChannelClosed.is_recoverable());
        assert!(CollatorError::HttpStatus {
            status: 503,
            body: String::new()
        }
        .is_recoverable());
        assert!(!CollatorError::HttpStatus {
            status: 413,
            body: String::new()
        }
        .is_recoverable());
    }

    #[test]
    fn test_http_status_message() {
        let err = CollatorError::HttpStatus {
            status: 400,
            body: "bad gauge".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unsuccessful request: response status: 400, error: \"bad gauge\""
        );
    }

    #[test]
    fn test_invalid_capacity_category() {
        let err = CollatorError::InvalidCapacity(3);
        assert_eq!(err.category(), "config");
        assert!(err.to_string().contains("power of two"));
    }
}
