use std::fmt;

/// Main error type for devicelab
#[derive(Debug)]
pub enum Error {
    /// Configuration errors
    Config(String),

    /// Validation errors (bad submission payload)
    Validation(String),

    /// Unknown job ID
    NotFound(String),

    /// Illegal lifecycle transition (cancel terminal, retry non-retriable)
    InvalidState(String),

    /// Backing store I/O errors
    Store(crate::store::StoreError),

    /// Serialization errors
    Serialization(serde_json::Error),

    /// Uncategorized errors
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Validation(msg) => write!(f, "Validation error: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::Store(e) => write!(f, "Store error: {}", e),
            Error::Serialization(e) => write!(f, "Serialization error: {}", e),
            Error::Internal(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => Some(e),
            Error::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

// Conversions from external error types
impl From<crate::store::StoreError> for Error {
    fn from(error: crate::store::StoreError) -> Self {
        Error::Store(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error.to_string())
    }
}

// Common error constructors
impl Error {
    /// Create a new configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new validation error
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state<T: Into<String>>(msg: T) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Create a new internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        Error::Internal(msg.into())
    }
}

impl Error {
    /// Get HTTP status code for error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::InvalidState(_) => 409,
            Error::Store(_) => 503,
            Error::Serialization(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Get error category for monitoring
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::InvalidState(_) => "invalid_state",
            Error::Store(_) => "store",
            Error::Serialization(_) => "serialization",
            Error::Internal(_) => "internal",
        }
    }
}
