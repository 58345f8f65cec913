use std::fmt;

/// Central error types for the sync engine
#[derive(Debug)]
pub enum AppError {
    /// Database error (rusqlite)
    Database(rusqlite::Error),
    /// Filesystem error
    Filesystem(std::io::Error),
    /// Stored or received JSON could not be (de)serialized
    Serialization(serde_json::Error),
    /// Configuration file could not be read or is invalid
    Config(String),
    /// Validation error (e.g. a bundle missing its uuid)
    Validation(String),
    /// Resource not found
    NotFound(String),
    /// No response was received (offline, DNS, timeout)
    Transport(String),
    /// The remote rejected our credential, or none is held
    Auth(String),
    /// Unexpected method/URL combination or missing staged data; a code defect
    Programmer(String),
    /// General error
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Database(e) => write!(f, "Database error: {}", e),
            AppError::Filesystem(e) => write!(f, "Filesystem error: {}", e),
            AppError::Serialization(e) => write!(f, "Serialization error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Transport(msg) => write!(f, "Transport error: {}", msg),
            AppError::Auth(msg) => write!(f, "Auth error: {}", msg),
            AppError::Programmer(msg) => write!(f, "Programmer error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AppError {}

// Conversions from other error types
impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Database(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Filesystem(e)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e)
    }
}

impl From<toml::de::Error> for AppError {
    fn from(e: toml::de::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(e: toml::ser::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl AppError {
    /// Transport and auth failures leave the queue intact and should be
    /// retried by the scheduler. Everything else is handled or is a defect.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transport(_) | AppError::Auth(_))
    }

    /// User-friendly error message for the UI
    pub fn user_message(&self) -> String {
        match self {
            AppError::Database(_) => "A database error occurred. Please try again.".to_string(),
            AppError::Filesystem(_) => {
                "Error accessing files. Please check app permissions.".to_string()
            }
            AppError::Serialization(_) => "Stored data could not be read.".to_string(),
            AppError::Config(msg) => format!("Invalid configuration: {}", msg),
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(msg) => format!("{} was not found.", msg),
            AppError::Transport(_) => {
                "You appear to be offline. Changes will be uploaded later.".to_string()
            }
            AppError::Auth(_) => "Please log in again to upload your changes.".to_string(),
            AppError::Programmer(_) => "An internal error occurred.".to_string(),
            AppError::Other(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(AppError::Transport("offline".to_string()).is_retryable());
        assert!(AppError::Auth("401".to_string()).is_retryable());
        assert!(!AppError::Programmer("bad url".to_string()).is_retryable());
        assert!(!AppError::Validation("no uuid".to_string()).is_retryable());
    }

    #[test]
    fn test_display_prefix() {
        let e = AppError::NotFound("record 123A".to_string());
        assert_eq!(e.to_string(), "Not found: record 123A");
        assert_eq!(e.user_message(), "record 123A was not found.");
    }
}
