use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Not connected to any process")]
    NotConnected,

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Main module not found")]
    ModuleNotFound,

    #[error("Device initialization failed: {0}")]
    DeviceInitFailure(String),

    #[error("Unknown target class: {0}")]
    UnknownTargetClass(String),

    #[error("Task failed: {0}")]
    TaskFault(String),

    #[error("Invalid offset line: {0}")]
    InvalidOffsetLine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(err.is_not_found());

        let other_io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err2 = Error::Io(other_io_err);
        assert!(!err2.is_not_found());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::InvalidPattern("token 'GG'".to_string()).to_string(),
            "Invalid pattern: token 'GG'"
        );
        assert_eq!(Error::NotConnected.to_string(), "Not connected to any process");
        assert_eq!(
            Error::UnknownTargetClass("GEngine".to_string()).to_string(),
            "Unknown target class: GEngine"
        );
    }
}
