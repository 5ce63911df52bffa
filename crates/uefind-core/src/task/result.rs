use crate::error::Error;

/// Outcome of one queued operation, handed to its callback exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsyncResult<T> {
    pub is_complete: bool,
    pub is_success: bool,
    pub payload: T,
    pub error_message: String,
    pub log_message: String,
}

impl<T> AsyncResult<T> {
    pub fn success(payload: T, log_message: impl Into<String>) -> Self {
        Self {
            is_complete: true,
            is_success: true,
            payload,
            error_message: String::new(),
            log_message: log_message.into(),
        }
    }

    /// Completed but unsuccessful; `payload` is still delivered.
    pub fn failure(payload: T, error_message: impl Into<String>) -> Self {
        Self {
            is_complete: true,
            is_success: false,
            payload,
            error_message: error_message.into(),
            log_message: String::new(),
        }
    }

    pub fn with_log(mut self, log_message: impl Into<String>) -> Self {
        self.log_message = log_message.into();
        self
    }

    /// Human-readable text: the log message on success, the error otherwise.
    pub fn message(&self) -> &str {
        if self.is_success {
            &self.log_message
        } else {
            &self.error_message
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        if self.is_success {
            Ok(self.payload)
        } else {
            Err(self.error_message)
        }
    }
}

impl<T: Default> AsyncResult<T> {
    /// Failure carrying a default payload.
    pub fn fault(error_message: impl Into<String>) -> Self {
        Self::failure(T::default(), error_message)
    }
}

impl<T: Default> From<Error> for AsyncResult<T> {
    fn from(error: Error) -> Self {
        Self::fault(error.to_string())
    }
}
