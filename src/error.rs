use hyper::StatusCode;
use thiserror::Error;

/// Type alias for Result with GmailError
pub type Result<T> = std::result::Result<T, GmailError>;

/// How the executor should treat a failed remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Rate limit or server-side failure; the same call may succeed later
    Retryable,
    /// Anything else; retrying the same call cannot help
    Terminal,
}

/// Error types for the mailbox cleaner
#[derive(Error, Debug)]
pub enum GmailError {
    /// Gmail API returned an unexpected status
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// HTTP 429
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Connection issues, timeouts
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Response is missing a field the caller needs
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Label lookup or creation failed
    #[error("Label error: {0}")]
    LabelError(String),

    /// User supplied an unusable value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// User interrupted the running action
    #[error("Operation cancelled: {0}")]
    OperationCancelled(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic catch-all error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl GmailError {
    /// Only rate limiting and 5xx responses are worth another attempt.
    /// Transport failures are terminal for the affected unit of work.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            GmailError::RateLimited(_) | GmailError::ServerError { .. } => FailureClass::Retryable,
            _ => FailureClass::Terminal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.failure_class() == FailureClass::Retryable
    }

    /// Map a non-success HTTP status to the matching error variant
    pub fn from_status(status: StatusCode) -> Self {
        let code = status.as_u16();
        let message = format!(
            "HTTP {}: {}",
            code,
            status.canonical_reason().unwrap_or("Unknown")
        );

        match code {
            429 => GmailError::RateLimited(message),
            404 => GmailError::MessageNotFound("Resource not found".to_string()),
            400 => GmailError::BadRequest(message),
            401 => GmailError::AuthError(message),
            403 => GmailError::Forbidden(message),
            500..=599 => GmailError::ServerError {
                status: code,
                message,
            },
            _ => GmailError::ApiError(message),
        }
    }
}

impl From<google_gmail1::Error> for GmailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => GmailError::from_status(response.status()),
            // Gmail sends its error responses with a JSON body, which the hub
            // reports as BadRequest whatever the status was
            google_gmail1::Error::BadRequest(ref body) => match status_in_body(body) {
                Some(status) => GmailError::from_status(status),
                None => GmailError::BadRequest(body.to_string()),
            },
            google_gmail1::Error::HttpError(ref err) => {
                GmailError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => GmailError::NetworkError(err.to_string()),
            google_gmail1::Error::MissingToken(err) => GmailError::AuthError(err.to_string()),
            _ => GmailError::ApiError(error.to_string()),
        }
    }
}

/// The HTTP status carried in a `{"error": {"code": ...}}` body
fn status_in_body(body: &serde_json::Value) -> Option<StatusCode> {
    let code = body["error"]["code"].as_u64()?;
    StatusCode::from_u16(u16::try_from(code).ok()?).ok()
}
