use thiserror::Error;

/// Main error type for garmin-sync
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Not authenticated with Garmin Connect. Log in before fetching data.")]
    NotAuthenticated,

    #[error("MFA required. Multi-factor accounts are not supported by non-interactive sync.")]
    MfaRequired,

    #[error("Rate limited. Please wait before retrying.")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid date format: {0}. Expected YYYY-MM-DD")]
    InvalidDateFormat(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Create an authentication error from a message
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a configuration error from a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid response error from a message
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create an invalid parameter error from a message
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Wrap a database error with the operation that failed
    pub fn database(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Database(format!("{}: {}", context, err))
    }

    /// Whether the vendor rejected or never had a session
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_) | Self::NotAuthenticated | Self::MfaRequired
        )
    }
}

/// Render an error for the terminal, with a hint where one helps
pub fn format_user_error(err: &SyncError) -> String {
    match err {
        SyncError::Authentication(_) => {
            format!("{}\nCheck the account email and password.", err)
        }
        SyncError::MfaRequired => {
            format!("{}\nDisable MFA for this account or sync with cached tokens.", err)
        }
        SyncError::RateLimited => {
            format!("{}\nGarmin Connect throttles repeated logins; try again later.", err)
        }
        SyncError::Database(_) => {
            format!("{}\nCheck the --database path is writable.", err)
        }
        _ => err.to_string(),
    }
}
