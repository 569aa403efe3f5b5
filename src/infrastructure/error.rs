use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Credential store error: {0}")]
    Credential(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("calendar provider error: http {status}; body={body}")]
    Provider { status: u16, body: String },
    #[error("calendar provider rejected the access token")]
    Unauthorized,
    #[error("unsupported calendar provider: {0}")]
    UnsupportedProvider(String),
    #[error("sign-in was cancelled by the user")]
    UserCancelled,
    #[error("sign-in popup was blocked by the host environment")]
    PopupBlocked,
    #[error("invalid manual token: {0}")]
    InvalidManualToken(String),
    #[error("interactive sign-in completed but no usable credential token was returned")]
    TokenExtractionFailed,
}

impl InfraError {
    /// Recoverable failures leave the connection table untouched and may be
    /// retried by the UI without any cleanup.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UserCancelled | Self::PopupBlocked | Self::InvalidManualToken(_)
        )
    }
}
