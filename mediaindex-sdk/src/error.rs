//! Errors returned by Bot API calls.

/// A failed Bot API call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API error {code}: {description}")]
    Api { code: i64, description: String },

    /// Rate limited; the server asks us to wait `retry_after` seconds.
    #[error("flood wait: retry after {retry_after}s")]
    FloodWait { retry_after: u64 },

    /// An edit that would leave the message unchanged.
    #[error("message is not modified")]
    NotModified,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// True for errors worth retrying after a pause.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Http(_) | ApiError::FloodWait { .. })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
