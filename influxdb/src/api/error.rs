use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("InfluxDB returned HTTP {status}: {message}")]
    HttpError { status: u16, message: String },

    /// Error reported by the server, either for the whole request or for one statement
    #[error("{0}")]
    QueryError(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}
