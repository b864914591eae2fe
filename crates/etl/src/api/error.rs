use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The service rejected our credentials. Never retried or ignored.
    #[error("Forbidden: API rejected credentials for region {0}")]
    Forbidden(String),
    #[error("Unexpected API response ({status}) from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Malformed API response: {0}")]
    Decode(#[from] serde_json::Error),
}
