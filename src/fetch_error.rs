#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Invalid HTTP header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
    #[error("Cannot encode form text as {encoding}: {text}")]
    Encoding {
        encoding: &'static str,
        text: String,
    },
}
