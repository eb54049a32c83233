use thiserror::Error;

#[derive(Error, Debug)]
pub enum NewsError {
    #[error("http status {status}: {url}")]
    Http { status: u16, url: String },

    #[error("response body exceeds {max_bytes} bytes")]
    TooLarge { max_bytes: usize },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("feed parse error: {0}")]
    FeedParse(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("encoded thumbnail exceeds {max_bytes} bytes")]
    ThumbnailBudget { max_bytes: usize },

    #[error("thumbnail sandbox failed: {0}")]
    Sandbox(String),

    #[error("object store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for NewsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NewsError::Timeout
        } else if err.is_builder() {
            NewsError::InvalidUrl(err.to_string())
        } else {
            NewsError::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for NewsError {
    fn from(err: url::ParseError) -> Self {
        NewsError::InvalidUrl(err.to_string())
    }
}

impl NewsError {
    /// Network-class failures that drop an item without being logged.
    pub fn is_silent_network_failure(&self) -> bool {
        matches!(
            self,
            NewsError::Timeout | NewsError::Network(_) | NewsError::InvalidUrl(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NewsError>;
