use thiserror::Error;

#[derive(Error, Debug)]
pub enum TradeLogError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Counterparty id not detected; open a profile or pass an id explicitly")]
    MissingCounterparty,

    #[error("Missing API key; set TRADELOG_API_KEY")]
    MissingCredential,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {code}: {message}")]
    RemoteApi { code: i64, message: String },

    #[error("Malformed log page: {0}")]
    MalformedPage(String),

    #[error("Fetch already in progress for {0}")]
    FetchInProgress(String),

    #[error("Invalid import payload: {0}")]
    InvalidImport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TradeLogError {
    /// Errors that abort a fetch because the remote source could not be read.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RemoteApi { .. } | Self::MalformedPage(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TradeLogError>;
