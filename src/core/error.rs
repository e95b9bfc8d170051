use thiserror::Error;

/// Any failure while invoking a model backend. Callers treat every variant
/// the same way; the variants only exist to give the log a useful message.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("{provider} timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },
    #[error("{provider} API error ({status}): {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("{provider} request failed: {reason}")]
    Transport { provider: String, reason: String },
    #[error("{provider} returned a malformed response: {reason}")]
    Malformed { provider: String, reason: String },
    #[error("no provider registered for '{0}'")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("invalid url '{0}'")]
    InvalidUrl(String),
    #[error("fetch of {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("fetch of {url} failed: {reason}")]
    Network { url: String, reason: String },
}

/// Structured output from the scoring model could not be read.
/// `raw` keeps the untouched adapter text for diagnostics.
#[derive(Debug, Clone, Error)]
#[error("could not parse analysis output: {reason}")]
pub struct ParseError {
    pub reason: String,
    pub raw: String,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("document encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("transcript store is closed")]
    Closed,
}

#[derive(Debug, Clone, Error)]
pub enum ImageGenError {
    #[error("image backend timed out after {0}s")]
    Timeout(u64),
    #[error("image backend error ({status}): {body}")]
    Http { status: u16, body: String },
    #[error("image request failed: {0}")]
    Transport(String),
    #[error("image backend returned no image")]
    Empty,
    #[error("image payload could not be decoded: {0}")]
    Decode(String),
}

/// Fatal failures of the analysis pipeline, tagged with the stage that produced them.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("scraping failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("analysis model failed: {0}")]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl AnalysisError {
    pub fn stage(&self) -> &'static str {
        match self {
            AnalysisError::Fetch(_) => "fetch",
            AnalysisError::Provider(_) => "scoring",
            AnalysisError::Parse(_) => "parse",
        }
    }
}
