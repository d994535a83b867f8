use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the mail provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned {code}: {message}")]
    Api { code: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ProviderError {
    /// The provider's error code, when the failure came with one.
    pub fn code(&self) -> Option<u16> {
        match self {
            ProviderError::Api { code, .. } => Some(*code),
            ProviderError::Transport(e) => e.status().map(|status| status.as_u16()),
            ProviderError::Decode(_) => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("cannot read credentials file '{path}': {source}")]
    Credentials { path: PathBuf, source: std::io::Error },

    #[error("cannot parse '{path}': {source}")]
    Malformed { path: PathBuf, source: serde_json::Error },

    #[error("credentials file '{0}' has neither a \"web\" nor an \"installed\" client")]
    MissingClient(PathBuf),

    #[error("cannot write token file '{path}': {source}")]
    TokenWrite { path: PathBuf, source: std::io::Error },

    #[error("cannot read authorization code: {0}")]
    Prompt(std::io::Error),

    #[error("token exchange failed: {0}")]
    Exchange(#[from] ProviderError),
}

/// Which fetch of a message scan failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStage {
    Message,
    Thread,
}

impl std::fmt::Display for ScanStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanStage::Message => write!(f, "get message"),
            ScanStage::Thread => write!(f, "get thread"),
        }
    }
}

#[derive(Error, Debug)]
#[error("{stage} failed for message {message_id}: {source}")]
pub struct ScanError {
    pub stage: ScanStage,
    pub message_id: String,
    #[source]
    pub source: ProviderError,
}
