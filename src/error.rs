use thiserror::Error;

/// Failures surfaced by the feed gateway.
///
/// Cloneable so a memoized result can be handed to every caller that joined
/// the same in-flight request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("http {status} from {endpoint}")]
    Network { status: u16, endpoint: String },

    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("invalid json from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("no standings from {endpoint} after trying {tried} seasontype values")]
    EmptyResult { endpoint: String, tried: usize },
}

impl FeedError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FeedError::Network { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            FeedError::Network { endpoint, .. }
            | FeedError::Transport { endpoint, .. }
            | FeedError::Decode { endpoint, .. }
            | FeedError::EmptyResult { endpoint, .. } => endpoint,
        }
    }
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;
