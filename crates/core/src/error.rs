use thiserror::Error;

/// Failure reported by a transport collaborator, or raised while validating
/// what it returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("request cancelled")]
    Cancelled,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("fixture error: {0}")]
    Fixture(String),
}

impl TransportError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Status { .. } => "bad_status",
            Self::Cancelled => "cancelled",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Fixture(_) => "fixture",
        }
    }
}

/// Backend failure of a tag resolver. A missing tag is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    #[error("tag backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_message_names_url() {
        let e = TransportError::Status {
            url: "http://example.test/en/".into(),
            status: 503,
        };
        assert_eq!(e.to_string(), "http://example.test/en/ returned status 503");
        assert_eq!(e.code(), "bad_status");
    }
}
