/// Shared error type used across all chatsync crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    // ── Resolution failures (fatal to a single mutation) ──────────────
    #[error("reference not found: {0}")]
    ReferenceNotFound(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    // ── Stream accumulation contract failures ─────────────────────────
    #[error("malformed tool arguments: {0}")]
    MalformedToolArguments(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("operation cancelled")]
    Cancelled,

    // ── Ambient ────────────────────────────────────────────────────────
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for the resolution family: the mutation was rejected but the
    /// graph is untouched.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Error::ReferenceNotFound(_)
                | Error::CollectionNotFound(_)
                | Error::AssetNotFound(_)
                | Error::ObjectNotFound(_)
                | Error::InvalidValue(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_family() {
        assert!(Error::ObjectNotFound("x".into()).is_resolution());
        assert!(Error::CollectionNotFound("x".into()).is_resolution());
        assert!(!Error::ProtocolViolation("x".into()).is_resolution());
        assert!(!Error::Cancelled.is_resolution());
    }

    #[test]
    fn display_carries_detail() {
        let e = Error::AssetNotFound("c1".into());
        assert_eq!(e.to_string(), "asset not found: c1");
    }
}
