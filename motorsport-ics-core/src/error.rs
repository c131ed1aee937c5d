use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date/time parsing failed: {0}")]
    DateTime(#[from] chrono::ParseError),

    #[error("Source error: {name} - {message}")]
    Source { name: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unresolved date: {0}")]
    UnresolvedDate(String),

    #[error("Mapping store failure: {0}")]
    Persistence(String),

    #[error("ICS generation failed: {0}")]
    IcsGeneration(String),

    #[error("Network timeout")]
    Timeout,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a collection attempt that failed with this error may be retried.
    ///
    /// Only timeouts and connection-level I/O failures qualify. Parse errors,
    /// HTTP status errors and everything else are reported immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout | Error::Io(_) => true,
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::Timeout.is_transient());
        assert!(
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset"
            ))
            .is_transient()
        );
        assert!(
            !Error::Source {
                name: "feed".to_string(),
                message: "malformed".to_string()
            }
            .is_transient()
        );
        assert!(!Error::Cancelled.is_transient());
        assert!(!Error::Config("bad".to_string()).is_transient());
    }
}
