use std::path::PathBuf;

/// All errors that can occur in the ladybug graph engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A caller supplied a malformed request (bad path, empty query, out-of-range weight, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A page, chunk, folder or tag referenced by the caller does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The embedding provider could not be reached or returned an error.
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The graph store failed to read or write.
    #[error("graph store error: {0}")]
    StoreError(String),

    /// A markdown or config-tracker document failed to parse.
    #[error("parse error in {}: {message}", path.display())]
    ParseError { path: PathBuf, message: String },

    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("watch error: {0}")]
    Watch(String),

    #[error("lock acquisition timed out")]
    LockTimeout,

    #[error("logging initialization failed: {0}")]
    Logging(String),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::ParseError {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn invalid_argument_variant_formats() {
        let err = Error::invalid_argument("empty query");
        assert_eq!(err.to_string(), "invalid argument: empty query");
    }

    #[test]
    fn not_found_variant_formats() {
        let err = Error::not_found("page Foo");
        assert_eq!(err.to_string(), "not found: page Foo");
    }

    #[test]
    fn provider_unavailable_variant_formats() {
        let err = Error::ProviderUnavailable("timeout".into());
        assert_eq!(err.to_string(), "embedding provider unavailable: timeout");
    }

    #[test]
    fn store_error_variant_formats() {
        let err = Error::StoreError("corrupt header".into());
        assert_eq!(err.to_string(), "graph store error: corrupt header");
    }

    #[test]
    fn parse_error_variant_formats() {
        let err = Error::parse("doc.md", "unexpected token");
        let s = err.to_string();
        assert!(s.contains("doc.md"));
        assert!(s.contains("unexpected token"));
    }

    #[test]
    fn config_error_variant_formats() {
        let err = Error::ConfigError("bad key".into());
        assert_eq!(err.to_string(), "configuration error: bad key");
    }

    #[test]
    fn io_from_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: Error = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn serialization_variant_formats() {
        let err = Error::Serialization("invalid json".into());
        assert_eq!(err.to_string(), "serialization error: invalid json");
    }

    #[test]
    fn watch_variant_formats() {
        let err = Error::Watch("inotify limit".into());
        assert_eq!(err.to_string(), "watch error: inotify limit");
    }

    #[test]
    fn lock_timeout_variant_formats() {
        let err = Error::LockTimeout;
        assert_eq!(err.to_string(), "lock acquisition timed out");
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
