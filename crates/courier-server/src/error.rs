//! Server error types.

use thiserror::Error;

/// Failures starting or running the transport.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The global metrics recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn bind_error_keeps_source() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:1".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:1: in use");
        assert!(err.source().is_some());
    }

    #[test]
    fn metrics_error_display() {
        let err = ServerError::Metrics("already installed".into());
        assert!(err.to_string().contains("already installed"));
    }
}
