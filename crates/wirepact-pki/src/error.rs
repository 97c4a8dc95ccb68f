//! Error types for key material bootstrap and certificate verification

use std::path::PathBuf;

use thiserror::Error;

/// PKI errors
///
/// Every variant raised while bootstrapping key material is fatal for the
/// process: a translator without a trust anchor, key and certificate cannot
/// vouch for or verify anyone.
#[derive(Debug, Error)]
pub enum PkiError {
    /// Reading or writing the local key material cache failed
    #[error("IO error on {path}: {source}")]
    Io {
        /// File or directory that was accessed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Talking to the PKI failed (transport error or non-success status)
    #[error("PKI request to {url} failed: {message}")]
    Http {
        /// Requested URL
        url: String,
        /// Error message
        message: String,
    },

    /// PEM, X.509 or key parsing error
    #[error("parse error: {0}")]
    ParseError(String),

    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// CSR generation failed
    #[error("CSR generation failed: {0}")]
    CsrGenerationFailed(String),

    /// The leaf certificate was not issued for the local signing key
    #[error("certificate does not match the local private key")]
    KeyMismatch,

    /// A presented certificate chain does not lead to the trust anchor
    #[error("untrusted certificate chain: {0}")]
    UntrustedChain(String),
}

impl PkiError {
    /// Create an IO error for the given path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an HTTP error for the given URL
    pub fn http(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Http {
            url: url.into(),
            message: msg.into(),
        }
    }
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;
