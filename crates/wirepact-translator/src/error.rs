//! Error types for the translator

use std::net::SocketAddr;

use thiserror::Error;
use tonic::Status;
use wirepact_pki::PkiError;

/// Errors that abort translator startup or serving
#[derive(Debug, Error)]
pub enum TranslatorError {
    /// Configuration is missing or invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Key material could not be bootstrapped
    #[error("key material error: {0}")]
    Pki(#[from] PkiError),

    /// A listener could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested listen address
        addr: SocketAddr,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A gRPC server failed while serving
    #[error("{listener} server error: {source}")]
    Serve {
        /// `ingress` or `egress`
        listener: &'static str,
        /// Underlying transport error
        #[source]
        source: tonic::transport::Error,
    },

    /// A server task panicked or was aborted
    #[error("{listener} server task failed: {message}")]
    Task {
        /// `ingress` or `egress`
        listener: &'static str,
        /// Join error description
        message: String,
    },
}

impl TranslatorError {
    /// Create a bind error for the given address
    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Bind { addr, source }
    }
}

/// Invalid or missing configuration values
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required value is empty
    #[error("{0} must not be empty")]
    Missing(&'static str),

    /// A value is present but unusable
    #[error("invalid {name}: {message}")]
    Invalid {
        /// Name of the setting
        name: &'static str,
        /// What is wrong with it
        message: String,
    },
}

/// Errors issuing or verifying identity tokens
#[derive(Debug, Error)]
pub enum TokenError {
    /// Tokens must name their issuer
    #[error("token issuer must not be empty")]
    EmptyIssuer,

    /// The token is not a parsable JWS
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The `x5c` header is absent or empty
    #[error("token carries no certificate chain")]
    MissingCertificateChain,

    /// The `x5t` header is absent
    #[error("token carries no certificate fingerprint")]
    MissingFingerprint,

    /// The certificate chain does not lead to the trusted CA
    #[error("untrusted certificate chain: {0}")]
    UntrustedChain(#[source] PkiError),

    /// The fingerprint header does not match the leaf certificate
    #[error("certificate fingerprint does not match the certificate chain")]
    FingerprintMismatch,

    /// The signature was not made with the leaf certificate's key
    #[error("invalid token signature: {0}")]
    Signature(String),

    /// Expiry, audience or other registered claims are invalid
    #[error("invalid token claims: {0}")]
    Claims(String),

    /// Signing the token failed
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl TokenError {
    /// Whether the error is caused by the presented token rather than by this node
    pub fn is_auth_failure(&self) -> bool {
        !matches!(self, TokenError::EmptyIssuer | TokenError::Signing(_))
    }
}

impl From<TokenError> for Status {
    fn from(err: TokenError) -> Self {
        if err.is_auth_failure() {
            Status::unauthenticated(err.to_string())
        } else {
            Status::internal(err.to_string())
        }
    }
}

/// Result type for translator startup and serving
pub type Result<T> = std::result::Result<T, TranslatorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn verification_failures_are_unauthenticated() {
        for err in [
            TokenError::Malformed("bad".to_string()),
            TokenError::MissingCertificateChain,
            TokenError::FingerprintMismatch,
            TokenError::Signature("bad".to_string()),
            TokenError::Claims("expired".to_string()),
        ] {
            assert_eq!(Status::from(err).code(), Code::Unauthenticated);
        }
    }

    #[test]
    fn issuance_failures_are_internal() {
        assert_eq!(Status::from(TokenError::EmptyIssuer).code(), Code::Internal);
        assert_eq!(
            Status::from(TokenError::Signing("boom".to_string())).code(),
            Code::Internal
        );
    }

    #[test]
    fn status_message_carries_the_cause() {
        let status = Status::from(TokenError::FingerprintMismatch);
        assert!(status.message().contains("fingerprint"));
    }

    #[test]
    fn config_error_names_the_setting() {
        let err = ConfigError::Missing("PKI_ADDRESS");
        assert_eq!(err.to_string(), "PKI_ADDRESS must not be empty");
    }
}
