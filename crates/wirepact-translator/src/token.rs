//! WirePact identity tokens
//!
//! An identity token is a compact RS256 JWS whose header carries the signer's
//! certificate chain (`x5c`: leaf, then CA) and the SHA-256 fingerprint of the
//! leaf (`x5t`). A receiver trusts the token without calling the PKI:
//!
//! 1. the chain in `x5c` must lead to the locally trusted CA,
//! 2. `x5t` must be the fingerprint of the leaf in that chain,
//! 3. the signature must verify under the leaf's public key,
//! 4. `aud` must be `WirePact` and the token must not be expired.
//!
//! Only then is `sub` handed out as the caller's identity.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use wirepact_pki::{rsa_decoding_key, sha256_fingerprint, verify_chain, KeyMaterial};

use crate::error::TokenError;

/// Audience of every WirePact identity token
pub const AUDIENCE: &str = "WirePact";

/// Token lifetime when none is configured
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(60);

/// Clock skew tolerated when checking `exp`
const EXPIRY_LEEWAY_SECONDS: u64 = 60;

/// Issuance settings for identity tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    /// Value of the `iss` claim; mandatory
    pub issuer: String,
    /// Token lifetime; [`DEFAULT_TOKEN_LIFETIME`] if unset
    pub lifetime: Option<Duration>,
}

impl TokenConfig {
    /// Config with the given issuer and the default lifetime
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            lifetime: None,
        }
    }

    /// Override the token lifetime
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    /// The lifetime to use for issued tokens
    pub fn effective_lifetime(&self) -> Duration {
        match self.lifetime {
            Some(lifetime) if !lifetime.is_zero() => lifetime,
            _ => DEFAULT_TOKEN_LIFETIME,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IdentityClaims {
    sub: String,
    iss: String,
    aud: String,
    iat: u64,
    exp: u64,
}

/// Issues and verifies identity tokens with this node's key material
#[derive(Debug, Clone)]
pub struct TokenCodec {
    material: Arc<KeyMaterial>,
}

impl TokenCodec {
    /// Create a codec over ready key material
    pub fn new(material: Arc<KeyMaterial>) -> Self {
        Self { material }
    }

    /// The key material behind this codec
    pub fn key_material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Issue a signed token asserting `subject`
    pub fn issue(&self, subject: &str, config: &TokenConfig) -> Result<String, TokenError> {
        if config.issuer.is_empty() {
            return Err(TokenError::EmptyIssuer);
        }

        let chain = self.material.certificate_chain_headers();
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        header.x5c = Some(chain.x5c.clone());
        header.x5t = Some(chain.x5t.clone());

        let issued_at = jsonwebtoken::get_current_timestamp();
        let expires_at = issued_at
            .checked_add(config.effective_lifetime().as_secs())
            .ok_or_else(|| TokenError::Signing("token lifetime overflows exp".to_string()))?;
        let claims = IdentityClaims {
            sub: subject.to_string(),
            iss: config.issuer.clone(),
            aud: AUDIENCE.to_string(),
            iat: issued_at,
            exp: expires_at,
        };

        jsonwebtoken::encode(&header, &claims, self.material.encoding_key())
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify a token and return its subject
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        let header =
            jsonwebtoken::decode_header(token).map_err(|e| TokenError::Malformed(e.to_string()))?;

        let chain = header
            .x5c
            .filter(|x5c| !x5c.is_empty())
            .ok_or(TokenError::MissingCertificateChain)?
            .iter()
            .map(|cert| {
                STANDARD
                    .decode(cert)
                    .map_err(|e| TokenError::Malformed(format!("invalid x5c entry: {}", e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let fingerprint = header
            .x5t
            .ok_or(TokenError::MissingFingerprint)?;

        verify_chain(&chain, self.material.trust_anchor_der())
            .map_err(TokenError::UntrustedChain)?;

        let leaf = &chain[0];
        if sha256_fingerprint(leaf) != fingerprint {
            return Err(TokenError::FingerprintMismatch);
        }

        let signer_key =
            rsa_decoding_key(leaf).map_err(|e| TokenError::Signature(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = EXPIRY_LEEWAY_SECONDS;
        validation.set_audience(&[AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);

        let data = jsonwebtoken::decode::<IdentityClaims>(token, &signer_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidRsaKey(_)
                | ErrorKind::Crypto(_) => TokenError::Signature(e.to_string()),
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => TokenError::Malformed(e.to_string()),
                _ => TokenError::Claims(e.to_string()),
            })?;

        debug!(
            subject = %data.claims.sub,
            issuer = %data.claims.iss,
            "Identity token verified"
        );
        Ok(data.claims.sub)
    }
}
