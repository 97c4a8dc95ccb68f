//! Certificate parsing and chain-of-trust verification
//!
//! A token carries its signer's certificate chain. Before anything in the
//! token is believed, the chain must lead to the CA this node trusts, and every
//! certificate on the way must be inside its validity window.

use aws_lc_rs::digest::{digest, SHA256};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::DecodingKey;
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::error::{PkiError, Result};

/// Parse PEM-encoded data and return the DER bytes
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.into_contents())
}

/// Base64 (standard alphabet, padded) of the SHA-256 digest of a DER certificate
pub fn sha256_fingerprint(der: &[u8]) -> String {
    STANDARD.encode(digest(&SHA256, der).as_ref())
}

/// Information about a certificate's validity window and subject
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// When the certificate becomes valid (Unix timestamp)
    pub not_before: i64,
    /// When the certificate expires (Unix timestamp)
    pub not_after: i64,
    /// Subject common name
    pub common_name: String,
    /// Whether the certificate may sign other certificates
    pub is_ca: bool,
}

impl CertificateInfo {
    /// Parse certificate info from PEM-encoded certificate
    pub fn from_pem(pem_data: &str) -> Result<Self> {
        let der = parse_pem(pem_data)?;
        Self::from_der(&der)
    }

    /// Parse certificate info from DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let cert = parse_certificate(der)?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        Ok(Self {
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            common_name,
            is_ca: cert.is_ca(),
        })
    }

    /// Check if the certificate has expired
    pub fn is_expired(&self) -> bool {
        self.not_after <= unix_now()
    }

    /// Check if now lies inside the validity window
    pub fn is_valid_now(&self) -> bool {
        self.not_before <= unix_now() && !self.is_expired()
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;
    Ok(cert)
}

/// RS256 verification key for the RSA public key in a DER certificate
pub fn rsa_decoding_key(cert_der: &[u8]) -> Result<DecodingKey> {
    let cert = parse_certificate(cert_der)?;
    let spki = cert.public_key();
    match spki.parsed() {
        Ok(PublicKey::RSA(_)) => Ok(DecodingKey::from_rsa_der(&spki.subject_public_key.data)),
        Ok(_) => Err(PkiError::ParseError(
            "certificate key is not an RSA key".to_string(),
        )),
        Err(e) => Err(PkiError::ParseError(format!(
            "failed to parse certificate public key: {}",
            e
        ))),
    }
}

fn check_validity(cert: &X509Certificate<'_>, position: usize) -> Result<()> {
    if cert.validity().is_valid() {
        Ok(())
    } else {
        Err(PkiError::UntrustedChain(format!(
            "certificate {} is expired or not yet valid",
            position
        )))
    }
}

/// Verify that a certificate chain leads to the trust anchor
///
/// `chain[0]` is the leaf. Each element is accepted as soon as its signature
/// verifies under the trust anchor's key; otherwise it must be signed by the
/// next element, which in turn must be a CA. Returns the index of the element
/// that was signed by the trust anchor.
pub fn verify_chain(chain: &[Vec<u8>], trust_anchor_der: &[u8]) -> Result<usize> {
    if chain.is_empty() {
        return Err(PkiError::UntrustedChain("empty certificate chain".to_string()));
    }

    let anchor = parse_certificate(trust_anchor_der)?;
    check_validity(&anchor, chain.len())?;

    let certs = chain
        .iter()
        .map(|der| parse_certificate(der))
        .collect::<Result<Vec<_>>>()?;

    for (position, cert) in certs.iter().enumerate() {
        check_validity(cert, position)?;

        if cert.verify_signature(Some(anchor.public_key())).is_ok() {
            return Ok(position);
        }

        let issuer = certs.get(position + 1).ok_or_else(|| {
            PkiError::UntrustedChain("chain does not lead to the trusted CA".to_string())
        })?;

        if !issuer.is_ca() {
            return Err(PkiError::UntrustedChain(format!(
                "certificate {} is not a CA",
                position + 1
            )));
        }

        cert.verify_signature(Some(issuer.public_key()))
            .map_err(|_| {
                PkiError::UntrustedChain(format!(
                    "signature of certificate {} verification failed",
                    position
                ))
            })?;
    }

    Err(PkiError::UntrustedChain(
        "chain does not lead to the trusted CA".to_string(),
    ))
}
