//! Key pair and certificate signing request generation
//!
//! The translator generates its RSA key locally and sends only a PKCS#10 CSR
//! to the PKI. The private key never leaves the node.

use rcgen::{CertificateParams, DistinguishedName, DnType, DnValue, KeyPair, PKCS_RSA_SHA256};

use crate::error::{PkiError, Result};

/// Organization placed in every translator CSR
pub const CSR_ORGANIZATION: &str = "WirePact PKI";

/// Organizational unit placed in every translator CSR
pub const CSR_ORGANIZATIONAL_UNIT: &str = "Translator";

/// Generate a fresh 2048-bit RSA private key as PKCS#8 PEM
pub fn generate_private_key_pem() -> Result<String> {
    let key_pair = KeyPair::generate_for(&PKCS_RSA_SHA256).map_err(|e| {
        PkiError::KeyGenerationFailed(format!("failed to generate RSA key: {}", e))
    })?;
    Ok(key_pair.serialize_pem())
}

/// A private key together with the CSR that asks the PKI to certify it
pub struct CertificateRequest {
    /// PKCS#8 PEM of the private key (stays local)
    key_pem: String,
    /// CSR in PEM format (sent to the PKI)
    csr_pem: String,
}

impl CertificateRequest {
    /// Generate a fresh 2048-bit RSA key and a CSR for it
    pub fn generate(common_name: &str) -> Result<Self> {
        Self::for_key(&generate_private_key_pem()?, common_name)
    }

    /// Build a CSR for an already existing (cached) private key
    pub fn for_key(key_pem: &str, common_name: &str) -> Result<Self> {
        let key_pair = KeyPair::from_pem(key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to parse private key: {}", e)))?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        dn.push(
            DnType::OrganizationName,
            DnValue::Utf8String(CSR_ORGANIZATION.to_string()),
        );
        dn.push(
            DnType::OrganizationalUnitName,
            DnValue::Utf8String(CSR_ORGANIZATIONAL_UNIT.to_string()),
        );
        params.distinguished_name = dn;

        let csr = params.serialize_request(&key_pair).map_err(|e| {
            PkiError::CsrGenerationFailed(format!("failed to create CSR: {}", e))
        })?;
        let csr_pem = csr.pem().map_err(|e| {
            PkiError::CsrGenerationFailed(format!("failed to serialize CSR: {}", e))
        })?;

        Ok(Self {
            key_pem: key_pem.to_string(),
            csr_pem,
        })
    }

    /// The CSR in PEM format (to send to the PKI)
    pub fn csr_pem(&self) -> &str {
        &self.csr_pem
    }

    /// The private key in PEM format (to store locally)
    pub fn private_key_pem(&self) -> &str {
        &self.key_pem
    }
}
