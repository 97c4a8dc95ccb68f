//! Key material store
//!
//! A translator needs three things before it can issue or verify a single
//! token: the PKI's CA certificate (trust anchor), its own private key and the
//! certificate the PKI issued for that key. They are bootstrapped once at
//! startup, strictly in this order:
//!
//! ```text
//! Uninitialized -> TrustAnchorLoaded -> KeyLoaded -> CertificateLoaded -> Ready
//! ```
//!
//! Each piece is taken from the local cache if present. Otherwise the CA is
//! fetched from the PKI, the key is generated locally, and the certificate is
//! requested with a CSR. Anything fetched or generated is validated before it
//! is written to the cache. Once `Ready`, [`KeyMaterial`] is immutable and can
//! be shared freely between concurrent requests.

use std::fmt;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::client::PkiClient;
use crate::config::{PkiConfig, CA_FILENAME, CERT_FILENAME, KEY_FILENAME};
use crate::csr::{generate_private_key_pem, CertificateRequest};
use crate::error::{PkiError, Result};
use crate::verify::{parse_pem, rsa_decoding_key, sha256_fingerprint, CertificateInfo};

/// Bootstrap progress of the key material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    /// Nothing loaded yet
    Uninitialized,
    /// CA certificate loaded
    TrustAnchorLoaded,
    /// Private key loaded or generated
    KeyLoaded,
    /// Leaf certificate loaded or issued
    CertificateLoaded,
    /// All material present and consistent
    Ready,
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapPhase::Uninitialized => "uninitialized",
            BootstrapPhase::TrustAnchorLoaded => "trust-anchor-loaded",
            BootstrapPhase::KeyLoaded => "key-loaded",
            BootstrapPhase::CertificateLoaded => "certificate-loaded",
            BootstrapPhase::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// The `x5c` and `x5t` header values that bind a token to this node's certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChainHeaders {
    /// Base64 DER of the leaf certificate followed by the CA certificate
    pub x5c: Vec<String>,
    /// Base64 SHA-256 digest of the leaf certificate DER
    pub x5t: String,
}

/// This node's trust anchor, signing key and leaf certificate
#[derive(Clone)]
pub struct KeyMaterial {
    trust_anchor_pem: String,
    trust_anchor_der: Vec<u8>,
    private_key_pem: String,
    encoding_key: EncodingKey,
    leaf_der: Vec<u8>,
    common_name: String,
    chain_headers: CertificateChainHeaders,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("common_name", &self.common_name)
            .field("x5t", &self.chain_headers.x5t)
            .finish_non_exhaustive()
    }
}

impl KeyMaterial {
    /// Load the key material from the local cache, bootstrapping missing
    /// pieces from the PKI
    pub async fn ensure(config: &PkiConfig) -> Result<Self> {
        let client = PkiClient::new()?;
        Self::ensure_with_client(config, &client).await
    }

    /// Same as [`KeyMaterial::ensure`] with a caller supplied PKI client
    pub async fn ensure_with_client(config: &PkiConfig, client: &PkiClient) -> Result<Self> {
        let mut phase = BootstrapPhase::Uninitialized;
        debug!(phase = %phase, common_name = %config.common_name, "Ensuring key material");

        if let Some(dir) = &config.local_cert_path {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| PkiError::io(dir, e))?;
        }

        let ca_pem = load_trust_anchor(config, client).await?;
        advance(&mut phase, BootstrapPhase::TrustAnchorLoaded);

        let key_pem = load_private_key(config).await?;
        advance(&mut phase, BootstrapPhase::KeyLoaded);

        let cert_pem = load_certificate(config, client, &key_pem).await?;
        advance(&mut phase, BootstrapPhase::CertificateLoaded);

        let material = Self::from_pem(&ca_pem, &key_pem, &cert_pem)?;
        advance(&mut phase, BootstrapPhase::Ready);

        info!(
            common_name = %material.common_name,
            x5t = %material.chain_headers.x5t,
            "Key material ready"
        );
        Ok(material)
    }

    /// Build key material from PEM encoded CA certificate, private key and leaf certificate
    ///
    /// Fails if any piece does not parse or if the leaf certificate was not
    /// issued for the private key.
    pub fn from_pem(ca_pem: &str, key_pem: &str, cert_pem: &str) -> Result<Self> {
        let trust_anchor_der = parse_pem(ca_pem)?;
        CertificateInfo::from_der(&trust_anchor_der)?;

        let leaf_der = parse_pem(cert_pem)?;
        let leaf_info = CertificateInfo::from_der(&leaf_der)?;

        let encoding_key = EncodingKey::from_rsa_pem(key_pem.as_bytes())
            .map_err(|e| PkiError::ParseError(format!("failed to load private key: {}", e)))?;

        ensure_key_matches_certificate(&encoding_key, &leaf_der)?;

        let chain_headers = CertificateChainHeaders {
            x5c: vec![STANDARD.encode(&leaf_der), STANDARD.encode(&trust_anchor_der)],
            x5t: sha256_fingerprint(&leaf_der),
        };

        Ok(Self {
            trust_anchor_pem: ca_pem.to_string(),
            trust_anchor_der,
            private_key_pem: key_pem.to_string(),
            encoding_key,
            leaf_der,
            common_name: leaf_info.common_name,
            chain_headers,
        })
    }

    /// The trusted CA certificate (DER)
    pub fn trust_anchor_der(&self) -> &[u8] {
        &self.trust_anchor_der
    }

    /// The trusted CA certificate (PEM, as delivered by the PKI)
    pub fn trust_anchor_pem(&self) -> &str {
        &self.trust_anchor_pem
    }

    /// This node's private key (PKCS#8 PEM)
    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    /// This node's private key, ready for RS256 signing
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// This node's certificate (DER)
    pub fn leaf_certificate_der(&self) -> &[u8] {
        &self.leaf_der
    }

    /// Common name of this node's certificate
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// The `x5c` / `x5t` token headers for this node's certificate
    pub fn certificate_chain_headers(&self) -> &CertificateChainHeaders {
        &self.chain_headers
    }
}

fn advance(phase: &mut BootstrapPhase, next: BootstrapPhase) {
    debug!(from = %phase, to = %next, "Key material bootstrap phase");
    *phase = next;
}

/// Sign a probe with the private key and verify it with the certificate's key
fn ensure_key_matches_certificate(key: &EncodingKey, leaf_der: &[u8]) -> Result<()> {
    const PROBE: &[u8] = b"wirepact key material probe";

    let public_key = rsa_decoding_key(leaf_der)?;
    let signature = jsonwebtoken::crypto::sign(PROBE, key, Algorithm::RS256)
        .map_err(|e| PkiError::ParseError(format!("failed to sign with private key: {}", e)))?;

    match jsonwebtoken::crypto::verify(&signature, PROBE, &public_key, Algorithm::RS256) {
        Ok(true) => Ok(()),
        _ => Err(PkiError::KeyMismatch),
    }
}

async fn load_trust_anchor(config: &PkiConfig, client: &PkiClient) -> Result<String> {
    let path = config.file_path(CA_FILENAME);
    if let Some(pem) = read_cached(&path).await? {
        debug!(path = %path.display(), "Using cached CA certificate");
        return Ok(pem);
    }

    let pem = client.fetch_ca(&config.ca_address()).await?;
    CertificateInfo::from_pem(&pem)?;
    write_cached(&path, &pem, false).await?;
    info!(path = %path.display(), "Cached CA certificate");
    Ok(pem)
}

async fn load_private_key(config: &PkiConfig) -> Result<String> {
    let path = config.file_path(KEY_FILENAME);
    if let Some(pem) = read_cached(&path).await? {
        debug!(path = %path.display(), "Using cached private key");
        return Ok(pem);
    }

    info!("Generating private key");
    let pem = tokio::task::spawn_blocking(generate_private_key_pem)
        .await
        .map_err(|e| PkiError::KeyGenerationFailed(format!("key generation task failed: {}", e)))??;
    write_cached(&path, &pem, true).await?;
    info!(path = %path.display(), "Cached private key");
    Ok(pem)
}

async fn load_certificate(config: &PkiConfig, client: &PkiClient, key_pem: &str) -> Result<String> {
    let path = config.file_path(CERT_FILENAME);
    if let Some(pem) = read_cached(&path).await? {
        let info = CertificateInfo::from_pem(&pem)?;
        if info.is_valid_now() {
            debug!(path = %path.display(), not_after = info.not_after, "Using cached certificate");
            return Ok(pem);
        }
        warn!(
            path = %path.display(),
            not_before = info.not_before,
            not_after = info.not_after,
            "Cached certificate outside its validity window, requesting a new one"
        );
    }

    let request = CertificateRequest::for_key(key_pem, &config.common_name)?;
    let pem = client
        .submit_csr(&config.csr_address(), request.csr_pem())
        .await?;
    CertificateInfo::from_pem(&pem)?;
    write_cached(&path, &pem, false).await?;
    info!(path = %path.display(), "Cached certificate");
    Ok(pem)
}

/// Read a cache file; `None` if it does not exist
async fn read_cached(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PkiError::io(path, e)),
    }
}

async fn write_cached(path: &Path, contents: &str, private: bool) -> Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if private {
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(path).await.map_err(|e| PkiError::io(path, e))?;
    file.write_all(contents.as_bytes())
        .await
        .map_err(|e| PkiError::io(path, e))?;
    file.flush().await.map_err(|e| PkiError::io(path, e))
}
