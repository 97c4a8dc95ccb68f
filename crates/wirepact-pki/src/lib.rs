//! Key material for WirePact translators
//!
//! Every translator holds the CA certificate of the WirePact PKI, a private
//! RSA key and a certificate the PKI issued for that key. This crate gets them
//! there and keeps them:
//!
//! - **Bootstrap**: fetch the CA, generate the key, request the certificate via CSR
//! - **Cache**: reuse material from a local directory across restarts
//! - **Verify**: check that a presented certificate chain leads to the trusted CA
//!
//! # Public API
//!
//! - [`KeyMaterial`]: The loaded trust anchor, signing key and leaf certificate
//! - [`PkiConfig`]: Where the PKI lives and where the cache is kept
//! - [`PkiClient`]: HTTP access to the PKI's CA and CSR endpoints
//! - [`verify_chain`], [`rsa_decoding_key`]: Chain-of-trust checks for received tokens
//! - [`PkiError`]: Error type for all of the above
//!
//! With the `test-support` feature, [`test_support`] provides an in-process
//! CA and a mock PKI server.

#![deny(missing_docs)]

pub mod client;
pub mod config;
pub mod csr;
pub mod error;
pub mod material;
pub mod verify;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use client::PkiClient;
pub use config::PkiConfig;
pub use csr::CertificateRequest;
pub use error::{PkiError, Result};
pub use material::{BootstrapPhase, CertificateChainHeaders, KeyMaterial};
pub use verify::{parse_pem, rsa_decoding_key, sha256_fingerprint, verify_chain, CertificateInfo};
