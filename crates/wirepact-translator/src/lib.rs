//! WirePact translator core
//!
//! A translator sits next to Envoy and answers its ext_authz checks on two
//! listeners:
//!
//! - **Egress**: an [`EgressTranslator`] names the user behind an outgoing
//!   request; the translator vouches for that user with a signed identity token
//!   in `x-wirepact-identity`.
//! - **Ingress**: the token of an incoming request is verified against the
//!   WirePact PKI's CA and the subject handed to an [`IngressTranslator`],
//!   which turns it back into whatever the destination understands.
//!
//! ```text
//! service A ──▶ envoy ──egress check──▶ translator A (issue token)
//!                 │
//!                 ▼ x-wirepact-identity: <JWS, x5c, x5t>
//!               envoy ──ingress check──▶ translator B (verify token) ──▶ service B
//! ```
//!
//! # Public API
//!
//! - [`TranslatorServer`], [`ShutdownHandle`]: Lifecycle of both listeners
//! - [`TranslatorConfig`], [`TranslatorArgs`]: Configuration from flags / environment
//! - [`TokenCodec`], [`TokenConfig`]: Identity token issuance and verification
//! - [`IngressTranslator`], [`EgressTranslator`]: Integrator-supplied translation
//! - [`envoy`]: ext_authz response builders and request accessors
//!
//! With the `test-support` feature, [`test_support`] builds check requests.

#![deny(missing_docs)]

pub mod config;
pub mod egress;
pub mod envoy;
pub mod error;
pub mod ingress;
pub mod server;
pub mod token;
pub mod translation;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::{TranslatorArgs, TranslatorConfig};
pub use egress::EgressService;
pub use error::{ConfigError, Result, TokenError, TranslatorError};
pub use ingress::IngressService;
pub use server::{ShutdownHandle, TranslatorServer};
pub use token::{TokenCodec, TokenConfig};
pub use translation::{EgressResult, EgressTranslator, IngressResult, IngressTranslator};

// Re-exported for translator implementations
pub use envoy_types::ext_authz::v3::pb::CheckRequest;
pub use tonic::Status;
