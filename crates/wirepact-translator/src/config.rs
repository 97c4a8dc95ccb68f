//! Translator configuration
//!
//! [`TranslatorArgs`] reads the settings from flags or environment variables
//! and [`TranslatorArgs::into_config`] validates them into a [`TranslatorConfig`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use wirepact_pki::config::{DEFAULT_CA_PATH, DEFAULT_CSR_PATH};
use wirepact_pki::PkiConfig;

use crate::error::ConfigError;
use crate::token::TokenConfig;

/// Default port of the inbound ext_authz listener
pub const DEFAULT_INGRESS_PORT: u16 = 50051;

/// Default port of the outbound ext_authz listener
pub const DEFAULT_EGRESS_PORT: u16 = 50052;

/// Longest accepted identity token lifetime, one day
pub const MAX_TOKEN_LIFETIME_SECONDS: u64 = 24 * 60 * 60;

/// Everything a translator needs to start
#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    /// Port of the inbound listener
    pub ingress_port: u16,
    /// Port of the outbound listener
    pub egress_port: u16,
    /// Address both listeners bind to
    pub listen_address: IpAddr,
    /// PKI location and key material cache
    pub pki: PkiConfig,
    /// Token issuance settings
    pub token: TokenConfig,
}

impl TranslatorConfig {
    /// Config with default ports listening on all interfaces
    pub fn new(pki: PkiConfig, token: TokenConfig) -> Self {
        Self {
            ingress_port: DEFAULT_INGRESS_PORT,
            egress_port: DEFAULT_EGRESS_PORT,
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            pki,
            token,
        }
    }

    /// Socket address of the inbound listener
    pub fn ingress_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.ingress_port)
    }

    /// Socket address of the outbound listener
    pub fn egress_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.egress_port)
    }
}

/// Command line / environment settings of a translator
#[derive(Debug, Clone, Args)]
pub struct TranslatorArgs {
    /// Base address of the WirePact PKI (e.g. http://wirepact-pki:8080)
    #[arg(long, env = "PKI_ADDRESS")]
    pub pki_address: String,

    /// Common name requested for this translator's certificate
    #[arg(long, env = "COMMON_NAME")]
    pub common_name: String,

    /// Port of the inbound ext_authz listener
    #[arg(long, env = "INGRESS_PORT", default_value_t = DEFAULT_INGRESS_PORT)]
    pub ingress_port: u16,

    /// Port of the outbound ext_authz listener
    #[arg(long, env = "EGRESS_PORT", default_value_t = DEFAULT_EGRESS_PORT)]
    pub egress_port: u16,

    /// Address both listeners bind to
    #[arg(long, env = "LISTEN_ADDRESS", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub listen_address: IpAddr,

    /// Path of the PKI's CA endpoint
    #[arg(long, env = "PKI_CA_PATH", default_value = DEFAULT_CA_PATH)]
    pub pki_ca_path: String,

    /// Path of the PKI's CSR endpoint
    #[arg(long, env = "PKI_CSR_PATH", default_value = DEFAULT_CSR_PATH)]
    pub pki_csr_path: String,

    /// Directory for the cached CA, key and certificate
    #[arg(long, env = "LOCAL_CERT_PATH")]
    pub local_cert_path: Option<PathBuf>,

    /// Issuer of identity tokens; the common name if unset
    #[arg(long, env = "JWT_ISSUER")]
    pub jwt_issuer: Option<String>,

    /// Lifetime of identity tokens in seconds
    #[arg(long, env = "JWT_LIFETIME_SECONDS", default_value_t = 60)]
    pub jwt_lifetime_seconds: u64,
}

impl TranslatorArgs {
    /// Validate the settings into a [`TranslatorConfig`]
    pub fn into_config(self) -> Result<TranslatorConfig, ConfigError> {
        let pki_address = self.pki_address.trim().trim_end_matches('/').to_string();
        if pki_address.is_empty() {
            return Err(ConfigError::Missing("PKI_ADDRESS"));
        }

        let common_name = self.common_name.trim().to_string();
        if common_name.is_empty() {
            return Err(ConfigError::Missing("COMMON_NAME"));
        }

        if self.jwt_lifetime_seconds == 0 {
            return Err(ConfigError::Invalid {
                name: "JWT_LIFETIME_SECONDS",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.jwt_lifetime_seconds > MAX_TOKEN_LIFETIME_SECONDS {
            return Err(ConfigError::Invalid {
                name: "JWT_LIFETIME_SECONDS",
                message: format!("must be at most {}", MAX_TOKEN_LIFETIME_SECONDS),
            });
        }

        let issuer = match self.jwt_issuer {
            Some(issuer) if !issuer.trim().is_empty() => issuer.trim().to_string(),
            _ => common_name.clone(),
        };

        let mut pki = PkiConfig::new(pki_address, common_name);
        pki.ca_path = self.pki_ca_path;
        pki.csr_path = self.pki_csr_path;
        pki.local_cert_path = self.local_cert_path;

        let token = TokenConfig::new(issuer)
            .with_lifetime(Duration::from_secs(self.jwt_lifetime_seconds));

        Ok(TranslatorConfig {
            ingress_port: self.ingress_port,
            egress_port: self.egress_port,
            listen_address: self.listen_address,
            pki,
            token,
        })
    }
}
