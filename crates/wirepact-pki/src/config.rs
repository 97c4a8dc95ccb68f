//! PKI location and local cache configuration

use std::path::{Path, PathBuf};

/// Default path of the CA endpoint on the PKI
pub const DEFAULT_CA_PATH: &str = "/ca";

/// Default path of the CSR endpoint on the PKI
pub const DEFAULT_CSR_PATH: &str = "/csr";

/// Cache file holding the PKI's CA certificate
pub const CA_FILENAME: &str = "ca.crt";

/// Cache file holding the certificate issued for this node
pub const CERT_FILENAME: &str = "cert.crt";

/// Cache file holding this node's private key
pub const KEY_FILENAME: &str = "cert.key";

/// Where to find the PKI and where to keep the fetched key material
#[derive(Debug, Clone)]
pub struct PkiConfig {
    /// Base address (URI) of the PKI, e.g. `http://wirepact-pki:8080`
    pub base_address: String,
    /// Path of the CA endpoint (HTTP GET)
    pub ca_path: String,
    /// Path of the CSR endpoint (HTTP POST)
    pub csr_path: String,
    /// Directory for the key material cache; the working directory if unset
    pub local_cert_path: Option<PathBuf>,
    /// Common name requested in the CSR
    pub common_name: String,
}

impl PkiConfig {
    /// Create a config with the default endpoint paths and no cache directory
    pub fn new(base_address: impl Into<String>, common_name: impl Into<String>) -> Self {
        Self {
            base_address: base_address.into(),
            ca_path: DEFAULT_CA_PATH.to_string(),
            csr_path: DEFAULT_CSR_PATH.to_string(),
            local_cert_path: None,
            common_name: common_name.into(),
        }
    }

    /// Store the key material cache in the given directory
    pub fn with_local_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_cert_path = Some(path.into());
        self
    }

    /// Full URL of the CA endpoint
    pub fn ca_address(&self) -> String {
        format!("{}{}", self.base_address, self.ca_path)
    }

    /// Full URL of the CSR endpoint
    pub fn csr_address(&self) -> String {
        format!("{}{}", self.base_address, self.csr_path)
    }

    /// Location of a cache file
    pub fn file_path(&self, filename: &str) -> PathBuf {
        match &self.local_cert_path {
            Some(dir) => dir.join(filename),
            None => Path::new(filename).to_path_buf(),
        }
    }
}
