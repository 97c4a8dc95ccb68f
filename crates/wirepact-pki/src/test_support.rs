//! In-process certificate authority and mock PKI for tests
//!
//! The translator is only ever a client of a PKI. These helpers stand in for
//! the real one: [`TestAuthority`] signs CSRs the way the WirePact PKI does and
//! [`MockPki`] serves it over HTTP on an ephemeral port.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DistinguishedName,
    DnType, DnValue, IsCa, Issuer, KeyPair, KeyUsagePurpose,
};
use tokio::task::JoinHandle;

use crate::config::{PkiConfig, DEFAULT_CA_PATH, DEFAULT_CSR_PATH};
use crate::csr::CertificateRequest;
use crate::error::{PkiError, Result};
use crate::verify::parse_pem;

/// Certificate authority for signing translator CSRs in tests
#[derive(Clone)]
pub struct TestAuthority {
    /// CA key pair serialized as PEM (KeyPair isn't Clone)
    ca_key_pem: String,
    /// PEM-encoded CA certificate
    ca_cert_pem: String,
}

impl TestAuthority {
    /// Create a new self-signed CA
    pub fn new(common_name: &str) -> Result<Self> {
        let key_pair = KeyPair::generate().map_err(|e| {
            PkiError::KeyGenerationFailed(format!("failed to generate CA key: {}", e))
        })?;
        let params = ca_params(common_name);
        let cert = params.self_signed(&key_pair).map_err(|e| {
            PkiError::CsrGenerationFailed(format!("failed to create CA cert: {}", e))
        })?;

        Ok(Self {
            ca_key_pem: key_pair.serialize_pem(),
            ca_cert_pem: cert.pem(),
        })
    }

    /// The CA certificate in PEM format
    pub fn ca_cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// The CA certificate in DER format
    pub fn ca_cert_der(&self) -> Vec<u8> {
        parse_pem(&self.ca_cert_pem).unwrap_or_default()
    }

    fn load_key_pair(&self) -> Result<KeyPair> {
        KeyPair::from_pem(&self.ca_key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to load CA key: {}", e)))
    }

    /// Sign a CSR, keeping the subject the translator asked for
    pub fn sign_csr(&self, csr_pem: &str) -> Result<String> {
        let mut csr_params = CertificateSigningRequestParams::from_pem(csr_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to parse CSR: {}", e)))?;

        csr_params.params.is_ca = IsCa::NoCa;
        csr_params.params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];

        let ca_key = self.load_key_pair()?;
        let issuer = Issuer::from_ca_cert_pem(&self.ca_cert_pem, &ca_key)
            .map_err(|e| PkiError::ParseError(format!("failed to create issuer: {}", e)))?;

        let signed = csr_params.signed_by(&issuer).map_err(|e| {
            PkiError::CsrGenerationFailed(format!("failed to sign certificate: {}", e))
        })?;
        Ok(signed.pem())
    }

    /// Sign a CSR with a validity window that already ended
    pub fn sign_csr_expired(&self, csr_pem: &str) -> Result<String> {
        let mut csr_params = CertificateSigningRequestParams::from_pem(csr_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to parse CSR: {}", e)))?;

        let now = ::time::OffsetDateTime::now_utc();
        csr_params.params.not_before = now - ::time::Duration::days(30);
        csr_params.params.not_after = now - ::time::Duration::days(1);

        let ca_key = self.load_key_pair()?;
        let issuer = Issuer::from_ca_cert_pem(&self.ca_cert_pem, &ca_key)
            .map_err(|e| PkiError::ParseError(format!("failed to create issuer: {}", e)))?;

        let signed = csr_params.signed_by(&issuer).map_err(|e| {
            PkiError::CsrGenerationFailed(format!("failed to sign certificate: {}", e))
        })?;
        Ok(signed.pem())
    }

    /// Issue an intermediate CA signed by this CA
    pub fn issue_intermediate(&self, common_name: &str) -> Result<TestAuthority> {
        let key_pair = KeyPair::generate().map_err(|e| {
            PkiError::KeyGenerationFailed(format!("failed to generate intermediate key: {}", e))
        })?;

        let ca_key = self.load_key_pair()?;
        let issuer = Issuer::from_ca_cert_pem(&self.ca_cert_pem, &ca_key)
            .map_err(|e| PkiError::ParseError(format!("failed to create issuer: {}", e)))?;

        let cert = ca_params(common_name)
            .signed_by(&key_pair, &issuer)
            .map_err(|e| {
                PkiError::CsrGenerationFailed(format!("failed to sign intermediate: {}", e))
            })?;

        Ok(TestAuthority {
            ca_key_pem: key_pair.serialize_pem(),
            ca_cert_pem: cert.pem(),
        })
    }

    /// Generate a translator key and a certificate for it, as `(key_pem, cert_pem)`
    pub fn issue_translator_identity(&self, common_name: &str) -> Result<(String, String)> {
        let request = CertificateRequest::generate(common_name)?;
        let cert_pem = self.sign_csr(request.csr_pem())?;
        Ok((request.private_key_pem().to_string(), cert_pem))
    }
}

fn ca_params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String("WirePact PKI".to_string()),
    );
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params
}

struct MockPkiState {
    authority: TestAuthority,
    ca_body: String,
    csr_body: Option<String>,
    ca_requests: AtomicUsize,
    csr_requests: AtomicUsize,
}

/// A PKI served over HTTP on `127.0.0.1` with an ephemeral port
pub struct MockPki {
    addr: SocketAddr,
    state: Arc<MockPkiState>,
    handle: JoinHandle<()>,
}

impl MockPki {
    /// Serve `authority` under the default `/ca` and `/csr` paths
    pub async fn start(authority: TestAuthority) -> std::io::Result<Self> {
        let ca_body = authority.ca_cert_pem().to_string();
        Self::start_with_ca_body(authority, ca_body).await
    }

    /// Serve `authority`, but answer CA requests with an arbitrary body
    pub async fn start_with_ca_body(
        authority: TestAuthority,
        ca_body: String,
    ) -> std::io::Result<Self> {
        Self::serve(authority, ca_body, None).await
    }

    /// Serve `authority`, but answer every CSR with an arbitrary body
    pub async fn start_with_csr_body(
        authority: TestAuthority,
        csr_body: String,
    ) -> std::io::Result<Self> {
        let ca_body = authority.ca_cert_pem().to_string();
        Self::serve(authority, ca_body, Some(csr_body)).await
    }

    async fn serve(
        authority: TestAuthority,
        ca_body: String,
        csr_body: Option<String>,
    ) -> std::io::Result<Self> {
        let state = Arc::new(MockPkiState {
            authority,
            ca_body,
            csr_body,
            ca_requests: AtomicUsize::new(0),
            csr_requests: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route(DEFAULT_CA_PATH, get(serve_ca))
            .route(DEFAULT_CSR_PATH, post(sign_csr))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "mock PKI stopped");
            }
        });

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    /// Base address to put into [`PkiConfig::base_address`]
    pub fn base_address(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// A [`PkiConfig`] pointing at this PKI
    pub fn config(&self, common_name: &str) -> PkiConfig {
        PkiConfig::new(self.base_address(), common_name)
    }

    /// The authority behind this PKI
    pub fn authority(&self) -> &TestAuthority {
        &self.state.authority
    }

    /// Number of CA requests served so far
    pub fn ca_requests(&self) -> usize {
        self.state.ca_requests.load(Ordering::SeqCst)
    }

    /// Number of CSR requests served so far
    pub fn csr_requests(&self) -> usize {
        self.state.csr_requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockPki {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_ca(State(state): State<Arc<MockPkiState>>) -> String {
    state.ca_requests.fetch_add(1, Ordering::SeqCst);
    state.ca_body.clone()
}

async fn sign_csr(
    State(state): State<Arc<MockPkiState>>,
    body: String,
) -> std::result::Result<String, (StatusCode, String)> {
    state.csr_requests.fetch_add(1, Ordering::SeqCst);
    if let Some(body) = &state.csr_body {
        return Ok(body.clone());
    }
    state
        .authority
        .sign_csr(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}
