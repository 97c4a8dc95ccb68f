//! Shared fixtures: header based translators, running servers and requests

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use envoy_types::ext_authz::v3::pb::CheckResponse;
use envoy_types::pb::envoy::service::auth::v3::authorization_client::AuthorizationClient;
use envoy_types::pb::envoy::service::auth::v3::check_response::HttpResponse;
use envoy_types::pb::envoy::service::auth::v3::OkHttpResponse;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tonic::async_trait;
use tonic::transport::{Channel, Endpoint};
use wirepact_pki::test_support::MockPki;
use wirepact_translator::envoy::{request_header, HTTP_AUTHORIZATION_HEADER};
pub use wirepact_translator::test_support::check_request;
use wirepact_translator::{
    CheckRequest, EgressResult, EgressTranslator, IngressResult, IngressTranslator,
    ShutdownHandle, Status, TokenConfig, TranslatorConfig, TranslatorError, TranslatorServer,
};

/// Header the test services use for the plain user id
pub const USER_HEADER: &str = "x-user-id";

/// Egress: vouches for the user in `x-user-id`, skips requests without it
pub struct HeaderEgress;

#[async_trait]
impl EgressTranslator for HeaderEgress {
    async fn translate_egress(&self, request: &CheckRequest) -> Result<EgressResult, Status> {
        match request_header(request, USER_HEADER)? {
            Some(user) => Ok(EgressResult {
                skip: false,
                user_id: user,
                headers_to_remove: vec![
                    USER_HEADER.to_string(),
                    HTTP_AUTHORIZATION_HEADER.to_string(),
                ],
            }),
            None => Ok(EgressResult::skip()),
        }
    }
}

/// Ingress: writes the verified subject into `x-user-id`
pub struct HeaderIngress;

#[async_trait]
impl IngressTranslator for HeaderIngress {
    async fn translate_ingress(
        &self,
        subject: &str,
        _request: &CheckRequest,
    ) -> Result<IngressResult, Status> {
        Ok(IngressResult {
            headers_to_add: vec![(USER_HEADER.to_string(), subject.to_string())],
            ..Default::default()
        })
    }
}

/// A translator serving on ephemeral loopback ports
pub struct RunningTranslator {
    pub ingress_addr: SocketAddr,
    pub egress_addr: SocketAddr,
    pub handle: ShutdownHandle,
    pub task: JoinHandle<Result<(), TranslatorError>>,
    _cache: TempDir,
}

impl RunningTranslator {
    /// Bootstrap against `pki` with its own empty cache and start serving
    pub async fn start(pki: &MockPki, common_name: &str) -> Self {
        let cache = tempfile::tempdir().expect("temp dir should be created");
        let mut config = TranslatorConfig::new(
            pki.config(common_name).with_local_cert_path(cache.path()),
            TokenConfig::new(common_name),
        );
        config.listen_address = IpAddr::V4(Ipv4Addr::LOCALHOST);
        config.ingress_port = 0;
        config.egress_port = 0;

        let server = TranslatorServer::bind(config, Arc::new(HeaderIngress), Arc::new(HeaderEgress))
            .await
            .expect("bind should succeed");
        let ingress_addr = server.ingress_addr();
        let egress_addr = server.egress_addr();
        let handle = server.shutdown_handle();
        let task = tokio::spawn(server.run());

        Self {
            ingress_addr,
            egress_addr,
            handle,
            task,
            _cache: cache,
        }
    }

    pub async fn ingress_client(&self) -> AuthorizationClient<Channel> {
        connect(self.ingress_addr).await
    }

    pub async fn egress_client(&self) -> AuthorizationClient<Channel> {
        connect(self.egress_addr).await
    }
}

async fn connect(addr: SocketAddr) -> AuthorizationClient<Channel> {
    let channel = Endpoint::from_shared(format!("http://{}", addr))
        .expect("endpoint address is valid")
        .connect()
        .await
        .expect("client should connect");
    AuthorizationClient::new(channel)
}

/// The OK part of a check response; panics on a denial
pub fn ok_response(response: &CheckResponse) -> &OkHttpResponse {
    match &response.http_response {
        Some(HttpResponse::OkResponse(ok)) => ok,
        other => panic!("expected OK response, got {:?}", other),
    }
}

/// Value of an added header in an OK response
pub fn added_header<'a>(ok: &'a OkHttpResponse, name: &str) -> Option<&'a str> {
    ok.headers
        .iter()
        .filter_map(|h| h.header.as_ref())
        .find(|h| h.key == name)
        .map(|h| h.value.as_str())
}
