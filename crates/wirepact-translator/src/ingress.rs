//! Inbound check handler
//!
//! Envoy calls this service for traffic entering the node. A request without
//! `x-wirepact-identity` passes untouched. Otherwise the token is verified, the
//! subject handed to the [`IngressTranslator`], and the token header removed
//! so it never reaches the destination.

use std::sync::Arc;

use envoy_types::ext_authz::v3::pb::{
    Authorization, AuthorizationServer, CheckRequest, CheckResponse,
};
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

use crate::envoy::{
    ingress_ok_response, noop_ok_response, request_header, WIREPACT_IDENTITY_HEADER,
};
use crate::token::TokenCodec;
use crate::translation::IngressTranslator;

/// ext_authz service for inbound traffic
pub struct IngressService {
    codec: TokenCodec,
    translator: Arc<dyn IngressTranslator>,
}

impl IngressService {
    /// Create an ingress service verifying with `codec`
    pub fn new(codec: TokenCodec, translator: Arc<dyn IngressTranslator>) -> Self {
        Self { codec, translator }
    }

    /// Wrap the service for a tonic router
    pub fn into_service(self) -> AuthorizationServer<Self> {
        AuthorizationServer::new(self)
    }

    async fn do_check(&self, request: &CheckRequest) -> Result<CheckResponse, Status> {
        let Some(token) = request_header(request, WIREPACT_IDENTITY_HEADER)? else {
            debug!("No identity header, passing through");
            return Ok(noop_ok_response());
        };

        let subject = self.codec.verify(&token).map_err(|e| {
            warn!(error = %e, "Rejected inbound identity token");
            Status::from(e)
        })?;

        let result = self
            .translator
            .translate_ingress(&subject, request)
            .await
            .map_err(|status| {
                warn!(subject = %subject, error = %status, "Ingress translation failed");
                status
            })?;

        if result.skip {
            debug!(subject = %subject, "Ingress translation skipped");
            return Ok(noop_ok_response());
        }

        let mut headers_to_remove = result.headers_to_remove;
        if !headers_to_remove
            .iter()
            .any(|h| h.eq_ignore_ascii_case(WIREPACT_IDENTITY_HEADER))
        {
            headers_to_remove.push(WIREPACT_IDENTITY_HEADER.to_string());
        }

        debug!(subject = %subject, "Inbound identity translated");
        Ok(ingress_ok_response(&result.headers_to_add, &headers_to_remove))
    }
}

#[tonic::async_trait]
impl Authorization for IngressService {
    async fn check(
        &self,
        request: Request<CheckRequest>,
    ) -> std::result::Result<Response<CheckResponse>, Status> {
        let check_request = request.into_inner();
        self.do_check(&check_request).await.map(Response::new)
    }
}
