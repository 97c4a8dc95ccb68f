//! Outbound check handler
//!
//! Envoy calls this service for traffic leaving the node. The
//! [`EgressTranslator`] names the user behind the request; this node then
//! vouches for that user with a signed identity token. Without a user id the
//! request is denied.

use std::sync::Arc;

use envoy_types::ext_authz::v3::pb::{
    Authorization, AuthorizationServer, CheckRequest, CheckResponse,
};
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

use crate::envoy::{egress_ok_response, forbidden_response, noop_ok_response};
use crate::token::{TokenCodec, TokenConfig};
use crate::translation::EgressTranslator;

/// Deny reason when the translator finds no user
pub const MISSING_USER_REASON: &str = "No UserID given for outbound communication.";

/// ext_authz service for outbound traffic
pub struct EgressService {
    codec: TokenCodec,
    config: TokenConfig,
    translator: Arc<dyn EgressTranslator>,
}

impl EgressService {
    /// Create an egress service issuing tokens with `codec` and `config`
    pub fn new(
        codec: TokenCodec,
        config: TokenConfig,
        translator: Arc<dyn EgressTranslator>,
    ) -> Self {
        Self {
            codec,
            config,
            translator,
        }
    }

    /// Wrap the service for a tonic router
    pub fn into_service(self) -> AuthorizationServer<Self> {
        AuthorizationServer::new(self)
    }

    async fn do_check(&self, request: &CheckRequest) -> Result<CheckResponse, Status> {
        let result = self
            .translator
            .translate_egress(request)
            .await
            .map_err(|status| {
                warn!(error = %status, "Egress translation failed");
                status
            })?;

        if result.skip {
            debug!("Egress translation skipped");
            return Ok(noop_ok_response());
        }

        if result.user_id.is_empty() {
            debug!("Egress translation found no user, denying");
            return Ok(forbidden_response(MISSING_USER_REASON));
        }

        egress_ok_response(
            &self.codec,
            &self.config,
            &result.user_id,
            &result.headers_to_remove,
        )
        .map_err(|e| {
            warn!(user_id = %result.user_id, error = %e, "Failed to issue identity token");
            Status::from(e)
        })
    }
}

#[tonic::async_trait]
impl Authorization for EgressService {
    async fn check(
        &self,
        request: Request<CheckRequest>,
    ) -> std::result::Result<Response<CheckResponse>, Status> {
        let check_request = request.into_inner();
        self.do_check(&check_request).await.map(Response::new)
    }
}
