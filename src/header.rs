//! Header based reference translation
//!
//! Egress vouches for whoever the calling service names in the user id header
//! and strips that header together with `authorization`. Ingress writes the
//! verified subject back into the same header for the destination service.

use async_trait::async_trait;
use tracing::debug;

use wirepact_translator::envoy::{request_header, HTTP_AUTHORIZATION_HEADER};
use wirepact_translator::{
    CheckRequest, EgressResult, EgressTranslator, IngressResult, IngressTranslator, Status,
};

/// Default header carrying the plain user id
pub const DEFAULT_USER_ID_HEADER: &str = "x-user-id";

/// Maps a plain user id header to WirePact identities and back
#[derive(Debug, Clone)]
pub struct HeaderTranslator {
    header: String,
}

impl HeaderTranslator {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
        }
    }
}

#[async_trait]
impl EgressTranslator for HeaderTranslator {
    async fn translate_egress(&self, request: &CheckRequest) -> Result<EgressResult, Status> {
        let Some(user_id) = request_header(request, &self.header)? else {
            debug!(header = %self.header, "No user id header, skipping");
            return Ok(EgressResult::skip());
        };

        Ok(EgressResult {
            skip: false,
            user_id,
            headers_to_remove: vec![self.header.clone(), HTTP_AUTHORIZATION_HEADER.to_string()],
        })
    }
}

#[async_trait]
impl IngressTranslator for HeaderTranslator {
    async fn translate_ingress(
        &self,
        subject: &str,
        _request: &CheckRequest,
    ) -> Result<IngressResult, Status> {
        Ok(IngressResult {
            headers_to_add: vec![(self.header.clone(), subject.to_string())],
            ..Default::default()
        })
    }
}
