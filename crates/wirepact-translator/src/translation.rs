//! Integrator-supplied translation logic
//!
//! The translator core decides nothing about proprietary credentials. On
//! egress an [`EgressTranslator`] maps the outgoing request to a user id; on
//! ingress an [`IngressTranslator`] maps the verified user id back to whatever
//! headers the destination expects.

use async_trait::async_trait;
use envoy_types::ext_authz::v3::pb::CheckRequest;
use tonic::Status;

#[cfg(test)]
use mockall::automock;

/// Outcome of translating an inbound request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngressResult {
    /// Let the request pass untouched
    pub skip: bool,
    /// Headers to add to the request, as `(name, value)`
    pub headers_to_add: Vec<(String, String)>,
    /// Header names to remove from the request
    pub headers_to_remove: Vec<String>,
}

impl IngressResult {
    /// A result that leaves the request untouched
    pub fn skip() -> Self {
        Self {
            skip: true,
            ..Default::default()
        }
    }
}

/// Outcome of translating an outbound request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EgressResult {
    /// Let the request pass untouched
    pub skip: bool,
    /// Identity to vouch for; empty denies the request
    pub user_id: String,
    /// Header names to remove from the request
    pub headers_to_remove: Vec<String>,
}

impl EgressResult {
    /// A result that leaves the request untouched
    pub fn skip() -> Self {
        Self {
            skip: true,
            ..Default::default()
        }
    }

    /// A result vouching for `user_id`
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

/// Translates a verified identity into headers for the destination
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IngressTranslator: Send + Sync {
    /// Called with the verified subject of an inbound identity token
    ///
    /// An error is reported to Envoy for this request only.
    async fn translate_ingress(
        &self,
        subject: &str,
        request: &CheckRequest,
    ) -> Result<IngressResult, Status>;
}

/// Extracts the identity to vouch for from an outbound request
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EgressTranslator: Send + Sync {
    /// Called for every outbound request
    async fn translate_egress(&self, request: &CheckRequest) -> Result<EgressResult, Status>;
}
