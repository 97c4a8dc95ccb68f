//! Check request fixtures for translator tests
//!
//! Enabled with the `test-support` feature.

use std::collections::HashMap;

use envoy_types::ext_authz::v3::pb::CheckRequest;
use envoy_types::pb::envoy::service::auth::v3::attribute_context::{HttpRequest, Request};
use envoy_types::pb::envoy::service::auth::v3::AttributeContext;

/// A `GET /orders` check request carrying the given headers
pub fn check_request(headers: &[(&str, &str)]) -> CheckRequest {
    http_check_request("GET", "/orders", headers)
}

/// A check request for `method` and `path` carrying the given headers
pub fn http_check_request(method: &str, path: &str, headers: &[(&str, &str)]) -> CheckRequest {
    let headers: HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    CheckRequest {
        attributes: Some(AttributeContext {
            request: Some(Request {
                http: Some(HttpRequest {
                    method: method.to_string(),
                    path: path.to_string(),
                    headers,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
