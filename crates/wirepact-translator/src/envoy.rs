//! Envoy ext_authz responses and request accessors
//!
//! Translates the handlers' decisions into `CheckResponse` values:
//!
//! | Decision | gRPC status | HTTP response |
//! |----------|-------------|---------------|
//! | no-op allow | OK | empty `OkHttpResponse` |
//! | allow with mutations | OK | `OkHttpResponse` with headers / headers_to_remove |
//! | issuance allow | OK | `OkHttpResponse` adding `x-wirepact-identity` |
//! | deny | PERMISSION_DENIED | `DeniedHttpResponse` 403 with reason body |

use envoy_types::ext_authz::v3::pb::{CheckRequest, CheckResponse};
use envoy_types::ext_authz::v3::CheckResponseExt;
use envoy_types::pb::envoy::config::core::v3::{HeaderValue, HeaderValueOption};
use envoy_types::pb::envoy::r#type::v3::{HttpStatus, StatusCode};
use envoy_types::pb::envoy::service::auth::v3::attribute_context::HttpRequest;
use envoy_types::pb::envoy::service::auth::v3::check_response::HttpResponse;
use envoy_types::pb::envoy::service::auth::v3::{DeniedHttpResponse, OkHttpResponse};
use tonic::Status;

use crate::error::TokenError;
use crate::token::{TokenCodec, TokenConfig};

/// Header carrying the WirePact identity token between translators
pub const WIREPACT_IDENTITY_HEADER: &str = "x-wirepact-identity";

/// Standard HTTP authorization header, usually removed once translated
pub const HTTP_AUTHORIZATION_HEADER: &str = "authorization";

fn ok_response(ok: OkHttpResponse) -> CheckResponse {
    let mut response = CheckResponse::with_status(Status::ok("allowed"));
    response.http_response = Some(HttpResponse::OkResponse(ok));
    response
}

fn header_option(key: &str, value: &str) -> HeaderValueOption {
    HeaderValueOption {
        header: Some(HeaderValue {
            key: key.to_string(),
            value: value.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Allow the request without touching any header
pub fn noop_ok_response() -> CheckResponse {
    ok_response(OkHttpResponse::default())
}

/// Allow the request, adding and removing the given headers
pub fn ingress_ok_response(
    headers_to_add: &[(String, String)],
    headers_to_remove: &[String],
) -> CheckResponse {
    ok_response(OkHttpResponse {
        headers: headers_to_add
            .iter()
            .map(|(key, value)| header_option(key, value))
            .collect(),
        headers_to_remove: headers_to_remove.to_vec(),
        ..Default::default()
    })
}

/// Allow the request with a freshly issued identity token for `user_id`
pub fn egress_ok_response(
    codec: &TokenCodec,
    config: &TokenConfig,
    user_id: &str,
    headers_to_remove: &[String],
) -> Result<CheckResponse, TokenError> {
    let token = codec.issue(user_id, config)?;
    Ok(ok_response(OkHttpResponse {
        headers: vec![header_option(WIREPACT_IDENTITY_HEADER, &token)],
        headers_to_remove: headers_to_remove.to_vec(),
        ..Default::default()
    }))
}

/// Deny the request with a 403 and the given reason as body
pub fn forbidden_response(reason: &str) -> CheckResponse {
    let mut response = CheckResponse::with_status(Status::permission_denied(reason));
    response.http_response = Some(HttpResponse::DeniedResponse(DeniedHttpResponse {
        status: Some(HttpStatus {
            code: StatusCode::Forbidden as i32,
        }),
        body: reason.to_string(),
        ..Default::default()
    }));
    response
}

fn http_request(request: &CheckRequest) -> Result<&HttpRequest, Status> {
    request
        .attributes
        .as_ref()
        .and_then(|a| a.request.as_ref())
        .and_then(|r| r.http.as_ref())
        .ok_or_else(|| Status::invalid_argument("check request carries no HTTP attributes"))
}

/// Value of a request header
///
/// Envoy lowercases header names; other senders may not, so the lookup falls
/// back to a case-insensitive match.
pub fn request_header(request: &CheckRequest, name: &str) -> Result<Option<String>, Status> {
    let http = http_request(request)?;
    if let Some(value) = http.headers.get(name) {
        return Ok(Some(value.clone()));
    }
    Ok(http
        .headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.clone()))
}

/// HTTP method of the checked request
pub fn request_method(request: &CheckRequest) -> Result<String, Status> {
    Ok(http_request(request)?.method.clone())
}

/// HTTP path of the checked request
pub fn request_path(request: &CheckRequest) -> Result<String, Status> {
    Ok(http_request(request)?.path.clone())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::{check_request, http_check_request};
    use tonic::Code;
    use wirepact_pki::test_support::TestAuthority;
    use wirepact_pki::KeyMaterial;

    fn ok_part(response: &CheckResponse) -> &OkHttpResponse {
        match &response.http_response {
            Some(HttpResponse::OkResponse(ok)) => ok,
            other => panic!("expected OK response, got {:?}", other),
        }
    }

    fn status_code(response: &CheckResponse) -> i32 {
        response.status.as_ref().map(|s| s.code).unwrap_or(-1)
    }

    #[test]
    fn noop_allows_without_mutations() {
        let response = noop_ok_response();

        assert_eq!(status_code(&response), Code::Ok as i32);
        let ok = ok_part(&response);
        assert!(ok.headers.is_empty());
        assert!(ok.headers_to_remove.is_empty());
    }

    #[test]
    fn ingress_response_carries_mutations() {
        let response = ingress_ok_response(
            &[("x-user-id".to_string(), "alice".to_string())],
            &[WIREPACT_IDENTITY_HEADER.to_string()],
        );

        let ok = ok_part(&response);
        let header = ok.headers[0].header.as_ref().expect("header value set");
        assert_eq!(header.key, "x-user-id");
        assert_eq!(header.value, "alice");
        assert_eq!(ok.headers_to_remove, vec![WIREPACT_IDENTITY_HEADER]);
    }

    #[test]
    fn egress_response_adds_identity_token() {
        let ca = TestAuthority::new("WirePact Test CA").expect("CA creation should succeed");
        let (key, cert) = ca
            .issue_translator_identity("translator-a")
            .expect("identity should be issued");
        let material =
            KeyMaterial::from_pem(ca.ca_cert_pem(), &key, &cert).expect("material should load");
        let codec = TokenCodec::new(Arc::new(material));

        let response = egress_ok_response(
            &codec,
            &TokenConfig::new("translator-a"),
            "alice",
            &[HTTP_AUTHORIZATION_HEADER.to_string()],
        )
        .expect("issuance should succeed");

        let ok = ok_part(&response);
        let header = ok.headers[0].header.as_ref().expect("header value set");
        assert_eq!(header.key, WIREPACT_IDENTITY_HEADER);
        assert_eq!(codec.verify(&header.value).expect("token verifies"), "alice");
        assert_eq!(ok.headers_to_remove, vec![HTTP_AUTHORIZATION_HEADER]);
    }

    #[test]
    fn forbidden_is_permission_denied_with_403() {
        let response = forbidden_response("go away");

        assert_eq!(status_code(&response), Code::PermissionDenied as i32);
        assert_eq!(
            response.status.as_ref().map(|s| s.message.as_str()),
            Some("go away")
        );
        match &response.http_response {
            Some(HttpResponse::DeniedResponse(denied)) => {
                assert_eq!(denied.body, "go away");
                assert_eq!(
                    denied.status.as_ref().map(|s| s.code),
                    Some(StatusCode::Forbidden as i32)
                );
            }
            other => panic!("expected denied response, got {:?}", other),
        }
    }

    #[test]
    fn request_accessors_read_http_attributes() {
        let request = check_request(&[("x-user-id", "alice")]);

        assert_eq!(
            request_header(&request, "x-user-id").expect("attributes present"),
            Some("alice".to_string())
        );
        assert_eq!(
            request_header(&request, "X-User-Id").expect("attributes present"),
            Some("alice".to_string())
        );
        assert_eq!(
            request_header(&request, "x-missing").expect("attributes present"),
            None
        );
        assert_eq!(request_method(&request).expect("method present"), "GET");
        assert_eq!(request_path(&request).expect("path present"), "/orders");
    }

    #[test]
    fn method_and_path_come_from_the_checked_request() {
        let request = http_check_request("POST", "/payments/42", &[]);

        assert_eq!(request_method(&request).expect("method present"), "POST");
        assert_eq!(request_path(&request).expect("path present"), "/payments/42");
    }

    #[test]
    fn missing_attributes_are_invalid_argument() {
        let request = CheckRequest::default();
        let err = request_header(&request, "x-user-id").expect_err("no attributes");
        assert_eq!(err.code(), Code::InvalidArgument);
    }
}
