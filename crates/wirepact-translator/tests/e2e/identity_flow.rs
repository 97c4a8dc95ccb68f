//! Identity travelling from one translator's egress to another's ingress

use envoy_types::pb::envoy::service::auth::v3::check_response::HttpResponse;
use tonic::Code;
use wirepact_pki::test_support::{MockPki, TestAuthority};
use wirepact_translator::envoy::{HTTP_AUTHORIZATION_HEADER, WIREPACT_IDENTITY_HEADER};

use super::helpers::{added_header, check_request, ok_response, RunningTranslator, USER_HEADER};

async fn start_pki() -> MockPki {
    let authority = TestAuthority::new("WirePact Test CA").expect("CA creation should succeed");
    MockPki::start(authority).await.expect("mock PKI should start")
}

/// Story: alice calls from service A to service B through two translators
#[tokio::test]
async fn story_identity_crosses_the_mesh() {
    let pki = start_pki().await;
    let sender = RunningTranslator::start(&pki, "translator-a").await;
    let receiver = RunningTranslator::start(&pki, "translator-b").await;

    // Chapter 1: sender's egress vouches for alice
    let egress = sender
        .egress_client()
        .await
        .check(check_request(&[
            (USER_HEADER, "alice"),
            (HTTP_AUTHORIZATION_HEADER, "Basic YWxpY2U6c2VjcmV0"),
        ]))
        .await
        .expect("egress check should succeed")
        .into_inner();

    let ok = ok_response(&egress);
    let token = added_header(ok, WIREPACT_IDENTITY_HEADER)
        .expect("identity token should be added")
        .to_string();
    assert!(ok.headers_to_remove.contains(&USER_HEADER.to_string()));
    assert!(ok
        .headers_to_remove
        .contains(&HTTP_AUTHORIZATION_HEADER.to_string()));

    // Chapter 2: receiver's ingress verifies it and restores the user header
    let ingress = receiver
        .ingress_client()
        .await
        .check(check_request(&[(WIREPACT_IDENTITY_HEADER, token.as_str())]))
        .await
        .expect("ingress check should succeed")
        .into_inner();

    let ok = ok_response(&ingress);
    assert_eq!(added_header(ok, USER_HEADER), Some("alice"));
    assert!(ok
        .headers_to_remove
        .contains(&WIREPACT_IDENTITY_HEADER.to_string()));

    // Both bootstrapped once and never called the PKI per request
    assert_eq!(pki.ca_requests(), 2);
    assert_eq!(pki.csr_requests(), 2);
}

#[tokio::test]
async fn concurrent_checks_keep_identities_apart() {
    let pki = start_pki().await;
    let node = RunningTranslator::start(&pki, "translator-a").await;

    let issue = |user: &'static str| {
        let client = node.egress_client();
        async move {
            let response = client
                .await
                .check(check_request(&[(USER_HEADER, user)]))
                .await
                .expect("egress check should succeed")
                .into_inner();
            added_header(ok_response(&response), WIREPACT_IDENTITY_HEADER)
                .expect("identity token should be added")
                .to_string()
        }
    };
    let (alice_token, bob_token) = tokio::join!(issue("alice"), issue("bob"));

    let verify = |token: String| {
        let client = node.ingress_client();
        async move {
            let response = client
                .await
                .check(check_request(&[(WIREPACT_IDENTITY_HEADER, token.as_str())]))
                .await
                .expect("ingress check should succeed")
                .into_inner();
            added_header(ok_response(&response), USER_HEADER).map(str::to_string)
        }
    };
    let (alice, bob) = tokio::join!(verify(alice_token), verify(bob_token));

    assert_eq!(alice.as_deref(), Some("alice"));
    assert_eq!(bob.as_deref(), Some("bob"));
}

#[tokio::test]
async fn token_from_another_mesh_is_unauthenticated() {
    let ours = start_pki().await;
    let theirs = start_pki().await;
    let receiver = RunningTranslator::start(&ours, "translator-a").await;
    let foreign = RunningTranslator::start(&theirs, "translator-x").await;

    let egress = foreign
        .egress_client()
        .await
        .check(check_request(&[(USER_HEADER, "mallory")]))
        .await
        .expect("egress check should succeed")
        .into_inner();
    let token = added_header(ok_response(&egress), WIREPACT_IDENTITY_HEADER)
        .expect("identity token should be added")
        .to_string();

    let status = receiver
        .ingress_client()
        .await
        .check(check_request(&[(WIREPACT_IDENTITY_HEADER, token.as_str())]))
        .await
        .expect_err("foreign token must be rejected");

    assert_eq!(status.code(), Code::Unauthenticated);
}

#[tokio::test]
async fn requests_without_identity_pass_both_ways() {
    let pki = start_pki().await;
    let node = RunningTranslator::start(&pki, "translator-a").await;

    let egress = node
        .egress_client()
        .await
        .check(check_request(&[]))
        .await
        .expect("egress check should succeed")
        .into_inner();
    let ok = ok_response(&egress);
    assert!(ok.headers.is_empty());

    let ingress = node
        .ingress_client()
        .await
        .check(check_request(&[("x-other", "value")]))
        .await
        .expect("ingress check should succeed")
        .into_inner();
    let ok = ok_response(&ingress);
    assert!(ok.headers.is_empty());
    assert!(ok.headers_to_remove.is_empty());
}

#[tokio::test]
async fn empty_user_is_forbidden() {
    let pki = start_pki().await;
    let node = RunningTranslator::start(&pki, "translator-a").await;

    let response = node
        .egress_client()
        .await
        .check(check_request(&[(USER_HEADER, "")]))
        .await
        .expect("a deny is a successful check")
        .into_inner();

    assert_eq!(
        response.status.as_ref().map(|s| s.code),
        Some(Code::PermissionDenied as i32)
    );
    match response.http_response {
        Some(HttpResponse::DeniedResponse(denied)) => {
            assert_eq!(denied.status.map(|s| s.code), Some(403));
        }
        other => panic!("expected denied response, got {:?}", other),
    }
}
