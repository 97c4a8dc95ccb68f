//! Starting and stopping translators

use std::time::Duration;

use wirepact_pki::test_support::{MockPki, TestAuthority};

use super::helpers::{check_request, RunningTranslator};

#[tokio::test]
async fn stop_drains_and_returns_ok() {
    let authority = TestAuthority::new("WirePact Test CA").expect("CA creation should succeed");
    let pki = MockPki::start(authority).await.expect("mock PKI should start");
    let node = RunningTranslator::start(&pki, "translator-a").await;

    // Serving before the stop
    node.egress_client()
        .await
        .check(check_request(&[]))
        .await
        .expect("egress check should succeed");

    node.handle.stop();
    let result = tokio::time::timeout(Duration::from_secs(30), node.task)
        .await
        .expect("run should return after stop")
        .expect("server task should not panic");

    assert!(result.is_ok());
}

#[tokio::test]
async fn broken_pki_never_serves() {
    let authority = TestAuthority::new("WirePact Test CA").expect("CA creation should succeed");
    let pki = MockPki::start_with_ca_body(authority, "not a certificate".to_string())
        .await
        .expect("mock PKI should start");
    let node = RunningTranslator::start(&pki, "translator-a").await;

    let result = tokio::time::timeout(Duration::from_secs(30), node.task)
        .await
        .expect("run should fail fast")
        .expect("server task should not panic");

    assert!(result.is_err());
    assert_eq!(pki.csr_requests(), 0);
}
