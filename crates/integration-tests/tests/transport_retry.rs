//! Retry-stage behavior of the transport link chain.

use std::sync::atomic::Ordering;

use clementine_integration_tests::{Failure, MockApi, order_json};

use clementine_client::StorefrontClient;

async fn logged_in_client(api: &MockApi) -> StorefrontClient {
    let client = StorefrontClient::init(api.client_config()).expect("client init");
    client
        .login("ada@example.com", "hunter2")
        .await
        .expect("login");
    client
}

/// A non-retryable code gets exactly one network attempt.
#[tokio::test]
async fn non_retryable_code_is_sent_once() {
    let api = MockApi::start().await;
    let client = logged_in_client(&api).await;
    let after_login = api.state.graphql_hits.load(Ordering::Relaxed);

    api.state.push_failures(&[Failure::Code("BAD_USER_INPUT")]);

    let err = client.orders().await.expect_err("must surface immediately");
    assert!(!err.is_retryable());
    assert_eq!(
        api.state.graphql_hits.load(Ordering::Relaxed) - after_login,
        1,
        "semantic errors must not be retried"
    );
}

/// Retryable failures are reissued up to the attempt budget, then surfaced.
#[tokio::test]
async fn retryable_failures_exhaust_attempt_budget() {
    let api = MockApi::start().await;
    let client = logged_in_client(&api).await;
    let after_login = api.state.graphql_hits.load(Ordering::Relaxed);

    api.state
        .push_failures(&[Failure::Server, Failure::Server, Failure::Server]);

    client.orders().await.expect_err("retries exhausted");
    assert_eq!(
        api.state.graphql_hits.load(Ordering::Relaxed) - after_login,
        3,
        "exactly max_attempts network attempts"
    );
}

/// A transient failure followed by success is recovered internally.
#[tokio::test]
async fn transient_failure_recovers_within_budget() {
    let api = MockApi::start().await;
    let client = logged_in_client(&api).await;
    let after_login = api.state.graphql_hits.load(Ordering::Relaxed);

    api.state
        .orders
        .lock()
        .expect("orders lock")
        .push(order_json("o1", "PENDING", "PAID"));
    api.state.push_failures(&[Failure::Server]);

    let orders = client.orders().await.expect("second attempt succeeds");
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order_number, "ORD-o1");
    assert_eq!(
        api.state.graphql_hits.load(Ordering::Relaxed) - after_login,
        2
    );

    // The fetched list landed in the cache under the replace-policy root.
    let cached = client.cache().read_root("orders").expect("cached orders");
    assert_eq!(cached.as_array().expect("list").len(), 1);
}

/// `FORBIDDEN` is semantic: surfaced immediately, never retried.
#[tokio::test]
async fn forbidden_is_not_retried() {
    let api = MockApi::start().await;
    let client = logged_in_client(&api).await;
    let after_login = api.state.graphql_hits.load(Ordering::Relaxed);

    api.state.push_failures(&[Failure::Code("FORBIDDEN")]);

    client.orders().await.expect_err("forbidden surfaces");
    assert_eq!(
        api.state.graphql_hits.load(Ordering::Relaxed) - after_login,
        1
    );
}
