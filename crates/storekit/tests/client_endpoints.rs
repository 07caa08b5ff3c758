//! End-to-end client calls against a mock App Store Server API

use std::time::Duration;

use http::StatusCode;
use pretty_assertions::assert_eq;
use rcgen::KeyPair;
use serde_json::json;
use storekit::{
    Environment, Error, ExtendReasonCode, JitterBackoff, MassExtendRenewalDateRequest,
    NotificationHistoryRequest, SigningIdentity, StoreClient, TransactionHistoryQuery,
};
use url::Url;
use wiremock::matchers::{
    body_partial_json, header, header_regex, method, path, query_param, query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn identity() -> SigningIdentity {
    let key = KeyPair::generate().unwrap();
    SigningIdentity::new(key.serialize_pem())
        .with_key_id("KEY123")
        .with_issuer("issuer-1")
        .with_bundle_id("com.example.app")
}

fn client_for(server: &MockServer) -> StoreClient {
    StoreClient::builder(identity())
        .base_url(Url::parse(&server.uri()).unwrap())
        .retry(JitterBackoff::new(
            Duration::from_millis(1),
            Duration::from_millis(4),
            2.0,
        ))
        .pagination_delay(Duration::from_millis(1))
        .build()
        .unwrap()
}

fn history_page(revision: &str, has_more: bool, transaction: &str) -> serde_json::Value {
    json!({
        "appAppleId": 1,
        "bundleId": "com.example.app",
        "environment": "Sandbox",
        "hasMore": has_more,
        "revision": revision,
        "signedTransactions": [transaction],
    })
}

#[tokio::test]
async fn test_get_transaction_info_sends_bearer_and_decodes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/inApps/v1/transactions/2000000123"))
        .and(header_regex("authorization", "^Bearer [A-Za-z0-9_-]+\\.[A-Za-z0-9_-]+\\.[A-Za-z0-9_-]+$"))
        .and(header("accept", "application/json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"signedTransactionInfo": "a.b.c"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let info = client_for(&server)
        .get_transaction_info("2000000123")
        .await
        .unwrap();
    assert_eq!(info.signed_transaction_info, "a.b.c");
}

#[tokio::test]
async fn test_bearer_token_reused_across_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/inApps/v1/lookup/MK5TTTVWJH"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": 0, "signedTransactions": ["t1", "t2"]})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let first = client.lookup_order_id("MK5TTTVWJH").await.unwrap();
    let second = client.lookup_order_id("MK5TTTVWJH").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.signed_transactions, vec!["t1", "t2"]);

    let requests = server.received_requests().await.unwrap();
    let auth: Vec<_> = requests
        .iter()
        .map(|r| r.headers.get("authorization").unwrap().clone())
        .collect();
    assert_eq!(auth[0], auth[1]);
}

#[tokio::test]
async fn test_transaction_history_follows_revision() {
    let server = MockServer::start().await;
    let base = "/inApps/v1/history/1000";
    Mock::given(method("GET"))
        .and(path(base))
        .and(query_param_is_missing("revision"))
        .and(query_param("sort", "DESCENDING"))
        .respond_with(ResponseTemplate::new(200).set_body_json(history_page("r1", true, "t1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(base))
        .and(query_param("revision", "r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(history_page("r2", true, "t2")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(base))
        .and(query_param("revision", "r2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(history_page("r3", false, "t3")))
        .expect(1)
        .mount(&server)
        .await;

    let query = TransactionHistoryQuery {
        sort: Some(storekit::SortOrder::Descending),
        ..TransactionHistoryQuery::default()
    };
    let pages = client_for(&server)
        .get_transaction_history("1000", &query)
        .await
        .unwrap();

    let transactions: Vec<_> = pages
        .iter()
        .flat_map(|page| page.signed_transactions.iter().map(String::as_str))
        .collect();
    assert_eq!(transactions, vec!["t1", "t2", "t3"]);
    assert_eq!(pages[0].environment, Environment::Sandbox);
}

#[tokio::test]
async fn test_failed_page_keeps_earlier_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/inApps/v2/refund/lookup/1000"))
        .and(query_param_is_missing("revision"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hasMore": true,
            "revision": "r1",
            "signedTransactions": ["t1"],
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/inApps/v2/refund/lookup/1000"))
        .and(query_param("revision", "r1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errorCode": 4040010,
            "errorMessage": "Transaction id not found.",
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get_refund_history("1000")
        .await
        .unwrap_err();
    assert_eq!(err.pages.len(), 1);
    assert_eq!(err.pages[0].signed_transactions, vec!["t1"]);

    let err = Error::from(err);
    assert!(matches!(err, Error::Pagination { pages_fetched: 1, .. }), "{err:?}");
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn test_notification_history_posts_filter_and_flattens() {
    let server = MockServer::start().await;
    let item = |uuid: &str| json!({"signedPayload": uuid, "sendAttempts": []});
    Mock::given(method("POST"))
        .and(path("/inApps/v1/notifications/history"))
        .and(query_param_is_missing("paginationToken"))
        .and(body_partial_json(json!({"startDate": 1, "endDate": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hasMore": true,
            "paginationToken": "p1",
            "notificationHistory": [item("n1"), item("n2")],
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/inApps/v1/notifications/history"))
        .and(query_param("paginationToken", "p1"))
        .and(body_partial_json(json!({"startDate": 1, "endDate": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hasMore": false,
            "paginationToken": "",
            "notificationHistory": [item("n3")],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = NotificationHistoryRequest {
        start_date: 1,
        end_date: 2,
        ..NotificationHistoryRequest::default()
    };
    let items = client_for(&server)
        .get_notification_history(&request)
        .await
        .unwrap();
    let payloads: Vec<_> = items.iter().map(|i| i.signed_payload.as_str()).collect();
    assert_eq!(payloads, vec!["n1", "n2", "n3"]);
}

#[tokio::test]
async fn test_api_error_body_becomes_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/inApps/v1/subscriptions/1000"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errorCode": 4000006,
            "errorMessage": "Invalid transaction id.",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get_all_subscription_statuses("1000")
        .await
        .unwrap_err();
    let Error::Api(api) = &err else {
        panic!("{err:?}");
    };
    assert_eq!(api.status, StatusCode::BAD_REQUEST);
    assert_eq!(api.error_code, 4_000_006);
    assert_eq!(api.error_message, "Invalid transaction id.");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_server_errors_retried_until_budget_spent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/inApps/v1/notifications/test/tok"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get_test_notification_status("tok")
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Http(storekit::HttpError::RetryTimeout { .. })),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_empty_rate_limited_response_keeps_its_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/inApps/v1/subscriptions/1000"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get_all_subscription_statuses("1000")
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Http(storekit::HttpError::RetryTimeout { .. })),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_empty_success_body_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/inApps/v1/transactions/1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get_transaction_info("1")
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Http(storekit::HttpError::EmptyResponseBody)),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_mass_extend_is_sent_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/inApps/v1/subscriptions/extend/mass/"))
        .and(body_partial_json(json!({"extendReasonCode": 1, "productId": "com.example.monthly"})))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let request = MassExtendRenewalDateRequest {
        request_identifier: "req-1".into(),
        extend_by_days: 7,
        extend_reason_code: ExtendReasonCode::CustomerSatisfaction,
        product_id: "com.example.monthly".into(),
        storefront_country_codes: Vec::new(),
    };
    let err = client_for(&server)
        .extend_subscription_renewal_date_for_all(&request)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
}

#[tokio::test]
async fn test_write_operations_report_status() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/inApps/v1/transactions/consumption/1000"))
        .and(body_partial_json(json!({"customerConsented": true})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let request = storekit::ConsumptionRequest {
        customer_consented: true,
        ..storekit::ConsumptionRequest::default()
    };
    let status = client_for(&server)
        .send_consumption_info("1000", &request)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/inApps/v1/notifications/test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"testNotificationToken": "tok"}))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let call = tokio::spawn({
        let client = client.clone();
        async move { client.request_test_notification().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.shutdown();

    let err = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(err.is_cancelled(), "{err:?}");
    assert!(client.is_shut_down());

    // Later calls fail without reaching the server.
    let err = client.request_test_notification().await.unwrap_err();
    assert!(err.is_cancelled(), "{err:?}");
}

#[tokio::test]
async fn test_rate_limit_shared_by_clones() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/inApps/v1/transactions/1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"signedTransactionInfo": "x"})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = StoreClient::builder(identity())
        .base_url(Url::parse(&server.uri()).unwrap())
        .requests_per_minute(2)
        .no_retry()
        .build()
        .unwrap();
    let clone = client.clone();

    client.get_transaction_info("1").await.unwrap();
    clone.get_transaction_info("1").await.unwrap();

    // The third request waits for a slot a minute away.
    let third = tokio::time::timeout(
        Duration::from_millis(200),
        client.get_transaction_info("1"),
    )
    .await;
    assert!(third.is_err());
}
