//! Subscription sync and entitlement tests.

mod common;

use common::{TestApp, INTERNAL_API_KEY};
use reqwest::Method;
use serde_json::{json, Value};

fn premium() -> Value {
    json!({
        "plan_tier": "premium",
        "status": "active",
        "external_customer_id": "cus_123",
        "external_subscription_id": "sub_123",
    })
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn internal_endpoints_require_the_internal_key() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;

    let missing = app
        .internal_subscription(Method::PUT, user_id, None, Some(premium()))
        .await;
    assert_eq!(missing.status(), 401);

    let wrong = app
        .internal_subscription(Method::PUT, user_id, Some("not-the-key"), Some(premium()))
        .await;
    assert_eq!(wrong.status(), 401);

    let cancel = app
        .internal_subscription(Method::DELETE, user_id, Some("not-the-key"), None)
        .await;
    assert_eq!(cancel.status(), 401);

    // The user header is not a substitute for the key.
    let as_user = app.put(&format!("/internal/subscriptions/{}", user_id), user_id, premium()).await;
    assert_eq!(as_user.status(), 401);

    let view: Value = app
        .get("/subscription", user_id)
        .await
        .json()
        .await
        .expect("Failed to parse subscription");
    assert!(view["subscription"].is_null());
    assert_eq!(view["entitlements"]["tier"], "free");

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn sync_grants_and_cancel_revokes_features() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;

    let synced = app
        .internal_subscription(Method::PUT, user_id, Some(INTERNAL_API_KEY), Some(premium()))
        .await;
    assert_eq!(synced.status(), 200);
    let row: Value = synced.json().await.expect("Failed to parse subscription");
    assert_eq!(row["plan_tier"], "premium");
    assert_eq!(row["status"], "active");

    let view: Value = app
        .get("/subscription", user_id)
        .await
        .json()
        .await
        .expect("Failed to parse subscription");
    assert_eq!(view["entitlements"]["tier"], "premium");
    assert!(view["entitlements"]["card_limit"].is_null());
    assert_eq!(view["entitlements"]["features"].as_array().map(Vec::len), Some(3));

    let canceled = app
        .internal_subscription(Method::DELETE, user_id, Some(INTERNAL_API_KEY), None)
        .await;
    assert_eq!(canceled.status(), 200);
    let row: Value = canceled.json().await.expect("Failed to parse subscription");
    assert_eq!(row["status"], "canceled");
    assert_eq!(row["external_subscription_id"], "sub_123");

    let view: Value = app
        .get("/subscription", user_id)
        .await
        .json()
        .await
        .expect("Failed to parse subscription");
    assert_eq!(view["subscription"]["status"], "canceled");
    assert_eq!(view["entitlements"]["tier"], "free");
    assert_eq!(view["entitlements"]["card_limit"], 2);
    assert_eq!(view["entitlements"]["features"], json!([]));

    // Back on the free tier, gated features are refused again.
    let card_id = app.create_card(user_id, 10, 20).await;
    let points = app
        .get(&format!("/cards/{}/points", card_id), user_id)
        .await;
    assert_eq!(points.status(), 403);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn unknown_users_and_missing_rows_are_not_found() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;

    let no_row = app
        .internal_subscription(Method::DELETE, user_id, Some(INTERNAL_API_KEY), None)
        .await;
    assert_eq!(no_row.status(), 404);

    let unknown = app
        .internal_subscription(
            Method::PUT,
            uuid::Uuid::new_v4(),
            Some(INTERNAL_API_KEY),
            Some(premium()),
        )
        .await;
    assert_eq!(unknown.status(), 404);

    let lapsed = app
        .internal_subscription(
            Method::PUT,
            user_id,
            Some(INTERNAL_API_KEY),
            Some(json!({
                "plan_tier": "family",
                "status": "active",
                "current_period_end": "2020-01-01T00:00:00Z",
            })),
        )
        .await;
    assert_eq!(lapsed.status(), 200);
    let view: Value = app
        .get("/subscription", user_id)
        .await
        .json()
        .await
        .expect("Failed to parse subscription");
    assert_eq!(view["entitlements"]["tier"], "free");

    app.cleanup().await;
}
