//! Loyalty points tests.

mod common;

use common::TestApp;
use serde_json::{json, Value};

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn points_require_loyalty_feature() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;
    let card_id = app.create_card(user_id, 10, 20).await;
    let base = format!("/cards/{}/points", card_id);

    let balance = app.get(&base, user_id).await;
    assert_eq!(balance.status(), 403);
    let error: Value = balance.json().await.expect("Failed to parse error");
    assert_eq!(error["error"], "Feature requires an active subscription");

    let adjust = app
        .post(&format!("{}/adjust", base), user_id, json!({ "points": 10 }))
        .await;
    assert_eq!(adjust.status(), 403);

    let redeem = app
        .post(&format!("{}/redeem", base), user_id, json!({ "points": 1 }))
        .await;
    assert_eq!(redeem.status(), 403);

    // Someone else's card is not found, whatever their plan.
    let stranger = app.create_user("Bruno").await;
    app.make_premium(stranger).await;
    let foreign = app.get(&base, stranger).await;
    assert_eq!(foreign.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn redeem_and_adjust_respect_the_balance() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;
    app.make_premium(user_id).await;
    let card_id = app.create_card(user_id, 10, 20).await;
    let base = format!("/cards/{}/points", card_id);
    let adjust = format!("{}/adjust", base);
    let redeem = format!("{}/redeem", base);

    let nothing_to_redeem = app.post(&redeem, user_id, json!({ "points": 1 })).await;
    assert_eq!(nothing_to_redeem.status(), 400);

    let zero = app.post(&adjust, user_id, json!({ "points": 0 })).await;
    assert_eq!(zero.status(), 400);

    let credited = app
        .post(
            &adjust,
            user_id,
            json!({ "points": 100, "description": "Welcome bonus" }),
        )
        .await;
    assert_eq!(credited.status(), 201);
    let body: Value = credited.json().await.expect("Failed to parse entry");
    assert_eq!(body["balance"], 100);
    assert_eq!(body["entry"]["reason"], "adjustment");

    let too_many = app.post(&redeem, user_id, json!({ "points": 150 })).await;
    assert_eq!(too_many.status(), 400);

    let non_positive = app.post(&redeem, user_id, json!({ "points": 0 })).await;
    assert_eq!(non_positive.status(), 400);

    let redeemed = app.post(&redeem, user_id, json!({ "points": 40 })).await;
    assert_eq!(redeemed.status(), 201);
    let body: Value = redeemed.json().await.expect("Failed to parse entry");
    assert_eq!(body["balance"], 60);
    assert_eq!(body["entry"]["points"], -40);

    let overdraw = app.post(&adjust, user_id, json!({ "points": -61 })).await;
    assert_eq!(overdraw.status(), 400);

    let points: Value = app
        .get(&base, user_id)
        .await
        .json()
        .await
        .expect("Failed to parse points");
    assert_eq!(points["balance"], 60);
    assert_eq!(points["entries"].as_array().map(Vec::len), Some(2));

    app.cleanup().await;
}
