//! Card, statement and payment flow tests.

mod common;

use common::{decimal_field, id_field, TestApp};
use serde_json::{json, Value};

async fn expense(app: &TestApp, user_id: uuid::Uuid, card_id: uuid::Uuid, amount: &str, on: &str) -> Value {
    let response = app
        .post(
            "/charges",
            user_id,
            json!({
                "description": "Compra",
                "amount": amount,
                "kind": "expense",
                "occurred_on": on,
                "card_id": card_id,
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    response.json().await.expect("Failed to parse charge")
}

async fn statement(app: &TestApp, user_id: uuid::Uuid, card_id: uuid::Uuid, month: &str) -> Value {
    let response = app
        .get(&format!("/cards/{}/statements/{}", card_id, month), user_id)
        .await;
    assert_eq!(response.status(), 200);
    response.json().await.expect("Failed to parse statement")
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn purchases_land_on_statement_by_closing_day() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;
    let card_id = app.create_card(user_id, 10, 20).await;

    let on_closing = expense(&app, user_id, card_id, "100.00", "2026-03-10").await;
    let after_closing = expense(&app, user_id, card_id, "40.00", "2026-03-11").await;

    let march = statement(&app, user_id, card_id, "2026-03").await;
    let april = statement(&app, user_id, card_id, "2026-04").await;

    assert_eq!(on_closing["statement_id"], march["statement_id"]);
    assert_eq!(after_closing["statement_id"], april["statement_id"]);
    assert_eq!(decimal_field(&march, "total"), "100.00");
    assert_eq!(decimal_field(&april, "total"), "40.00");
    assert_eq!(march["closing_date"], "2026-03-10");
    assert_eq!(march["due_date"], "2026-03-20");
    assert_eq!(march["charges"].as_array().map(Vec::len), Some(1));

    let card: Value = app
        .get(&format!("/cards/{}", card_id), user_id)
        .await
        .json()
        .await
        .expect("Failed to parse card");
    assert_eq!(decimal_field(&card, "used_limit"), "140.00");
    assert_eq!(decimal_field(&card, "available_limit"), "4860.00");

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn statement_dates_clamp_in_short_months() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;
    let card_id = app.create_card(user_id, 31, 30).await;

    let february = statement(&app, user_id, card_id, "2026-02").await;
    assert_eq!(february["closing_date"], "2026-02-28");
    assert_eq!(february["due_date"], "2026-02-28");
    assert_eq!(february["status"], "open");

    let invalid = app
        .get(&format!("/cards/{}/statements/2026-13", card_id), user_id)
        .await;
    assert_eq!(invalid.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn partial_then_full_payment_settles_and_accrues_points() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;
    app.make_premium(user_id).await;
    let card_id = app.create_card(user_id, 10, 20).await;

    expense(&app, user_id, card_id, "200.00", "2026-03-02").await;
    expense(&app, user_id, card_id, "100.00", "2026-03-05").await;
    let march = statement(&app, user_id, card_id, "2026-03").await;
    let statement_id = id_field(&march, "statement_id");
    assert_eq!(decimal_field(&march, "total"), "300.00");

    let path = format!("/statements/{}/payments", statement_id);

    let partial = app.post(&path, user_id, json!({ "amount": "120.00" })).await;
    assert_eq!(partial.status(), 201);
    let body: Value = partial.json().await.expect("Failed to parse payment");
    assert_eq!(body["statement"]["status"], "open");
    assert_eq!(decimal_field(&body, "amount_due"), "180.00");

    let overpay = app.post(&path, user_id, json!({ "amount": "180.01" })).await;
    assert_eq!(overpay.status(), 400);

    let rest = app.post(&path, user_id, json!({ "amount": "180.00" })).await;
    assert_eq!(rest.status(), 201);
    let body: Value = rest.json().await.expect("Failed to parse payment");
    assert_eq!(body["statement"]["status"], "paid");
    assert!(!body["statement"]["paid_utc"].is_null());

    let again = app.post(&path, user_id, json!({ "amount": "1.00" })).await;
    assert_eq!(again.status(), 409);

    let detail: Value = app
        .get(&format!("/statements/{}", statement_id), user_id)
        .await
        .json()
        .await
        .expect("Failed to parse statement");
    assert_eq!(detail["payments"].as_array().map(Vec::len), Some(2));
    assert!(detail["charges"]
        .as_array()
        .map(|charges| charges.iter().all(|c| c["is_paid"] == true))
        .unwrap_or(false));

    // floor(300.00 * 1.5)
    let points: Value = app
        .get(&format!("/cards/{}/points", card_id), user_id)
        .await
        .json()
        .await
        .expect("Failed to parse points");
    assert_eq!(points["balance"], 450);

    let late = app
        .post(
            "/charges",
            user_id,
            json!({
                "description": "Atrasada",
                "amount": "10.00",
                "kind": "expense",
                "occurred_on": "2026-03-06",
                "card_id": card_id,
            }),
        )
        .await;
    assert_eq!(late.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn payments_require_positive_cents() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;
    let card_id = app.create_card(user_id, 10, 20).await;
    expense(&app, user_id, card_id, "50.00", "2026-03-02").await;
    let march = statement(&app, user_id, card_id, "2026-03").await;
    let path = format!("/statements/{}/payments", id_field(&march, "statement_id"));

    for amount in ["0", "-5.00", "10.001"] {
        let response = app.post(&path, user_id, json!({ "amount": amount })).await;
        assert_eq!(response.status(), 400, "amount {}", amount);
    }

    let stranger = app.create_user("Bruno").await;
    let response = app.post(&path, stranger, json!({ "amount": "10.00" })).await;
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn free_tier_is_limited_to_two_cards() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;
    app.create_card(user_id, 10, 20).await;
    app.create_card(user_id, 5, 15).await;

    let body = json!({ "name": "Third", "closing_day": 1, "due_day": 10 });
    let third = app.post("/cards", user_id, body.clone()).await;
    assert_eq!(third.status(), 403);
    let error: Value = third.json().await.expect("Failed to parse error");
    assert_eq!(error["error"], "Feature requires an active subscription");

    app.make_premium(user_id).await;
    let third = app.post("/cards", user_id, body).await;
    assert_eq!(third.status(), 201);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn card_validation_and_deletion() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;

    let bad_day = app
        .post("/cards", user_id, json!({ "name": "X", "closing_day": 0, "due_day": 10 }))
        .await;
    assert_eq!(bad_day.status(), 400);

    let negative = app
        .post(
            "/cards",
            user_id,
            json!({ "name": "X", "closing_day": 5, "due_day": 10, "credit_limit": "-1.00" }),
        )
        .await;
    assert_eq!(negative.status(), 400);

    let card_id = app.create_card(user_id, 10, 20).await;
    let charge = expense(&app, user_id, card_id, "25.00", "2026-03-02").await;

    let deleted = app.delete(&format!("/cards/{}", card_id), user_id).await;
    assert_eq!(deleted.status(), 204);

    let orphan: Value = app
        .get(&format!("/charges/{}", id_field(&charge, "charge_id")), user_id)
        .await
        .json()
        .await
        .expect("Failed to parse charge");
    assert!(orphan["card_id"].is_null());
    assert!(orphan["statement_id"].is_null());

    let gone = app.get(&format!("/cards/{}", card_id), user_id).await;
    assert_eq!(gone.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn edits_cannot_drop_total_below_amount_paid() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;
    let card_id = app.create_card(user_id, 10, 20).await;

    let big = expense(&app, user_id, card_id, "200.00", "2026-03-02").await;
    let small = expense(&app, user_id, card_id, "100.00", "2026-03-05").await;
    let march = statement(&app, user_id, card_id, "2026-03").await;
    let statement_id = id_field(&march, "statement_id");

    let paid = app
        .post(
            &format!("/statements/{}/payments", statement_id),
            user_id,
            json!({ "amount": "250.00" }),
        )
        .await;
    assert_eq!(paid.status(), 201);

    // 200.00 + 10.00 would fall below the 250.00 already paid.
    let shrink = app
        .patch(
            &format!("/charges/{}", id_field(&small, "charge_id")),
            user_id,
            json!({ "amount": "10.00" }),
        )
        .await;
    assert_eq!(shrink.status(), 409);

    let remove = app
        .delete(&format!("/charges/{}", id_field(&big, "charge_id")), user_id)
        .await;
    assert_eq!(remove.status(), 409);

    // Rejected edits leave the statement as it was.
    let march = statement(&app, user_id, card_id, "2026-03").await;
    assert_eq!(decimal_field(&march, "total"), "300.00");
    assert_eq!(decimal_field(&march, "amount_paid"), "250.00");
    assert_eq!(march["status"], "open");

    // Growing the statement is still allowed.
    let grow = app
        .patch(
            &format!("/charges/{}", id_field(&small, "charge_id")),
            user_id,
            json!({ "amount": "120.00" }),
        )
        .await;
    assert_eq!(grow.status(), 200);
    let march = statement(&app, user_id, card_id, "2026-03").await;
    assert_eq!(decimal_field(&march, "total"), "320.00");

    app.cleanup().await;
}
