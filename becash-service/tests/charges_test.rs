//! Income/expense entry tests.

mod common;

use common::{decimal_field, id_field, TestApp};
use serde_json::{json, Value};

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn entry_crud_and_monthly_summary() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;

    let salary = app
        .post(
            "/charges",
            user_id,
            json!({
                "description": "Salário",
                "amount": "5000.00",
                "kind": "income",
                "category": "salary",
                "occurred_on": "2026-03-05",
                "is_paid": true,
            }),
        )
        .await;
    assert_eq!(salary.status(), 201);

    let rent = app
        .post(
            "/charges",
            user_id,
            json!({
                "description": "Aluguel",
                "amount": "1800.00",
                "kind": "expense",
                "occurred_on": "2026-03-10",
            }),
        )
        .await;
    assert_eq!(rent.status(), 201);
    let rent: Value = rent.json().await.expect("Failed to parse charge");
    let rent_id = id_field(&rent, "charge_id");
    assert_eq!(rent["occurrence_month"], "2026-03");
    assert_eq!(rent["is_paid"], false);

    let summary: Value = app
        .get("/charges/summary?month=2026-03", user_id)
        .await
        .json()
        .await
        .expect("Failed to parse summary");
    assert_eq!(decimal_field(&summary, "income"), "5000.00");
    assert_eq!(decimal_field(&summary, "expense"), "1800.00");
    assert_eq!(decimal_field(&summary, "balance"), "3200.00");
    assert_eq!(decimal_field(&summary, "unpaid_expense"), "1800.00");
    assert_eq!(summary["entries"], 2);

    let paid = app
        .patch(&format!("/charges/{}", rent_id), user_id, json!({ "is_paid": true }))
        .await;
    assert_eq!(paid.status(), 200);
    let paid: Value = paid.json().await.expect("Failed to parse charge");
    assert_eq!(paid["is_paid"], true);

    let unpaid_only: Value = app
        .get("/charges?month=2026-03&paid=false", user_id)
        .await
        .json()
        .await
        .expect("Failed to parse list");
    assert_eq!(unpaid_only.as_array().map(Vec::len), Some(0));

    let incomes: Value = app
        .get("/charges?kind=income", user_id)
        .await
        .json()
        .await
        .expect("Failed to parse list");
    assert_eq!(incomes.as_array().map(Vec::len), Some(1));

    let deleted = app.delete(&format!("/charges/{}", rent_id), user_id).await;
    assert_eq!(deleted.status(), 204);
    let missing = app.get(&format!("/charges/{}", rent_id), user_id).await;
    assert_eq!(missing.status(), 404);

    let other_user = app.create_user("Bruno").await;
    let hidden: Value = app
        .get("/charges", other_user)
        .await
        .json()
        .await
        .expect("Failed to parse list");
    assert_eq!(hidden.as_array().map(Vec::len), Some(0));

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn entry_validation_rules() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;
    let card_id = app.create_card(user_id, 10, 20).await;

    let income_on_card = app
        .post(
            "/charges",
            user_id,
            json!({
                "description": "Reembolso",
                "amount": "10.00",
                "kind": "income",
                "occurred_on": "2026-03-05",
                "card_id": card_id,
            }),
        )
        .await;
    assert_eq!(income_on_card.status(), 400);

    let end_without_recurrence = app
        .post(
            "/charges",
            user_id,
            json!({
                "description": "Academia",
                "amount": "99.90",
                "kind": "expense",
                "occurred_on": "2026-03-05",
                "recurrence_end": "2026-12-31",
            }),
        )
        .await;
    assert_eq!(end_without_recurrence.status(), 400);

    let zero = app
        .post(
            "/charges",
            user_id,
            json!({
                "description": "Nada",
                "amount": "0",
                "kind": "expense",
                "occurred_on": "2026-03-05",
            }),
        )
        .await;
    assert_eq!(zero.status(), 400);

    let bad_month = app.get("/charges?month=2026-3", user_id).await;
    assert_eq!(bad_month.status(), 400);

    let unknown_card = app
        .post(
            "/charges",
            user_id,
            json!({
                "description": "Compra",
                "amount": "10.00",
                "kind": "expense",
                "occurred_on": "2026-03-05",
                "card_id": uuid::Uuid::new_v4(),
            }),
        )
        .await;
    assert_eq!(unknown_card.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn card_entry_updates_recompute_statements() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;
    let card_id = app.create_card(user_id, 10, 20).await;

    let created = app
        .post(
            "/charges",
            user_id,
            json!({
                "description": "Mercado",
                "amount": "250.00",
                "kind": "expense",
                "occurred_on": "2026-03-08",
                "card_id": card_id,
            }),
        )
        .await;
    assert_eq!(created.status(), 201);
    let charge: Value = created.json().await.expect("Failed to parse charge");
    let charge_path = format!("/charges/{}", id_field(&charge, "charge_id"));

    let paid_directly = app.patch(&charge_path, user_id, json!({ "is_paid": true })).await;
    assert_eq!(paid_directly.status(), 409);

    // Moving the purchase past the closing day moves it to April's statement.
    let moved = app
        .patch(
            &charge_path,
            user_id,
            json!({ "occurred_on": "2026-03-15", "amount": "260.00" }),
        )
        .await;
    assert_eq!(moved.status(), 200);

    let march: Value = app
        .get(&format!("/cards/{}/statements/2026-03", card_id), user_id)
        .await
        .json()
        .await
        .expect("Failed to parse statement");
    let april: Value = app
        .get(&format!("/cards/{}/statements/2026-04", card_id), user_id)
        .await
        .json()
        .await
        .expect("Failed to parse statement");
    assert_eq!(march["total"].as_str().map(|t| t.parse::<f64>().ok()), Some(Some(0.0)));
    assert_eq!(decimal_field(&april, "total"), "260.00");

    // Detaching the card turns it into a plain expense.
    let detached = app.patch(&charge_path, user_id, json!({ "card_id": null })).await;
    assert_eq!(detached.status(), 200);
    let detached: Value = detached.json().await.expect("Failed to parse charge");
    assert!(detached["statement_id"].is_null());

    let april: Value = app
        .get(&format!("/cards/{}/statements/2026-04", card_id), user_id)
        .await
        .json()
        .await
        .expect("Failed to parse statement");
    assert_eq!(april["total"].as_str().map(|t| t.parse::<f64>().ok()), Some(Some(0.0)));

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn patch_sets_and_clears_category() {
    let app = TestApp::spawn().await;
    let user_id = app.create_user("Ana").await;

    let created: Value = app
        .post(
            "/charges",
            user_id,
            json!({
                "description": "Feira",
                "amount": "85.40",
                "kind": "expense",
                "category": "groceries",
                "occurred_on": "2026-03-07",
            }),
        )
        .await
        .json()
        .await
        .expect("Failed to parse charge");
    let path = format!("/charges/{}", id_field(&created, "charge_id"));

    let untouched: Value = app
        .patch(&path, user_id, json!({ "description": "Feira livre" }))
        .await
        .json()
        .await
        .expect("Failed to parse charge");
    assert_eq!(untouched["category"], "groceries");

    let cleared = app.patch(&path, user_id, json!({ "category": null })).await;
    assert_eq!(cleared.status(), 200);
    let cleared: Value = cleared.json().await.expect("Failed to parse charge");
    assert!(cleared["category"].is_null());
    assert_eq!(cleared["description"], "Feira livre");

    app.cleanup().await;
}
