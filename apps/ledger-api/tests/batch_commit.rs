//! Integration tests for the batch commit handlers.
//!
//! Handlers are exercised directly against an in-memory ledger with a
//! recording fan-out publisher, the same way the router invokes them.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;

use dukan_core::wire::{
    DueCustomerBatchRequest, DuePaymentBatchRequest, ProductBatchRequest, SaleBatchRequest,
};
use dukan_core::{
    DueCustomerPayload, DuePaymentPayload, PaymentMethod, ProductPayload, SaleLinePayload,
    SalePayload,
};
use ledger_api::auth::AuthSession;
use ledger_api::config::{LedgerConfig, StockPolicy};
use ledger_api::db::LedgerDb;
use ledger_api::handlers::{due, products, sales};
use ledger_api::realtime::RecordingPublisher;
use ledger_api::{AppState, JwtManager};

// =============================================================================
// Fixtures
// =============================================================================

async fn test_state_with(policy: StockPolicy) -> (Arc<AppState>, Arc<RecordingPublisher>) {
    let db = LedgerDb::in_memory().await.unwrap();
    db.create_shop("shop-1", "Test Shop").await.unwrap();
    db.create_shop("shop-2", "Other Shop").await.unwrap();
    db.create_device("shop-1", "dev-1", "Counter 1", "secret")
        .await
        .unwrap();

    let mut config = LedgerConfig::for_tests();
    config.stock_policy = policy;

    let publisher = Arc::new(RecordingPublisher::default());
    let jwt = JwtManager::new(config.jwt_secret.clone(), config.jwt_lifetime_secs);

    let state = Arc::new(AppState {
        db,
        config,
        jwt,
        realtime: publisher.clone(),
    });

    (state, publisher)
}

async fn test_state() -> (Arc<AppState>, Arc<RecordingPublisher>) {
    test_state_with(StockPolicy::AllowNegative).await
}

fn session() -> AuthSession {
    AuthSession {
        shop_id: "shop-1".to_string(),
        device_id: "dev-1".to_string(),
    }
}

fn session_for(shop_id: &str) -> AuthSession {
    AuthSession {
        shop_id: shop_id.to_string(),
        device_id: "dev-1".to_string(),
    }
}

fn product_payload(client_ref: &str, price_cents: i64, stock_qty: i64) -> ProductPayload {
    ProductPayload {
        client_ref: client_ref.to_string(),
        product_id: None,
        name: format!("Product {}", client_ref),
        price_cents,
        cost_cents: None,
        stock_qty,
        track_stock: true,
        is_active: true,
        recorded_at: Utc::now(),
    }
}

fn sale_payload(client_ref: &str, product_id: &str, quantity: i64, unit_price: i64) -> SalePayload {
    SalePayload {
        client_ref: client_ref.to_string(),
        lines: vec![SaleLinePayload {
            product_id: product_id.to_string(),
            quantity,
            unit_price_cents: unit_price,
        }],
        payment_method: PaymentMethod::Cash,
        customer_id: None,
        total_cents: Some(quantity * unit_price),
        note: None,
        recorded_at: Utc::now(),
    }
}

/// Seeds one product through the product batch endpoint, returning its
/// canonical id.
async fn seed_product(state: &Arc<AppState>, client_ref: &str, price: i64, stock: i64) -> String {
    let resp = products::commit_products(
        State(state.clone()),
        session(),
        Json(ProductBatchRequest {
            new_items: vec![product_payload(client_ref, price, stock)],
            updated_items: vec![],
            deleted_ids: vec![],
        }),
    )
    .await
    .unwrap();

    assert!(resp.0.success);
    resp.0.ids[0].server_id.clone()
}

async fn stock_of(state: &Arc<AppState>, product_id: &str) -> i64 {
    sqlx::query_scalar("SELECT stock_qty FROM products WHERE id = ?1")
        .bind(product_id)
        .fetch_one(state.db.pool())
        .await
        .unwrap()
}

// =============================================================================
// Sales
// =============================================================================

#[tokio::test]
async fn sale_commit_applies_all_effects() {
    let (state, publisher) = test_state().await;
    let product_id = seed_product(&state, "p1", 150, 10).await;

    let resp = sales::commit_sales(
        State(state.clone()),
        session(),
        Json(SaleBatchRequest {
            new_items: vec![sale_payload("s1", "p1", 2, 150)],
        }),
    )
    .await
    .unwrap();

    assert!(resp.0.success);
    assert_eq!(resp.0.ids.len(), 1);
    assert_eq!(resp.0.ids[0].invoice_no, Some(1));

    // Stock decremented by the sold quantity.
    assert_eq!(stock_of(&state, &product_id).await, 8);

    // Immediate tender landed in the cash ledger.
    let cash_total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM cash_ledger \
         WHERE shop_id = 'shop-1' AND source = 'sale'",
    )
    .fetch_one(state.db.pool())
    .await
    .unwrap();
    assert_eq!(cash_total, 300);

    // Committed amounts fanned out to connected sessions.
    let events = publisher.recorded();
    assert!(events.iter().any(|(event, shop, _)| {
        event == "sale.committed" && shop == "shop-1"
    }));
}

#[tokio::test]
async fn sale_total_is_recomputed_server_side() {
    let (state, _) = test_state().await;
    seed_product(&state, "p1", 150, 10).await;

    // Client claims a total that disagrees with Σ(qty × price).
    let mut sale = sale_payload("s1", "p1", 2, 150);
    sale.total_cents = Some(9999);

    let resp = sales::commit_sales(
        State(state.clone()),
        session(),
        Json(SaleBatchRequest {
            new_items: vec![sale],
        }),
    )
    .await
    .unwrap();

    assert!(!resp.0.success);
    assert_eq!(resp.0.errors[0].code, "TOTAL_MISMATCH");
    assert!(!resp.0.errors[0].retryable);

    // Nothing persisted, and the invoice counter was not consumed: the
    // next valid sale still gets number 1.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
        .fetch_one(state.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);

    let resp = sales::commit_sales(
        State(state.clone()),
        session(),
        Json(SaleBatchRequest {
            new_items: vec![sale_payload("s2", "p1", 1, 150)],
        }),
    )
    .await
    .unwrap();
    assert_eq!(resp.0.ids[0].invoice_no, Some(1));
}

#[tokio::test]
async fn sale_replay_commits_at_most_once() {
    let (state, _) = test_state().await;
    seed_product(&state, "p1", 150, 10).await;

    let request = SaleBatchRequest {
        new_items: vec![sale_payload("s1", "p1", 2, 150)],
    };

    let first = sales::commit_sales(State(state.clone()), session(), Json(request.clone()))
        .await
        .unwrap();
    // Simulates a retry after an ambiguous network failure.
    let second = sales::commit_sales(State(state.clone()), session(), Json(request))
        .await
        .unwrap();

    assert!(second.0.success);
    assert_eq!(first.0.ids[0].server_id, second.0.ids[0].server_id);
    assert_eq!(first.0.ids[0].invoice_no, second.0.ids[0].invoice_no);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
        .fetch_one(state.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);

    // The replay must not double the stock decrement either.
    let stock: i64 = sqlx::query_scalar("SELECT stock_qty FROM products WHERE client_ref = 'p1'")
        .fetch_one(state.db.pool())
        .await
        .unwrap();
    assert_eq!(stock, 8);
}

#[tokio::test]
async fn foreign_shop_product_is_rejected() {
    let (state, _) = test_state().await;
    seed_product(&state, "p1", 150, 10).await;

    // shop-2's session cannot sell shop-1's product.
    let resp = sales::commit_sales(
        State(state.clone()),
        session_for("shop-2"),
        Json(SaleBatchRequest {
            new_items: vec![sale_payload("s1", "p1", 1, 150)],
        }),
    )
    .await
    .unwrap();

    assert!(!resp.0.success);
    assert_eq!(resp.0.errors[0].code, "PRODUCT_NOT_FOUND");
}

#[tokio::test]
async fn inactive_product_is_rejected() {
    let (state, _) = test_state().await;
    let product_id = seed_product(&state, "p1", 150, 10).await;

    // Soft-delete via the product batch endpoint.
    products::commit_products(
        State(state.clone()),
        session(),
        Json(ProductBatchRequest {
            new_items: vec![],
            updated_items: vec![],
            deleted_ids: vec![product_id],
        }),
    )
    .await
    .unwrap();

    let resp = sales::commit_sales(
        State(state.clone()),
        session(),
        Json(SaleBatchRequest {
            new_items: vec![sale_payload("s1", "p1", 1, 150)],
        }),
    )
    .await
    .unwrap();

    assert!(!resp.0.success);
    assert_eq!(resp.0.errors[0].code, "PRODUCT_INACTIVE");
    assert!(!resp.0.errors[0].retryable);
}

#[tokio::test]
async fn invoice_sequence_is_contiguous_under_concurrency() {
    let (state, _) = test_state().await;
    seed_product(&state, "p1", 100, 1000).await;

    let mut joins = Vec::new();
    for i in 0..50 {
        let state = state.clone();
        joins.push(tokio::spawn(async move {
            let resp = sales::commit_sales(
                State(state),
                session(),
                Json(SaleBatchRequest {
                    new_items: vec![sale_payload(&format!("s{}", i), "p1", 1, 100)],
                }),
            )
            .await
            .unwrap();
            resp.0.ids[0].invoice_no.unwrap()
        }));
    }

    let mut invoice_numbers = Vec::new();
    for join in joins {
        invoice_numbers.push(join.await.unwrap());
    }

    // Contiguous, duplicate-free 1..=50.
    invoice_numbers.sort_unstable();
    let expected: Vec<i64> = (1..=50).collect();
    assert_eq!(invoice_numbers, expected);
}

#[tokio::test]
async fn oversell_is_recorded_and_flagged_by_policy() {
    let (state, _) = test_state_with(StockPolicy::FlagDiscrepancy).await;
    let product_id = seed_product(&state, "p1", 100, 3).await;

    // Selling 5 with 3 in stock: the sale is never blocked.
    let resp = sales::commit_sales(
        State(state.clone()),
        session(),
        Json(SaleBatchRequest {
            new_items: vec![sale_payload("s1", "p1", 5, 100)],
        }),
    )
    .await
    .unwrap();
    assert!(resp.0.success);

    assert_eq!(stock_of(&state, &product_id).await, -2);

    let discrepancies: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM stock_discrepancies WHERE product_id = ?1",
    )
    .bind(&product_id)
    .fetch_one(state.db.pool())
    .await
    .unwrap();
    assert_eq!(discrepancies, 1);
}

#[tokio::test]
async fn oversell_is_silent_under_default_policy() {
    let (state, _) = test_state().await;
    let product_id = seed_product(&state, "p1", 100, 3).await;

    let resp = sales::commit_sales(
        State(state.clone()),
        session(),
        Json(SaleBatchRequest {
            new_items: vec![sale_payload("s1", "p1", 5, 100)],
        }),
    )
    .await
    .unwrap();
    assert!(resp.0.success);
    assert_eq!(stock_of(&state, &product_id).await, -2);

    let discrepancies: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_discrepancies")
        .fetch_one(state.db.pool())
        .await
        .unwrap();
    assert_eq!(discrepancies, 0);
}

#[tokio::test]
async fn one_bad_item_does_not_poison_the_batch() {
    let (state, _) = test_state().await;
    seed_product(&state, "p1", 150, 10).await;

    let mut bad = sale_payload("bad", "p1", 1, 150);
    bad.total_cents = Some(1);

    let resp = sales::commit_sales(
        State(state.clone()),
        session(),
        Json(SaleBatchRequest {
            new_items: vec![bad, sale_payload("good", "p1", 1, 150)],
        }),
    )
    .await
    .unwrap();

    // The good item committed even though the bad one was rejected.
    assert!(!resp.0.success);
    assert_eq!(resp.0.ids.len(), 1);
    assert_eq!(resp.0.ids[0].client_ref, "good");
    assert_eq!(resp.0.errors.len(), 1);
    assert_eq!(resp.0.errors[0].client_ref, "bad");
}

// =============================================================================
// Due Customers & Payments
// =============================================================================

#[tokio::test]
async fn due_sale_and_payment_maintain_customer_balance() {
    let (state, _) = test_state().await;
    seed_product(&state, "p1", 500, 10).await;

    // Customer with an opening balance of 10.00.
    let resp = due::commit_due_customers(
        State(state.clone()),
        session(),
        Json(DueCustomerBatchRequest {
            new_items: vec![DueCustomerPayload {
                client_ref: "c1".to_string(),
                name: "Akbar".to_string(),
                phone: None,
                opening_due_cents: 1000,
                recorded_at: Utc::now(),
            }],
        }),
    )
    .await
    .unwrap();
    assert!(resp.0.success);
    let customer_id = resp.0.ids[0].server_id.clone();

    // Credit sale of 2 x 5.00 increases the balance to 20.00.
    let mut sale = sale_payload("s1", "p1", 2, 500);
    sale.payment_method = PaymentMethod::Due;
    sale.customer_id = Some("c1".to_string());

    let resp = sales::commit_sales(
        State(state.clone()),
        session(),
        Json(SaleBatchRequest {
            new_items: vec![sale],
        }),
    )
    .await
    .unwrap();
    assert!(resp.0.success);

    let due: i64 = sqlx::query_scalar("SELECT due_cents FROM customers WHERE id = ?1")
        .bind(&customer_id)
        .fetch_one(state.db.pool())
        .await
        .unwrap();
    assert_eq!(due, 2000);

    // A credit sale collects no cash.
    let cash_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cash_ledger")
        .fetch_one(state.db.pool())
        .await
        .unwrap();
    assert_eq!(cash_rows, 0);

    // Payment of 15.00 brings the balance down and lands in the cash
    // ledger in the same transaction.
    let resp = due::commit_due_payments(
        State(state.clone()),
        session(),
        Json(DuePaymentBatchRequest {
            new_items: vec![DuePaymentPayload {
                client_ref: "pay1".to_string(),
                customer_id: "c1".to_string(),
                amount_cents: 1500,
                recorded_at: Utc::now(),
            }],
        }),
    )
    .await
    .unwrap();
    assert!(resp.0.success);

    let due: i64 = sqlx::query_scalar("SELECT due_cents FROM customers WHERE id = ?1")
        .bind(&customer_id)
        .fetch_one(state.db.pool())
        .await
        .unwrap();
    assert_eq!(due, 500);

    let cash_total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM cash_ledger WHERE source = 'due_payment'",
    )
    .fetch_one(state.db.pool())
    .await
    .unwrap();
    assert_eq!(cash_total, 1500);

    // The append-only history has all three entries.
    let ledger_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM customer_ledger WHERE customer_id = ?1")
            .bind(&customer_id)
            .fetch_one(state.db.pool())
            .await
            .unwrap();
    assert_eq!(ledger_rows, 3);
}

#[tokio::test]
async fn due_payment_for_unknown_customer_is_rejected() {
    let (state, _) = test_state().await;

    let resp = due::commit_due_payments(
        State(state.clone()),
        session(),
        Json(DuePaymentBatchRequest {
            new_items: vec![DuePaymentPayload {
                client_ref: "pay1".to_string(),
                customer_id: "ghost".to_string(),
                amount_cents: 500,
                recorded_at: Utc::now(),
            }],
        }),
    )
    .await
    .unwrap();

    assert!(!resp.0.success);
    assert_eq!(resp.0.errors[0].code, "CUSTOMER_NOT_FOUND");
}

#[tokio::test]
async fn due_payment_replay_is_idempotent() {
    let (state, _) = test_state().await;

    due::commit_due_customers(
        State(state.clone()),
        session(),
        Json(DueCustomerBatchRequest {
            new_items: vec![DueCustomerPayload {
                client_ref: "c1".to_string(),
                name: "Akbar".to_string(),
                phone: None,
                opening_due_cents: 2000,
                recorded_at: Utc::now(),
            }],
        }),
    )
    .await
    .unwrap();

    let request = DuePaymentBatchRequest {
        new_items: vec![DuePaymentPayload {
            client_ref: "pay1".to_string(),
            customer_id: "c1".to_string(),
            amount_cents: 500,
            recorded_at: Utc::now(),
        }],
    };

    due::commit_due_payments(State(state.clone()), session(), Json(request.clone()))
        .await
        .unwrap();
    due::commit_due_payments(State(state.clone()), session(), Json(request))
        .await
        .unwrap();

    // Paid once, not twice.
    let due: i64 = sqlx::query_scalar("SELECT due_cents FROM customers WHERE client_ref = 'c1'")
        .fetch_one(state.db.pool())
        .await
        .unwrap();
    assert_eq!(due, 1500);
}

// =============================================================================
// Products
// =============================================================================

#[tokio::test]
async fn product_create_is_idempotent_on_client_ref() {
    let (state, _) = test_state().await;

    let id_first = seed_product(&state, "p1", 150, 10).await;
    let id_second = seed_product(&state, "p1", 150, 10).await;
    assert_eq!(id_first, id_second);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(state.db.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn product_update_bumps_sync_version() {
    let (state, _) = test_state().await;
    let product_id = seed_product(&state, "p1", 150, 10).await;

    let mut updated = product_payload("p1", 175, 12);
    updated.product_id = Some(product_id.clone());

    let resp = products::commit_products(
        State(state.clone()),
        session(),
        Json(ProductBatchRequest {
            new_items: vec![],
            updated_items: vec![updated],
            deleted_ids: vec![],
        }),
    )
    .await
    .unwrap();
    assert!(resp.0.success);

    let (price, version): (i64, i64) = sqlx::query_as(
        "SELECT price_cents, sync_version FROM products WHERE id = ?1",
    )
    .bind(&product_id)
    .fetch_one(state.db.pool())
    .await
    .unwrap();
    assert_eq!(price, 175);
    assert_eq!(version, 1);
}

#[tokio::test]
async fn deleting_unknown_product_succeeds() {
    let (state, _) = test_state().await;

    let resp = products::commit_products(
        State(state.clone()),
        session(),
        Json(ProductBatchRequest {
            new_items: vec![],
            updated_items: vec![],
            deleted_ids: vec!["never-existed".to_string()],
        }),
    )
    .await
    .unwrap();

    assert!(resp.0.success);
    assert_eq!(resp.0.ids[0].client_ref, "never-existed");
}
