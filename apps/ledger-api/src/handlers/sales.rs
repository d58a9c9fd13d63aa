//! Sale batch commit handler: the most involved of the family handlers.
//!
//! ## Per-Sale Effects (one transaction each)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Committing One Sale                               │
//! │                                                                         │
//! │  1. Idempotency: (shop_id, client_ref) already committed? → replay     │
//! │  2. Resolve products; reject foreign-shop or inactive references       │
//! │  3. Recompute total from Σ(qty × unit price); a disagreeing client     │
//! │     total rejects the item                                             │
//! │  4. Due sale? resolve the customer                                     │
//! │  5. Claim invoice number (atomic increment on shop_counters:           │
//! │     rollback releases it, keeping the sequence contiguous)             │
//! │  6. Insert header + lines; decrement stock for tracked products        │
//! │     (negative stock recorded, never blocked; FlagDiscrepancy policy    │
//! │     additionally files a stock_discrepancies row)                      │
//! │  7. Cash/digital → cash_ledger entry; due → customer_ledger entry      │
//! │  8. COMMIT, then fan out committed amounts to connected sessions       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::AuthSession;
use crate::config::StockPolicy;
use crate::db::{new_id, CustomerRecord, ProductRecord};
use crate::error::ApiError;
use crate::handlers::{db_item_err, item_err};
use crate::AppState;
use dukan_core::wire::{BatchItemError, BatchResponse, CommittedId, SaleBatchRequest};
use dukan_core::{line_total_cents, Money, OperationPayload, PaymentMethod, SalePayload};

/// `POST /v1/sync/sales`
pub async fn commit_sales(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(req): Json<SaleBatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    if req.new_items.len() > state.config.batch_size_limit {
        return Err(ApiError::InvalidRequest(format!(
            "batch exceeds {} items",
            state.config.batch_size_limit
        )));
    }

    info!(
        shop_id = %session.shop_id,
        count = req.new_items.len(),
        "Processing sale batch"
    );

    let mut ids = Vec::new();
    let mut errors = Vec::new();

    for sale in &req.new_items {
        match commit_one(&state, &session, sale).await {
            Ok(Committed::Fresh(committed)) => {
                state.realtime.publish(
                    "sale.committed",
                    &session.shop_id,
                    json!({
                        "saleId": committed.server_id,
                        "invoiceNo": committed.invoice_no,
                        "totalCents": sale.computed_total_cents(),
                        "paymentMethod": sale.payment_method,
                    }),
                );
                ids.push(committed);
            }
            Ok(Committed::Replay(committed)) => ids.push(committed),
            Err(e) => {
                warn!(
                    client_ref = %e.client_ref,
                    code = %e.code,
                    message = %e.message,
                    "Sale rejected"
                );
                errors.push(e);
            }
        }
    }

    Ok(Json(BatchResponse::from_outcomes(ids, errors)))
}

/// Distinguishes a first commit (fans out) from an idempotent replay
/// (does not).
enum Committed {
    Fresh(CommittedId),
    Replay(CommittedId),
}

async fn commit_one(
    state: &AppState,
    session: &AuthSession,
    sale: &SalePayload,
) -> Result<Committed, BatchItemError> {
    if let Err(e) = OperationPayload::SaleCreate(sale.clone()).validate() {
        return Err(item_err(&sale.client_ref, "VALIDATION", e.to_string(), false));
    }

    let mut tx = state
        .db
        .pool()
        .begin()
        .await
        .map_err(|e| db_item_err(&sale.client_ref, e))?;

    // Idempotent replay: this client_ref already committed. The replay
    // echoes the original identifiers without claiming a new invoice.
    let existing: Option<(String, i64)> = sqlx::query_as(
        "SELECT id, invoice_no FROM sales WHERE shop_id = ?1 AND client_ref = ?2",
    )
    .bind(&session.shop_id)
    .bind(&sale.client_ref)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| db_item_err(&sale.client_ref, e))?;

    if let Some((id, invoice_no)) = existing {
        return Ok(Committed::Replay(CommittedId {
            client_ref: sale.client_ref.clone(),
            server_id: id,
            invoice_no: Some(invoice_no),
        }));
    }

    // Resolve every referenced product before any write. Lines may carry
    // either the canonical id or the client ref of a product that synced
    // earlier in the same run.
    let mut resolved: Vec<(ProductRecord, i64, i64)> = Vec::new();
    for line in &sale.lines {
        let product: Option<ProductRecord> = sqlx::query_as(
            r#"
            SELECT id, shop_id, client_ref, name, price_cents, cost_cents,
                   stock_qty, track_stock, is_active, sync_version
            FROM products
            WHERE shop_id = ?1 AND (id = ?2 OR client_ref = ?2)
            "#,
        )
        .bind(&session.shop_id)
        .bind(&line.product_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_item_err(&sale.client_ref, e))?;

        let Some(product) = product else {
            return Err(item_err(
                &sale.client_ref,
                "PRODUCT_NOT_FOUND",
                format!("product {} does not exist in this shop", line.product_id),
                false,
            ));
        };

        if !product.is_active {
            return Err(item_err(
                &sale.client_ref,
                "PRODUCT_INACTIVE",
                format!("product {} is inactive", line.product_id),
                false,
            ));
        }

        resolved.push((product, line.quantity, line.unit_price_cents));
    }

    // Recompute the total. A client-sent total is a sanity cross-check
    // only; disagreement rejects the whole item.
    let total_cents = line_total_cents(sale.lines.iter().map(|l| (l.quantity, l.unit_price_cents)));
    if let Some(client_total) = sale.total_cents {
        if client_total != total_cents {
            return Err(item_err(
                &sale.client_ref,
                "TOTAL_MISMATCH",
                format!("client sent {}, recomputed {}", client_total, total_cents),
                false,
            ));
        }
    }

    // Credit sales need an existing customer.
    let customer: Option<CustomerRecord> = if sale.payment_method == PaymentMethod::Due {
        let customer_key = sale.customer_id.as_deref().unwrap_or_default();
        let customer: Option<CustomerRecord> = sqlx::query_as(
            r#"
            SELECT id, shop_id, client_ref, name, due_cents
            FROM customers
            WHERE shop_id = ?1 AND (id = ?2 OR client_ref = ?2)
            "#,
        )
        .bind(&session.shop_id)
        .bind(customer_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_item_err(&sale.client_ref, e))?;

        let Some(customer) = customer else {
            return Err(item_err(
                &sale.client_ref,
                "CUSTOMER_NOT_FOUND",
                format!("customer {} does not exist in this shop", customer_key),
                false,
            ));
        };
        Some(customer)
    } else {
        None
    };

    // All validation passed. Claim the invoice number inside this
    // transaction: two concurrent commits for the same shop never receive
    // the same number, and a rollback releases it with no gap.
    sqlx::query(
        "INSERT INTO shop_counters (shop_id, next_invoice) VALUES (?1, 0) \
         ON CONFLICT (shop_id) DO NOTHING",
    )
    .bind(&session.shop_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| db_item_err(&sale.client_ref, e))?;

    let invoice_no: i64 = sqlx::query_scalar(
        "UPDATE shop_counters SET next_invoice = next_invoice + 1 \
         WHERE shop_id = ?1 RETURNING next_invoice",
    )
    .bind(&session.shop_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| db_item_err(&sale.client_ref, e))?;

    let sale_id = new_id();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, shop_id, device_id, client_ref, invoice_no, total_cents,
            payment_method, customer_id, note, recorded_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&sale_id)
    .bind(&session.shop_id)
    .bind(&session.device_id)
    .bind(&sale.client_ref)
    .bind(invoice_no)
    .bind(total_cents)
    .bind(sale.payment_method)
    .bind(customer.as_ref().map(|c| c.id.clone()))
    .bind(&sale.note)
    .bind(sale.recorded_at)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| db_item_err(&sale.client_ref, e))?;

    // Lines with snapshot names, plus stock effects.
    for (product, quantity, unit_price_cents) in &resolved {
        let line_total = Money::from_cents(*unit_price_cents)
            .saturating_mul_qty(*quantity)
            .cents();

        sqlx::query(
            r#"
            INSERT INTO sale_lines (
                id, sale_id, product_id, name_snapshot,
                quantity, unit_price_cents, line_total_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(new_id())
        .bind(&sale_id)
        .bind(&product.id)
        .bind(&product.name)
        .bind(quantity)
        .bind(unit_price_cents)
        .bind(line_total)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_item_err(&sale.client_ref, e))?;

        if product.track_stock {
            let stock_after: i64 = sqlx::query_scalar(
                "UPDATE products SET stock_qty = stock_qty - ?3, updated_at = ?4 \
                 WHERE shop_id = ?1 AND id = ?2 RETURNING stock_qty",
            )
            .bind(&session.shop_id)
            .bind(&product.id)
            .bind(quantity)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_item_err(&sale.client_ref, e))?;

            if stock_after < 0 && state.config.stock_policy == StockPolicy::FlagDiscrepancy {
                sqlx::query(
                    r#"
                    INSERT INTO stock_discrepancies (
                        id, shop_id, product_id, sale_id, quantity, stock_after, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                )
                .bind(new_id())
                .bind(&session.shop_id)
                .bind(&product.id)
                .bind(&sale_id)
                .bind(quantity)
                .bind(stock_after)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_item_err(&sale.client_ref, e))?;
            }
        }
    }

    // Tender effects: immediate payment lands in the cash ledger, store
    // credit appends to the customer's ledger instead.
    match &customer {
        Some(customer) => {
            sqlx::query(
                r#"
                INSERT INTO customer_ledger (
                    id, shop_id, customer_id, client_ref, entry_type,
                    amount_cents, reference_id, recorded_at, created_at
                ) VALUES (?1, ?2, ?3, ?4, 'sale', ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(new_id())
            .bind(&session.shop_id)
            .bind(&customer.id)
            .bind(&sale.client_ref)
            .bind(total_cents)
            .bind(&sale_id)
            .bind(sale.recorded_at)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_item_err(&sale.client_ref, e))?;

            sqlx::query(
                "UPDATE customers SET due_cents = due_cents + ?3, updated_at = ?4 \
                 WHERE shop_id = ?1 AND id = ?2",
            )
            .bind(&session.shop_id)
            .bind(&customer.id)
            .bind(total_cents)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_item_err(&sale.client_ref, e))?;
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO cash_ledger (
                    id, shop_id, device_id, client_ref, direction,
                    amount_cents, source, reference_id, reason, recorded_at, created_at
                ) VALUES (?1, ?2, ?3, ?4, 'cash_in', ?5, 'sale', ?6, NULL, ?7, ?8)
                "#,
            )
            .bind(new_id())
            .bind(&session.shop_id)
            .bind(&session.device_id)
            .bind(&sale.client_ref)
            .bind(total_cents)
            .bind(&sale_id)
            .bind(sale.recorded_at)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_item_err(&sale.client_ref, e))?;
        }
    }

    tx.commit()
        .await
        .map_err(|e| db_item_err(&sale.client_ref, e))?;

    Ok(Committed::Fresh(CommittedId {
        client_ref: sale.client_ref.clone(),
        server_id: sale_id,
        invoice_no: Some(invoice_no),
    }))
}
