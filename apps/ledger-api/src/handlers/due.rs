//! Due (store credit) batch commit handlers: customers and payments.
//!
//! A due customer's running balance lives denormalized on the customer row
//! and as an append-only `customer_ledger` history. Both are written inside
//! the same transaction, so they can never drift.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::AuthSession;
use crate::db::{new_id, CustomerRecord};
use crate::error::ApiError;
use crate::handlers::{db_item_err, item_err};
use crate::AppState;
use dukan_core::wire::{
    BatchItemError, BatchResponse, CommittedId, DueCustomerBatchRequest, DuePaymentBatchRequest,
};
use dukan_core::{DueCustomerPayload, DuePaymentPayload, OperationPayload};

// =============================================================================
// Due Customers
// =============================================================================

/// `POST /v1/sync/due-customers`
pub async fn commit_due_customers(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(req): Json<DueCustomerBatchRequest>,
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
        "Processing due-customer batch"
    );

    let mut ids = Vec::new();
    let mut errors = Vec::new();

    for customer in &req.new_items {
        match commit_customer(&state, &session, customer).await {
            Ok(committed) => ids.push(committed),
            Err(e) => {
                warn!(client_ref = %e.client_ref, code = %e.code, "Due customer rejected");
                errors.push(e);
            }
        }
    }

    Ok(Json(BatchResponse::from_outcomes(ids, errors)))
}

async fn commit_customer(
    state: &AppState,
    session: &AuthSession,
    customer: &DueCustomerPayload,
) -> Result<CommittedId, BatchItemError> {
    if let Err(e) = OperationPayload::DueCustomerCreate(customer.clone()).validate() {
        return Err(item_err(
            &customer.client_ref,
            "VALIDATION",
            e.to_string(),
            false,
        ));
    }

    let mut tx = state
        .db
        .pool()
        .begin()
        .await
        .map_err(|e| db_item_err(&customer.client_ref, e))?;

    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM customers WHERE shop_id = ?1 AND client_ref = ?2")
            .bind(&session.shop_id)
            .bind(&customer.client_ref)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_item_err(&customer.client_ref, e))?;

    if let Some(id) = existing {
        return Ok(CommittedId {
            client_ref: customer.client_ref.clone(),
            server_id: id,
            invoice_no: None,
        });
    }

    let id = new_id();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO customers (
            id, shop_id, client_ref, name, phone, due_cents, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        "#,
    )
    .bind(&id)
    .bind(&session.shop_id)
    .bind(&customer.client_ref)
    .bind(customer.name.trim())
    .bind(&customer.phone)
    .bind(customer.opening_due_cents)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| db_item_err(&customer.client_ref, e))?;

    if customer.opening_due_cents > 0 {
        sqlx::query(
            r#"
            INSERT INTO customer_ledger (
                id, shop_id, customer_id, client_ref, entry_type,
                amount_cents, reference_id, recorded_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, 'opening', ?5, NULL, ?6, ?7)
            "#,
        )
        .bind(new_id())
        .bind(&session.shop_id)
        .bind(&id)
        .bind(&customer.client_ref)
        .bind(customer.opening_due_cents)
        .bind(customer.recorded_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_item_err(&customer.client_ref, e))?;
    }

    tx.commit()
        .await
        .map_err(|e| db_item_err(&customer.client_ref, e))?;

    Ok(CommittedId {
        client_ref: customer.client_ref.clone(),
        server_id: id,
        invoice_no: None,
    })
}

// =============================================================================
// Due Payments
// =============================================================================

/// `POST /v1/sync/due-payments`
pub async fn commit_due_payments(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(req): Json<DuePaymentBatchRequest>,
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
        "Processing due-payment batch"
    );

    let mut ids = Vec::new();
    let mut errors = Vec::new();

    for payment in &req.new_items {
        match commit_payment(&state, &session, payment).await {
            Ok((committed, fresh)) => {
                if fresh {
                    state.realtime.publish(
                        "due.payment",
                        &session.shop_id,
                        json!({
                            "paymentId": committed.server_id,
                            "amountCents": payment.amount_cents,
                        }),
                    );
                }
                ids.push(committed);
            }
            Err(e) => {
                warn!(client_ref = %e.client_ref, code = %e.code, "Due payment rejected");
                errors.push(e);
            }
        }
    }

    Ok(Json(BatchResponse::from_outcomes(ids, errors)))
}

async fn commit_payment(
    state: &AppState,
    session: &AuthSession,
    payment: &DuePaymentPayload,
) -> Result<(CommittedId, bool), BatchItemError> {
    if let Err(e) = OperationPayload::DuePaymentCreate(payment.clone()).validate() {
        return Err(item_err(
            &payment.client_ref,
            "VALIDATION",
            e.to_string(),
            false,
        ));
    }

    let mut tx = state
        .db
        .pool()
        .begin()
        .await
        .map_err(|e| db_item_err(&payment.client_ref, e))?;

    let existing: Option<String> = sqlx::query_scalar(
        "SELECT id FROM customer_ledger \
         WHERE shop_id = ?1 AND client_ref = ?2 AND entry_type = 'payment'",
    )
    .bind(&session.shop_id)
    .bind(&payment.client_ref)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| db_item_err(&payment.client_ref, e))?;

    if let Some(id) = existing {
        return Ok((
            CommittedId {
                client_ref: payment.client_ref.clone(),
                server_id: id,
                invoice_no: None,
            },
            false,
        ));
    }

    // The customer may have been created earlier in this very run, so the
    // reference resolves by canonical id or client ref.
    let customer: Option<CustomerRecord> = sqlx::query_as(
        r#"
        SELECT id, shop_id, client_ref, name, due_cents
        FROM customers
        WHERE shop_id = ?1 AND (id = ?2 OR client_ref = ?2)
        "#,
    )
    .bind(&session.shop_id)
    .bind(&payment.customer_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| db_item_err(&payment.client_ref, e))?;

    let Some(customer) = customer else {
        return Err(item_err(
            &payment.client_ref,
            "CUSTOMER_NOT_FOUND",
            format!(
                "customer {} does not exist in this shop",
                payment.customer_id
            ),
            false,
        ));
    };

    let ledger_id = new_id();
    let now = Utc::now();

    // Payment reduces the balance: negative ledger amount.
    sqlx::query(
        r#"
        INSERT INTO customer_ledger (
            id, shop_id, customer_id, client_ref, entry_type,
            amount_cents, reference_id, recorded_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, 'payment', ?5, NULL, ?6, ?7)
        "#,
    )
    .bind(&ledger_id)
    .bind(&session.shop_id)
    .bind(&customer.id)
    .bind(&payment.client_ref)
    .bind(-payment.amount_cents)
    .bind(payment.recorded_at)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| db_item_err(&payment.client_ref, e))?;

    sqlx::query(
        "UPDATE customers SET due_cents = due_cents - ?3, updated_at = ?4 \
         WHERE shop_id = ?1 AND id = ?2",
    )
    .bind(&session.shop_id)
    .bind(&customer.id)
    .bind(payment.amount_cents)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| db_item_err(&payment.client_ref, e))?;

    // The collected cash lands in the cash ledger in the same transaction.
    sqlx::query(
        r#"
        INSERT INTO cash_ledger (
            id, shop_id, device_id, client_ref, direction,
            amount_cents, source, reference_id, reason, recorded_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, 'cash_in', ?5, 'due_payment', ?6, NULL, ?7, ?8)
        "#,
    )
    .bind(new_id())
    .bind(&session.shop_id)
    .bind(&session.device_id)
    .bind(&payment.client_ref)
    .bind(payment.amount_cents)
    .bind(&ledger_id)
    .bind(payment.recorded_at)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| db_item_err(&payment.client_ref, e))?;

    tx.commit()
        .await
        .map_err(|e| db_item_err(&payment.client_ref, e))?;

    Ok((
        CommittedId {
            client_ref: payment.client_ref.clone(),
            server_id: ledger_id,
            invoice_no: None,
        },
        true,
    ))
}
