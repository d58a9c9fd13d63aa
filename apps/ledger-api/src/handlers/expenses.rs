//! Expense batch commit handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::AuthSession;
use crate::db::new_id;
use crate::error::ApiError;
use crate::handlers::{db_item_err, item_err};
use crate::AppState;
use dukan_core::wire::{BatchItemError, BatchResponse, CommittedId, ExpenseBatchRequest};
use dukan_core::{ExpensePayload, OperationPayload};

/// `POST /v1/sync/expenses`
pub async fn commit_expenses(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(req): Json<ExpenseBatchRequest>,
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
        "Processing expense batch"
    );

    let mut ids = Vec::new();
    let mut errors = Vec::new();

    for expense in &req.new_items {
        match commit_one(&state, &session, expense).await {
            Ok((committed, fresh)) => {
                if fresh {
                    state.realtime.publish(
                        "expense.committed",
                        &session.shop_id,
                        json!({
                            "expenseId": committed.server_id,
                            "amountCents": expense.amount_cents,
                            "category": expense.category,
                        }),
                    );
                }
                ids.push(committed);
            }
            Err(e) => {
                warn!(client_ref = %e.client_ref, code = %e.code, "Expense rejected");
                errors.push(e);
            }
        }
    }

    Ok(Json(BatchResponse::from_outcomes(ids, errors)))
}

async fn commit_one(
    state: &AppState,
    session: &AuthSession,
    expense: &ExpensePayload,
) -> Result<(CommittedId, bool), BatchItemError> {
    if let Err(e) = OperationPayload::ExpenseCreate(expense.clone()).validate() {
        return Err(item_err(
            &expense.client_ref,
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
        .map_err(|e| db_item_err(&expense.client_ref, e))?;

    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM expenses WHERE shop_id = ?1 AND client_ref = ?2")
            .bind(&session.shop_id)
            .bind(&expense.client_ref)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_item_err(&expense.client_ref, e))?;

    if let Some(id) = existing {
        return Ok((
            CommittedId {
                client_ref: expense.client_ref.clone(),
                server_id: id,
                invoice_no: None,
            },
            false,
        ));
    }

    let id = new_id();

    sqlx::query(
        r#"
        INSERT INTO expenses (
            id, shop_id, device_id, client_ref, category, description,
            amount_cents, recorded_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&id)
    .bind(&session.shop_id)
    .bind(&session.device_id)
    .bind(&expense.client_ref)
    .bind(expense.category.trim())
    .bind(&expense.description)
    .bind(expense.amount_cents)
    .bind(expense.recorded_at)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .map_err(|e| db_item_err(&expense.client_ref, e))?;

    tx.commit()
        .await
        .map_err(|e| db_item_err(&expense.client_ref, e))?;

    Ok((
        CommittedId {
            client_ref: expense.client_ref.clone(),
            server_id: id,
            invoice_no: None,
        },
        true,
    ))
}
