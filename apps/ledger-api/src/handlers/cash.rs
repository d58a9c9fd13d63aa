//! Cash movement batch commit handler.
//!
//! Manual cash-in / cash-out entries. Sale- and due-payment-sourced cash
//! rows are written by their own handlers inside the same transaction as
//! the fact that caused them; this endpoint only accepts `manual` rows.

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
use dukan_core::wire::{BatchItemError, BatchResponse, CashBatchRequest, CommittedId};
use dukan_core::{CashEntryPayload, OperationPayload};

/// `POST /v1/sync/cash`
pub async fn commit_cash(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(req): Json<CashBatchRequest>,
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
        "Processing cash batch"
    );

    let mut ids = Vec::new();
    let mut errors = Vec::new();

    for entry in &req.new_items {
        match commit_one(&state, &session, entry).await {
            Ok((committed, fresh)) => {
                if fresh {
                    state.realtime.publish(
                        "cash.committed",
                        &session.shop_id,
                        json!({
                            "entryId": committed.server_id,
                            "direction": entry.direction,
                            "amountCents": entry.amount_cents,
                        }),
                    );
                }
                ids.push(committed);
            }
            Err(e) => {
                warn!(client_ref = %e.client_ref, code = %e.code, "Cash entry rejected");
                errors.push(e);
            }
        }
    }

    Ok(Json(BatchResponse::from_outcomes(ids, errors)))
}

async fn commit_one(
    state: &AppState,
    session: &AuthSession,
    entry: &CashEntryPayload,
) -> Result<(CommittedId, bool), BatchItemError> {
    if let Err(e) = OperationPayload::CashCreate(entry.clone()).validate() {
        return Err(item_err(
            &entry.client_ref,
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
        .map_err(|e| db_item_err(&entry.client_ref, e))?;

    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM cash_ledger WHERE shop_id = ?1 AND client_ref = ?2")
            .bind(&session.shop_id)
            .bind(&entry.client_ref)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_item_err(&entry.client_ref, e))?;

    if let Some(id) = existing {
        return Ok((
            CommittedId {
                client_ref: entry.client_ref.clone(),
                server_id: id,
                invoice_no: None,
            },
            false,
        ));
    }

    let id = new_id();

    sqlx::query(
        r#"
        INSERT INTO cash_ledger (
            id, shop_id, device_id, client_ref, direction,
            amount_cents, source, reference_id, reason, recorded_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'manual', NULL, ?7, ?8, ?9)
        "#,
    )
    .bind(&id)
    .bind(&session.shop_id)
    .bind(&session.device_id)
    .bind(&entry.client_ref)
    .bind(entry.direction)
    .bind(entry.amount_cents)
    .bind(&entry.reason)
    .bind(entry.recorded_at)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .map_err(|e| db_item_err(&entry.client_ref, e))?;

    tx.commit()
        .await
        .map_err(|e| db_item_err(&entry.client_ref, e))?;

    Ok((
        CommittedId {
            client_ref: entry.client_ref.clone(),
            server_id: id,
            invoice_no: None,
        },
        true,
    ))
}
