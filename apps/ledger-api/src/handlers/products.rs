//! Product batch commit handler.
//!
//! Products are the only mutable entity family, so the batch carries
//! creates, updates, and deletions together. Deletes are soft (is_active),
//! and deleting an unknown product is a success: the intent is already
//! satisfied.

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
use dukan_core::wire::{BatchItemError, BatchResponse, CommittedId, ProductBatchRequest};
use dukan_core::{OperationPayload, ProductPayload};

/// `POST /v1/sync/products`
pub async fn commit_products(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(req): Json<ProductBatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    let item_count = req.new_items.len() + req.updated_items.len() + req.deleted_ids.len();
    if item_count > state.config.batch_size_limit {
        return Err(ApiError::InvalidRequest(format!(
            "batch exceeds {} items",
            state.config.batch_size_limit
        )));
    }

    info!(
        shop_id = %session.shop_id,
        creates = req.new_items.len(),
        updates = req.updated_items.len(),
        deletes = req.deleted_ids.len(),
        "Processing product batch"
    );

    let mut ids = Vec::new();
    let mut errors = Vec::new();

    for product in &req.new_items {
        match create_one(&state, &session, product).await {
            Ok(committed) => ids.push(committed),
            Err(e) => {
                warn!(client_ref = %e.client_ref, code = %e.code, "Product create rejected");
                errors.push(e);
            }
        }
    }

    for product in &req.updated_items {
        match update_one(&state, &session, product).await {
            Ok(committed) => ids.push(committed),
            Err(e) => {
                warn!(client_ref = %e.client_ref, code = %e.code, "Product update rejected");
                errors.push(e);
            }
        }
    }

    for deleted_id in &req.deleted_ids {
        match delete_one(&state, &session, deleted_id).await {
            Ok(committed) => ids.push(committed),
            Err(e) => errors.push(e),
        }
    }

    if !ids.is_empty() {
        state.realtime.publish(
            "product.changed",
            &session.shop_id,
            json!({ "count": ids.len() }),
        );
    }

    Ok(Json(BatchResponse::from_outcomes(ids, errors)))
}

async fn create_one(
    state: &AppState,
    session: &AuthSession,
    product: &ProductPayload,
) -> Result<CommittedId, BatchItemError> {
    if let Err(e) = OperationPayload::ProductCreate(product.clone()).validate() {
        return Err(item_err(
            &product.client_ref,
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
        .map_err(|e| db_item_err(&product.client_ref, e))?;

    // Idempotent on (shop, client_ref).
    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM products WHERE shop_id = ?1 AND client_ref = ?2")
            .bind(&session.shop_id)
            .bind(&product.client_ref)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_item_err(&product.client_ref, e))?;

    if let Some(id) = existing {
        return Ok(CommittedId {
            client_ref: product.client_ref.clone(),
            server_id: id,
            invoice_no: None,
        });
    }

    let id = new_id();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO products (
            id, shop_id, client_ref, name, price_cents, cost_cents,
            stock_qty, track_stock, is_active, sync_version, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?10)
        "#,
    )
    .bind(&id)
    .bind(&session.shop_id)
    .bind(&product.client_ref)
    .bind(product.name.trim())
    .bind(product.price_cents)
    .bind(product.cost_cents)
    .bind(product.stock_qty)
    .bind(product.track_stock)
    .bind(product.is_active)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| db_item_err(&product.client_ref, e))?;

    tx.commit()
        .await
        .map_err(|e| db_item_err(&product.client_ref, e))?;

    Ok(CommittedId {
        client_ref: product.client_ref.clone(),
        server_id: id,
        invoice_no: None,
    })
}

async fn update_one(
    state: &AppState,
    session: &AuthSession,
    product: &ProductPayload,
) -> Result<CommittedId, BatchItemError> {
    if let Err(e) = OperationPayload::ProductUpdate(product.clone()).validate() {
        return Err(item_err(
            &product.client_ref,
            "VALIDATION",
            e.to_string(),
            false,
        ));
    }

    // Updates address the canonical id when known, the client ref otherwise.
    let key = product
        .product_id
        .clone()
        .unwrap_or_else(|| product.client_ref.clone());

    let mut tx = state
        .db
        .pool()
        .begin()
        .await
        .map_err(|e| db_item_err(&product.client_ref, e))?;

    let existing: Option<String> = sqlx::query_scalar(
        "SELECT id FROM products WHERE shop_id = ?1 AND (id = ?2 OR client_ref = ?2)",
    )
    .bind(&session.shop_id)
    .bind(&key)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| db_item_err(&product.client_ref, e))?;

    let Some(id) = existing else {
        return Err(item_err(
            &product.client_ref,
            "PRODUCT_NOT_FOUND",
            format!("product {} does not exist in this shop", key),
            false,
        ));
    };

    sqlx::query(
        r#"
        UPDATE products SET
            name = ?3,
            price_cents = ?4,
            cost_cents = ?5,
            stock_qty = ?6,
            track_stock = ?7,
            is_active = ?8,
            sync_version = sync_version + 1,
            updated_at = ?9
        WHERE shop_id = ?1 AND id = ?2
        "#,
    )
    .bind(&session.shop_id)
    .bind(&id)
    .bind(product.name.trim())
    .bind(product.price_cents)
    .bind(product.cost_cents)
    .bind(product.stock_qty)
    .bind(product.track_stock)
    .bind(product.is_active)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .map_err(|e| db_item_err(&product.client_ref, e))?;

    tx.commit()
        .await
        .map_err(|e| db_item_err(&product.client_ref, e))?;

    Ok(CommittedId {
        client_ref: product.client_ref.clone(),
        server_id: id,
        invoice_no: None,
    })
}

async fn delete_one(
    state: &AppState,
    session: &AuthSession,
    deleted_id: &str,
) -> Result<CommittedId, BatchItemError> {
    let existing: Option<String> = sqlx::query_scalar(
        "SELECT id FROM products WHERE shop_id = ?1 AND (id = ?2 OR client_ref = ?2)",
    )
    .bind(&session.shop_id)
    .bind(deleted_id)
    .fetch_optional(state.db.pool())
    .await
    .map_err(|e| db_item_err(deleted_id, e))?;

    // Deleting something already gone is a success, not an error.
    let Some(id) = existing else {
        return Ok(CommittedId {
            client_ref: deleted_id.to_string(),
            server_id: deleted_id.to_string(),
            invoice_no: None,
        });
    };

    sqlx::query(
        "UPDATE products SET is_active = 0, sync_version = sync_version + 1, updated_at = ?3 \
         WHERE shop_id = ?1 AND id = ?2",
    )
    .bind(&session.shop_id)
    .bind(&id)
    .bind(Utc::now())
    .execute(state.db.pool())
    .await
    .map_err(|e| db_item_err(deleted_id, e))?;

    Ok(CommittedId {
        client_ref: deleted_id.to_string(),
        server_id: id,
        invoice_no: None,
    })
}
