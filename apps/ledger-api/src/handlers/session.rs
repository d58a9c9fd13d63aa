//! Device enrollment and session probe.
//!
//! The engine authenticates every batch request with the token issued
//! here; `GET /v1/session` is the probe it uses to decide whether to
//! resume after an auth pause.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use tracing::info;

use crate::auth::AuthSession;
use crate::error::ApiError;
use crate::AppState;
use dukan_core::wire::{DeviceAuthRequest, DeviceAuthResponse, SessionResponse};

/// `POST /v1/auth/device`: exchanges a shop API key for a session token.
pub async fn device_auth(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeviceAuthRequest>,
) -> Result<Json<DeviceAuthResponse>, ApiError> {
    let device = state
        .db
        .authenticate_device(&req.shop_id, &req.device_id, &req.api_key)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("Unknown device or invalid API key".into()))?;

    info!(shop_id = %device.shop_id, device_id = %device.id, "Device session issued");

    let token = state.jwt.generate_token(&device.shop_id, &device.id)?;

    Ok(Json(DeviceAuthResponse {
        token,
        expires_in_secs: state.jwt.lifetime_secs(),
    }))
}

/// `GET /v1/session`: succeeds iff the bearer token is valid.
pub async fn session_probe(session: AuthSession) -> Json<SessionResponse> {
    Json(SessionResponse {
        shop_id: session.shop_id,
        device_id: session.device_id,
    })
}
