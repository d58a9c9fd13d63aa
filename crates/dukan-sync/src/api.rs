//! # Batch API Client
//!
//! The engine's view of the ledger server: one commit call per entity
//! family plus a session probe. The trait seam lets tests drive the engine
//! with an in-memory server while production uses HTTP.
//!
//! ## Status Classification
//! ```text
//! 2xx                    → decode BatchResponse (per-item outcomes inside)
//! 401 / 403              → AuthRejected   → engine-wide pause
//! 5xx                    → ServerFault    → retry next run, logged distinctly
//! 408 / 429              → Transport      → retry next run
//! other 4xx              → Rejected       → dead-letter, retrying cannot help
//! network / timeout      → Transport      → retry next run
//! undecodable body       → Protocol       → retry next run
//! ```

use std::future::Future;
use std::sync::RwLock;

use serde::Serialize;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use dukan_core::wire::{
    BatchResponse, CashBatchRequest, DueCustomerBatchRequest, DuePaymentBatchRequest,
    ExpenseBatchRequest, ProductBatchRequest, SaleBatchRequest,
};

// =============================================================================
// Batch API Trait
// =============================================================================

/// Server batch endpoints, one per entity family.
///
/// Every call is independent: the engine submits families one at a time and
/// a failure in one must not block the others.
pub trait BatchApi: Send + Sync {
    fn commit_products(
        &self,
        req: ProductBatchRequest,
    ) -> impl Future<Output = SyncResult<BatchResponse>> + Send;

    fn commit_sales(
        &self,
        req: SaleBatchRequest,
    ) -> impl Future<Output = SyncResult<BatchResponse>> + Send;

    fn commit_expenses(
        &self,
        req: ExpenseBatchRequest,
    ) -> impl Future<Output = SyncResult<BatchResponse>> + Send;

    fn commit_cash(
        &self,
        req: CashBatchRequest,
    ) -> impl Future<Output = SyncResult<BatchResponse>> + Send;

    fn commit_due_customers(
        &self,
        req: DueCustomerBatchRequest,
    ) -> impl Future<Output = SyncResult<BatchResponse>> + Send;

    fn commit_due_payments(
        &self,
        req: DuePaymentBatchRequest,
    ) -> impl Future<Output = SyncResult<BatchResponse>> + Send;

    /// Probes the ambient session. Used to lift an auth pause.
    fn check_session(&self) -> impl Future<Output = SyncResult<()>> + Send;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// HTTP batch client against the ledger API.
pub struct HttpBatchApi {
    client: reqwest::Client,
    base_url: String,
    /// Bearer token for the ambient session. Refreshed by the auth layer,
    /// read per request.
    token: RwLock<Option<String>>,
}

impl HttpBatchApi {
    /// Creates a client for the given base URL.
    pub fn new(base_url: impl Into<String>, request_timeout: std::time::Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let base_url: String = base_url.into();

        Ok(HttpBatchApi {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    /// Installs the session token used for subsequent requests.
    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token.into());
        }
    }

    fn current_token(&self) -> Option<String> {
        self.token.read().ok().and_then(|g| g.clone())
    }

    async fn post_batch<B: Serialize + ?Sized>(
        &self,
        family_path: &str,
        body: &B,
    ) -> SyncResult<BatchResponse> {
        let url = format!("{}/v1/sync/{}", self.base_url, family_path);
        debug!(url = %url, "Submitting batch");

        let mut request = self.client.post(&url).json(body);
        if let Some(token) = self.current_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(status, message));
        }

        response
            .json::<BatchResponse>()
            .await
            .map_err(|e| SyncError::Protocol(e.to_string()))
    }
}

impl BatchApi for HttpBatchApi {
    async fn commit_products(&self, req: ProductBatchRequest) -> SyncResult<BatchResponse> {
        self.post_batch("products", &req).await
    }

    async fn commit_sales(&self, req: SaleBatchRequest) -> SyncResult<BatchResponse> {
        self.post_batch("sales", &req).await
    }

    async fn commit_expenses(&self, req: ExpenseBatchRequest) -> SyncResult<BatchResponse> {
        self.post_batch("expenses", &req).await
    }

    async fn commit_cash(&self, req: CashBatchRequest) -> SyncResult<BatchResponse> {
        self.post_batch("cash", &req).await
    }

    async fn commit_due_customers(
        &self,
        req: DueCustomerBatchRequest,
    ) -> SyncResult<BatchResponse> {
        self.post_batch("due-customers", &req).await
    }

    async fn commit_due_payments(&self, req: DuePaymentBatchRequest) -> SyncResult<BatchResponse> {
        self.post_batch("due-payments", &req).await
    }

    async fn check_session(&self) -> SyncResult<()> {
        let url = format!("{}/v1/session", self.base_url);

        let mut request = self.client.get(&url);
        if let Some(token) = self.current_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(classify_status(status, String::new()))
        }
    }
}

/// Maps a non-success HTTP status onto the sync failure taxonomy.
fn classify_status(status: u16, message: String) -> SyncError {
    match status {
        401 | 403 => SyncError::AuthRejected { status },
        408 | 429 => SyncError::Transport(format!("status {}: {}", status, message)),
        500..=599 => SyncError::ServerFault { status, message },
        _ => SyncError::Rejected { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(401, String::new()),
            SyncError::AuthRejected { status: 401 }
        ));
        assert!(matches!(
            classify_status(403, String::new()),
            SyncError::AuthRejected { status: 403 }
        ));
        assert!(matches!(
            classify_status(503, String::new()),
            SyncError::ServerFault { status: 503, .. }
        ));
        assert!(matches!(
            classify_status(429, String::new()),
            SyncError::Transport(_)
        ));
        assert!(matches!(
            classify_status(422, String::new()),
            SyncError::Rejected { status: 422, .. }
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let api = HttpBatchApi::new(
            "https://ledger.example.com/",
            std::time::Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(api.base_url, "https://ledger.example.com");
    }
}
