//! HTTP Batch Store client
//!
//! **[BO-INT-011]** JSON-over-HTTP implementation of the `BatchStore`
//! contract against the transformation backend's REST surface.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;
use wtmk_common::events::BatchStatus;

use super::{status_wire_name, BatchRecord, BatchStore, ItemRecord, StoreError};

const USER_AGENT: &str = concat!("wtmk-bo/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the Batch Store / transformation backend
#[derive(Debug, Clone)]
pub struct HttpBatchStore {
    client: reqwest::Client,
    base_url: String,
    /// Upper bound for reads and status updates. The processing trigger is
    /// deliberately unbounded (its duration tracks the whole batch).
    request_timeout: Duration,
}

impl HttpBatchStore {
    /// Create a client against the given base URL (no trailing slash)
    pub fn new(base_url: String, request_timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            request_timeout,
        })
    }

    fn batch_url(&self, batch_id: Uuid) -> String {
        format!("{}/batches/{}", self.base_url, batch_id)
    }

    async fn check_status(
        response: reqwest::Response,
        batch_id: Uuid,
    ) -> Result<reqwest::Response, StoreError> {
        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(batch_id)),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Api(s.as_u16(), body))
            }
        }
    }
}

#[async_trait]
impl BatchStore for HttpBatchStore {
    async fn get_batch(&self, batch_id: Uuid) -> Result<BatchRecord, StoreError> {
        let response = self
            .client
            .get(self.batch_url(batch_id))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Self::check_status(response, batch_id)
            .await?
            .json::<BatchRecord>()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))
    }

    async fn get_batch_items(&self, batch_id: Uuid) -> Result<Vec<ItemRecord>, StoreError> {
        let response = self
            .client
            .get(format!("{}/items", self.batch_url(batch_id)))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Self::check_status(response, batch_id)
            .await?
            .json::<Vec<ItemRecord>>()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))
    }

    async fn update_batch_status(
        &self,
        batch_id: Uuid,
        status: BatchStatus,
    ) -> Result<(), StoreError> {
        let response = self
            .client
            .patch(format!("{}/status", self.batch_url(batch_id)))
            .timeout(self.request_timeout)
            .json(&json!({ "status": status_wire_name(status) }))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Self::check_status(response, batch_id).await?;
        Ok(())
    }

    async fn trigger_processing(&self, batch_id: Uuid) -> Result<(), StoreError> {
        // No timeout: the backend holds this request open until the batch
        // reaches a terminal state.
        let response = self
            .client
            .post(format!("{}/process", self.batch_url(batch_id)))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Self::check_status(response, batch_id).await?;
        Ok(())
    }
}
