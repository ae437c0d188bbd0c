use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use tracing::debug;

use crate::data::types::{HistoryPage, HistoryResponse};
use crate::data::HistorySource;
use crate::error::HistoryError;

/// HTTP client for a Safe transaction service instance.
///
/// The service keeps the full multisig history per wallet and hands out weak
/// ETags; sending the last one back as `If-None-Match` turns an unchanged
/// fetch into a bodyless 304.
pub struct TransactionService {
    client: reqwest::Client,
    base_url: String,
}

impl TransactionService {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Endpoint URL for one wallet's transaction list. Doubles as the ETag
    /// cache key, so each wallet keeps its own validator.
    pub fn history_url(&self, safe: Address) -> String {
        format!("{}/api/v1/safes/{safe}/transactions/", self.base_url)
    }

    /// Fetch the wallet's transaction history.
    ///
    /// GET {base}/api/v1/safes/{address}/transactions/ with `If-None-Match`
    /// when a previous validator is known. A 304 comes back as
    /// `HistoryPage::NotModified` and is not an error.
    pub async fn fetch_history(
        &self,
        safe: Address,
        etag: Option<&str>,
    ) -> Result<HistoryPage, HistoryError> {
        let url = self.history_url(safe);
        let mut request = self.client.get(&url);
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            debug!(%safe, "history not modified");
            return Ok(HistoryPage::NotModified);
        }
        if !response.status().is_success() {
            return Err(HistoryError::Status(response.status()));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let body = response.bytes().await?;
        let parsed: HistoryResponse = serde_json::from_slice(&body)?;
        debug!(%safe, count = parsed.count, "fetched history page");

        Ok(HistoryPage::Page {
            etag,
            results: parsed.results,
        })
    }
}

#[async_trait]
impl HistorySource for TransactionService {
    fn history_url(&self, safe: Address) -> String {
        TransactionService::history_url(self, safe)
    }

    async fn fetch_history(
        &self,
        safe: Address,
        etag: Option<&str>,
    ) -> Result<HistoryPage, HistoryError> {
        TransactionService::fetch_history(self, safe, etag).await
    }
}
