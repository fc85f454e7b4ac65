//! Covalent API service - token holders, address balances, block lookups

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::chains::Chain;
use crate::config::Config;
use crate::error::ScanError;
use crate::utils::rate_limit::RequestThrottle;

const BASE_URL: &str = "https://api.covalenthq.com/v1";
const PAGE_SIZE: u32 = 1000;
const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// A holder record from the token-holders endpoint. Immutable after fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct Holder {
    pub address: String,
    /// Raw balance as a decimal string, unscaled
    pub balance: String,
    #[serde(default)]
    pub contract_decimals: i64,
    #[serde(default)]
    pub contract_ticker_symbol: String,
}

/// A portfolio entry from the balances endpoint. Immutable after fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct Balance {
    #[serde(default)]
    pub contract_ticker_symbol: String,
    #[serde(default)]
    pub contract_address: String,
    #[serde(rename = "type", default)]
    pub balance_type: String,
    /// USD value of the position; null for unpriced tokens
    #[serde(default)]
    pub quote: Option<f64>,
}

/// Covalent wraps every payload in the same envelope and reports errors
/// in-band.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HoldersPage {
    #[serde(default)]
    items: Vec<Holder>,
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct BalancesPage {
    #[serde(default)]
    items: Vec<Balance>,
}

#[derive(Debug, Deserialize)]
struct BlocksPage {
    #[serde(default)]
    items: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct Block {
    height: u64,
}

/// Covalent API service. Every request goes through the shared throttle and
/// the bounded retry loop.
pub struct CovalentService {
    client: reqwest::Client,
    api_key: String,
    throttle: Arc<RequestThrottle>,
    base_url: String,
}

impl CovalentService {
    pub fn new(config: &Config, throttle: Arc<RequestThrottle>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            throttle,
            base_url: BASE_URL.to_string(),
        }
    }

    /// All current holders of a token, paginated internally.
    pub async fn token_holders(
        &self,
        chain: Chain,
        token_address: &str,
        block_height: Option<u64>,
    ) -> Result<Vec<Holder>, ScanError> {
        let mut holders = Vec::new();
        let mut page = 0u32;

        loop {
            let mut url = format!(
                "{}/{}/tokens/{}/token_holders/?page-size={}&page-number={}&key={}",
                self.base_url,
                chain.covalent_id(),
                token_address,
                PAGE_SIZE,
                page,
                self.api_key
            );
            if let Some(height) = block_height {
                url.push_str(&format!("&block-height={}", height));
            }

            let data: HoldersPage = self.get("token_holders", &url).await?;
            let has_more = data.pagination.map(|p| p.has_more).unwrap_or(false);
            debug!(target: "COVALENT", "holders page {}: {} items", page, data.items.len());
            holders.extend(data.items);

            if !has_more {
                break;
            }
            page += 1;
        }

        Ok(holders)
    }

    /// Every balance held by an address on the given chain.
    pub async fn address_balances(
        &self,
        chain: Chain,
        address: &str,
    ) -> Result<Vec<Balance>, ScanError> {
        let url = format!(
            "{}/{}/address/{}/balances_v2/?key={}",
            self.base_url,
            chain.covalent_id(),
            address,
            self.api_key
        );
        let data: BalancesPage = self.get("address_balances", &url).await?;
        Ok(data.items)
    }

    /// Block height at the given date, if any block exists for it.
    pub async fn block_by_date(
        &self,
        chain: Chain,
        date: NaiveDate,
    ) -> Result<Option<u64>, ScanError> {
        let end = date.succ_opt().unwrap_or(date);
        let url = format!(
            "{}/{}/block_v2/{}/{}/?key={}",
            self.base_url,
            chain.covalent_id(),
            date,
            end,
            self.api_key
        );
        let data: BlocksPage = self.get("block_by_date", &url).await?;
        Ok(data.items.first().map(|b| b.height))
    }

    /// One throttled GET with bounded retry on transient failures.
    async fn get<T: DeserializeOwned>(&self, operation: &str, url: &str) -> Result<T, ScanError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 1;

        loop {
            match self.get_once(url).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_transient() => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(ScanError::UpstreamUnavailable {
                            operation: operation.to_string(),
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }
                    warn!(
                        target: "COVALENT",
                        "{} attempt {} failed, retrying in {:?}: {}",
                        operation, attempt, backoff, e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, ScanError> {
        self.throttle.acquire().await;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ScanError::Transient(format!("status {}", status)));
        }

        let envelope: Envelope<T> = response.json().await?;
        if envelope.error {
            let message = envelope
                .error_message
                .unwrap_or_else(|| "unknown upstream error".to_string());
            return Err(classify_upstream(message));
        }

        envelope
            .data
            .ok_or_else(|| ScanError::Transient("missing data in response body".to_string()))
    }
}

/// Queue-full and rate-limit conditions reported in the envelope are worth
/// retrying; everything else is a hard upstream error.
fn classify_upstream(message: String) -> ScanError {
    let lower = message.to_lowercase();
    if lower.contains("rate limit")
        || lower.contains("limit exceeded")
        || lower.contains("queue")
        || lower.contains("backlog")
        || lower.contains("timeout")
    {
        ScanError::Transient(message)
    } else {
        ScanError::Upstream(message)
    }
}
