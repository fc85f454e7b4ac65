//! CoinGecko API service - coin catalogue and per-coin market data

use std::collections::HashMap;
use std::time::Duration;

use bigdecimal::BigDecimal;
use serde::Deserialize;
use tracing::info;

use crate::error::ScanError;

const BASE_URL: &str = "https://api.coingecko.com/api/v3";
const COIN_PAGE_URL: &str = "https://www.coingecko.com/en/coins";
const MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// One row of the full coins list.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinListEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    /// Platform slug to contract address; empty for native listings
    #[serde(default)]
    pub platforms: HashMap<String, Option<String>>,
}

/// Market data for a single coin.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub genesis_date: Option<String>,
    #[serde(default)]
    pub market_data: Option<MarketData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketData {
    #[serde(default)]
    pub market_cap: MarketCap,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketCap {
    #[serde(default)]
    pub usd: Option<BigDecimal>,
}

impl CoinInfo {
    /// Market cap in USD, zero when CoinGecko has none.
    pub fn market_cap_usd(&self) -> BigDecimal {
        self.market_data
            .as_ref()
            .and_then(|m| m.market_cap.usd.clone())
            .unwrap_or_default()
    }
}

/// Public page URL for a coin id, used in the token reports.
pub fn coin_page_url(id: &str) -> String {
    format!("{}/{}", COIN_PAGE_URL, id)
}

/// CoinGecko API service. The free tier rate-limits aggressively, so the
/// per-coin fetch honors `Retry-After` on 429 responses.
pub struct CoinGeckoService {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoService {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Full coin catalogue with platform mappings.
    pub async fn coins_list(&self) -> Result<Vec<CoinListEntry>, ScanError> {
        let url = format!("{}/coins/list?include_platform=true", self.base_url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::Upstream(format!(
                "coins list status {}: {}",
                status, body
            )));
        }

        let list: Vec<CoinListEntry> = response.json().await?;
        if list.is_empty() {
            return Err(ScanError::Upstream("empty coins list".to_string()));
        }
        Ok(list)
    }

    /// Market data for one coin, waiting out 429 responses.
    pub async fn coin_info(&self, id: &str) -> Result<CoinInfo, ScanError> {
        let url = format!(
            "{}/coins/{}?localization=false&tickers=false&community_data=false&developer_data=false&sparkline=false",
            self.base_url, id
        );
        let mut attempt = 1;

        loop {
            let response = self.client.get(&url).send().await?;

            if response.status().as_u16() == 429 {
                if attempt >= MAX_ATTEMPTS {
                    return Err(ScanError::UpstreamUnavailable {
                        operation: "coin_info".to_string(),
                        attempts: attempt,
                        source: Box::new(ScanError::Transient(
                            "rate limit exceeded".to_string(),
                        )),
                    });
                }
                let wait = retry_after(&response).unwrap_or(DEFAULT_RETRY_AFTER);
                info!(target: "COINGECKO", "rate limit reached, waiting {:?}...", wait);
                tokio::time::sleep(wait).await;
                attempt += 1;
                continue;
            }

            return Ok(response.json().await?);
        }
    }
}

impl Default for CoinGeckoService {
    fn default() -> Self {
        Self::new()
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
