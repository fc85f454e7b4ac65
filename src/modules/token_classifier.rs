//! Token inclusion rules backed by a shared CoinGecko metadata cache

use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::chains::Chain;
use crate::error::ScanError;
use crate::utils::coingecko::CoinGeckoService;
use crate::utils::covalent::Balance;

/// Market cap ceiling in USD; anything larger is already well discovered.
const MARKET_CAP_CEILING_USD: i64 = 50_000_000;

/// Tokens with a genesis date before this are excluded.
const GENESIS_CUTOFF: (i32, u32, u32) = (2022, 4, 1);

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Cached CoinGecko metadata for one (chain, symbol) key.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub id: String,
    pub symbol: String,
    /// None until the one-time per-coin fetch has run
    pub market_cap: Option<BigDecimal>,
    pub genesis_date: Option<String>,
}

type CacheMap = HashMap<Chain, HashMap<String, TokenInfo>>;

/// Decides whether a balance belongs in the holdings report.
///
/// The metadata cache behind it is a single lock shared across
/// classification for all chains; entries are filled at most once per key
/// and never evicted within a run.
pub struct TokenClassifier {
    coingecko: Arc<CoinGeckoService>,
    queried_token_address: String,
    cache: Mutex<CacheMap>,
}

impl TokenClassifier {
    pub fn new(coingecko: Arc<CoinGeckoService>, queried_token_address: &str) -> Self {
        Self {
            coingecko,
            queried_token_address: queried_token_address.to_string(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Seed the per-chain symbol maps from the CoinGecko coins list.
    pub async fn warm_cache(&self, chains: &[Chain]) -> Result<(), ScanError> {
        info!(target: "COINGECKO", "Initializing token metadata cache...");
        let list = self.coingecko.coins_list().await?;

        let mut cache = self.cache.lock().await;
        for chain in chains {
            cache.entry(*chain).or_default();
        }

        for coin in list {
            if coin.id.is_empty() || coin.symbol.is_empty() {
                continue;
            }
            // wormhole-wrapped listings shadow the originals
            if coin.id.contains("wormhole") {
                continue;
            }

            let info = TokenInfo {
                id: coin.id.clone(),
                symbol: coin.symbol.clone(),
                market_cap: None,
                genesis_date: None,
            };
            let key = coin.symbol.to_lowercase();

            // Coins without platform mappings are native listings; Covalent
            // reports those under Ethereum.
            if coin.platforms.is_empty() {
                if let Some(map) = cache.get_mut(&Chain::Ethereum) {
                    map.insert(key, info);
                }
                continue;
            }
            for chain in chains {
                if coin.platforms.contains_key(chain.coingecko_platform()) {
                    if let Some(map) = cache.get_mut(chain) {
                        map.insert(key.clone(), info.clone());
                    }
                }
            }
        }

        if cache.values().all(|m| m.is_empty()) {
            return Err(ScanError::Upstream(
                "no known tokens for any configured chain".to_string(),
            ));
        }
        for (chain, map) in cache.iter() {
            info!(target: "COINGECKO", "{}: {} known tokens", chain, map.len());
        }
        Ok(())
    }

    /// True iff the balance is the queried token itself or dust. Such
    /// balances still count toward portfolio value, just not holdings.
    pub fn should_skip_balance(&self, balance: &Balance) -> bool {
        balance.contract_address == self.queried_token_address || balance.balance_type == "dust"
    }

    /// Whether a symbol should be excluded from the report. Market data is
    /// fetched on first use; later calls for the same key hit the cache.
    pub async fn should_skip_token(&self, chain: Chain, symbol: &str) -> Result<bool, ScanError> {
        let key = symbol.to_lowercase();
        let mut cache = self.cache.lock().await;

        let cached = match cache.get(&chain).and_then(|m| m.get(&key)) {
            Some(info) => info.clone(),
            None => return Ok(true),
        };
        if cached.id.is_empty() {
            return Ok(true);
        }

        let info = if cached.market_cap.is_none() {
            let fetched = self.coingecko.coin_info(&cached.id).await?;
            let fresh = TokenInfo {
                market_cap: Some(fetched.market_cap_usd()),
                id: fetched.id,
                symbol: fetched.symbol,
                genesis_date: fetched.genesis_date,
            };
            debug!(target: "COINGECKO", "symbol: {}, token info: {:?}", symbol, fresh);
            if let Some(map) = cache.get_mut(&chain) {
                map.insert(key, fresh.clone());
            }
            fresh
        } else {
            cached
        };

        if let Some(cap) = &info.market_cap {
            if *cap > BigDecimal::from(MARKET_CAP_CEILING_USD) {
                return Ok(true);
            }
        }

        if let Some(genesis) = info.genesis_date.as_deref().filter(|d| !d.is_empty()) {
            let genesis_date = NaiveDate::parse_from_str(genesis, DATE_FORMAT)
                .map_err(|e| ScanError::Upstream(format!("bad genesis date {}: {}", genesis, e)))?;
            if genesis_date < genesis_cutoff() {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// CoinGecko coin id for a cached (chain, symbol), used for report links.
    pub async fn coin_id(&self, chain: Chain, symbol: &str) -> Option<String> {
        let cache = self.cache.lock().await;
        cache
            .get(&chain)
            .and_then(|m| m.get(&symbol.to_lowercase()))
            .map(|info| info.id.clone())
    }

    #[cfg(test)]
    pub(crate) async fn seed(&self, chain: Chain, symbol: &str, info: TokenInfo) {
        let mut cache = self.cache.lock().await;
        cache
            .entry(chain)
            .or_default()
            .insert(symbol.to_lowercase(), info);
    }
}

fn genesis_cutoff() -> NaiveDate {
    let (y, m, d) = GENESIS_CUTOFF;
    NaiveDate::from_ymd_opt(y, m, d).expect("valid cutoff date")
}
