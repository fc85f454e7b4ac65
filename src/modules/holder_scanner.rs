//! Concurrent holder pipeline
//!
//! Fans out one task per eligible holder, per chain. Workers emit holding
//! and whale messages over a channel to a single-consumer aggregation loop,
//! so the merge needs no shared-map locking. All tasks for a chain drain
//! before that chain's report is written; chains run sequentially.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bigdecimal::{BigDecimal, FromPrimitive, Zero};
use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::chains::Chain;
use crate::modules::holder_filter;
use crate::modules::token_classifier::TokenClassifier;
use crate::utils::covalent::{Balance, CovalentService, Holder};
use crate::utils::reports::ReportService;

/// Messages from holder tasks to the aggregation loop.
#[derive(Debug)]
enum ScanUpdate {
    Holding {
        symbol: String,
        quote: BigDecimal,
    },
    Whale {
        address: String,
        portfolio_value: BigDecimal,
    },
}

/// Parameters for one scan run.
#[derive(Debug, Clone)]
pub struct ScanParams {
    pub token_address: String,
    pub token_chain: Chain,
    pub min_token_qty: BigDecimal,
    pub min_holding_usd: BigDecimal,
    pub whale_threshold: BigDecimal,
    pub snapshot_date: Option<NaiveDate>,
}

pub struct HolderScanner {
    params: ScanParams,
    chains: Vec<Chain>,
    covalent: Arc<CovalentService>,
    classifier: Arc<TokenClassifier>,
    reports: ReportService,
}

impl HolderScanner {
    pub fn new(
        params: ScanParams,
        chains: Vec<Chain>,
        covalent: Arc<CovalentService>,
        classifier: Arc<TokenClassifier>,
        reports: ReportService,
    ) -> Self {
        Self {
            params,
            chains,
            covalent,
            classifier,
            reports,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let block_height = match self.params.snapshot_date {
            Some(date) => {
                let height = self
                    .covalent
                    .block_by_date(self.params.token_chain, date)
                    .await
                    .context("retrieving block by date")?
                    .ok_or_else(|| anyhow!("no block found for {}", date))?;
                info!(target: "SCANNER", "block: {}", height);
                Some(height)
            }
            None => None,
        };

        self.classifier
            .warm_cache(&self.chains)
            .await
            .context("initializing token metadata cache")?;

        info!(target: "SCANNER", "Retrieving holders...");
        let holders = self
            .covalent
            .token_holders(
                self.params.token_chain,
                &self.params.token_address,
                block_height,
            )
            .await
            .with_context(|| {
                format!("retrieving token holders for {}", self.params.token_address)
            })?;
        info!(target: "SCANNER", "Found {} holders", holders.len());
        if holders.is_empty() {
            return Err(anyhow!(
                "no holders found for {}",
                self.params.token_address
            ));
        }
        let token_symbol = holders[0].contract_ticker_symbol.clone();

        let mut whales: HashMap<String, BigDecimal> = HashMap::new();
        for chain in &self.chains {
            info!(target: "SCANNER", "Processing {} chain...", chain);
            let (holdings, chain_whales) = self.scan_chain(*chain, &holders).await;
            merge_whales(&mut whales, chain_whales);
            self.reports
                .write_token_report(*chain, &token_symbol, &holdings, &self.classifier)
                .await?;
        }

        if !whales.is_empty() {
            info!(target: "SCANNER", "🐋 Found {} whales", whales.len());
        }
        self.reports.write_whale_report(&whales)
    }

    /// One chain's window: spawn a task per eligible holder and drain the
    /// channel until every sender is gone.
    async fn scan_chain(
        &self,
        chain: Chain,
        holders: &[Holder],
    ) -> (HashMap<String, BigDecimal>, HashMap<String, BigDecimal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let collector = tokio::spawn(collect_updates(rx));

        let mut tasks = Vec::new();
        for holder in holders {
            if !holder_filter::is_eligible(holder, &self.params.min_token_qty) {
                continue;
            }

            let tx = tx.clone();
            let covalent = Arc::clone(&self.covalent);
            let classifier = Arc::clone(&self.classifier);
            let params = self.params.clone();
            let address = holder.address.clone();
            tasks.push(tokio::spawn(async move {
                process_holder(chain, address, params, covalent, classifier, tx).await;
            }));
        }
        drop(tx);

        for task in tasks {
            if let Err(e) = task.await {
                warn!(target: "SCANNER", "holder task failed: {}", e);
            }
        }
        join_collector(collector).await
    }
}

/// Fetch one holder's balances and emit qualifying updates.
async fn process_holder(
    chain: Chain,
    address: String,
    params: ScanParams,
    covalent: Arc<CovalentService>,
    classifier: Arc<TokenClassifier>,
    tx: mpsc::UnboundedSender<ScanUpdate>,
) {
    let balances = match covalent.address_balances(chain, &address).await {
        Ok(balances) => balances,
        Err(e) => {
            warn!(
                target: "SCANNER",
                "error retrieving balances for chain {}, address {}: {}",
                chain, address, e
            );
            return;
        }
    };

    let (portfolio_value, holdings) = fold_balances(
        chain,
        &address,
        &balances,
        &params.min_holding_usd,
        &classifier,
    )
    .await;

    for (symbol, quote) in holdings {
        let _ = tx.send(ScanUpdate::Holding { symbol, quote });
    }
    if is_whale(&portfolio_value, &params.whale_threshold) {
        let _ = tx.send(ScanUpdate::Whale {
            address,
            portfolio_value,
        });
    }
}

/// Fold one holder's balances into a portfolio value and the qualifying
/// holdings. Every quote counts toward the portfolio value; a holding
/// additionally needs a non-skipped balance, the minimum USD value, and a
/// token the classifier keeps. A metadata error drops only that balance.
async fn fold_balances(
    chain: Chain,
    address: &str,
    balances: &[Balance],
    min_holding_usd: &BigDecimal,
    classifier: &TokenClassifier,
) -> (BigDecimal, Vec<(String, BigDecimal)>) {
    let mut portfolio_value = BigDecimal::zero();
    let mut holdings = Vec::new();

    for balance in balances {
        let quote = balance
            .quote
            .and_then(BigDecimal::from_f64)
            .unwrap_or_else(BigDecimal::zero);
        // skipped balances still count toward portfolio value
        portfolio_value += &quote;

        if classifier.should_skip_balance(balance) {
            continue;
        }
        if quote < *min_holding_usd {
            continue;
        }
        match classifier
            .should_skip_token(chain, &balance.contract_ticker_symbol)
            .await
        {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                warn!(
                    target: "SCANNER",
                    "error checking token {} for {}: {}",
                    balance.contract_ticker_symbol, address, e
                );
                continue;
            }
        }

        holdings.push((balance.contract_ticker_symbol.clone(), quote));
    }

    (portfolio_value, holdings)
}

/// A failed aggregation task is logged and yields empty maps.
async fn join_collector(
    collector: JoinHandle<(HashMap<String, BigDecimal>, HashMap<String, BigDecimal>)>,
) -> (HashMap<String, BigDecimal>, HashMap<String, BigDecimal>) {
    match collector.await {
        Ok(maps) => maps,
        Err(e) => {
            warn!(target: "SCANNER", "aggregation task failed: {}", e);
            (HashMap::new(), HashMap::new())
        }
    }
}

/// The threshold is inclusive.
fn is_whale(portfolio_value: &BigDecimal, threshold: &BigDecimal) -> bool {
    portfolio_value >= threshold
}

/// Single-consumer merge: additive per symbol, maximum per whale address.
async fn collect_updates(
    mut rx: mpsc::UnboundedReceiver<ScanUpdate>,
) -> (HashMap<String, BigDecimal>, HashMap<String, BigDecimal>) {
    let mut holdings: HashMap<String, BigDecimal> = HashMap::new();
    let mut whales: HashMap<String, BigDecimal> = HashMap::new();

    while let Some(update) = rx.recv().await {
        match update {
            ScanUpdate::Holding { symbol, quote } => {
                *holdings.entry(symbol).or_insert_with(BigDecimal::zero) += quote;
            }
            ScanUpdate::Whale {
                address,
                portfolio_value,
            } => insert_max(&mut whales, address, portfolio_value),
        }
    }
    (holdings, whales)
}

/// The same address can qualify on several chains; keep its largest
/// portfolio value so the result does not depend on task ordering.
fn merge_whales(into: &mut HashMap<String, BigDecimal>, from: HashMap<String, BigDecimal>) {
    for (address, value) in from {
        insert_max(into, address, value);
    }
}

fn insert_max(map: &mut HashMap<String, BigDecimal>, key: String, value: BigDecimal) {
    match map.entry(key) {
        Entry::Occupied(mut e) => {
            if value > *e.get() {
                e.insert(value);
            }
        }
        Entry::Vacant(e) => {
            e.insert(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use crate::modules::token_classifier::TokenInfo;
    use crate::utils::coingecko::CoinGeckoService;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    // unroutable base URL: the only metadata fetch these tests tolerate is
    // the one expected to fail
    fn classifier() -> TokenClassifier {
        let coingecko = Arc::new(CoinGeckoService::with_base_url(
            "http://127.0.0.1:9".to_string(),
        ));
        TokenClassifier::new(coingecko, "0xqueried")
    }

    fn bal(symbol: &str, contract: &str, balance_type: &str, quote: f64) -> Balance {
        Balance {
            contract_ticker_symbol: symbol.to_string(),
            contract_address: contract.to_string(),
            balance_type: balance_type.to_string(),
            quote: Some(quote),
        }
    }

    fn kept(id: &str) -> TokenInfo {
        TokenInfo {
            id: id.to_string(),
            symbol: id.to_string(),
            market_cap: Some(BigDecimal::from(1_000_000)),
            genesis_date: None,
        }
    }

    async fn collect(updates: Vec<ScanUpdate>) -> (HashMap<String, BigDecimal>, HashMap<String, BigDecimal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let collector = tokio::spawn(collect_updates(rx));
        for update in updates {
            tx.send(update).unwrap();
        }
        drop(tx);
        collector.await.unwrap()
    }

    fn holding(symbol: &str, quote: &str) -> ScanUpdate {
        ScanUpdate::Holding {
            symbol: symbol.to_string(),
            quote: dec(quote),
        }
    }

    fn whale(address: &str, value: &str) -> ScanUpdate {
        ScanUpdate::Whale {
            address: address.to_string(),
            portfolio_value: dec(value),
        }
    }

    #[tokio::test]
    async fn holdings_accumulate_independent_of_order() {
        let (forward, _) = collect(vec![holding("ABC", "100.00"), holding("ABC", "50.00")]).await;
        let (reverse, _) = collect(vec![holding("ABC", "50.00"), holding("ABC", "100.00")]).await;

        assert_eq!(forward["ABC"], dec("150.00"));
        assert_eq!(reverse["ABC"], dec("150.00"));
    }

    #[tokio::test]
    async fn symbols_accumulate_separately() {
        let (holdings, _) = collect(vec![
            holding("ABC", "100"),
            holding("DEF", "20"),
            holding("ABC", "1"),
        ])
        .await;

        assert_eq!(holdings["ABC"], dec("101"));
        assert_eq!(holdings["DEF"], dec("20"));
    }

    #[tokio::test]
    async fn duplicate_whale_keeps_maximum_value() {
        let (_, first) = collect(vec![whale("0xaaa", "1000000"), whale("0xaaa", "2000000")]).await;
        let (_, second) = collect(vec![whale("0xaaa", "2000000"), whale("0xaaa", "1000000")]).await;

        assert_eq!(first["0xaaa"], dec("2000000"));
        assert_eq!(second["0xaaa"], dec("2000000"));
    }

    #[test]
    fn whale_threshold_is_inclusive_and_monotonic() {
        let threshold = dec("1000000");
        assert!(!is_whale(&dec("999999.99"), &threshold));
        assert!(is_whale(&dec("1000000"), &threshold));
        assert!(is_whale(&dec("1000000.01"), &threshold));
    }

    #[tokio::test]
    async fn skipped_balances_count_toward_portfolio_value() {
        let c = classifier();
        c.seed(Chain::Ethereum, "new", kept("new")).await;

        let balances = vec![
            bal("QRY", "0xqueried", "cryptocurrency", 500.0),
            bal("DST", "0xdust", "dust", 300.0),
            bal("NEW", "0xnew", "cryptocurrency", 150.0),
        ];
        let (portfolio, holdings) =
            fold_balances(Chain::Ethereum, "0xholder", &balances, &dec("100"), &c).await;

        assert_eq!(portfolio, dec("950"));
        assert_eq!(holdings, vec![("NEW".to_string(), dec("150"))]);
    }

    #[tokio::test]
    async fn min_holding_gate_is_inclusive() {
        let c = classifier();
        c.seed(Chain::Ethereum, "abc", kept("abc")).await;
        c.seed(Chain::Ethereum, "def", kept("def")).await;

        let balances = vec![
            bal("ABC", "0xabc", "cryptocurrency", 100.0),
            bal("DEF", "0xdef", "cryptocurrency", 99.0),
        ];
        let (portfolio, holdings) =
            fold_balances(Chain::Ethereum, "0xholder", &balances, &dec("100"), &c).await;

        assert_eq!(portfolio, dec("199"));
        assert_eq!(holdings, vec![("ABC".to_string(), dec("100"))]);
    }

    #[tokio::test]
    async fn metadata_error_drops_the_balance_but_not_the_holder() {
        let c = classifier();
        // id known but market cap unfetched, so classification has to hit
        // the unroutable endpoint and fail
        c.seed(
            Chain::Ethereum,
            "bad",
            TokenInfo {
                id: "bad".to_string(),
                symbol: "bad".to_string(),
                market_cap: None,
                genesis_date: None,
            },
        )
        .await;

        let balances = vec![bal("BAD", "0xbad", "cryptocurrency", 2_000_000.0)];
        let (portfolio, holdings) =
            fold_balances(Chain::Ethereum, "0xholder", &balances, &dec("100"), &c).await;

        assert!(holdings.is_empty());
        assert_eq!(portfolio, dec("2000000"));
        assert!(is_whale(&portfolio, &dec("1000000")));
    }

    #[tokio::test]
    async fn failed_aggregation_task_falls_back_to_empty_maps() {
        let collector = tokio::spawn(async { panic!("aggregation loop dropped") });

        let (holdings, whales) = join_collector(collector).await;
        assert!(holdings.is_empty());
        assert!(whales.is_empty());
    }

    #[test]
    fn cross_chain_merge_keeps_maximum() {
        let mut whales = HashMap::new();
        whales.insert("0xaaa".to_string(), dec("5"));

        let mut other = HashMap::new();
        other.insert("0xaaa".to_string(), dec("3"));
        other.insert("0xbbb".to_string(), dec("9"));
        merge_whales(&mut whales, other);

        assert_eq!(whales["0xaaa"], dec("5"));
        assert_eq!(whales["0xbbb"], dec("9"));
    }
}
