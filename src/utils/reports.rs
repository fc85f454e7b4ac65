//! CSV report emission - per-chain token holdings and the global whale list

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use bigdecimal::{BigDecimal, RoundingMode};
use chrono::Utc;
use tracing::info;

use crate::chains::Chain;
use crate::config::Config;
use crate::modules::TokenClassifier;
use crate::utils::coingecko;

pub struct ReportService {
    tokens_dir: PathBuf,
    whales_dir: PathBuf,
}

impl ReportService {
    pub fn new(config: &Config) -> Self {
        Self {
            tokens_dir: PathBuf::from(&config.tokens_dir),
            whales_dir: PathBuf::from(&config.whales_dir),
        }
    }

    /// One CSV per chain: symbols sorted by accumulated USD value, each with
    /// its CoinGecko page link.
    pub async fn write_token_report(
        &self,
        chain: Chain,
        token_symbol: &str,
        holdings: &HashMap<String, BigDecimal>,
        classifier: &TokenClassifier,
    ) -> Result<()> {
        if holdings.is_empty() {
            info!(target: "REPORTS", "No tokens found for {} chain", chain);
            return Ok(());
        }
        info!(target: "REPORTS", "Found {} tokens. Saving results...", holdings.len());

        fs::create_dir_all(&self.tokens_dir)
            .with_context(|| format!("creating {}", self.tokens_dir.display()))?;
        let filename = format!(
            "tokens_{}_{}_{}.csv",
            token_symbol,
            chain,
            Utc::now().format("%Y-%m-%d")
        );
        let path = self.tokens_dir.join(filename);

        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("creating report file {}", path.display()))?;
        writer
            .write_record(["symbol", "info"])
            .context("writing csv header")?;

        for symbol in sorted_by_value_desc(holdings) {
            let coin_id = classifier.coin_id(chain, &symbol).await.unwrap_or_default();
            writer
                .write_record([symbol.as_str(), coingecko::coin_page_url(&coin_id).as_str()])
                .context("writing token row")?;
        }
        writer.flush().context("flushing report file")?;

        info!(target: "REPORTS", "Wrote {}", path.display());
        Ok(())
    }

    /// One global CSV: whale addresses with abbreviated portfolio values.
    pub fn write_whale_report(&self, whales: &HashMap<String, BigDecimal>) -> Result<()> {
        if whales.is_empty() {
            info!(target: "REPORTS", "No whales found");
            return Ok(());
        }
        info!(target: "REPORTS", "Found {} whales. Saving results...", whales.len());

        fs::create_dir_all(&self.whales_dir)
            .with_context(|| format!("creating {}", self.whales_dir.display()))?;
        let filename = format!("whales_{}.csv", Utc::now().format("%Y-%m-%d"));
        let path = self.whales_dir.join(filename);

        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("creating report file {}", path.display()))?;
        writer
            .write_record(["address", "portfolio value"])
            .context("writing csv header")?;

        for (address, value) in whales {
            writer
                .write_record([address.as_str(), short_value(value).as_str()])
                .context("writing whale row")?;
        }
        writer.flush().context("flushing report file")?;

        info!(target: "REPORTS", "Wrote {}", path.display());
        Ok(())
    }
}

/// Holding symbols ordered by accumulated quote, largest first.
fn sorted_by_value_desc(holdings: &HashMap<String, BigDecimal>) -> Vec<String> {
    let mut symbols: Vec<&String> = holdings.keys().collect();
    symbols.sort_by(|a, b| holdings[*b].cmp(&holdings[*a]));
    symbols.into_iter().cloned().collect()
}

/// Abbreviates a USD value to cents: 1_230_000 -> "1.23M", 456_780 ->
/// "456.78K".
pub fn short_value(value: &BigDecimal) -> String {
    let million = BigDecimal::from(1_000_000);
    let thousand = BigDecimal::from(1_000);

    let in_millions = value / &million;
    if in_millions >= BigDecimal::from(1) {
        format!("{}M", in_millions.with_scale_round(2, RoundingMode::HalfUp))
    } else {
        let in_thousands = value / &thousand;
        format!("{}K", in_thousands.with_scale_round(2, RoundingMode::HalfUp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn abbreviates_millions() {
        assert_eq!(short_value(&dec("1230000")), "1.23M");
        assert_eq!(short_value(&dec("1000000")), "1.00M");
        assert_eq!(short_value(&dec("12345678")), "12.35M");
    }

    #[test]
    fn abbreviates_thousands_below_one_million() {
        assert_eq!(short_value(&dec("456780")), "456.78K");
        assert_eq!(short_value(&dec("456000")), "456.00K");
        assert_eq!(short_value(&dec("999999")), "1000.00K");
    }

    #[test]
    fn sorts_symbols_by_descending_value() {
        let mut holdings = HashMap::new();
        holdings.insert("AAA".to_string(), dec("100"));
        holdings.insert("BBB".to_string(), dec("300.5"));
        holdings.insert("CCC".to_string(), dec("200"));

        assert_eq!(sorted_by_value_desc(&holdings), vec!["BBB", "CCC", "AAA"]);
    }
}
