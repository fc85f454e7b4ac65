//! Supported EVM chains and their upstream identifiers

use std::fmt;
use std::str::FromStr;

use crate::error::ScanError;

/// A chain that both Covalent and CoinGecko know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Ethereum,
    Matic,
    Arbitrum,
    Avalanche,
    Fantom,
    Optimism,
}

impl Chain {
    /// Numeric chain id used in Covalent URL paths.
    pub fn covalent_id(&self) -> &'static str {
        match self {
            Chain::Ethereum => "1",
            Chain::Matic => "137",
            Chain::Arbitrum => "42161",
            Chain::Avalanche => "43114",
            Chain::Fantom => "250",
            Chain::Optimism => "10",
        }
    }

    /// Platform slug used in the CoinGecko coins list.
    pub fn coingecko_platform(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Matic => "polygon-pos",
            Chain::Arbitrum => "arbitrum-one",
            Chain::Avalanche => "avalanche",
            Chain::Fantom => "fantom",
            Chain::Optimism => "optimism",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Matic => "matic",
            Chain::Arbitrum => "arbitrum",
            Chain::Avalanche => "avalanche",
            Chain::Fantom => "fantom",
            Chain::Optimism => "optimism",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Chain {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "matic" | "polygon" => Ok(Chain::Matic),
            "arbitrum" => Ok(Chain::Arbitrum),
            "avalanche" | "avax" => Ok(Chain::Avalanche),
            "fantom" | "ftm" => Ok(Chain::Fantom),
            "optimism" => Ok(Chain::Optimism),
            other => Err(ScanError::UnsupportedChain(other.to_string())),
        }
    }
}
