//! Error taxonomy for upstream API calls

use thiserror::Error;

/// Errors raised while talking to Covalent and CoinGecko.
///
/// Transient conditions are retried with backoff; everything else propagates
/// to the caller unchanged.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("transient upstream error: {0}")]
    Transient(String),

    #[error("{operation}: upstream unavailable after {attempts} attempts: {source}")]
    UpstreamUnavailable {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<ScanError>,
    },

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ScanError {
    /// Whether a retry with backoff makes sense. Timeouts and malformed
    /// response bodies count; anything structural does not.
    pub fn is_transient(&self) -> bool {
        match self {
            ScanError::Transient(_) => true,
            ScanError::Http(e) => e.is_timeout() || e.is_decode() || e.is_connect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_variant_is_retryable() {
        assert!(ScanError::Transient("queue full".to_string()).is_transient());
    }

    #[test]
    fn upstream_and_chain_errors_are_not_retryable() {
        assert!(!ScanError::Upstream("bad token address".to_string()).is_transient());
        assert!(!ScanError::UnsupportedChain("solana".to_string()).is_transient());
    }

    #[test]
    fn exhaustion_is_not_retryable() {
        let err = ScanError::UpstreamUnavailable {
            operation: "token_holders".to_string(),
            attempts: 5,
            source: Box::new(ScanError::Transient("timeout".to_string())),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("after 5 attempts"));
    }
}
