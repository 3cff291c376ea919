//! Report gas pricing
//!
//! price = min(max(observed * num / den, rapid), ceiling)
//!
//! The markup outbids the leaked transaction, the oracle floor keeps the
//! bid competitive when the leaked transaction itself is underpriced, and
//! the ceiling bounds cost during fee spikes. The ceiling wins every tie.

use crate::types::WatcherConfig;

pub const GWEI: u128 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    pub markup_numerator: u64,
    pub markup_denominator: u64,
    /// Hard cap in wei
    pub ceiling: u128,
}

impl GasPolicy {
    pub fn new(markup_numerator: u64, markup_denominator: u64, max_gas_price_gwei: u64) -> Self {
        Self {
            markup_numerator,
            markup_denominator: markup_denominator.max(1),
            ceiling: (max_gas_price_gwei as u128).saturating_mul(GWEI),
        }
    }

    pub fn from_config(config: &WatcherConfig) -> Self {
        Self::new(
            config.gas_markup_numerator,
            config.gas_markup_denominator,
            config.max_gas_price_gwei,
        )
    }

    pub fn price(&self, observed: u128, rapid: Option<u128>) -> u128 {
        compute_report_gas_price(
            observed,
            rapid,
            self.markup_numerator,
            self.markup_denominator,
            self.ceiling,
        )
    }
}

/// All values in wei. `denominator` of zero is treated as one.
pub fn compute_report_gas_price(
    observed: u128,
    rapid: Option<u128>,
    numerator: u64,
    denominator: u64,
    ceiling: u128,
) -> u128 {
    let marked = observed.saturating_mul(numerator as u128) / denominator.max(1) as u128;
    marked.max(rapid.unwrap_or(0)).min(ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_applied() {
        // 30 gwei * 4/3 = 40 gwei
        assert_eq!(compute_report_gas_price(30 * GWEI, None, 4, 3, 500 * GWEI), 40 * GWEI);
        // x3 policy
        assert_eq!(compute_report_gas_price(30 * GWEI, None, 3, 1, 500 * GWEI), 90 * GWEI);
    }

    #[test]
    fn test_oracle_floor() {
        assert_eq!(
            compute_report_gas_price(10 * GWEI, Some(80 * GWEI), 4, 3, 500 * GWEI),
            80 * GWEI
        );
        // floor never lowers the marked-up price
        assert_eq!(
            compute_report_gas_price(90 * GWEI, Some(80 * GWEI), 4, 3, 500 * GWEI),
            120 * GWEI
        );
    }

    #[test]
    fn test_ceiling_beats_oracle_floor() {
        assert_eq!(
            compute_report_gas_price(GWEI, Some(900 * GWEI), 4, 3, 500 * GWEI),
            500 * GWEI
        );
    }

    #[test]
    fn test_bounds_hold_from_zero_to_far_above_ceiling() {
        let policy = GasPolicy::new(4, 3, 500);
        let rapids = [None, Some(0), Some(50 * GWEI), Some(499 * GWEI), Some(10_000 * GWEI)];

        let mut observed = 0u128;
        while observed <= 1_000_000 * GWEI {
            for rapid in rapids {
                let price = policy.price(observed, rapid);
                let marked = observed * 4 / 3;
                assert!(price <= policy.ceiling, "observed={} price={}", observed, price);
                assert!(price >= marked.min(policy.ceiling), "observed={} price={}", observed, price);
                assert!(price >= observed.min(policy.ceiling));
            }
            observed = if observed == 0 { 1 } else { observed * 3 + 7 };
        }

        // overflow of the multiplication saturates into the ceiling
        assert_eq!(policy.price(u128::MAX, None), policy.ceiling);
    }

    #[test]
    fn test_price_monotonic_in_observed() {
        let policy = GasPolicy::new(4, 3, 500);
        let mut last = 0;
        for gwei in 0..600u128 {
            let price = policy.price(gwei * GWEI, Some(20 * GWEI));
            assert!(price >= last);
            last = price;
        }
    }
}
