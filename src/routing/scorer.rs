//! Profitability scoring
//!
//! All cost math is done in USD via the stable-reference registry. A route
//! is actionable only when net profit strictly exceeds the required floor,
//! which is itself never below total costs.

use crate::config::{FlashloanConfig, LimitsConfig, ProfitConfig};
use crate::types::{Route, RouteQuote, ScoredRoute};

const WEI_PER_NATIVE: f64 = 1e18;

/// Pre-quote filter: hop count, per-leg TVL floor, exotic-token denial.
pub fn allowed(route: &Route, limits: &LimitsConfig) -> bool {
    if route.hops() > limits.max_hops {
        return false;
    }
    if route.legs().iter().any(|leg| leg.tvl_usd < limits.min_tvl_usd) {
        return false;
    }
    if limits.deny_exotic && route.legs().iter().any(|leg| leg.exotic) {
        return false;
    }
    true
}

/// Minimum profit worth acting on: never below the configured floor, never
/// below total costs.
pub fn required_profit_usd(gas_usd: f64, flash_fee_usd: f64, floor_usd: f64) -> f64 {
    floor_usd.max(gas_usd + flash_fee_usd)
}

/// Net profit after gas and flashloan fee.
pub fn calculate_profit_usd(
    amount_in_usd: f64,
    amount_out_usd: f64,
    gas_usd: f64,
    flash_fee_usd: f64,
) -> f64 {
    (amount_out_usd - amount_in_usd) - (gas_usd + flash_fee_usd)
}

/// USD cost of the attempt at the current gas price, assuming the full
/// configured gas limit is burned.
pub fn gas_cost_usd(gas_limit: u64, gas_price_wei: u128, native_price_usd: f64) -> f64 {
    (gas_limit as f64) * (gas_price_wei as f64) / WEI_PER_NATIVE * native_price_usd
}

/// Proportional borrow fee on the input notional, zero when flashloans are
/// disabled.
pub fn flash_fee_usd(amount_in_usd: f64, flashloan: &FlashloanConfig) -> f64 {
    if flashloan.enabled {
        amount_in_usd * flashloan.fee_pct
    } else {
        0.0
    }
}

/// Combine a quote with current costs into a scored route.
pub fn score(
    quote: RouteQuote,
    gas_cost_usd: f64,
    flash_fee_usd: f64,
    profit: &ProfitConfig,
) -> ScoredRoute {
    let profit_usd = calculate_profit_usd(
        quote.amount_in_usd,
        quote.amount_out_usd,
        gas_cost_usd,
        flash_fee_usd,
    );
    let required_profit_usd =
        required_profit_usd(gas_cost_usd, flash_fee_usd, profit.profit_floor_usd);
    ScoredRoute {
        quote,
        gas_cost_usd,
        flash_fee_usd,
        profit_usd,
        required_profit_usd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::{test_leg, A, B, C};
    use alloy::primitives::U256;

    fn quote(amount_in_usd: f64, amount_out_usd: f64) -> RouteQuote {
        RouteQuote {
            route: Route::new(vec![test_leg(A, B), test_leg(B, A)]).unwrap(),
            amount_in: U256::from(1_000_000u64),
            amount_out: U256::from(1_001_000u64),
            amount_in_usd,
            amount_out_usd,
        }
    }

    fn profit_cfg() -> ProfitConfig {
        ProfitConfig {
            profit_floor_usd: 0.01,
            slippage_bps_per_leg: 30,
        }
    }

    #[test]
    fn profitable_route_is_actionable() {
        // $1000 in, $1010 out, $2 gas, $0.50 flash fee
        let scored = score(quote(1000.0, 1010.0), 2.0, 0.5, &profit_cfg());
        assert!((scored.profit_usd - 7.5).abs() < 1e-9);
        assert!((scored.required_profit_usd - 2.5).abs() < 1e-9);
        assert!(scored.actionable());
    }

    #[test]
    fn thin_edge_below_costs_is_not_actionable() {
        // gross edge $1.00 but gas alone is $2.50
        let scored = score(quote(1000.0, 1001.0), 2.50, 0.0, &profit_cfg());
        assert!(scored.profit_usd < 0.0);
        assert!(!scored.actionable());
    }

    #[test]
    fn break_even_is_not_actionable() {
        // $1005 out against $2 gas + $0.50 flash: profit exactly equals
        // required, and the strict inequality rejects it
        let scored = score(quote(1000.0, 1005.0), 2.0, 0.5, &profit_cfg());
        assert!((scored.profit_usd - 2.5).abs() < 1e-9);
        assert!((scored.required_profit_usd - 2.5).abs() < 1e-9);
        assert!(!scored.actionable());
    }

    #[test]
    fn required_profit_never_below_floor() {
        assert_eq!(required_profit_usd(0.0, 0.0, 0.01), 0.01);
        assert_eq!(required_profit_usd(2.0, 0.9, 0.01), 2.9);
    }

    #[test]
    fn flashloan_fee_scales_with_notional() {
        let enabled = FlashloanConfig {
            enabled: true,
            fee_pct: 0.0009,
        };
        let disabled = FlashloanConfig {
            enabled: false,
            fee_pct: 0.0009,
        };
        assert!((flash_fee_usd(10_000.0, &enabled) - 9.0).abs() < 1e-9);
        assert_eq!(flash_fee_usd(10_000.0, &disabled), 0.0);
    }

    #[test]
    fn gas_cost_conversion() {
        // 600k gas at 10 gwei, native at $3300
        let usd = gas_cost_usd(600_000, 10_000_000_000, 3300.0);
        assert!((usd - 19.8).abs() < 1e-9);
    }

    #[test]
    fn allowed_applies_all_limits() {
        let limits = LimitsConfig {
            min_tvl_usd: 100_000.0,
            max_hops: 2,
            deny_exotic: true,
        };
        let ok = Route::new(vec![test_leg(A, B), test_leg(B, C)]).unwrap();
        assert!(allowed(&ok, &limits));

        let triangle = Route::new(vec![test_leg(A, B), test_leg(B, C), test_leg(C, A)]).unwrap();
        assert!(!allowed(&triangle, &limits));

        let mut shallow = test_leg(B, C);
        shallow.tvl_usd = 50_000.0;
        let thin = Route::new(vec![test_leg(A, B), shallow]).unwrap();
        assert!(!allowed(&thin, &limits));

        let mut weird = test_leg(B, C);
        weird.exotic = true;
        let exotic = Route::new(vec![test_leg(A, B), weird]).unwrap();
        assert!(!allowed(&exotic, &limits));
    }
}
