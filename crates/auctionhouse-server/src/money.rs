//! Fixed-precision money helpers.
//!
//! Every monetary value in the system is a [`rust_decimal::Decimal`] rounded
//! to two fractional digits; binary floating point never touches a price,
//! bid or fee calculation.

use rust_decimal::{
    Decimal,
    RoundingStrategy,
};

/// Rounds `value` to two fractional digits, rounding half away from zero
/// ("round half up"), matching the close algorithm's fee computation.
#[must_use]
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Computes the platform fee for a final auction price, given the fee in
/// basis points (e.g. `700` for 7.00%).
#[must_use]
pub fn platform_fee(final_price: Decimal, fee_bps: u32) -> Decimal {
    let bps = Decimal::from(fee_bps);
    round2(final_price * bps / Decimal::from(10_000))
}

/// Computes `(platform_fee, seller_payout)` for a final auction price.
#[must_use]
pub fn split_payout(final_price: Decimal, fee_bps: u32) -> (Decimal, Decimal) {
    let fee = platform_fee(final_price, fee_bps);
    (fee, final_price - fee)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn seven_percent_of_twelve_rounds_up() {
        // 12.00 * 0.07 = 0.84 exactly, no rounding ambiguity here.
        let (fee, payout) = split_payout(dec!(12.00), 700);
        assert_eq!(fee, dec!(0.84));
        assert_eq!(payout, dec!(11.16));
    }

    #[test]
    fn half_cent_rounds_away_from_zero() {
        // 0.25 * 0.07 = 0.0175 -> rounds to 0.02.
        let fee = platform_fee(dec!(0.25), 700);
        assert_eq!(fee, dec!(0.02));
    }

    #[test]
    fn fee_plus_payout_equals_final_price() {
        for price in [dec!(10.00), dec!(11.00), dec!(12.34), dec!(999.99)] {
            let (fee, payout) = split_payout(price, 700);
            assert_eq!(fee + payout, price);
        }
    }
}
