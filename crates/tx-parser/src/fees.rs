//! Wrap deposit fee arithmetic.

use tapnet_primitives::constants::{WRAP_FEE_BASE, WRAP_PERCENTAGE_FEE};

/// How the wrapping fee splits across recipients.  The treasury takes the
/// rounding remainder so `validator + treasury == total − stacking` always
/// holds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WrapFees {
    pub total: u64,
    pub validator: u64,
    pub stacking: u64,
    pub treasury: u64,
}

/// Total wrapping fee on a deposit: `floor(deposit × fee / base) + 1`.
/// The `+ 1` guarantees a nonzero fee on dust-sized deposits.
pub fn wrapping_fee(deposit: u64) -> u64 {
    deposit * WRAP_PERCENTAGE_FEE / WRAP_FEE_BASE + 1
}

/// Splits the wrapping fee: half to indexer validators, a quarter to
/// stackers, remainder to the overlay treasury.
pub fn split_wrap_fees(deposit: u64) -> WrapFees {
    let total = wrapping_fee(deposit);
    let validator = total / 2;
    let stacking = total / 4;
    let treasury = total - validator - stacking;
    WrapFees {
        total,
        validator,
        stacking,
        treasury,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_floor_plus_one() {
        // 0.3% of 10_000 is 30, plus the constant 1.
        assert_eq!(wrapping_fee(10_000), 31);
        // Dust deposits still pay something.
        assert_eq!(wrapping_fee(0), 1);
        assert_eq!(wrapping_fee(100), 1);
    }

    #[test]
    fn test_split_conserves_total() {
        for deposit in [330u64, 10_000, 123_456_789, 21_000_000 * 100_000_000] {
            let fees = split_wrap_fees(deposit);
            assert_eq!(
                fees.validator + fees.stacking + fees.treasury,
                fees.total,
                "split must conserve the total for deposit {deposit}"
            );
            assert_eq!(
                fees.validator + fees.treasury,
                fees.total - fees.stacking,
                "non-stacking slices must absorb the remainder"
            );
        }
    }
}
