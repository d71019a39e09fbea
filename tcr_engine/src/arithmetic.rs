//! Ledger Engine: Arithmetic Primitives
//!
//! All quantities are `Amount` (u128). No float anywhere.
//! Every operation is checked and reports overflow as an error.

use crate::domain::Amount;
use crate::errors::{EngineError, EngineResult};

/// Denominator for percentage values.
pub const PERCENT: Amount = 100;

/// Checked addition.
pub fn checked_add(a: Amount, b: Amount) -> EngineResult<Amount> {
    a.checked_add(b).ok_or(EngineError::Overflow)
}

/// Checked subtraction.
pub fn checked_sub(a: Amount, b: Amount) -> EngineResult<Amount> {
    a.checked_sub(b).ok_or(EngineError::Underflow)
}

/// Checked multiplication.
pub fn checked_mul(a: Amount, b: Amount) -> EngineResult<Amount> {
    a.checked_mul(b).ok_or(EngineError::Overflow)
}

/// `a * b / c`, rounding down. Division by zero is an invalid amount.
pub fn mul_div(a: Amount, b: Amount, c: Amount) -> EngineResult<Amount> {
    if c == 0 {
        return Err(EngineError::InvalidAmount("division by zero".to_string()));
    }
    Ok(checked_mul(a, b)? / c)
}

/// `amount * pct / 100`, rounding down.
pub fn percent_of(amount: Amount, pct: u8) -> EngineResult<Amount> {
    mul_div(amount, Amount::from(pct), PERCENT)
}

/// Sum an iterator of amounts, failing on overflow.
pub fn checked_sum<I: IntoIterator<Item = Amount>>(values: I) -> EngineResult<Amount> {
    values.into_iter().try_fold(0, checked_add)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_add_ok() {
        assert_eq!(checked_add(3, 4), Ok(7));
    }

    #[test]
    fn test_checked_add_overflow() {
        assert_eq!(checked_add(Amount::MAX, 1), Err(EngineError::Overflow));
    }

    #[test]
    fn test_checked_sub_underflow() {
        assert_eq!(checked_sub(1, 2), Err(EngineError::Underflow));
    }

    #[test]
    fn test_mul_div_rounds_down() {
        assert_eq!(mul_div(50, 100, 100), Ok(50));
        assert_eq!(mul_div(10, 1, 3), Ok(3));
        assert!(matches!(mul_div(1, 1, 0), Err(EngineError::InvalidAmount(_))));
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(100, 0), Ok(0));
        assert_eq!(percent_of(100, 5), Ok(5));
        assert_eq!(percent_of(99, 10), Ok(9));
    }

    #[test]
    fn test_checked_sum() {
        assert_eq!(checked_sum([1, 2, 3]), Ok(6));
        assert_eq!(checked_sum([Amount::MAX, 1]), Err(EngineError::Overflow));
    }
}
