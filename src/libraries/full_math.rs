//! Multiply-then-divide with a full 512 bit intermediate product, and the
//! wrapping add/sub used by the mod-2^256 accumulator contract.

use super::big_num::U256;
use crate::error::{ErrorCode, Result};

/// Returns `floor(a * b / denominator)`.
///
/// The product is computed at 512 bits so no precision is lost before the
/// division. Fails with `Overflow` if `denominator` is zero or the quotient
/// does not fit in 256 bits.
pub fn mul_div_floor(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(ErrorCode::Overflow);
    }
    let product = a.to_u512() * b.to_u512();
    let quotient = product / denominator.to_u512();
    quotient.try_to_u256().ok_or(ErrorCode::Overflow)
}

/// Returns `ceil(a * b / denominator)`.
///
/// Same contract as [`mul_div_floor`]; a quotient of exactly `2^256 - 1`
/// that needs rounding up also fails with `Overflow`.
pub fn mul_div_ceil(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(ErrorCode::Overflow);
    }
    let product = a.to_u512() * b.to_u512();
    let denominator = denominator.to_u512();
    let quotient = product / denominator;
    let rounded = if (product % denominator).is_zero() {
        quotient
    } else {
        quotient + 1
    };
    rounded.try_to_u256().ok_or(ErrorCode::Overflow)
}

/// Addition modulo 2^256.
pub fn wrapping_add(a: U256, b: U256) -> U256 {
    a.overflowing_add(b).0
}

/// Subtraction modulo 2^256. Accumulator snapshots are differenced with
/// this, so growth remains correct across wrap-around.
pub fn wrapping_sub(a: U256, b: U256) -> U256 {
    a.overflowing_sub(b).0
}
