//! Liquidity amount functions.
//!
//! Conversions between liquidity and token amounts over a price range, used
//! by depositors to size mints and value positions.

use super::{big_num::U256, fixed_point_96, full_math};
use crate::error::{ErrorCode, Result};

/// Computes the liquidity received for a given amount of token_0 and price
/// range.
///
/// Calculates `ΔL = Δx (√P_upper x √P_lower) / (√P_upper - √P_lower)`
///
/// # Arguments
///
/// * `sqrt_ratio_a_x96` - A sqrt price representing the first tick boundary
/// * `sqrt_ratio_b_x96` - A sqrt price representing the second tick boundary
/// * `amount_0` - The amount_0 being sent in
pub fn get_liquidity_for_amount_0(
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    amount_0: u128,
) -> Result<u128> {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        core::mem::swap(&mut sqrt_ratio_a_x96, &mut sqrt_ratio_b_x96);
    }
    let intermediate =
        full_math::mul_div_floor(sqrt_ratio_a_x96, sqrt_ratio_b_x96, fixed_point_96::Q96)?;

    full_math::mul_div_floor(
        U256::from(amount_0),
        intermediate,
        sqrt_ratio_b_x96 - sqrt_ratio_a_x96,
    )?
    .try_to_u128()
    .ok_or(ErrorCode::Overflow)
}

/// Computes the liquidity received for a given amount of token_1 and price
/// range.
///
/// Calculates `ΔL = Δy / (√P_upper - √P_lower)`
///
/// # Arguments
///
/// * `sqrt_ratio_a_x96` - A sqrt price representing the first tick boundary
/// * `sqrt_ratio_b_x96` - A sqrt price representing the second tick boundary
/// * `amount_1` - The amount_1 being sent in
pub fn get_liquidity_for_amount_1(
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    amount_1: u128,
) -> Result<u128> {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        core::mem::swap(&mut sqrt_ratio_a_x96, &mut sqrt_ratio_b_x96);
    }

    full_math::mul_div_floor(
        U256::from(amount_1),
        fixed_point_96::Q96,
        sqrt_ratio_b_x96 - sqrt_ratio_a_x96,
    )?
    .try_to_u128()
    .ok_or(ErrorCode::Overflow)
}

/// Computes the maximum liquidity received for given amounts of token_0 and
/// token_1, the current pool price and the prices at the tick boundaries.
///
/// # Arguments
///
/// * `sqrt_ratio_x96` - The current pool sqrt price
/// * `sqrt_ratio_a_x96` - A sqrt price representing the first tick boundary
/// * `sqrt_ratio_b_x96` - A sqrt price representing the second tick boundary
/// * `amount_0` - The amount of token_0 being sent in
/// * `amount_1` - The amount of token_1 being sent in
pub fn get_liquidity_for_amounts(
    sqrt_ratio_x96: U256,
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    amount_0: u128,
    amount_1: u128,
) -> Result<u128> {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        core::mem::swap(&mut sqrt_ratio_a_x96, &mut sqrt_ratio_b_x96);
    }

    if sqrt_ratio_x96 <= sqrt_ratio_a_x96 {
        // below the range, liquidity can only come from token_0
        get_liquidity_for_amount_0(sqrt_ratio_a_x96, sqrt_ratio_b_x96, amount_0)
    } else if sqrt_ratio_x96 < sqrt_ratio_b_x96 {
        // inside the range, take the lesser of the two contributions
        Ok(u128::min(
            get_liquidity_for_amount_0(sqrt_ratio_x96, sqrt_ratio_b_x96, amount_0)?,
            get_liquidity_for_amount_1(sqrt_ratio_a_x96, sqrt_ratio_x96, amount_1)?,
        ))
    } else {
        get_liquidity_for_amount_1(sqrt_ratio_a_x96, sqrt_ratio_b_x96, amount_1)
    }
}

/// Computes the amount of token_0 held by a given amount of liquidity over a
/// price range.
///
/// Calculates `Δx = ΔL (√P_upper - √P_lower) / (√P_upper x √P_lower)`
///
/// # Arguments
///
/// * `sqrt_ratio_a_x96` - A sqrt price representing the first tick boundary
/// * `sqrt_ratio_b_x96` - A sqrt price representing the second tick boundary
/// * `liquidity` - The liquidity being valued
pub fn get_amount_0_for_liquidity(
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    liquidity: u128,
) -> Result<u128> {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        core::mem::swap(&mut sqrt_ratio_a_x96, &mut sqrt_ratio_b_x96);
    }
    if sqrt_ratio_a_x96.is_zero() {
        return Err(ErrorCode::Overflow);
    }

    let shifted = U256::from(liquidity) << fixed_point_96::RESOLUTION as usize;
    (full_math::mul_div_floor(shifted, sqrt_ratio_b_x96 - sqrt_ratio_a_x96, sqrt_ratio_b_x96)?
        / sqrt_ratio_a_x96)
        .try_to_u128()
        .ok_or(ErrorCode::Overflow)
}

/// Computes the amount of token_1 held by a given amount of liquidity over a
/// price range.
///
/// Calculates `Δy = ΔL * (√P_upper - √P_lower)`
///
/// # Arguments
///
/// * `sqrt_ratio_a_x96` - A sqrt price representing the first tick boundary
/// * `sqrt_ratio_b_x96` - A sqrt price representing the second tick boundary
/// * `liquidity` - The liquidity being valued
pub fn get_amount_1_for_liquidity(
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    liquidity: u128,
) -> Result<u128> {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        core::mem::swap(&mut sqrt_ratio_a_x96, &mut sqrt_ratio_b_x96);
    }

    full_math::mul_div_floor(
        U256::from(liquidity),
        sqrt_ratio_b_x96 - sqrt_ratio_a_x96,
        fixed_point_96::Q96,
    )?
    .try_to_u128()
    .ok_or(ErrorCode::Overflow)
}

/// Computes the token_0 and token_1 value of a given amount of liquidity at
/// the current pool price and the prices at the tick boundaries.
///
/// # Arguments
///
/// * `sqrt_ratio_x96` - The current pool sqrt price
/// * `sqrt_ratio_a_x96` - A sqrt price representing the first tick boundary
/// * `sqrt_ratio_b_x96` - A sqrt price representing the second tick boundary
/// * `liquidity` - The liquidity being valued
pub fn get_amounts_for_liquidity(
    sqrt_ratio_x96: U256,
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    liquidity: u128,
) -> Result<(u128, u128)> {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        core::mem::swap(&mut sqrt_ratio_a_x96, &mut sqrt_ratio_b_x96);
    }

    Ok(if sqrt_ratio_x96 <= sqrt_ratio_a_x96 {
        (
            get_amount_0_for_liquidity(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity)?,
            0,
        )
    } else if sqrt_ratio_x96 < sqrt_ratio_b_x96 {
        (
            get_amount_0_for_liquidity(sqrt_ratio_x96, sqrt_ratio_b_x96, liquidity)?,
            get_amount_1_for_liquidity(sqrt_ratio_a_x96, sqrt_ratio_x96, liquidity)?,
        )
    } else {
        (
            0,
            get_amount_1_for_liquidity(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity)?,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libraries::fixed_point_96::Q96;

    #[test]
    fn liquidity_from_token_1_only() {
        // ΔL = Δy / (√Pb - √Pa) with √Pa = 1, √Pb = 2
        let liquidity = get_liquidity_for_amount_1(Q96, Q96 * 2, 10u128.pow(18)).unwrap();
        assert_eq!(liquidity, 10u128.pow(18));
    }

    #[test]
    fn liquidity_from_token_0_only() {
        // ΔL = Δx * (√Pa √Pb) / (√Pb - √Pa) = 1e18 * 2 / 1
        let liquidity = get_liquidity_for_amount_0(Q96, Q96 * 2, 10u128.pow(18)).unwrap();
        assert_eq!(liquidity, 2 * 10u128.pow(18));
    }

    #[test]
    fn in_range_takes_the_minimum() {
        let current = Q96;
        let a = Q96 / 2;
        let b = Q96 * 2;
        let both = get_liquidity_for_amounts(current, a, b, 10u128.pow(18), 10u128.pow(18)).unwrap();
        let from_0 = get_liquidity_for_amount_0(current, b, 10u128.pow(18)).unwrap();
        let from_1 = get_liquidity_for_amount_1(a, current, 10u128.pow(18)).unwrap();
        assert_eq!(both, from_0.min(from_1));
    }

    #[test]
    fn amounts_round_trip_below_liquidity() {
        // valuing the liquidity minted from amounts never exceeds the inputs
        let current = Q96;
        let a = Q96 / 2;
        let b = Q96 * 2;
        let liquidity = get_liquidity_for_amounts(current, a, b, 10u128.pow(18), 10u128.pow(18)).unwrap();
        let (amount_0, amount_1) = get_amounts_for_liquidity(current, a, b, liquidity).unwrap();
        assert!(amount_0 <= 10u128.pow(18));
        assert!(amount_1 <= 10u128.pow(18));
        assert!(amount_0 > 0 && amount_1 > 0);
    }

    #[test]
    fn out_of_range_is_single_sided() {
        let a = Q96 * 2;
        let b = Q96 * 4;
        let (amount_0, amount_1) = get_amounts_for_liquidity(Q96, a, b, 10u128.pow(18)).unwrap();
        assert!(amount_0 > 0);
        assert_eq!(amount_1, 0);
        let (amount_0, amount_1) = get_amounts_for_liquidity(Q96 * 8, a, b, 10u128.pow(18)).unwrap();
        assert_eq!(amount_0, 0);
        assert!(amount_1 > 0);
    }
}
