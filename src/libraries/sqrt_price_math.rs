//! Helper functions to find price changes for a change in token supply and
//! vice versa.

use super::{big_num::U256, fixed_point_96, full_math, unsafe_math};
use crate::error::{ErrorCode, Result};

/// Gets the next sqrt price √P' given a delta of token_0.
///
/// Always round up because
/// 1. In the exact output case, token 0 supply decreases leading to price
///    increase. Move price up so that exact output is met.
/// 2. In the exact input case, token 0 supply increases leading to price
///    decrease. Do not round down to minimize price impact. We only need to
///    meet the input change and not guarantee exact output.
///
/// # Formula
///
/// * `√P' = √P * L / (L + Δx * √P)`
/// * If `Δx * √P` overflows, use the alternate form `√P' = L / (L/√P + Δx)`
///
/// # Arguments
///
/// * `sqrt_p_x96` - The starting price `√P`, where P is `token_1/token_0`
/// * `liquidity` - The amount of usable liquidity L
/// * `amount` - Delta of token 0 (Δx) to add or remove from virtual reserves
/// * `add` - Whether to add or remove the amount of token_0
pub fn get_next_sqrt_price_from_amount_0_rounding_up(
    sqrt_p_x96: U256,
    liquidity: u128,
    amount: u128,
    add: bool,
) -> Result<U256> {
    // we short circuit amount == 0 because the result is otherwise not
    // guaranteed to equal the input price
    if amount == 0 {
        return Ok(sqrt_p_x96);
    }
    let numerator_1 = U256::from(liquidity) << fixed_point_96::RESOLUTION as usize;
    let amount = U256::from(amount);

    if add {
        if let Some(product) = amount.checked_mul(sqrt_p_x96) {
            let (denominator, overflowed) = numerator_1.overflowing_add(product);
            if !overflowed {
                return full_math::mul_div_ceil(numerator_1, sqrt_p_x96, denominator);
            }
        }
        // alternate form if the product overflows
        let denominator = (numerator_1 / sqrt_p_x96)
            .checked_add(amount)
            .ok_or(ErrorCode::Overflow)?;
        Ok(unsafe_math::div_rounding_up(numerator_1, denominator))
    } else {
        // the denominator must not underflow when removing token_0
        let product = amount.checked_mul(sqrt_p_x96).ok_or(ErrorCode::Overflow)?;
        if numerator_1 <= product {
            return Err(ErrorCode::Overflow);
        }
        full_math::mul_div_ceil(numerator_1, sqrt_p_x96, numerator_1 - product)
    }
}

/// Gets the next sqrt price given a delta of token_1.
///
/// Always round down because
/// 1. In the exact output case, token 1 supply decreases leading to price
///    decrease. Move price down by rounding down so that exact output of
///    token 0 is met.
/// 2. In the exact input case, token 1 supply increases leading to price
///    increase. Do not round up so the price moves no further than the
///    input pays for.
///
/// # Formula
///
/// * `√P' = √P + Δy / L`
///
/// # Arguments
///
/// * `sqrt_p_x96` - The starting price `√P`
/// * `liquidity` - The amount of usable liquidity L
/// * `amount` - Delta of token 1 (Δy) to add or remove from virtual reserves
/// * `add` - Whether to add or remove the amount of token_1
pub fn get_next_sqrt_price_from_amount_1_rounding_down(
    sqrt_p_x96: U256,
    liquidity: u128,
    amount: u128,
    add: bool,
) -> Result<U256> {
    let liquidity = U256::from(liquidity);
    // quotient is `Δy / L` as a Q64.96; a u128 amount shifted left by 96
    // always fits in 256 bits, so plain division loses nothing
    if add {
        let quotient = (U256::from(amount) << fixed_point_96::RESOLUTION as usize) / liquidity;
        sqrt_p_x96.checked_add(quotient).ok_or(ErrorCode::Overflow)
    } else {
        let quotient = unsafe_math::div_rounding_up(
            U256::from(amount) << fixed_point_96::RESOLUTION as usize,
            liquidity,
        );
        if sqrt_p_x96 <= quotient {
            return Err(ErrorCode::Overflow);
        }
        Ok(sqrt_p_x96 - quotient)
    }
}

/// Gets the next sqrt price given an input amount of token_0 or token_1.
///
/// Fails if price or liquidity is 0, or if the next price is out of bounds.
/// The rounding guarantees the price moves no further than the input amount
/// pays for.
///
/// # Arguments
///
/// * `sqrt_p_x96` - The starting price, before accounting for the input
/// * `liquidity` - The amount of usable liquidity
/// * `amount_in` - How much of token_0 or token_1 is being swapped in
/// * `zero_for_one` - Whether the amount in is token_0 or token_1
pub fn get_next_sqrt_price_from_input(
    sqrt_p_x96: U256,
    liquidity: u128,
    amount_in: u128,
    zero_for_one: bool,
) -> Result<U256> {
    if sqrt_p_x96.is_zero() || liquidity == 0 {
        return Err(ErrorCode::Overflow);
    }

    if zero_for_one {
        get_next_sqrt_price_from_amount_0_rounding_up(sqrt_p_x96, liquidity, amount_in, true)
    } else {
        get_next_sqrt_price_from_amount_1_rounding_down(sqrt_p_x96, liquidity, amount_in, true)
    }
}

/// Gets the next sqrt price given an output amount of token_0 or token_1.
///
/// Fails if price or liquidity is 0, or if the output is not obtainable from
/// the current price.
///
/// # Arguments
///
/// * `sqrt_p_x96` - The starting price, before accounting for the output
/// * `liquidity` - The amount of usable liquidity
/// * `amount_out` - How much of token_0 or token_1 is being swapped out
/// * `zero_for_one` - Whether the amount out is token_1 or token_0
pub fn get_next_sqrt_price_from_output(
    sqrt_p_x96: U256,
    liquidity: u128,
    amount_out: u128,
    zero_for_one: bool,
) -> Result<U256> {
    if sqrt_p_x96.is_zero() || liquidity == 0 {
        return Err(ErrorCode::Overflow);
    }

    if zero_for_one {
        get_next_sqrt_price_from_amount_1_rounding_down(sqrt_p_x96, liquidity, amount_out, false)
    } else {
        get_next_sqrt_price_from_amount_0_rounding_up(sqrt_p_x96, liquidity, amount_out, false)
    }
}

/// Gets the amount_0 delta between two prices for a given amount of
/// liquidity.
///
/// # Formula
///
/// * `Δx = L * (√P_upper - √P_lower) / (√P_upper * √P_lower)`
///
/// # Arguments
///
/// * `sqrt_ratio_a_x96` - A sqrt price
/// * `sqrt_ratio_b_x96` - Another sqrt price
/// * `liquidity` - The amount of usable liquidity
/// * `round_up` - Whether to round the amount up or down
pub fn get_amount_0_delta_unsigned(
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<u128> {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        core::mem::swap(&mut sqrt_ratio_a_x96, &mut sqrt_ratio_b_x96);
    }
    if sqrt_ratio_a_x96.is_zero() {
        return Err(ErrorCode::Overflow);
    }

    let numerator_1 = U256::from(liquidity) << fixed_point_96::RESOLUTION as usize;
    let numerator_2 = sqrt_ratio_b_x96 - sqrt_ratio_a_x96;

    let amount = if round_up {
        unsafe_math::div_rounding_up(
            full_math::mul_div_ceil(numerator_1, numerator_2, sqrt_ratio_b_x96)?,
            sqrt_ratio_a_x96,
        )
    } else {
        full_math::mul_div_floor(numerator_1, numerator_2, sqrt_ratio_b_x96)? / sqrt_ratio_a_x96
    };
    amount.try_to_u128().ok_or(ErrorCode::Overflow)
}

/// Gets the amount_1 delta between two prices for a given amount of
/// liquidity.
///
/// # Formula
///
/// * `Δy = L * (√P_upper - √P_lower)`
///
/// # Arguments
///
/// * `sqrt_ratio_a_x96` - A sqrt price
/// * `sqrt_ratio_b_x96` - Another sqrt price
/// * `liquidity` - The amount of usable liquidity
/// * `round_up` - Whether to round the amount up or down
pub fn get_amount_1_delta_unsigned(
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<u128> {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        core::mem::swap(&mut sqrt_ratio_a_x96, &mut sqrt_ratio_b_x96);
    }

    let amount = if round_up {
        full_math::mul_div_ceil(
            U256::from(liquidity),
            sqrt_ratio_b_x96 - sqrt_ratio_a_x96,
            fixed_point_96::Q96,
        )?
    } else {
        full_math::mul_div_floor(
            U256::from(liquidity),
            sqrt_ratio_b_x96 - sqrt_ratio_a_x96,
            fixed_point_96::Q96,
        )?
    };
    amount.try_to_u128().ok_or(ErrorCode::Overflow)
}

/// Signed token_0 delta for a change in liquidity. Deposits (positive ΔL)
/// round up in the pool's favor, withdrawals round down.
///
/// # Arguments
///
/// * `sqrt_ratio_a_x96` - A sqrt price
/// * `sqrt_ratio_b_x96` - Another sqrt price
/// * `liquidity` - The change in liquidity for which to compute the delta
pub fn get_amount_0_delta_signed(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: i128,
) -> Result<i128> {
    if liquidity < 0 {
        let amount =
            get_amount_0_delta_unsigned(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity.unsigned_abs(), false)?;
        Ok(-i128::try_from(amount).map_err(|_| ErrorCode::Overflow)?)
    } else {
        let amount =
            get_amount_0_delta_unsigned(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity as u128, true)?;
        i128::try_from(amount).map_err(|_| ErrorCode::Overflow)
    }
}

/// Signed token_1 delta for a change in liquidity; rounding as in
/// [`get_amount_0_delta_signed`].
///
/// # Arguments
///
/// * `sqrt_ratio_a_x96` - A sqrt price
/// * `sqrt_ratio_b_x96` - Another sqrt price
/// * `liquidity` - The change in liquidity for which to compute the delta
pub fn get_amount_1_delta_signed(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: i128,
) -> Result<i128> {
    if liquidity < 0 {
        let amount =
            get_amount_1_delta_unsigned(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity.unsigned_abs(), false)?;
        Ok(-i128::try_from(amount).map_err(|_| ErrorCode::Overflow)?)
    } else {
        let amount =
            get_amount_1_delta_unsigned(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity as u128, true)?;
        i128::try_from(amount).map_err(|_| ErrorCode::Overflow)
    }
}
