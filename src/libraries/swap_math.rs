//! Finds the result of a swap within a single tick price range.

use super::{
    big_num::U256,
    sqrt_price_math::{
        get_amount_0_delta_unsigned, get_amount_1_delta_unsigned, get_next_sqrt_price_from_input,
        get_next_sqrt_price_from_output,
    },
};
use crate::error::{ErrorCode, Result};

/// Fee denominator: fees are quoted in hundredths of a bip.
const FEE_DENOMINATOR: u32 = 1_000_000;

/// Result of one swap step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapStep {
    /// Price after swapping the step's amounts, not to exceed the target
    pub sqrt_ratio_next_x96: U256,
    /// Amount swapped in during this step
    pub amount_in: u128,
    /// Amount swapped out during this step
    pub amount_out: u128,
    /// Amount of the input taken as fee
    pub fee_amount: u128,
}

/// Computes the result of swapping some amount in or out, within a single
/// tick interval.
///
/// The swap direction is inferred from the price target: a target at or
/// below the current price swaps token_0 for token_1. `amount_remaining`
/// is positive for exact input (fee deducted from it first) and negative
/// for exact output. Inputs are rounded up and outputs rounded down, so
/// the rounding never favors the swapper.
///
/// When an exact-input step terminates inside the interval the entire
/// unconsumed remainder becomes the fee, keeping
/// `amount_in + fee_amount == amount_remaining` exact; otherwise the fee is
/// `ceil(amount_in * fee / (10^6 - fee))`.
///
/// # Arguments
///
/// * `sqrt_ratio_current_x96` - The current price of the pool
/// * `sqrt_ratio_target_x96` - The price which cannot be exceeded this step
/// * `liquidity` - The usable in-range liquidity
/// * `amount_remaining` - How much input or output remains to be swapped
/// * `fee_pips` - The fee taken from the input amount, in hundredths of a bip
pub fn compute_swap_step(
    sqrt_ratio_current_x96: U256,
    sqrt_ratio_target_x96: U256,
    liquidity: u128,
    amount_remaining: i128,
    fee_pips: u32,
) -> Result<SwapStep> {
    let zero_for_one = sqrt_ratio_current_x96 >= sqrt_ratio_target_x96;
    let exact_in = amount_remaining >= 0;

    let sqrt_ratio_next_x96;
    let mut amount_in = 0u128;
    let mut amount_out = 0u128;

    if exact_in {
        let amount_remaining_less_fee = super::full_math::mul_div_floor(
            U256::from(amount_remaining as u128),
            U256::from(FEE_DENOMINATOR - fee_pips),
            U256::from(FEE_DENOMINATOR),
        )?
        .low_u128();
        amount_in = if zero_for_one {
            get_amount_0_delta_unsigned(
                sqrt_ratio_target_x96,
                sqrt_ratio_current_x96,
                liquidity,
                true,
            )?
        } else {
            get_amount_1_delta_unsigned(
                sqrt_ratio_current_x96,
                sqrt_ratio_target_x96,
                liquidity,
                true,
            )?
        };
        sqrt_ratio_next_x96 = if amount_remaining_less_fee >= amount_in {
            sqrt_ratio_target_x96
        } else {
            get_next_sqrt_price_from_input(
                sqrt_ratio_current_x96,
                liquidity,
                amount_remaining_less_fee,
                zero_for_one,
            )?
        };
    } else {
        amount_out = if zero_for_one {
            get_amount_1_delta_unsigned(
                sqrt_ratio_target_x96,
                sqrt_ratio_current_x96,
                liquidity,
                false,
            )?
        } else {
            get_amount_0_delta_unsigned(
                sqrt_ratio_current_x96,
                sqrt_ratio_target_x96,
                liquidity,
                false,
            )?
        };
        sqrt_ratio_next_x96 = if amount_remaining.unsigned_abs() >= amount_out {
            sqrt_ratio_target_x96
        } else {
            get_next_sqrt_price_from_output(
                sqrt_ratio_current_x96,
                liquidity,
                amount_remaining.unsigned_abs(),
                zero_for_one,
            )?
        };
    }

    let max = sqrt_ratio_target_x96 == sqrt_ratio_next_x96;

    // recompute the amounts from the price actually reached
    if zero_for_one {
        if !(max && exact_in) {
            amount_in = get_amount_0_delta_unsigned(
                sqrt_ratio_next_x96,
                sqrt_ratio_current_x96,
                liquidity,
                true,
            )?;
        }
        if !(max && !exact_in) {
            amount_out = get_amount_1_delta_unsigned(
                sqrt_ratio_next_x96,
                sqrt_ratio_current_x96,
                liquidity,
                false,
            )?;
        }
    } else {
        if !(max && exact_in) {
            amount_in = get_amount_1_delta_unsigned(
                sqrt_ratio_current_x96,
                sqrt_ratio_next_x96,
                liquidity,
                true,
            )?;
        }
        if !(max && !exact_in) {
            amount_out = get_amount_0_delta_unsigned(
                sqrt_ratio_current_x96,
                sqrt_ratio_next_x96,
                liquidity,
                false,
            )?;
        }
    }

    // cap the output amount to not exceed the remaining output amount
    if !exact_in && amount_out > amount_remaining.unsigned_abs() {
        amount_out = amount_remaining.unsigned_abs();
    }

    let fee_amount = if exact_in && sqrt_ratio_next_x96 != sqrt_ratio_target_x96 {
        // the swap ended inside the interval: the whole remainder is fee
        (amount_remaining as u128)
            .checked_sub(amount_in)
            .ok_or(ErrorCode::Overflow)?
    } else {
        super::full_math::mul_div_ceil(
            U256::from(amount_in),
            U256::from(fee_pips),
            U256::from(FEE_DENOMINATOR - fee_pips),
        )?
        .try_to_u128()
        .ok_or(ErrorCode::Overflow)?
    };

    Ok(SwapStep {
        sqrt_ratio_next_x96,
        amount_in,
        amount_out,
        fee_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libraries::{fixed_point_96::Q96, tick_math};
    use proptest::prelude::*;

    const L: u128 = 10u128.pow(18);

    #[test]
    fn exact_in_capped_at_target() {
        // plenty of input: the step must stop exactly at the target price
        let current = Q96;
        let target = tick_math::get_sqrt_ratio_at_tick(-600).unwrap();
        let step = compute_swap_step(current, target, L, 10i128.pow(18), 3000).unwrap();

        assert_eq!(step.sqrt_ratio_next_x96, target);
        // input to reach the target, independently recomputed
        let required = crate::libraries::sqrt_price_math::get_amount_0_delta_unsigned(
            target, current, L, true,
        )
        .unwrap();
        assert_eq!(step.amount_in, required);
        assert!(step.amount_out > 0);
        // fee on a capped step is the pip share of the input, rounded up
        let fee_floor = step.amount_in * 3000 / 997_000;
        assert!(step.fee_amount == fee_floor || step.fee_amount == fee_floor + 1);
    }

    #[test]
    fn exact_in_ends_inside_interval() {
        // tiny input against a distant target: accounting must be exact
        let current = Q96;
        let target = tick_math::get_sqrt_ratio_at_tick(-60_000).unwrap();
        let amount = 10i128.pow(15);
        let step = compute_swap_step(current, target, L, amount, 3000).unwrap();

        assert!(step.sqrt_ratio_next_x96 > target);
        assert!(step.sqrt_ratio_next_x96 < current);
        // the whole remainder splits into input and fee with nothing left
        assert_eq!(step.amount_in + step.fee_amount, amount as u128);
        // fee is at least the pip share
        assert!(step.fee_amount >= (amount as u128) * 3000 / 1_000_000);
        assert!(step.amount_out < step.amount_in);
    }

    #[test]
    fn exact_out_capped_at_target() {
        let current = Q96;
        let target = tick_math::get_sqrt_ratio_at_tick(600).unwrap();
        // one-for-zero: wants far more token_0 out than the interval holds
        let step = compute_swap_step(current, target, L, -(10i128.pow(18)), 3000).unwrap();

        assert_eq!(step.sqrt_ratio_next_x96, target);
        let obtainable = crate::libraries::sqrt_price_math::get_amount_0_delta_unsigned(
            current, target, L, false,
        )
        .unwrap();
        assert_eq!(step.amount_out, obtainable);
    }

    #[test]
    fn exact_out_never_exceeds_request() {
        let current = Q96;
        let target = tick_math::get_sqrt_ratio_at_tick(60_000).unwrap();
        let requested = 10u128.pow(15);
        let step = compute_swap_step(current, target, L, -(requested as i128), 3000).unwrap();

        assert!(step.amount_out <= requested);
        assert!(step.sqrt_ratio_next_x96 < target);
    }

    #[test]
    fn zero_liquidity_jumps_to_target() {
        let current = Q96;
        let target = tick_math::get_sqrt_ratio_at_tick(-600).unwrap();
        let step = compute_swap_step(current, target, 0, 10i128.pow(15), 3000).unwrap();

        assert_eq!(step.sqrt_ratio_next_x96, target);
        assert_eq!(step.amount_in, 0);
        assert_eq!(step.amount_out, 0);
        assert_eq!(step.fee_amount, 0);
    }

    proptest! {
        // the step never consumes more than the remaining input
        #[test]
        fn input_accounting_is_bounded(
            amount in 1i128..10i128.pow(24),
            tick_target in -100_000i32..-1,
            fee in 0u32..100_000,
        ) {
            let current = Q96;
            let target = tick_math::get_sqrt_ratio_at_tick(tick_target).unwrap();
            let step = compute_swap_step(current, target, L, amount, fee).unwrap();
            prop_assert!(step.amount_in + step.fee_amount <= amount as u128);
            // terminating inside the interval consumes everything
            if step.sqrt_ratio_next_x96 != target {
                prop_assert_eq!(step.amount_in + step.fee_amount, amount as u128);
            }
        }
    }
}
