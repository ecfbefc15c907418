//! Per-owner position records and the ledger that stores them.

use std::collections::HashMap;

use crate::error::{ErrorCode, Result};
use crate::interfaces::Address;
use crate::libraries::{big_num::U256, fixed_point_128, full_math, liquidity_math};

/// Identifies a position: owner plus the tick range it covers.
pub type PositionKey = (Address, i32, i32);

/// A liquidity commitment between two ticks, with the fee snapshots needed
/// to account what it is owed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionState {
    /// Virtual liquidity in the position the last time it was touched
    pub liquidity: u128,

    /// Fee growth inside the range as of the last update
    pub fee_growth_inside_0_last_x128: U256,
    pub fee_growth_inside_1_last_x128: U256,

    /// Uncollected token amounts owed to the position from burned liquidity
    /// and accrued fees. Owners must collect before these wrap u128.
    pub tokens_owed_0: u128,
    pub tokens_owed_1: u128,
}

/// Ledger of all positions, keyed by `(owner, tick_lower, tick_upper)`.
/// Records are created on first touch and never explicitly deleted; a
/// record may hold zero liquidity but non-zero owed tokens until collected.
#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    positions: HashMap<PositionKey, PositionState>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The position at `key`; missing records read as all zeros.
    pub fn get(&self, key: PositionKey) -> PositionState {
        self.positions.get(&key).copied().unwrap_or_default()
    }

    /// Mutable access to the record at `key`, materializing it if absent.
    pub fn get_mut(&mut self, key: PositionKey) -> &mut PositionState {
        self.positions.entry(key).or_default()
    }

    /// Credits a liquidity change and the fees accumulated since the last
    /// snapshot to the position at `key`.
    ///
    /// Owed amounts are `mulDiv(Δgrowth, liquidity, 2^128)` with the
    /// snapshot difference taken modulo 2^256; the accumulation into
    /// `tokens_owed` wraps deliberately, matching the collect-before-
    /// overflow contract.
    ///
    /// # Arguments
    ///
    /// * `key` - The position being updated
    /// * `liquidity_delta` - The liquidity change, zero to poke fees only
    /// * `fee_growth_inside_0_x128` - Current fee growth inside the
    ///   position's range, token_0
    /// * `fee_growth_inside_1_x128` - Current fee growth inside the
    ///   position's range, token_1
    pub fn update(
        &mut self,
        key: PositionKey,
        liquidity_delta: i128,
        fee_growth_inside_0_x128: U256,
        fee_growth_inside_1_x128: U256,
    ) -> Result<()> {
        let mut position = self.get(key);

        let liquidity_next = if liquidity_delta == 0 {
            // pokes of empty positions have nothing to recompute
            if position.liquidity == 0 {
                return Err(ErrorCode::ZeroAmount);
            }
            position.liquidity
        } else {
            liquidity_math::add_delta(position.liquidity, liquidity_delta)?
        };

        // owed amounts truncate to u128; owners collect before they wrap
        let tokens_owed_0 = full_math::mul_div_floor(
            full_math::wrapping_sub(
                fee_growth_inside_0_x128,
                position.fee_growth_inside_0_last_x128,
            ),
            U256::from(position.liquidity),
            fixed_point_128::Q128,
        )?
        .low_u128();
        let tokens_owed_1 = full_math::mul_div_floor(
            full_math::wrapping_sub(
                fee_growth_inside_1_x128,
                position.fee_growth_inside_1_last_x128,
            ),
            U256::from(position.liquidity),
            fixed_point_128::Q128,
        )?
        .low_u128();

        if liquidity_delta != 0 {
            position.liquidity = liquidity_next;
        }
        position.fee_growth_inside_0_last_x128 = fee_growth_inside_0_x128;
        position.fee_growth_inside_1_last_x128 = fee_growth_inside_1_x128;
        if tokens_owed_0 > 0 || tokens_owed_1 > 0 {
            position.tokens_owed_0 = position.tokens_owed_0.wrapping_add(tokens_owed_0);
            position.tokens_owed_1 = position.tokens_owed_1.wrapping_add(tokens_owed_1);
        }

        self.positions.insert(key, position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: PositionKey = (1, -60, 60);

    #[test]
    fn missing_positions_read_as_zero() {
        let ledger = PositionLedger::new();
        assert_eq!(ledger.get(KEY), PositionState::default());
    }

    #[test]
    fn poking_an_empty_position_fails() {
        let mut ledger = PositionLedger::new();
        assert_eq!(
            ledger.update(KEY, 0, U256::zero(), U256::zero()),
            Err(ErrorCode::ZeroAmount)
        );
    }

    #[test]
    fn fees_accrue_from_snapshot_difference() {
        let mut ledger = PositionLedger::new();
        ledger.update(KEY, 10u128.pow(18) as i128, U256::zero(), U256::zero()).unwrap();

        // growth of 3 token units per unit liquidity, Q128.128
        let growth = U256::from(3u64) << 128;
        ledger.update(KEY, 0, growth, U256::zero()).unwrap();

        let position = ledger.get(KEY);
        assert_eq!(position.tokens_owed_0, 3 * 10u128.pow(18));
        assert_eq!(position.tokens_owed_1, 0);
        assert_eq!(position.fee_growth_inside_0_last_x128, growth);
        // a second poke with the same snapshot owes nothing more
        ledger.update(KEY, 0, growth, U256::zero()).unwrap();
        assert_eq!(ledger.get(KEY).tokens_owed_0, 3 * 10u128.pow(18));
    }

    #[test]
    fn burning_to_zero_keeps_owed_tokens() {
        let mut ledger = PositionLedger::new();
        ledger.update(KEY, 1000, U256::zero(), U256::zero()).unwrap();
        let growth = U256::one() << 128;
        ledger.update(KEY, -1000, growth, growth).unwrap();

        let position = ledger.get(KEY);
        assert_eq!(position.liquidity, 0);
        assert_eq!(position.tokens_owed_0, 1000);
        assert_eq!(position.tokens_owed_1, 1000);
    }

    #[test]
    fn removing_more_than_held_fails() {
        let mut ledger = PositionLedger::new();
        ledger.update(KEY, 1000, U256::zero(), U256::zero()).unwrap();
        assert_eq!(
            ledger.update(KEY, -1001, U256::zero(), U256::zero()),
            Err(ErrorCode::LiquidityOverflow)
        );
    }

    #[test]
    fn wrapped_snapshots_still_difference_correctly() {
        let mut ledger = PositionLedger::new();
        ledger.update(KEY, 1 << 20, U256::MAX, U256::zero()).unwrap();
        // the accumulator wrapped past 2^256: the new snapshot compares
        // smaller, but the mod-2^256 difference is exactly 2^120
        let wrapped = (U256::one() << 120) - 1;
        ledger.update(KEY, 0, wrapped, U256::zero()).unwrap();
        // owed = 2^120 * 2^20 / 2^128 = 2^12
        assert_eq!(ledger.get(KEY).tokens_owed_0, 1 << 12);
    }
}
