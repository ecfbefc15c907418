//! # tidepool
//!
//! An in-memory concentrated-liquidity pool engine for a two-asset pair.
//!
//! Liquidity providers commit capital to bounded tick ranges; traders swap
//! along the piecewise-constant liquidity curve, crossing range boundaries
//! as the price moves. The engine keeps the books: per-tick net/gross
//! liquidity with outside-accumulators, per-position fee snapshots and owed
//! tokens, a packed bitmap index over initialized ticks, and a ring-buffer
//! oracle of cumulative tick and seconds-per-liquidity samples.
//!
//! Token custody and time are injected through the [`TokenVault`] and
//! [`Clock`] capabilities; payment obligations are collected through a
//! [`PaymentCallback`]. Every mutating operation is atomic: it takes the
//! pool's reentrancy lock, and any failure rolls the whole pool record back
//! to its state on entry.
//!
//! ```
//! use tidepool::{Pool, Clock};
//!
//! struct FixedClock;
//! impl Clock for FixedClock {
//!     fn now(&self) -> u32 {
//!         1_700_000_000
//!     }
//! }
//!
//! let mut pool = Pool::new(1, 2, 3000, 60, 100, 200, Box::new(FixedClock));
//! // price 1.0 sits at tick 0
//! pool.initialize(tidepool::U256::one() << 96).unwrap();
//! assert_eq!(pool.slot0.tick, 0);
//! ```

pub mod error;
pub mod interfaces;
pub mod libraries;
pub mod states;

pub use error::{ErrorCode, Result};
pub use interfaces::{Address, Clock, PaymentCallback, TokenId, TokenVault};
pub use libraries::big_num::{U256, U512};
pub use states::pool::{Pool, PoolEvent, ProtocolFees, Slot0};

use libraries::{fixed_point_128, full_math, liquidity_math, sqrt_price_math, swap_math, tick_math};

/// Checks that a tick lies within the tick domain and on the pool's
/// spacing grid.
///
/// # Arguments
///
/// * `tick` - The price tick
/// * `tick_spacing` - The pool's tick spacing
pub fn check_tick(tick: i32, tick_spacing: u16) -> Result<()> {
    if tick < tick_math::MIN_TICK || tick > tick_math::MAX_TICK {
        return Err(ErrorCode::TickOutOfBounds);
    }
    if tick % tick_spacing as i32 != 0 {
        return Err(ErrorCode::TickNotSpaced);
    }
    Ok(())
}

/// Checks that a tick range is ordered.
///
/// # Arguments
///
/// * `tick_lower` - The lower tick
/// * `tick_upper` - The upper tick
pub fn check_ticks(tick_lower: i32, tick_upper: i32) -> Result<()> {
    if tick_lower >= tick_upper {
        return Err(ErrorCode::InvalidTickRange);
    }
    Ok(())
}

/// Cached values a swap reads once at entry.
struct SwapCache {
    /// The protocol fee nibble for the input token
    fee_protocol: u8,
    /// Liquidity at the beginning of the swap
    liquidity_start: u128,
    /// The timestamp of the swap
    block_timestamp: u32,
    /// Current tick accumulator, computed lazily on the first crossing
    tick_cumulative: i64,
    /// Current seconds-per-liquidity accumulator, computed with the above
    seconds_per_liquidity_cumulative_x128: U256,
    /// Whether the two accumulators above have been computed
    computed_latest_observation: bool,
}

/// The top-level state of the swap, committed to storage at the end.
struct SwapState {
    /// Amount remaining to be swapped in/out of the input/output asset
    amount_specified_remaining: i128,
    /// Amount already swapped out/in of the output/input asset
    amount_calculated: i128,
    /// Current sqrt price
    sqrt_price_x96: U256,
    /// The tick associated with the current price
    tick: i32,
    /// Global fee growth of the input token
    fee_growth_global_x128: U256,
    /// Input token paid as protocol fee
    protocol_fee: u128,
    /// Current in-range liquidity
    liquidity: u128,
}

/// Working state of a single step of the swap loop.
#[derive(Default)]
struct StepComputations {
    /// Price at the beginning of the step
    sqrt_price_start_x96: U256,
    /// The next tick to swap to, in the swap direction
    tick_next: i32,
    /// Whether `tick_next` is initialized
    initialized: bool,
    /// Price at `tick_next`
    sqrt_price_next_x96: U256,
    /// How much is being swapped in during this step
    amount_in: u128,
    /// How much is being swapped out
    amount_out: u128,
    /// How much fee is being paid in
    fee_amount: u128,
}

impl Pool {
    /// Sets the initial price for the pool and seeds the oracle. The sole
    /// transition out of the unborn state; all other operations fail
    /// `NotInitialized` before it and this fails `AlreadyInitialized`
    /// after.
    ///
    /// # Arguments
    ///
    /// * `sqrt_price_x96` - The initial sqrt price of the pool as a Q64.96
    pub fn initialize(&mut self, sqrt_price_x96: U256) -> Result<()> {
        if !self.slot0.sqrt_price_x96.is_zero() {
            return Err(ErrorCode::AlreadyInitialized);
        }

        let tick = tick_math::get_tick_at_sqrt_ratio(sqrt_price_x96)?;
        let time = self.clock.now();
        let (cardinality, cardinality_next) = self.observations.initialize(time);

        self.slot0 = Slot0 {
            sqrt_price_x96,
            tick,
            observation_index: 0,
            observation_cardinality: cardinality,
            observation_cardinality_next: cardinality_next,
            fee_protocol: 0,
            unlocked: true,
        };

        self.record(PoolEvent::Initialize {
            sqrt_price_x96,
            tick,
        });
        Ok(())
    }

    /// Adds liquidity for `owner` over `[tick_lower, tick_upper)`.
    ///
    /// The owed token amounts are collected through
    /// `callback.on_mint_payment`; the operation fails
    /// `InsufficientInputAmount` unless the pool's vault balances grew by
    /// at least the owed amounts.
    ///
    /// # Arguments
    ///
    /// * `vault` - Token custody
    /// * `callback` - Payer of the owed amounts
    /// * `owner` - The account credited with the position
    /// * `tick_lower` - Lower tick of the range
    /// * `tick_upper` - Upper tick of the range
    /// * `amount` - Liquidity to mint, must be positive
    /// * `data` - Opaque bytes passed through to the callback
    #[allow(clippy::too_many_arguments)]
    pub fn mint(
        &mut self,
        vault: &mut dyn TokenVault,
        callback: &mut dyn PaymentCallback,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        data: &[u8],
    ) -> Result<(u128, u128)> {
        self.guarded(|pool| {
            if amount == 0 {
                return Err(ErrorCode::ZeroAmount);
            }
            let liquidity_delta = i128::try_from(amount).map_err(|_| ErrorCode::Overflow)?;
            let (amount_0_int, amount_1_int) =
                pool.modify_position(owner, tick_lower, tick_upper, liquidity_delta)?;

            let amount_0 = amount_0_int as u128;
            let amount_1 = amount_1_int as u128;

            let balance_0_before = if amount_0 > 0 {
                vault.balance_of(pool.token_0, pool.vault_account)
            } else {
                0
            };
            let balance_1_before = if amount_1 > 0 {
                vault.balance_of(pool.token_1, pool.vault_account)
            } else {
                0
            };

            callback.on_mint_payment(pool, vault, amount_0, amount_1, data)?;

            if amount_0 > 0 {
                let paid_to = balance_0_before
                    .checked_add(amount_0)
                    .ok_or(ErrorCode::Overflow)?;
                if vault.balance_of(pool.token_0, pool.vault_account) < paid_to {
                    return Err(ErrorCode::InsufficientInputAmount);
                }
            }
            if amount_1 > 0 {
                let paid_to = balance_1_before
                    .checked_add(amount_1)
                    .ok_or(ErrorCode::Overflow)?;
                if vault.balance_of(pool.token_1, pool.vault_account) < paid_to {
                    return Err(ErrorCode::InsufficientInputAmount);
                }
            }

            pool.record(PoolEvent::Mint {
                owner,
                tick_lower,
                tick_upper,
                amount,
                amount_0,
                amount_1,
            });
            Ok((amount_0, amount_1))
        })
    }

    /// Burns liquidity from `owner`'s position and credits the freed token
    /// amounts to the position's owed balances. Burning zero liquidity
    /// recomputes the fees owed to an existing position.
    ///
    /// # Arguments
    ///
    /// * `owner` - The position owner
    /// * `tick_lower` - Lower tick of the range
    /// * `tick_upper` - Upper tick of the range
    /// * `amount` - Liquidity to burn; zero pokes fee accounting only
    pub fn burn(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
    ) -> Result<(u128, u128)> {
        self.guarded(|pool| {
            let liquidity_delta = i128::try_from(amount).map_err(|_| ErrorCode::Overflow)?;
            let (amount_0_int, amount_1_int) =
                pool.modify_position(owner, tick_lower, tick_upper, -liquidity_delta)?;

            let amount_0 = amount_0_int.unsigned_abs();
            let amount_1 = amount_1_int.unsigned_abs();

            if amount_0 > 0 || amount_1 > 0 {
                let position = pool.positions.get_mut((owner, tick_lower, tick_upper));
                position.tokens_owed_0 = position.tokens_owed_0.wrapping_add(amount_0);
                position.tokens_owed_1 = position.tokens_owed_1.wrapping_add(amount_1);
            }

            pool.record(PoolEvent::Burn {
                owner,
                tick_lower,
                tick_upper,
                amount,
                amount_0,
                amount_1,
            });
            Ok((amount_0, amount_1))
        })
    }

    /// Transfers owed tokens from a position to `recipient`, up to the
    /// requested amounts. Does not recompute fees; burn (possibly zero)
    /// first for that.
    ///
    /// # Arguments
    ///
    /// * `vault` - Token custody
    /// * `owner` - The position owner
    /// * `recipient` - Receiver of the withdrawn tokens
    /// * `tick_lower` - Lower tick of the range
    /// * `tick_upper` - Upper tick of the range
    /// * `amount_0_requested` - Max token_0 to withdraw; pass `u128::MAX`
    ///   for everything owed
    /// * `amount_1_requested` - Max token_1 to withdraw
    #[allow(clippy::too_many_arguments)]
    pub fn collect(
        &mut self,
        vault: &mut dyn TokenVault,
        owner: Address,
        recipient: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount_0_requested: u128,
        amount_1_requested: u128,
    ) -> Result<(u128, u128)> {
        self.guarded(|pool| {
            let position = pool.positions.get_mut((owner, tick_lower, tick_upper));
            let amount_0 = amount_0_requested.min(position.tokens_owed_0);
            let amount_1 = amount_1_requested.min(position.tokens_owed_1);
            position.tokens_owed_0 -= amount_0;
            position.tokens_owed_1 -= amount_1;

            if amount_0 > 0 {
                vault.transfer(pool.token_0, pool.vault_account, recipient, amount_0)?;
            }
            if amount_1 > 0 {
                vault.transfer(pool.token_1, pool.vault_account, recipient, amount_1)?;
            }

            pool.record(PoolEvent::Collect {
                owner,
                recipient,
                tick_lower,
                tick_upper,
                amount_0,
                amount_1,
            });
            Ok((amount_0, amount_1))
        })
    }

    /// Swaps token_0 for token_1 or vice versa.
    ///
    /// The output token is transferred to `recipient` before the callback
    /// is asked to pay the input, so the recipient may fund the payment
    /// with the output (a flash swap). Fails `InsufficientInputAmount`
    /// unless the pool's input-token balance grew by the owed amount.
    ///
    /// # Arguments
    ///
    /// * `vault` - Token custody
    /// * `callback` - Payer of the input amount
    /// * `recipient` - Receiver of the output token
    /// * `zero_for_one` - Swap direction: token_0 in, token_1 out if true
    /// * `amount_specified` - Exact input if positive, exact output if
    ///   negative
    /// * `sqrt_price_limit_x96` - Price bound the swap cannot cross
    /// * `data` - Opaque bytes passed through to the callback
    #[allow(clippy::too_many_arguments)]
    pub fn swap(
        &mut self,
        vault: &mut dyn TokenVault,
        callback: &mut dyn PaymentCallback,
        recipient: Address,
        zero_for_one: bool,
        amount_specified: i128,
        sqrt_price_limit_x96: U256,
        data: &[u8],
    ) -> Result<(i128, i128)> {
        if amount_specified == 0 {
            return Err(ErrorCode::ZeroAmount);
        }
        self.guarded(|pool| {
            pool.swap_locked(
                vault,
                callback,
                recipient,
                zero_for_one,
                amount_specified,
                sqrt_price_limit_x96,
                data,
            )
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn swap_locked(
        &mut self,
        vault: &mut dyn TokenVault,
        callback: &mut dyn PaymentCallback,
        recipient: Address,
        zero_for_one: bool,
        amount_specified: i128,
        sqrt_price_limit_x96: U256,
        data: &[u8],
    ) -> Result<(i128, i128)> {
        let slot0_start = self.slot0;

        let limit_in_range = if zero_for_one {
            sqrt_price_limit_x96 < slot0_start.sqrt_price_x96
                && sqrt_price_limit_x96 > tick_math::MIN_SQRT_RATIO
        } else {
            sqrt_price_limit_x96 > slot0_start.sqrt_price_x96
                && sqrt_price_limit_x96 < tick_math::MAX_SQRT_RATIO
        };
        if !limit_in_range {
            return Err(ErrorCode::PriceLimitOutOfRange);
        }

        let mut cache = SwapCache {
            liquidity_start: self.liquidity,
            block_timestamp: self.clock.now(),
            fee_protocol: if zero_for_one {
                slot0_start.fee_protocol % 16
            } else {
                slot0_start.fee_protocol >> 4
            },
            tick_cumulative: 0,
            seconds_per_liquidity_cumulative_x128: U256::zero(),
            computed_latest_observation: false,
        };

        let exact_input = amount_specified > 0;

        let mut state = SwapState {
            amount_specified_remaining: amount_specified,
            amount_calculated: 0,
            sqrt_price_x96: slot0_start.sqrt_price_x96,
            tick: slot0_start.tick,
            fee_growth_global_x128: if zero_for_one {
                self.fee_growth_global_0_x128
            } else {
                self.fee_growth_global_1_x128
            },
            protocol_fee: 0,
            liquidity: cache.liquidity_start,
        };

        // continue swapping as long as we haven't used the entire
        // input/output and haven't reached the price limit
        while state.amount_specified_remaining != 0
            && state.sqrt_price_x96 != sqrt_price_limit_x96
        {
            let mut step = StepComputations {
                sqrt_price_start_x96: state.sqrt_price_x96,
                ..Default::default()
            };

            (step.tick_next, step.initialized) = self
                .tick_bitmap
                .next_initialized_tick_within_one_word(
                    state.tick,
                    self.tick_spacing as i32,
                    zero_for_one,
                );

            // the bitmap is not aware of the tick domain bounds
            step.tick_next = step.tick_next.clamp(tick_math::MIN_TICK, tick_math::MAX_TICK);
            step.sqrt_price_next_x96 = tick_math::get_sqrt_ratio_at_tick(step.tick_next)?;

            // swap toward the tick boundary, but never past the price limit
            let sqrt_price_target_x96 = if (zero_for_one
                && step.sqrt_price_next_x96 < sqrt_price_limit_x96)
                || (!zero_for_one && step.sqrt_price_next_x96 > sqrt_price_limit_x96)
            {
                sqrt_price_limit_x96
            } else {
                step.sqrt_price_next_x96
            };

            let swap_step = swap_math::compute_swap_step(
                state.sqrt_price_x96,
                sqrt_price_target_x96,
                state.liquidity,
                state.amount_specified_remaining,
                self.fee,
            )?;
            state.sqrt_price_x96 = swap_step.sqrt_ratio_next_x96;
            step.amount_in = swap_step.amount_in;
            step.amount_out = swap_step.amount_out;
            step.fee_amount = swap_step.fee_amount;

            if exact_input {
                let consumed = step
                    .amount_in
                    .checked_add(step.fee_amount)
                    .ok_or(ErrorCode::Overflow)?;
                state.amount_specified_remaining -=
                    i128::try_from(consumed).map_err(|_| ErrorCode::Overflow)?;
                state.amount_calculated = state
                    .amount_calculated
                    .checked_sub(i128::try_from(step.amount_out).map_err(|_| ErrorCode::Overflow)?)
                    .ok_or(ErrorCode::Overflow)?;
            } else {
                state.amount_specified_remaining +=
                    i128::try_from(step.amount_out).map_err(|_| ErrorCode::Overflow)?;
                let owed = step
                    .amount_in
                    .checked_add(step.fee_amount)
                    .ok_or(ErrorCode::Overflow)?;
                state.amount_calculated = state
                    .amount_calculated
                    .checked_add(i128::try_from(owed).map_err(|_| ErrorCode::Overflow)?)
                    .ok_or(ErrorCode::Overflow)?;
            }

            // split out the protocol's share of the fee if enabled
            if cache.fee_protocol > 0 {
                let delta = step.fee_amount / cache.fee_protocol as u128;
                step.fee_amount -= delta;
                state.protocol_fee += delta;
            }

            // update the global fee tracker
            if state.liquidity > 0 {
                state.fee_growth_global_x128 = full_math::wrapping_add(
                    state.fee_growth_global_x128,
                    full_math::mul_div_floor(
                        U256::from(step.fee_amount),
                        fixed_point_128::Q128,
                        U256::from(state.liquidity),
                    )?,
                );
            }

            // shift tick if we reached the next price
            if state.sqrt_price_x96 == step.sqrt_price_next_x96 {
                // if the tick is initialized, run the tick transition
                if step.initialized {
                    // lazily compute the accumulators for the pre-swap
                    // state, once per swap
                    if !cache.computed_latest_observation {
                        let (tick_cumulative, seconds_per_liquidity_cumulative_x128) =
                            self.observations.observe_single(
                                cache.block_timestamp,
                                0,
                                slot0_start.tick,
                                slot0_start.observation_index,
                                cache.liquidity_start,
                                slot0_start.observation_cardinality,
                            )?;
                        cache.tick_cumulative = tick_cumulative;
                        cache.seconds_per_liquidity_cumulative_x128 =
                            seconds_per_liquidity_cumulative_x128;
                        cache.computed_latest_observation = true;
                    }

                    let mut liquidity_net = self.ticks.cross(
                        step.tick_next,
                        if zero_for_one {
                            state.fee_growth_global_x128
                        } else {
                            self.fee_growth_global_0_x128
                        },
                        if zero_for_one {
                            self.fee_growth_global_1_x128
                        } else {
                            state.fee_growth_global_x128
                        },
                        cache.seconds_per_liquidity_cumulative_x128,
                        cache.tick_cumulative,
                        cache.block_timestamp,
                    );

                    // moving leftward crosses the tick in the negative
                    // direction; net liquidity is bounded well below
                    // i128::MIN so the negation cannot overflow
                    if zero_for_one {
                        liquidity_net = -liquidity_net;
                    }

                    state.liquidity = liquidity_math::add_delta(state.liquidity, liquidity_net)?;
                }

                state.tick = if zero_for_one {
                    step.tick_next - 1
                } else {
                    step.tick_next
                };
            } else if state.sqrt_price_x96 != step.sqrt_price_start_x96 {
                // recompute unless we're on a lower tick boundary (i.e.
                // already transitioned ticks) and haven't moved
                state.tick = tick_math::get_tick_at_sqrt_ratio(state.sqrt_price_x96)?;
            }
        }

        // write an oracle entry if the tick changed
        if state.tick != slot0_start.tick {
            let (observation_index, observation_cardinality) = self.observations.write(
                slot0_start.observation_index,
                cache.block_timestamp,
                slot0_start.tick,
                cache.liquidity_start,
                slot0_start.observation_cardinality,
                slot0_start.observation_cardinality_next,
            );
            self.slot0.sqrt_price_x96 = state.sqrt_price_x96;
            self.slot0.tick = state.tick;
            self.slot0.observation_index = observation_index;
            self.slot0.observation_cardinality = observation_cardinality;
        } else {
            // otherwise just update the price
            self.slot0.sqrt_price_x96 = state.sqrt_price_x96;
        }

        if cache.liquidity_start != state.liquidity {
            self.liquidity = state.liquidity;
        }

        // overflow of the global accumulator is acceptable; the protocol
        // must withdraw fees before they hit u128::MAX
        if zero_for_one {
            self.fee_growth_global_0_x128 = state.fee_growth_global_x128;
            if state.protocol_fee > 0 {
                self.protocol_fees.token_0 =
                    self.protocol_fees.token_0.wrapping_add(state.protocol_fee);
            }
        } else {
            self.fee_growth_global_1_x128 = state.fee_growth_global_x128;
            if state.protocol_fee > 0 {
                self.protocol_fees.token_1 =
                    self.protocol_fees.token_1.wrapping_add(state.protocol_fee);
            }
        }

        let (amount_0, amount_1) = if zero_for_one == exact_input {
            (
                amount_specified - state.amount_specified_remaining,
                state.amount_calculated,
            )
        } else {
            (
                state.amount_calculated,
                amount_specified - state.amount_specified_remaining,
            )
        };

        // pay out the output, then collect the input through the callback
        if zero_for_one {
            if amount_1 < 0 {
                vault.transfer(
                    self.token_1,
                    self.vault_account,
                    recipient,
                    amount_1.unsigned_abs(),
                )?;
            }
            let balance_0_before = vault.balance_of(self.token_0, self.vault_account);
            callback.on_swap_payment(self, vault, amount_0, amount_1, data)?;
            let owed = balance_0_before
                .checked_add(amount_0 as u128)
                .ok_or(ErrorCode::Overflow)?;
            if vault.balance_of(self.token_0, self.vault_account) < owed {
                return Err(ErrorCode::InsufficientInputAmount);
            }
        } else {
            if amount_0 < 0 {
                vault.transfer(
                    self.token_0,
                    self.vault_account,
                    recipient,
                    amount_0.unsigned_abs(),
                )?;
            }
            let balance_1_before = vault.balance_of(self.token_1, self.vault_account);
            callback.on_swap_payment(self, vault, amount_0, amount_1, data)?;
            let owed = balance_1_before
                .checked_add(amount_1 as u128)
                .ok_or(ErrorCode::Overflow)?;
            if vault.balance_of(self.token_1, self.vault_account) < owed {
                return Err(ErrorCode::InsufficientInputAmount);
            }
        }

        self.record(PoolEvent::Swap {
            recipient,
            amount_0,
            amount_1,
            sqrt_price_x96: state.sqrt_price_x96,
            liquidity: state.liquidity,
            tick: state.tick,
        });
        Ok((amount_0, amount_1))
    }

    /// Lends `amount_0` and `amount_1` out for the duration of the
    /// callback, which must repay principal plus `ceil(amount * fee / 1e6)`
    /// per token. Repaid fees (including any overpayment) are apportioned
    /// to the protocol and to in-range liquidity exactly as swap fees are.
    ///
    /// # Arguments
    ///
    /// * `vault` - Token custody
    /// * `callback` - Repayer of the loan and fees
    /// * `recipient` - Receiver of the loaned tokens
    /// * `amount_0` - token_0 to lend
    /// * `amount_1` - token_1 to lend
    /// * `data` - Opaque bytes passed through to the callback
    #[allow(clippy::too_many_arguments)]
    pub fn flash(
        &mut self,
        vault: &mut dyn TokenVault,
        callback: &mut dyn PaymentCallback,
        recipient: Address,
        amount_0: u128,
        amount_1: u128,
        data: &[u8],
    ) -> Result<()> {
        self.guarded(|pool| {
            let liquidity = pool.liquidity;
            if liquidity == 0 {
                return Err(ErrorCode::ZeroAmount);
            }

            let fee_0 = full_math::mul_div_ceil(
                U256::from(amount_0),
                U256::from(pool.fee),
                U256::from(1_000_000u32),
            )?
            .try_to_u128()
            .ok_or(ErrorCode::Overflow)?;
            let fee_1 = full_math::mul_div_ceil(
                U256::from(amount_1),
                U256::from(pool.fee),
                U256::from(1_000_000u32),
            )?
            .try_to_u128()
            .ok_or(ErrorCode::Overflow)?;

            let balance_0_before = vault.balance_of(pool.token_0, pool.vault_account);
            let balance_1_before = vault.balance_of(pool.token_1, pool.vault_account);

            if amount_0 > 0 {
                vault.transfer(pool.token_0, pool.vault_account, recipient, amount_0)?;
            }
            if amount_1 > 0 {
                vault.transfer(pool.token_1, pool.vault_account, recipient, amount_1)?;
            }

            callback.on_flash_payment(pool, vault, fee_0, fee_1, data)?;

            let balance_0_after = vault.balance_of(pool.token_0, pool.vault_account);
            let balance_1_after = vault.balance_of(pool.token_1, pool.vault_account);

            if balance_0_before
                .checked_add(fee_0)
                .ok_or(ErrorCode::Overflow)?
                > balance_0_after
            {
                return Err(ErrorCode::InsufficientInputAmount);
            }
            if balance_1_before
                .checked_add(fee_1)
                .ok_or(ErrorCode::Overflow)?
                > balance_1_after
            {
                return Err(ErrorCode::InsufficientInputAmount);
            }

            // whatever came back above the loan is fee, overpayment included
            let paid_0 = balance_0_after - balance_0_before;
            let paid_1 = balance_1_after - balance_1_before;

            if paid_0 > 0 {
                let fee_protocol_0 = pool.slot0.fee_protocol % 16;
                let fees_0 = if fee_protocol_0 == 0 {
                    0
                } else {
                    paid_0 / fee_protocol_0 as u128
                };
                if fees_0 > 0 {
                    pool.protocol_fees.token_0 = pool.protocol_fees.token_0.wrapping_add(fees_0);
                }
                pool.fee_growth_global_0_x128 = full_math::wrapping_add(
                    pool.fee_growth_global_0_x128,
                    full_math::mul_div_floor(
                        U256::from(paid_0 - fees_0),
                        fixed_point_128::Q128,
                        U256::from(liquidity),
                    )?,
                );
            }
            if paid_1 > 0 {
                let fee_protocol_1 = pool.slot0.fee_protocol >> 4;
                let fees_1 = if fee_protocol_1 == 0 {
                    0
                } else {
                    paid_1 / fee_protocol_1 as u128
                };
                if fees_1 > 0 {
                    pool.protocol_fees.token_1 = pool.protocol_fees.token_1.wrapping_add(fees_1);
                }
                pool.fee_growth_global_1_x128 = full_math::wrapping_add(
                    pool.fee_growth_global_1_x128,
                    full_math::mul_div_floor(
                        U256::from(paid_1 - fees_1),
                        fixed_point_128::Q128,
                        U256::from(liquidity),
                    )?,
                );
            }

            pool.record(PoolEvent::Flash {
                recipient,
                amount_0,
                amount_1,
                paid_0,
                paid_1,
            });
            Ok(())
        })
    }

    /// Raises the number of observations the oracle will store. A no-op if
    /// the buffer is already slated to reach `observation_cardinality_next`.
    ///
    /// # Arguments
    ///
    /// * `observation_cardinality_next` - The desired window length
    pub fn grow_oracle(&mut self, observation_cardinality_next: u16) -> Result<()> {
        self.guarded(|pool| {
            let old = pool.slot0.observation_cardinality_next;
            let new = pool
                .observations
                .grow(old, observation_cardinality_next);
            pool.slot0.observation_cardinality_next = new;
            if old != new {
                pool.record(PoolEvent::IncreaseObservationCardinalityNext {
                    observation_cardinality_next_old: old,
                    observation_cardinality_next_new: new,
                });
            }
            Ok(())
        })
    }

    /// Cumulative tick and seconds-per-liquidity values as of each
    /// `seconds_ago` before now. Read-only; fails `NotInitialized` before
    /// the pool has a price and `OracleOld` for targets beyond the stored
    /// history.
    ///
    /// # Arguments
    ///
    /// * `seconds_agos` - How far back each returned sample should be
    pub fn observe(&self, seconds_agos: &[u32]) -> Result<(Vec<i64>, Vec<U256>)> {
        self.ensure_initialized()?;
        self.observations.observe(
            self.clock.now(),
            seconds_agos,
            self.slot0.tick,
            self.slot0.observation_index,
            self.liquidity,
            self.slot0.observation_cardinality,
        )
    }

    /// Cumulative snapshot restricted to a tick range: the tick
    /// accumulator, seconds per liquidity, and seconds spent inside
    /// `[tick_lower, tick_upper)`. Snapshots are only comparable with other
    /// snapshots taken while a position straddled the range for the whole
    /// interval between them. Both boundary ticks must be initialized.
    ///
    /// # Arguments
    ///
    /// * `tick_lower` - Lower tick of the range
    /// * `tick_upper` - Upper tick of the range
    pub fn snapshot_cumulatives_inside(
        &self,
        tick_lower: i32,
        tick_upper: i32,
    ) -> Result<(i64, U256, u32)> {
        self.ensure_initialized()?;
        check_ticks(tick_lower, tick_upper)?;
        check_tick(tick_lower, self.tick_spacing)?;
        check_tick(tick_upper, self.tick_spacing)?;

        let lower = *self
            .ticks
            .get(tick_lower)
            .filter(|t| t.initialized)
            .ok_or(ErrorCode::InvalidTickRange)?;
        let upper = *self
            .ticks
            .get(tick_upper)
            .filter(|t| t.initialized)
            .ok_or(ErrorCode::InvalidTickRange)?;

        let tick_current = self.slot0.tick;
        if tick_current < tick_lower {
            Ok((
                lower
                    .tick_cumulative_outside
                    .wrapping_sub(upper.tick_cumulative_outside),
                full_math::wrapping_sub(
                    lower.seconds_per_liquidity_outside_x128,
                    upper.seconds_per_liquidity_outside_x128,
                ),
                lower.seconds_outside.wrapping_sub(upper.seconds_outside),
            ))
        } else if tick_current < tick_upper {
            let time = self.clock.now();
            let (tick_cumulative, seconds_per_liquidity_cumulative_x128) =
                self.observations.observe_single(
                    time,
                    0,
                    tick_current,
                    self.slot0.observation_index,
                    self.liquidity,
                    self.slot0.observation_cardinality,
                )?;
            Ok((
                tick_cumulative
                    .wrapping_sub(lower.tick_cumulative_outside)
                    .wrapping_sub(upper.tick_cumulative_outside),
                full_math::wrapping_sub(
                    full_math::wrapping_sub(
                        seconds_per_liquidity_cumulative_x128,
                        lower.seconds_per_liquidity_outside_x128,
                    ),
                    upper.seconds_per_liquidity_outside_x128,
                ),
                time.wrapping_sub(lower.seconds_outside)
                    .wrapping_sub(upper.seconds_outside),
            ))
        } else {
            Ok((
                upper
                    .tick_cumulative_outside
                    .wrapping_sub(lower.tick_cumulative_outside),
                full_math::wrapping_sub(
                    upper.seconds_per_liquidity_outside_x128,
                    lower.seconds_per_liquidity_outside_x128,
                ),
                upper.seconds_outside.wrapping_sub(lower.seconds_outside),
            ))
        }
    }

    /// Sets the protocol's share of swap and flash fees. Owner only; each
    /// nibble is a denominator, so a value of 5 sends 1/5 of fees to the
    /// protocol, and 0 disables the cut.
    ///
    /// # Arguments
    ///
    /// * `sender` - The caller; must be the pool owner
    /// * `fee_protocol_0` - Denominator for token_0 fees, 0 or in [4, 10]
    /// * `fee_protocol_1` - Denominator for token_1 fees, 0 or in [4, 10]
    pub fn set_protocol_fee(
        &mut self,
        sender: Address,
        fee_protocol_0: u8,
        fee_protocol_1: u8,
    ) -> Result<()> {
        self.guarded(|pool| {
            if sender != pool.owner {
                return Err(ErrorCode::Unauthorized);
            }
            let valid = |nibble: u8| nibble == 0 || (4..=10).contains(&nibble);
            if !valid(fee_protocol_0) || !valid(fee_protocol_1) {
                return Err(ErrorCode::InvalidFeeProtocol);
            }

            let fee_protocol_old = pool.slot0.fee_protocol;
            pool.slot0.fee_protocol = (fee_protocol_1 << 4) | fee_protocol_0;

            pool.record(PoolEvent::SetFeeProtocol {
                fee_protocol_0_old: fee_protocol_old % 16,
                fee_protocol_1_old: fee_protocol_old >> 4,
                fee_protocol_0,
                fee_protocol_1,
            });
            Ok(())
        })
    }

    /// Withdraws accrued protocol fees to `recipient`, up to the requested
    /// amounts. Owner only. One unit is left behind whenever a token's
    /// accrual is drained completely, so reported amounts stay bit-exact
    /// against ledgers that keep the storage slot warm.
    ///
    /// # Arguments
    ///
    /// * `vault` - Token custody
    /// * `sender` - The caller; must be the pool owner
    /// * `recipient` - Receiver of the collected fees
    /// * `amount_0_requested` - Max token_0 to collect
    /// * `amount_1_requested` - Max token_1 to collect
    pub fn collect_protocol(
        &mut self,
        vault: &mut dyn TokenVault,
        sender: Address,
        recipient: Address,
        amount_0_requested: u128,
        amount_1_requested: u128,
    ) -> Result<(u128, u128)> {
        self.guarded(|pool| {
            if sender != pool.owner {
                return Err(ErrorCode::Unauthorized);
            }

            let mut amount_0 = amount_0_requested.min(pool.protocol_fees.token_0);
            let mut amount_1 = amount_1_requested.min(pool.protocol_fees.token_1);

            if amount_0 > 0 {
                if amount_0 == pool.protocol_fees.token_0 {
                    amount_0 -= 1;
                }
                pool.protocol_fees.token_0 -= amount_0;
                vault.transfer(pool.token_0, pool.vault_account, recipient, amount_0)?;
            }
            if amount_1 > 0 {
                if amount_1 == pool.protocol_fees.token_1 {
                    amount_1 -= 1;
                }
                pool.protocol_fees.token_1 -= amount_1;
                vault.transfer(pool.token_1, pool.vault_account, recipient, amount_1)?;
            }

            pool.record(PoolEvent::CollectProtocol {
                recipient,
                amount_0,
                amount_1,
            });
            Ok((amount_0, amount_1))
        })
    }

    // -----------------------------------------------------------------
    // Internals

    fn ensure_initialized(&self) -> Result<()> {
        if self.slot0.sqrt_price_x96.is_zero() {
            return Err(ErrorCode::NotInitialized);
        }
        Ok(())
    }

    /// Runs `op` with the reentrancy lock held. On failure the entire pool
    /// record is restored, so errors leave no observable state change.
    fn guarded<T>(&mut self, op: impl FnOnce(&mut Pool) -> Result<T>) -> Result<T> {
        self.ensure_initialized()?;
        if !self.slot0.unlocked {
            return Err(ErrorCode::Locked);
        }
        self.slot0.unlocked = false;

        let snapshot = self.snapshot();
        let result = op(self);
        if result.is_err() {
            self.restore(snapshot);
        }

        self.slot0.unlocked = true;
        result
    }

    /// Credits or debits liquidity on a position and returns the token
    /// amounts owed to the pool (positive) or to the owner (negative).
    fn modify_position(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: i128,
    ) -> Result<(i128, i128)> {
        check_ticks(tick_lower, tick_upper)?;
        check_tick(tick_lower, self.tick_spacing)?;
        check_tick(tick_upper, self.tick_spacing)?;

        self.update_position(owner, tick_lower, tick_upper, liquidity_delta)?;

        let mut amount_0 = 0i128;
        let mut amount_1 = 0i128;
        if liquidity_delta != 0 {
            if self.slot0.tick < tick_lower {
                // current price below the range: the position is entirely
                // token_0, which becomes more valuable crossing rightward
                amount_0 = sqrt_price_math::get_amount_0_delta_signed(
                    tick_math::get_sqrt_ratio_at_tick(tick_lower)?,
                    tick_math::get_sqrt_ratio_at_tick(tick_upper)?,
                    liquidity_delta,
                )?;
            } else if self.slot0.tick < tick_upper {
                // current price inside the range: both tokens at the
                // current price split, and active liquidity changes, which
                // is worth an oracle sample
                let time = self.clock.now();
                let (observation_index, observation_cardinality) = self.observations.write(
                    self.slot0.observation_index,
                    time,
                    self.slot0.tick,
                    self.liquidity,
                    self.slot0.observation_cardinality,
                    self.slot0.observation_cardinality_next,
                );
                self.slot0.observation_index = observation_index;
                self.slot0.observation_cardinality = observation_cardinality;

                amount_0 = sqrt_price_math::get_amount_0_delta_signed(
                    self.slot0.sqrt_price_x96,
                    tick_math::get_sqrt_ratio_at_tick(tick_upper)?,
                    liquidity_delta,
                )?;
                amount_1 = sqrt_price_math::get_amount_1_delta_signed(
                    tick_math::get_sqrt_ratio_at_tick(tick_lower)?,
                    self.slot0.sqrt_price_x96,
                    liquidity_delta,
                )?;

                self.liquidity = liquidity_math::add_delta(self.liquidity, liquidity_delta)?;
            } else {
                // current price above the range: entirely token_1
                amount_1 = sqrt_price_math::get_amount_1_delta_signed(
                    tick_math::get_sqrt_ratio_at_tick(tick_lower)?,
                    tick_math::get_sqrt_ratio_at_tick(tick_upper)?,
                    liquidity_delta,
                )?;
            }
        }

        Ok((amount_0, amount_1))
    }

    /// Updates the position record and its boundary ticks for a liquidity
    /// change, flipping bitmap bits and clearing emptied ticks.
    fn update_position(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: i128,
    ) -> Result<()> {
        let tick_current = self.slot0.tick;

        let mut flipped_lower = false;
        let mut flipped_upper = false;
        if liquidity_delta != 0 {
            let time = self.clock.now();
            let (tick_cumulative, seconds_per_liquidity_cumulative_x128) =
                self.observations.observe_single(
                    time,
                    0,
                    tick_current,
                    self.slot0.observation_index,
                    self.liquidity,
                    self.slot0.observation_cardinality,
                )?;

            flipped_lower = self.ticks.update(
                tick_lower,
                tick_current,
                liquidity_delta,
                self.fee_growth_global_0_x128,
                self.fee_growth_global_1_x128,
                seconds_per_liquidity_cumulative_x128,
                tick_cumulative,
                time,
                false,
                self.max_liquidity_per_tick,
            )?;
            flipped_upper = self.ticks.update(
                tick_upper,
                tick_current,
                liquidity_delta,
                self.fee_growth_global_0_x128,
                self.fee_growth_global_1_x128,
                seconds_per_liquidity_cumulative_x128,
                tick_cumulative,
                time,
                true,
                self.max_liquidity_per_tick,
            )?;

            if flipped_lower {
                self.tick_bitmap.flip_tick(tick_lower, self.tick_spacing as i32);
            }
            if flipped_upper {
                self.tick_bitmap.flip_tick(tick_upper, self.tick_spacing as i32);
            }
        }

        let (fee_growth_inside_0_x128, fee_growth_inside_1_x128) = self.ticks.get_fee_growth_inside(
            tick_lower,
            tick_upper,
            tick_current,
            self.fee_growth_global_0_x128,
            self.fee_growth_global_1_x128,
        );
        self.positions.update(
            (owner, tick_lower, tick_upper),
            liquidity_delta,
            fee_growth_inside_0_x128,
            fee_growth_inside_1_x128,
        )?;

        // drop tick records that a removal flipped to uninitialized
        if liquidity_delta < 0 {
            if flipped_lower {
                self.ticks.clear(tick_lower);
            }
            if flipped_upper {
                self.ticks.clear(tick_upper);
            }
        }
        Ok(())
    }
}
