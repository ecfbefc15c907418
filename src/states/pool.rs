//! The pool record: immutable configuration, the packed `Slot0`, the owned
//! component containers, and the event journal.

use crate::interfaces::{Address, Clock, TokenId};
use crate::libraries::big_num::U256;
use crate::states::{
    oracle::Oracle, position::PositionLedger, tick::TickBook, tick_bitmap::TickBitmap,
};

/// The packed mutable header of the pool, read and written together by
/// every operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slot0 {
    /// The current price of the pool as a sqrt(token_1/token_0) Q64.96
    pub sqrt_price_x96: U256,

    /// The current tick, i.e. according to the last tick transition that
    /// was run. May not always equal the tick at `sqrt_price_x96` when the
    /// price sits on a boundary, and is not necessarily a multiple of the
    /// tick spacing.
    pub tick: i32,

    /// The most recently updated index of the observation buffer
    pub observation_index: u16,

    /// The current maximum number of observations being stored
    pub observation_cardinality: u16,

    /// The next maximum number of observations, activated once the buffer
    /// wraps past the current window
    pub observation_cardinality_next: u16,

    /// Protocol fee denominators for both tokens, packed as two nibbles:
    /// `fee_protocol_1 << 4 | fee_protocol_0`, each 0 or in [4, 10]
    pub fee_protocol: u8,

    /// Whether the pool is unlocked to mutating operations
    pub unlocked: bool,
}

/// Protocol fees accrued in each token, collected by the pool owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolFees {
    pub token_0: u128,
    pub token_1: u128,
}

/// A two-asset concentrated-liquidity pool.
///
/// Construction wires in the immutable configuration and a clock; the pool
/// is unusable until [`initialize`](Pool::initialize) sets a starting
/// price. All further mutations go through the engine operations, which
/// hold the `Slot0` lock for their duration and roll the whole record back
/// on failure.
pub struct Pool {
    /// Token pair of the pool, where `token_0 < token_1`
    pub token_0: TokenId,
    pub token_1: TokenId,

    /// Fee taken on every swap, denominated in hundredths of a bip
    pub fee: u32,

    /// The minimum number of ticks between initialized ticks
    pub tick_spacing: u16,

    /// Cap on per-tick gross liquidity, derived from the tick spacing
    pub max_liquidity_per_tick: u128,

    /// Account allowed to set and collect protocol fees
    pub owner: Address,

    /// The vault account holding the pool's token balances
    pub vault_account: Address,

    pub slot0: Slot0,

    /// Fee growth per unit of liquidity over the life of the pool, Q128.128
    /// modulo 2^256
    pub fee_growth_global_0_x128: U256,
    pub fee_growth_global_1_x128: U256,

    pub protocol_fees: ProtocolFees,

    /// The liquidity currently in range. Unrelated to the total liquidity
    /// across all ticks.
    pub liquidity: u128,

    pub ticks: TickBook,
    pub tick_bitmap: TickBitmap,
    pub positions: PositionLedger,
    pub observations: Oracle,

    pub(crate) clock: Box<dyn Clock>,
    pub(crate) events: Vec<PoolEvent>,
}

impl Pool {
    /// Creates an uninitialized pool.
    ///
    /// # Panics
    ///
    /// Panics on misconfiguration: tokens out of order, fee at or above
    /// 100%, or a tick spacing outside (0, 16384). Spacings at or above
    /// 16384 could let the bitmap walk produce ticks outside the 24-bit
    /// domain.
    pub fn new(
        token_0: TokenId,
        token_1: TokenId,
        fee: u32,
        tick_spacing: u16,
        owner: Address,
        vault_account: Address,
        clock: Box<dyn Clock>,
    ) -> Self {
        assert!(token_0 < token_1);
        assert!(fee < 1_000_000);
        assert!(tick_spacing > 0 && tick_spacing < 16_384);

        Self {
            token_0,
            token_1,
            fee,
            tick_spacing,
            max_liquidity_per_tick: crate::states::tick::tick_spacing_to_max_liquidity_per_tick(
                tick_spacing as i32,
            ),
            owner,
            vault_account,
            slot0: Slot0::default(),
            fee_growth_global_0_x128: U256::zero(),
            fee_growth_global_1_x128: U256::zero(),
            protocol_fees: ProtocolFees::default(),
            liquidity: 0,
            ticks: TickBook::new(),
            tick_bitmap: TickBitmap::new(),
            positions: PositionLedger::new(),
            observations: Oracle::new(),
            clock,
            events: Vec::new(),
        }
    }

    /// Drains and returns the journaled events in emission order.
    pub fn take_events(&mut self) -> Vec<PoolEvent> {
        core::mem::take(&mut self.events)
    }

    pub(crate) fn record(&mut self, event: PoolEvent) {
        tracing::debug!(?event, "pool event");
        self.events.push(event);
    }

    /// Captures every mutable part of the record so a failed operation can
    /// be undone wholesale.
    pub(crate) fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            slot0: self.slot0,
            fee_growth_global_0_x128: self.fee_growth_global_0_x128,
            fee_growth_global_1_x128: self.fee_growth_global_1_x128,
            protocol_fees: self.protocol_fees,
            liquidity: self.liquidity,
            ticks: self.ticks.clone(),
            tick_bitmap: self.tick_bitmap.clone(),
            positions: self.positions.clone(),
            observations: self.observations.clone(),
            events_len: self.events.len(),
        }
    }

    pub(crate) fn restore(&mut self, snapshot: PoolSnapshot) {
        self.slot0 = snapshot.slot0;
        self.fee_growth_global_0_x128 = snapshot.fee_growth_global_0_x128;
        self.fee_growth_global_1_x128 = snapshot.fee_growth_global_1_x128;
        self.protocol_fees = snapshot.protocol_fees;
        self.liquidity = snapshot.liquidity;
        self.ticks = snapshot.ticks;
        self.tick_bitmap = snapshot.tick_bitmap;
        self.positions = snapshot.positions;
        self.observations = snapshot.observations;
        self.events.truncate(snapshot.events_len);
    }
}

/// The mutable half of a [`Pool`], captured on entry to every locked
/// operation and restored on failure.
pub(crate) struct PoolSnapshot {
    slot0: Slot0,
    fee_growth_global_0_x128: U256,
    fee_growth_global_1_x128: U256,
    protocol_fees: ProtocolFees,
    liquidity: u128,
    ticks: TickBook,
    tick_bitmap: TickBitmap,
    positions: PositionLedger,
    observations: Oracle,
    events_len: usize,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("token_0", &self.token_0)
            .field("token_1", &self.token_1)
            .field("fee", &self.fee)
            .field("tick_spacing", &self.tick_spacing)
            .field("slot0", &self.slot0)
            .field("liquidity", &self.liquidity)
            .finish_non_exhaustive()
    }
}

/// Everything observers can learn about pool mutations, journaled per
/// operation and drained via [`Pool::take_events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// The pool received its starting price
    Initialize { sqrt_price_x96: U256, tick: i32 },

    /// Liquidity was added to a position
    Mint {
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        amount_0: u128,
        amount_1: u128,
    },

    /// Liquidity was removed from a position and credited as owed tokens
    Burn {
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        amount_0: u128,
        amount_1: u128,
    },

    /// Owed tokens were withdrawn from a position
    Collect {
        owner: Address,
        recipient: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount_0: u128,
        amount_1: u128,
    },

    /// Token_0 was exchanged for token_1, or vice versa
    Swap {
        recipient: Address,
        amount_0: i128,
        amount_1: i128,
        sqrt_price_x96: U256,
        liquidity: u128,
        tick: i32,
    },

    /// A flash loan was taken and repaid with fees
    Flash {
        recipient: Address,
        amount_0: u128,
        amount_1: u128,
        paid_0: u128,
        paid_1: u128,
    },

    /// The observation buffer's next cardinality was raised
    IncreaseObservationCardinalityNext {
        observation_cardinality_next_old: u16,
        observation_cardinality_next_new: u16,
    },

    /// The protocol fee nibbles changed
    SetFeeProtocol {
        fee_protocol_0_old: u8,
        fee_protocol_1_old: u8,
        fee_protocol_0: u8,
        fee_protocol_1: u8,
    },

    /// Accrued protocol fees were withdrawn
    CollectProtocol {
        recipient: Address,
        amount_0: u128,
        amount_1: u128,
    },
}
