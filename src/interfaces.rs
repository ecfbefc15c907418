//! Capability traits the engine consumes.
//!
//! The pool never owns token balances or a clock. Token custody is abstracted
//! behind [`TokenVault`], payment obligations behind [`PaymentCallback`], and
//! time behind [`Clock`]. Hosts inject implementations at construction
//! (clock) or per call (vault, callback); tests inject mocks.

use crate::error::Result;
use crate::states::pool::Pool;

/// Identifier of a token managed by the vault.
pub type TokenId = u64;

/// Identifier of a balance-holding account. Pools, position owners and
/// recipients all live in this namespace.
pub type Address = u64;

/// Token custody abstraction.
///
/// Balance reads must reflect transfers performed earlier in the same call
/// chain, including transfers made by a payment callback.
pub trait TokenVault {
    /// Balance of `account` in `token`.
    fn balance_of(&self, token: TokenId, account: Address) -> u128;

    /// Move `amount` of `token` from `from` to `to`.
    ///
    /// The engine always passes its own vault account as `from`; callback
    /// implementations pass whichever account is paying the pool.
    fn transfer(&mut self, token: TokenId, from: Address, to: Address, amount: u128) -> Result<()>;
}

/// Payment obligations invoked by the engine mid-operation.
///
/// Each hook receives the pool so integrators can read post-step state, and
/// must leave the pool's vault account with the stated balance increase
/// before returning. Calling back into a mutating pool operation from inside
/// a hook fails with [`ErrorCode::Locked`](crate::ErrorCode::Locked).
pub trait PaymentCallback {
    /// Pay the tokens owed for minted liquidity.
    fn on_mint_payment(
        &mut self,
        pool: &mut Pool,
        vault: &mut dyn TokenVault,
        amount_0_owed: u128,
        amount_1_owed: u128,
        data: &[u8],
    ) -> Result<()>;

    /// Pay the input side of a swap. Positive deltas are owed to the pool,
    /// negative deltas were already sent to the recipient.
    fn on_swap_payment(
        &mut self,
        pool: &mut Pool,
        vault: &mut dyn TokenVault,
        amount_0_delta: i128,
        amount_1_delta: i128,
        data: &[u8],
    ) -> Result<()>;

    /// Repay a flash loan plus the stated fees.
    fn on_flash_payment(
        &mut self,
        pool: &mut Pool,
        vault: &mut dyn TokenVault,
        fee_0: u128,
        fee_1: u128,
        data: &[u8],
    ) -> Result<()>;
}

/// Source of the `u32` timestamps stored in oracle observations.
///
/// Wrap-around is expected and handled by the oracle's comparators.
pub trait Clock {
    fn now(&self) -> u32;
}
