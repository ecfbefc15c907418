use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, ErrorCode>;

/// Error kinds for every fallible pool operation.
///
/// An error aborts the whole operation: the engine rolls back to the state
/// it held on entry, so callers never observe partial mutations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// A mutating or read operation was attempted before `initialize`
    #[error("pool is not initialized")]
    NotInitialized,

    /// `initialize` was called on a pool that already has a price
    #[error("pool is already initialized")]
    AlreadyInitialized,

    /// Reentrant call while an operation holds the pool lock
    #[error("pool is locked")]
    Locked,

    /// Lower tick is not below the upper tick, or a snapshot was requested
    /// over a range whose boundary ticks are not initialized
    #[error("invalid tick range")]
    InvalidTickRange,

    /// Tick lies outside [MIN_TICK, MAX_TICK]
    #[error("tick out of bounds")]
    TickOutOfBounds,

    /// Tick is not a multiple of the pool's tick spacing
    #[error("tick not a multiple of tick spacing")]
    TickNotSpaced,

    /// Liquidity change under/overflows, or per-tick gross liquidity would
    /// exceed the per-tick maximum
    #[error("liquidity overflow")]
    LiquidityOverflow,

    /// Post-callback balance check failed: the payer did not deliver the
    /// owed input amount or flash fee
    #[error("insufficient input amount")]
    InsufficientInputAmount,

    /// Swap price limit is on the wrong side of the current price or outside
    /// the representable sqrt price range
    #[error("price limit out of range")]
    PriceLimitOutOfRange,

    /// 256-bit arithmetic overflow or division by zero
    #[error("arithmetic overflow")]
    Overflow,

    /// Requested oracle timestamp predates the oldest stored observation
    #[error("oracle timestamp too old")]
    OracleOld,

    /// Zero amount where a non-zero amount is required, including pokes of
    /// empty positions and flash loans against zero in-range liquidity
    #[error("zero amount")]
    ZeroAmount,

    /// Caller is not the pool owner
    #[error("unauthorized")]
    Unauthorized,

    /// Protocol fee nibble outside 0 or [4, 10]
    #[error("invalid protocol fee")]
    InvalidFeeProtocol,
}
