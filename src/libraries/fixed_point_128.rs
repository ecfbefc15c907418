//! Constants for the Q128.128 fixed point format used by fee growth and
//! seconds-per-liquidity accumulators.

use super::big_num::U256;

/// 2^128
pub const Q128: U256 = U256([0, 0, 1, 0]);
