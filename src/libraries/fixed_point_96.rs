//! Constants for the Q64.96 fixed point format used by sqrt prices.

use super::big_num::U256;

pub const RESOLUTION: u8 = 96;

/// 2^96
pub const Q96: U256 = U256([0, 0x1_0000_0000, 0, 0]);
