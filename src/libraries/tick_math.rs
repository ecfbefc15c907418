//! Conversion between price ticks and √P, both ways, bit exact.
//!
//! A tick `i` prices the pair at `P = 1.0001^i` (token_1 per token_0), so
//! `√P = 1.0001^(i/2)`, carried as an unsigned Q64.96. The forward direction
//! multiplies precomputed Q128.128 factors selected by the bits of `|i|`;
//! the reverse direction takes a fixed point log2 via the most significant
//! bit, changes base to √1.0001, and disambiguates the candidate ticks with
//! the exact forward ladder.

use super::{big_num::U256, bit_math};
use crate::error::{ErrorCode, Result};

pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = -MIN_TICK;

/// √P at MIN_TICK, i.e. 4295128739
pub const MIN_SQRT_RATIO: U256 = U256([4295128739, 0, 0, 0]);

/// √P at MAX_TICK, i.e. 1461446703485210103287273052203988822378723970342
pub const MAX_SQRT_RATIO: U256 = U256([
    0x5d95_1d52_6398_8d26,
    0xefd1_fc6a_5064_8849,
    0xfffd_8963,
    0,
]);

/// Calculates `1.0001^(tick/2)` as a Q64.96.
///
/// Each magic factor is `2^128 / 1.0001^(2^(i-1))` for bit `i` of `|tick|`;
/// the running product stays in Q128.128 until the final shift, which rounds
/// up so the reverse mapping of the result is always consistent.
///
/// # Arguments
///
/// * `tick` - the price tick, in `[MIN_TICK, MAX_TICK]`
pub fn get_sqrt_ratio_at_tick(tick: i32) -> Result<U256> {
    let abs_tick = tick.unsigned_abs();
    if abs_tick > MAX_TICK as u32 {
        return Err(ErrorCode::TickOutOfBounds);
    }

    let mut ratio = if abs_tick & 0x1 != 0 {
        U256::from(0xfffcb933bd6fad37aa2d162d1a594001u128)
    } else {
        U256::one() << 128
    };
    if abs_tick & 0x2 != 0 {
        ratio = (ratio * U256::from(0xfff97272373d413259a46990580e213au128)) >> 128;
    }
    if abs_tick & 0x4 != 0 {
        ratio = (ratio * U256::from(0xfff2e50f5f656932ef12357cf3c7fdccu128)) >> 128;
    }
    if abs_tick & 0x8 != 0 {
        ratio = (ratio * U256::from(0xffe5caca7e10e4e61c3624eaa0941cd0u128)) >> 128;
    }
    if abs_tick & 0x10 != 0 {
        ratio = (ratio * U256::from(0xffcb9843d60f6159c9db58835c926644u128)) >> 128;
    }
    if abs_tick & 0x20 != 0 {
        ratio = (ratio * U256::from(0xff973b41fa98c081472e6896dfb254c0u128)) >> 128;
    }
    if abs_tick & 0x40 != 0 {
        ratio = (ratio * U256::from(0xff2ea16466c96a3843ec78b326b52861u128)) >> 128;
    }
    if abs_tick & 0x80 != 0 {
        ratio = (ratio * U256::from(0xfe5dee046a99a2a811c461f1969c3053u128)) >> 128;
    }
    if abs_tick & 0x100 != 0 {
        ratio = (ratio * U256::from(0xfcbe86c7900a88aedcffc83b479aa3a4u128)) >> 128;
    }
    if abs_tick & 0x200 != 0 {
        ratio = (ratio * U256::from(0xf987a7253ac413176f2b074cf7815e54u128)) >> 128;
    }
    if abs_tick & 0x400 != 0 {
        ratio = (ratio * U256::from(0xf3392b0822b70005940c7a398e4b70f3u128)) >> 128;
    }
    if abs_tick & 0x800 != 0 {
        ratio = (ratio * U256::from(0xe7159475a2c29b7443b29c7fa6e889d9u128)) >> 128;
    }
    if abs_tick & 0x1000 != 0 {
        ratio = (ratio * U256::from(0xd097f3bdfd2022b8845ad8f792aa5825u128)) >> 128;
    }
    if abs_tick & 0x2000 != 0 {
        ratio = (ratio * U256::from(0xa9f746462d870fdf8a65dc1f90e061e5u128)) >> 128;
    }
    if abs_tick & 0x4000 != 0 {
        ratio = (ratio * U256::from(0x70d869a156d2a1b890bb3df62baf32f7u128)) >> 128;
    }
    if abs_tick & 0x8000 != 0 {
        ratio = (ratio * U256::from(0x31be135f97d08fd981231505542fcfa6u128)) >> 128;
    }
    if abs_tick & 0x1_0000 != 0 {
        ratio = (ratio * U256::from(0x9aa508b5b7a84e1c677de54f3e99bc9u128)) >> 128;
    }
    if abs_tick & 0x2_0000 != 0 {
        ratio = (ratio * U256::from(0x5d6af8dedb81196699c329225ee604u128)) >> 128;
    }
    if abs_tick & 0x4_0000 != 0 {
        ratio = (ratio * U256::from(0x2216e584f5fa1ea926041bedfe98u128)) >> 128;
    }
    if abs_tick & 0x8_0000 != 0 {
        ratio = (ratio * U256::from(0x48a170391f7dc42444e8fa2u128)) >> 128;
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 -> Q64.96, rounding up
    let sqrt_price_x96 = (ratio >> 32)
        + if (ratio & U256::from(0xffff_ffffu64)).is_zero() {
            U256::zero()
        } else {
            U256::one()
        };

    Ok(sqrt_price_x96)
}

/// Calculates the greatest tick whose √P is at most `sqrt_price_x96`.
///
/// The integer part of `log2 √P` comes from the most significant bit. The
/// fractional part is refined to 14 bits by repeated squaring of a 32-bit
/// normalized mantissa, which brackets the tick to at most two candidates;
/// the exact ladder then settles which one satisfies
/// `get_sqrt_ratio_at_tick(t) <= √P < get_sqrt_ratio_at_tick(t + 1)`.
///
/// # Arguments
///
/// * `sqrt_price_x96` - the sqrt price, in `[MIN_SQRT_RATIO, MAX_SQRT_RATIO)`
pub fn get_tick_at_sqrt_ratio(sqrt_price_x96: U256) -> Result<i32> {
    // second inequality must be < because the price can never reach the
    // price at the max tick
    if sqrt_price_x96 < MIN_SQRT_RATIO || sqrt_price_x96 >= MAX_SQRT_RATIO {
        return Err(ErrorCode::PriceLimitOutOfRange);
    }

    let msb = bit_math::most_significant_bit(sqrt_price_x96);

    // Normalize the mantissa to [2^31, 2^32). The 32 retained bits bound the
    // truncation error far below the bracketing margins below.
    let mut r: u64 = if msb >= 32 {
        (sqrt_price_x96 >> (msb as usize - 31)).low_u64()
    } else {
        (sqrt_price_x96 << (31 - msb as usize)).low_u64()
    };

    // Integer part: msb biased by the 96 fractional bits, as Q48.16
    let mut log_2_x16: i64 = ((msb as i64) - 96) << 16;

    // Fractional part: 14 bits of refinement by repeated squaring
    for shift in (2..=15).rev() {
        r = (r * r) >> 31;
        let f = (r >> 32) as u8;
        log_2_x16 |= (f as i64) << shift;
        r >>= f;
    }

    // Change of base: multiply by 2^16 / log2(√1.0001), moving to Q32.32
    let log_sqrt_10001_x32 = log_2_x16 * 908567298;

    // The refinement error of 2^-14 / log2(√1.0001) = 0.8461 ticks plus a
    // 0.01 guard on either side brackets the true tick to two candidates
    let tick_low = ((log_sqrt_10001_x32 - 42949672) >> 32) as i32;
    let tick_high = ((log_sqrt_10001_x32 + 3677218864) >> 32) as i32;

    Ok(if tick_low == tick_high {
        tick_low
    } else if get_sqrt_ratio_at_tick(tick_high)? <= sqrt_price_x96 {
        tick_high
    } else {
        tick_low
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ratio_to_f64(ratio: U256) -> f64 {
        format!("{}", ratio).parse::<f64>().unwrap() / 2f64.powi(96)
    }

    #[test]
    fn known_anchor_points() {
        assert_eq!(
            get_sqrt_ratio_at_tick(0).unwrap(),
            U256::from_dec_str("79228162514264337593543950336").unwrap()
        );
        assert_eq!(get_sqrt_ratio_at_tick(MIN_TICK).unwrap(), MIN_SQRT_RATIO);
        assert_eq!(get_sqrt_ratio_at_tick(MAX_TICK).unwrap(), MAX_SQRT_RATIO);
        assert_eq!(
            MAX_SQRT_RATIO,
            U256::from_dec_str("1461446703485210103287273052203988822378723970342").unwrap()
        );
        assert_eq!(MIN_SQRT_RATIO, U256::from_dec_str("4295128739").unwrap());
    }

    #[test]
    fn sqrt_price_tracks_the_float_curve() {
        for tick in (MIN_TICK..=MAX_TICK).step_by(3001) {
            let sqrt_price = ratio_to_f64(get_sqrt_ratio_at_tick(tick).unwrap());
            let float_price = f64::powf(1.0001, (tick as f64) / 2.0);
            let deviation = (sqrt_price - float_price) / float_price;
            assert!(deviation.abs() < 1e-10, "tick {tick}: deviation {deviation}");
        }
    }

    #[test]
    fn sqrt_price_increases_with_tick() {
        let mut prev = U256::zero();
        for tick in (MIN_TICK..=MAX_TICK).step_by(997) {
            let sqrt_price_x96 = get_sqrt_ratio_at_tick(tick).unwrap();
            assert!(sqrt_price_x96 > prev);
            prev = sqrt_price_x96;
        }
        assert!(get_sqrt_ratio_at_tick(MAX_TICK).unwrap() > prev);
    }

    #[test]
    fn adjacent_ticks_are_distinct() {
        for tick in [MIN_TICK, -100_000, -1, 0, 1, 100_000, MAX_TICK - 1] {
            assert!(get_sqrt_ratio_at_tick(tick + 1).unwrap() > get_sqrt_ratio_at_tick(tick).unwrap());
        }
    }

    #[test]
    fn retrieve_original_tick() {
        for tick in (MIN_TICK..=MAX_TICK).step_by(997) {
            let sqrt_price_x96 = get_sqrt_ratio_at_tick(tick).unwrap();
            assert_eq!(get_tick_at_sqrt_ratio(sqrt_price_x96).unwrap(), tick);
        }
        for tick in [MIN_TICK, MIN_TICK + 1, -1, 0, 1, MAX_TICK - 1] {
            let sqrt_price_x96 = get_sqrt_ratio_at_tick(tick).unwrap();
            assert_eq!(get_tick_at_sqrt_ratio(sqrt_price_x96).unwrap(), tick);
        }
    }

    #[test]
    fn tick_is_a_left_inverse() {
        // any ratio strictly between two tick ratios maps to the lower tick
        for tick in [MIN_TICK, -50_000, 0, 33_333, MAX_TICK - 1] {
            let at_tick = get_sqrt_ratio_at_tick(tick).unwrap();
            let above = get_sqrt_ratio_at_tick(tick + 1).unwrap();
            assert_eq!(get_tick_at_sqrt_ratio(at_tick).unwrap(), tick);
            assert_eq!(get_tick_at_sqrt_ratio(above - 1).unwrap(), tick);
        }
    }

    #[test]
    fn boundary_ratios() {
        assert_eq!(get_tick_at_sqrt_ratio(MIN_SQRT_RATIO).unwrap(), MIN_TICK);
        assert_eq!(get_tick_at_sqrt_ratio(MAX_SQRT_RATIO - 1).unwrap(), MAX_TICK - 1);
    }

    #[test]
    fn out_of_bounds_inputs_fail() {
        assert_eq!(get_sqrt_ratio_at_tick(MIN_TICK - 1), Err(ErrorCode::TickOutOfBounds));
        assert_eq!(get_sqrt_ratio_at_tick(MAX_TICK + 1), Err(ErrorCode::TickOutOfBounds));
        assert_eq!(
            get_tick_at_sqrt_ratio(MIN_SQRT_RATIO - 1),
            Err(ErrorCode::PriceLimitOutOfRange)
        );
        assert_eq!(
            get_tick_at_sqrt_ratio(MAX_SQRT_RATIO),
            Err(ErrorCode::PriceLimitOutOfRange)
        );
    }

    proptest! {
        // MAX_TICK itself prices at MAX_SQRT_RATIO, which the reverse
        // mapping excludes, so the round trip covers [MIN_TICK, MAX_TICK)
        #[test]
        fn round_trip_any_tick(tick in MIN_TICK..MAX_TICK) {
            let ratio = get_sqrt_ratio_at_tick(tick).unwrap();
            prop_assert!(ratio >= MIN_SQRT_RATIO && ratio < MAX_SQRT_RATIO);
            prop_assert_eq!(get_tick_at_sqrt_ratio(ratio).unwrap(), tick);
        }
    }
}
