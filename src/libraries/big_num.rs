//! 256 and 512 bit unsigned integers.
//!
//! `U256` carries sqrt prices (Q64.96), fee growth accumulators (Q128.128)
//! and tick bitmap words. `U512` exists only as the intermediate width for
//! `full_math`, so 256x256 bit products are exact.

use uint::construct_uint;

construct_uint! {
    pub struct U256(4);
}

construct_uint! {
    pub struct U512(8);
}

impl U256 {
    /// Widen into the 512 bit type.
    pub fn to_u512(self) -> U512 {
        let mut words = [0u64; 8];
        words[..4].copy_from_slice(&self.0);
        U512(words)
    }

    /// Narrow to `u128`, or `None` if the value needs more than 128 bits.
    pub fn try_to_u128(self) -> Option<u128> {
        if self.bits() > 128 {
            None
        } else {
            Some(self.low_u128())
        }
    }
}

impl U512 {
    /// Narrow to `U256`, or `None` if the value needs more than 256 bits.
    pub fn try_to_u256(self) -> Option<U256> {
        if self.0[4..].iter().any(|word| *word != 0) {
            None
        } else {
            Some(U256([self.0[0], self.0[1], self.0[2], self.0[3]]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_and_narrow_round_trip() {
        let x = U256::MAX;
        assert_eq!(x.to_u512().try_to_u256(), Some(x));
    }

    #[test]
    fn narrow_overflow_is_none() {
        let wide = U256::MAX.to_u512() + U512::one();
        assert_eq!(wide.try_to_u256(), None);
        assert_eq!((U256::one() << 128).try_to_u128(), None);
    }

    #[test]
    fn narrow_to_u128() {
        assert_eq!(((U256::one() << 128) - 1).try_to_u128(), Some(u128::MAX));
    }
}
