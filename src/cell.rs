use std::fmt::Debug;

/// A single tape cell.
///
/// The engine is generic over the cell type so the same interpreter serves
/// both the unsigned layout (`u8`, the native executable) and the signed
/// layout (`i8`, the embeddable module). All arithmetic wraps modulo 256.
pub trait Cell: Copy + Default + Eq + Debug + 'static {
    const ZERO: Self;

    fn increment(self) -> Self;
    fn decrement(self) -> Self;

    #[inline(always)]
    fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    /// The raw bit pattern, used for character output and native dispatch.
    fn to_byte(self) -> u8;

    fn from_byte(byte: u8) -> Self;

    /// The numeric value as printed by the debug dump.
    fn to_int(self) -> i64;
}

impl Cell for u8 {
    const ZERO: Self = 0;

    #[inline(always)]
    fn increment(self) -> Self {
        self.wrapping_add(1)
    }

    #[inline(always)]
    fn decrement(self) -> Self {
        self.wrapping_sub(1)
    }

    #[inline(always)]
    fn to_byte(self) -> u8 {
        self
    }

    #[inline(always)]
    fn from_byte(byte: u8) -> Self {
        byte
    }

    fn to_int(self) -> i64 {
        self.into()
    }
}

impl Cell for i8 {
    const ZERO: Self = 0;

    #[inline(always)]
    fn increment(self) -> Self {
        self.wrapping_add(1)
    }

    #[inline(always)]
    fn decrement(self) -> Self {
        self.wrapping_sub(1)
    }

    #[inline(always)]
    fn to_byte(self) -> u8 {
        self as u8
    }

    #[inline(always)]
    fn from_byte(byte: u8) -> Self {
        byte as i8
    }

    fn to_int(self) -> i64 {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_wraps() {
        assert_eq!(255u8.increment(), 0);
        assert_eq!(0u8.decrement(), 255);
    }

    #[test]
    fn test_signed_wraps() {
        assert_eq!(127i8.increment(), -128);
        assert_eq!((-128i8).decrement(), 127);
    }

    #[test]
    fn test_signed_bit_pattern() {
        // -1 and 255 share a bit pattern, so both select native slot 255.
        assert_eq!((-1i8).to_byte(), 255);
        assert_eq!(i8::from_byte(200), -56);
        assert_eq!((-56i8).to_int(), -56);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn byte_round_trip_u8(b in any::<u8>()) {
            prop_assert_eq!(u8::from_byte(b).to_byte(), b);
        }

        #[test]
        fn signed_and_unsigned_agree_on_bits(b in any::<u8>(), ups in 0usize..600) {
            let mut u = u8::from_byte(b);
            let mut s = i8::from_byte(b);
            for _ in 0..ups {
                u = u.increment();
                s = s.increment();
            }
            prop_assert_eq!(u.to_byte(), s.to_byte());
        }
    }
}
