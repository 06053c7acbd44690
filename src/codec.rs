//! Byte-order-correct encoding of fixed-width register values.
//!
//! The codec knows nothing about the logical width of a reading; a sensor that
//! packs a narrower value into a wider transaction shifts the decoded value
//! itself (see `sensors::bmi323`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    /// Most significant byte first.
    Big,
    /// Least significant byte first.
    Little,
}

/// An integer that can be carried in a register transaction.
pub trait RegisterValue: Copy + Sized {
    /// Byte buffer of exactly `WIDTH` bytes.
    type Bytes: AsRef<[u8]> + AsMut<[u8]> + Default + Copy;

    const WIDTH: usize;

    fn encode(self, endianness: Endianness) -> Self::Bytes;

    fn decode(bytes: Self::Bytes, endianness: Endianness) -> Self;

    /// Decode from a slice, which must be exactly `WIDTH` bytes long.
    fn decode_slice(bytes: &[u8], endianness: Endianness) -> Option<Self> {
        if bytes.len() != Self::WIDTH {
            return None;
        }
        let mut buffer = Self::Bytes::default();
        buffer.as_mut().copy_from_slice(bytes);
        Some(Self::decode(buffer, endianness))
    }
}

macro_rules! register_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl RegisterValue for $ty {
                type Bytes = [u8; core::mem::size_of::<$ty>()];

                const WIDTH: usize = core::mem::size_of::<$ty>();

                #[inline]
                fn encode(self, endianness: Endianness) -> Self::Bytes {
                    match endianness {
                        Endianness::Big => self.to_be_bytes(),
                        Endianness::Little => self.to_le_bytes(),
                    }
                }

                #[inline]
                fn decode(bytes: Self::Bytes, endianness: Endianness) -> Self {
                    match endianness {
                        Endianness::Big => <$ty>::from_be_bytes(bytes),
                        Endianness::Little => <$ty>::from_le_bytes(bytes),
                    }
                }
            }
        )*
    };
}

register_value!(u8, i8, u16, i16, u32, i32, u64, i64);

pub fn encode<T: RegisterValue>(value: T, endianness: Endianness) -> T::Bytes {
    value.encode(endianness)
}

pub fn decode<T: RegisterValue>(bytes: T::Bytes, endianness: Endianness) -> T {
    T::decode(bytes, endianness)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: RegisterValue + PartialEq + core::fmt::Debug>(values: &[T]) {
        for &value in values {
            for endianness in [Endianness::Big, Endianness::Little] {
                let bytes = encode(value, endianness);
                assert_eq!(bytes.as_ref().len(), T::WIDTH);
                assert_eq!(decode::<T>(bytes, endianness), value);
            }
        }
    }

    #[test]
    fn test_round_trip_edge_values() {
        round_trip(&[u8::MIN, 1, 0x7F, 0x80, u8::MAX]);
        round_trip(&[i8::MIN, -1, 0, 1, i8::MAX]);
        round_trip(&[u16::MIN, 0x00FF, 0xFF00, 0x1234, u16::MAX]);
        round_trip(&[i16::MIN, -2, 0, 0x7500, i16::MAX]);
        round_trip(&[u32::MIN, 0xAABB_CCDD, 0x8000_0000, u32::MAX]);
        round_trip(&[i32::MIN, -65536, 0, 0x00FF_FFFF, i32::MAX]);
        round_trip(&[u64::MIN, 0x0102_0304_0506_0708, u64::MAX]);
        round_trip(&[i64::MIN, -1, 0, i64::MAX]);
    }

    #[test]
    fn test_exhaustive_16_bit_round_trip() {
        for raw in 0..=u16::MAX {
            round_trip(&[raw]);
            round_trip(&[raw as i16]);
        }
    }

    #[test]
    fn test_byte_order_is_independent_of_host() {
        assert_eq!(encode(0x1234_u16, Endianness::Big), [0x12, 0x34]);
        assert_eq!(encode(0x1234_u16, Endianness::Little), [0x34, 0x12]);
        assert_eq!(
            encode(0xAABB_CCDD_u32, Endianness::Big),
            [0xAA, 0xBB, 0xCC, 0xDD]
        );
        assert_eq!(decode::<u32>([0xDD, 0xCC, 0xBB, 0xAA], Endianness::Little), 0xAABB_CCDD);
        assert_eq!(decode::<i16>([0xFF, 0xF0], Endianness::Big), -16);
    }

    #[test]
    fn test_upper_half_shift_preserves_sign() {
        let raw = decode::<i32>([0xAA, 0xBB, 0xCC, 0xDD], Endianness::Big);
        let logical = (raw >> 16) as i16;
        assert_eq!(logical as u16, 0xAABB);
        assert!(logical < 0);

        let positive = decode::<i32>([0x12, 0x34, 0x00, 0x00], Endianness::Big);
        assert_eq!((positive >> 16) as i16, 0x1234);
    }

    #[test]
    fn test_decode_slice_checks_length() {
        assert_eq!(u16::decode_slice(&[0x01, 0x02], Endianness::Big), Some(0x0102));
        assert_eq!(u16::decode_slice(&[0x01], Endianness::Big), None);
        assert_eq!(u32::decode_slice(&[0; 5], Endianness::Little), None);
    }
}
