//! # Component Schemas
//!
//! A [`Schema`] is the serialize/deserialize contract of a component value.
//! Host and scene must agree on it for every component id they share.
//!
//! Implementations are provided for primitives, strings, vectors, options,
//! the shared math types and [`Entity`]. Component structs compose these
//! field by field.

use std::fmt;

use meridian_shared::math::{Quaternion, Vec3};

use crate::codec::ByteBuffer;
use crate::ecs::Entity;
use crate::error::{CodecError, CodecResult};

/// Serialization contract for component values.
pub trait Schema: Clone + PartialEq + fmt::Debug + 'static {
    /// Appends the encoding of `self`.
    fn serialize(&self, buf: &mut ByteBuffer);

    /// Reads one value from the buffer.
    ///
    /// # Errors
    ///
    /// Any [`CodecError`] if the bytes do not hold a valid value.
    fn deserialize(buf: &mut ByteBuffer) -> CodecResult<Self>;

    /// Encodes `self` into a fresh vector.
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = ByteBuffer::with_capacity(64);
        self.serialize(&mut buf);
        buf.into_bytes()
    }

    /// Decodes a value that must span `bytes` exactly.
    ///
    /// # Errors
    ///
    /// [`CodecError::TrailingBytes`] if bytes are left over, otherwise whatever
    /// [`Schema::deserialize`] reports.
    fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        let mut buf = ByteBuffer::from_bytes(bytes);
        let value = Self::deserialize(&mut buf)?;
        match buf.remaining() {
            0 => Ok(value),
            extra => Err(CodecError::TrailingBytes(extra)),
        }
    }
}

macro_rules! impl_primitive_schema {
    ($($ty:ty => $write:ident, $read:ident);* $(;)?) => {
        $(
            impl Schema for $ty {
                #[inline]
                fn serialize(&self, buf: &mut ByteBuffer) {
                    buf.$write(*self);
                }

                #[inline]
                fn deserialize(buf: &mut ByteBuffer) -> CodecResult<Self> {
                    buf.$read()
                }
            }
        )*
    };
}

impl_primitive_schema! {
    u8 => write_u8, read_u8;
    bool => write_bool, read_bool;
    u16 => write_u16, read_u16;
    u32 => write_u32, read_u32;
    i32 => write_i32, read_i32;
    u64 => write_u64, read_u64;
    i64 => write_i64, read_i64;
    f32 => write_f32, read_f32;
    f64 => write_f64, read_f64;
}

impl Schema for String {
    fn serialize(&self, buf: &mut ByteBuffer) {
        buf.write_string(self);
    }

    fn deserialize(buf: &mut ByteBuffer) -> CodecResult<Self> {
        buf.read_string()
    }
}

impl<T: Schema> Schema for Vec<T> {
    fn serialize(&self, buf: &mut ByteBuffer) {
        let len = u32::try_from(self.len()).unwrap_or(u32::MAX);
        buf.write_u32(len);
        for item in self.iter().take(len as usize) {
            item.serialize(buf);
        }
    }

    fn deserialize(buf: &mut ByteBuffer) -> CodecResult<Self> {
        let len = buf.read_u32()? as usize;
        // Every element takes at least one byte.
        if len > buf.remaining() {
            return Err(CodecError::Truncated {
                needed: len,
                available: buf.remaining(),
            });
        }
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(T::deserialize(buf)?);
        }
        Ok(out)
    }
}

impl<T: Schema> Schema for Option<T> {
    fn serialize(&self, buf: &mut ByteBuffer) {
        match self {
            Some(value) => {
                buf.write_bool(true);
                value.serialize(buf);
            }
            None => buf.write_bool(false),
        }
    }

    fn deserialize(buf: &mut ByteBuffer) -> CodecResult<Self> {
        if buf.read_bool()? {
            T::deserialize(buf).map(Some)
        } else {
            Ok(None)
        }
    }
}

impl Schema for Vec3 {
    fn serialize(&self, buf: &mut ByteBuffer) {
        buf.write_f32(self.x);
        buf.write_f32(self.y);
        buf.write_f32(self.z);
    }

    fn deserialize(buf: &mut ByteBuffer) -> CodecResult<Self> {
        Ok(Self::new(buf.read_f32()?, buf.read_f32()?, buf.read_f32()?))
    }
}

impl Schema for Quaternion {
    fn serialize(&self, buf: &mut ByteBuffer) {
        buf.write_f32(self.x);
        buf.write_f32(self.y);
        buf.write_f32(self.z);
        buf.write_f32(self.w);
    }

    fn deserialize(buf: &mut ByteBuffer) -> CodecResult<Self> {
        Ok(Self::new(
            buf.read_f32()?,
            buf.read_f32()?,
            buf.read_f32()?,
            buf.read_f32()?,
        ))
    }
}

impl Schema for Entity {
    fn serialize(&self, buf: &mut ByteBuffer) {
        buf.write_u32(self.to_raw());
    }

    fn deserialize(buf: &mut ByteBuffer) -> CodecResult<Self> {
        buf.read_u32().map(Entity::from_raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Schema>(value: &T) {
        let bytes = value.to_bytes();
        assert_eq!(&T::from_bytes(&bytes).unwrap(), value);
    }

    #[test]
    fn test_primitive_roundtrip() {
        roundtrip(&7u8);
        roundtrip(&true);
        roundtrip(&-12i32);
        roundtrip(&u64::MAX);
        roundtrip(&3.25f32);
        roundtrip(&-0.5f64);
    }

    #[test]
    fn test_composite_roundtrip() {
        roundtrip(&String::from("scene"));
        roundtrip(&vec![1u32, 2, 3]);
        roundtrip(&Some(Vec3::new(1.0, 2.0, 3.0)));
        roundtrip(&Option::<u32>::None);
        roundtrip(&Quaternion::from_euler_degrees(10.0, 20.0, 30.0));
        roundtrip(&Entity::new(520, 3));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = 5u32.to_bytes();
        bytes.push(0);
        assert_eq!(u32::from_bytes(&bytes), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn test_vec_length_beyond_data_rejected() {
        let mut buf = ByteBuffer::new();
        buf.write_u32(1_000_000);
        let bytes = buf.into_bytes();
        assert!(matches!(
            Vec::<u8>::from_bytes(&bytes),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_truncated_value() {
        assert!(matches!(
            Vec3::from_bytes(&[0, 0, 0, 0]),
            Err(CodecError::Truncated { .. })
        ));
    }
}
