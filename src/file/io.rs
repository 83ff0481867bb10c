//! Low-level byte order and safe reading/writing utilities for BAML streams.
//!
//! BAML is little-endian throughout, so this module only provides endian-fixed
//! primitives. It implements safe, bounds-checked operations for reading and
//! writing primitive types from/to byte buffers, ensuring data integrity and
//! preventing buffer overruns during decoding and encoding.
//!
//! # Key Components
//!
//! ## Core Trait
//! - [`crate::file::io::BamlIO`] - Trait defining little-endian reading and writing
//!   capabilities for primitive types
//!
//! ## Reading Functions
//! - [`crate::file::io::read_le`] - Read values from buffer start
//! - [`crate::file::io::read_le_at`] - Read values at specific offset with auto-advance
//!
//! ## Writing Functions
//! - [`crate::file::io::write_le`] - Write values to buffer start
//! - [`crate::file::io::write_le_at`] - Write values at specific offset with auto-advance
//!
//! ## Supported Types
//! The [`crate::file::io::BamlIO`] trait is implemented for the primitive types that
//! occur in BAML record layouts: `u8`, `i8`, `u16`, `i16`, `u32`, `i32`.
//!
//! # Error Handling
//!
//! All functions return [`crate::Result<T>`] and produce [`crate::Error::OutOfBounds`]
//! if there are insufficient bytes in the buffer to complete the operation.

use crate::{Error::OutOfBounds, Result};

/// Trait for implementing type-specific safe binary data reading and writing.
///
/// This trait provides a unified interface for converting between primitive values
/// and their little-endian byte representations. It is implemented for the integer
/// types that appear in BAML record layouts, ensuring type safety and consistent
/// behavior across all binary access in this crate.
///
/// Each implementation defines a `Bytes` associated type that represents the
/// fixed-size byte array required for that particular type (e.g., `[u8; 4]` for
/// `u32`).
pub trait BamlIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read `Self` from a little-endian byte array
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
    /// Write `Self` to a little-endian byte array
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_baml_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl BamlIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_baml_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
}

/// Safely reads a value of type `T` in little-endian byte order from a data buffer.
///
/// # Arguments
///
/// * `data` - The byte buffer to read from
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le<T: BamlIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely reads a value of type `T` in little-endian byte order at a specific offset.
///
/// The offset is advanced by the number of bytes read.
///
/// # Arguments
///
/// * `data` - The byte buffer to read from
/// * `offset` - Mutable reference to the offset position (advanced after reading)
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at<T: BamlIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..*offset + type_len].try_into() else {
        return Err(OutOfBounds);
    };

    *offset += type_len;

    Ok(T::from_le_bytes(read))
}

/// Safely writes a value of type `T` in little-endian byte order to a data buffer.
///
/// # Arguments
///
/// * `data` - The mutable byte buffer to write to
/// * `value` - The value to write
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn write_le<T: BamlIO>(data: &mut [u8], value: T) -> Result<()> {
    let mut offset = 0_usize;
    write_le_at(data, &mut offset, value)
}

/// Safely writes a value of type `T` in little-endian byte order at a specific offset.
///
/// The offset is advanced by the number of bytes written.
///
/// # Arguments
///
/// * `data` - The mutable byte buffer to write to
/// * `offset` - Mutable reference to the offset position (advanced after writing)
/// * `value` - The value to write
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn write_le_at<T: BamlIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    let bytes = value.to_le_bytes();
    data[*offset..*offset + type_len].copy_from_slice(bytes.as_ref());
    *offset += type_len;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_le_u8() {
        let result = read_le::<u8>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x01);
    }

    #[test]
    fn read_le_u16() {
        let result = read_le::<u16>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0201);
    }

    #[test]
    fn read_le_i16() {
        let result = read_le::<i16>(&[0xFF, 0xFF]).unwrap();
        assert_eq!(result, -1);
    }

    #[test]
    fn read_le_u32() {
        let result = read_le::<u32>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0403_0201);
    }

    #[test]
    fn read_le_i32() {
        let result = read_le::<i32>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0403_0201);
    }

    #[test]
    fn read_le_from() {
        let mut offset = 2_usize;
        let result = read_le_at::<u16>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(result, 0x0403);
        assert_eq!(offset, 4);
    }

    #[test]
    fn read_errors() {
        let buffer = [0xFF, 0xFF];

        let result = read_le::<u32>(&buffer);
        assert!(matches!(result, Err(OutOfBounds)));
    }

    #[test]
    fn write_le_u16() {
        let mut buffer = [0u8; 2];
        write_le(&mut buffer, 0x1234u16).unwrap();
        assert_eq!(buffer, [0x34, 0x12]);
    }

    #[test]
    fn write_le_i16() {
        let mut buffer = [0u8; 2];
        write_le(&mut buffer, -1i16).unwrap();
        assert_eq!(buffer, [0xFF, 0xFF]);
    }

    #[test]
    fn write_le_u32() {
        let mut buffer = [0u8; 4];
        write_le(&mut buffer, 0x12345678u32).unwrap();
        assert_eq!(buffer, [0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn write_le_at_sequential() {
        let mut buffer = [0u8; 8];
        let mut offset = 0;

        write_le_at(&mut buffer, &mut offset, 0x1234u16).unwrap();
        assert_eq!(offset, 2);

        write_le_at(&mut buffer, &mut offset, 0x5678u16).unwrap();
        assert_eq!(offset, 4);

        write_le_at(&mut buffer, &mut offset, 0xABCDu32).unwrap();
        assert_eq!(offset, 8);

        assert_eq!(buffer, [0x34, 0x12, 0x78, 0x56, 0xCD, 0xAB, 0x00, 0x00]);
    }

    #[test]
    fn write_errors() {
        let mut buffer = [0u8; 2];

        let result = write_le(&mut buffer, 0x12345678u32);
        assert!(matches!(result, Err(OutOfBounds)));
    }

    #[test]
    fn round_trip_consistency() {
        const VALUE_U32: u32 = 0x12345678;
        const VALUE_I32: i32 = -12345;

        let mut buffer = [0u8; 4];
        write_le(&mut buffer, VALUE_U32).unwrap();
        let read_value: u32 = read_le(&buffer).unwrap();
        assert_eq!(read_value, VALUE_U32);

        write_le(&mut buffer, VALUE_I32).unwrap();
        let read_value: i32 = read_le(&buffer).unwrap();
        assert_eq!(read_value, VALUE_I32);
    }
}
