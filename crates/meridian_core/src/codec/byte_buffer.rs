//! # Byte Buffer
//!
//! One growable buffer with independent read and write cursors.
//!
//! ## Design
//!
//! - Writes append at the write cursor and grow the backing storage
//! - Reads advance the read cursor and never go past the write cursor
//! - All integers are little-endian
//! - Reads return `CodecError::Truncated` instead of panicking

use bytemuck::Pod;

use crate::error::{CodecError, CodecResult};

/// Initial capacity for buffers created with [`ByteBuffer::new`].
pub const DEFAULT_CAPACITY: usize = 1024;

/// Growable byte buffer with a read cursor and a write cursor.
///
/// # Example
///
/// ```rust,ignore
/// let mut buf = ByteBuffer::new();
/// buf.write_u32(7);
/// buf.write_f32(1.5);
/// assert_eq!(buf.read_u32()?, 7);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
    read_offset: usize,
}

impl ByteBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty buffer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            read_offset: 0,
        }
    }

    /// Wraps existing bytes for reading. The write cursor sits at the end.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            read_offset: 0,
        }
    }

    /// Number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if nothing has been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes written but not yet read.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_offset)
    }

    /// Current read position.
    #[inline]
    #[must_use]
    pub const fn read_offset(&self) -> usize {
        self.read_offset
    }

    /// Current write position.
    #[inline]
    #[must_use]
    pub fn write_offset(&self) -> usize {
        self.data.len()
    }

    /// Moves the read cursor, clamped to the written length.
    #[inline]
    pub fn set_read_offset(&mut self, offset: usize) {
        self.read_offset = offset.min(self.data.len());
    }

    /// Skips `count` unread bytes (clamped to what is left).
    #[inline]
    pub fn skip(&mut self, count: usize) {
        self.set_read_offset(self.read_offset.saturating_add(count));
    }

    /// All written bytes.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Unread bytes.
    #[inline]
    #[must_use]
    pub fn unread(&self) -> &[u8] {
        &self.data[self.read_offset..]
    }

    /// Consumes the buffer, returning all written bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Clears both cursors, keeping the allocation.
    #[inline]
    pub fn reset(&mut self) {
        self.data.clear();
        self.read_offset = 0;
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Writes a bool as one byte.
    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i32 in little-endian format.
    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u64 in little-endian format.
    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i64 in little-endian format.
    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a f32 in little-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a f64 in little-endian format.
    #[inline]
    pub fn write_f64(&mut self, value: f64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes raw bytes with no length prefix.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Writes a u32 length prefix followed by the bytes.
    pub fn write_len_prefixed(&mut self, bytes: &[u8]) {
        // Payloads beyond u32::MAX cannot be framed; callers bound their sizes.
        let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        self.write_u32(len);
        self.write_bytes(&bytes[..len as usize]);
    }

    /// Writes a UTF-8 string with a u32 length prefix.
    pub fn write_string(&mut self, value: &str) {
        self.write_len_prefixed(value.as_bytes());
    }

    /// Writes a Pod type directly.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        self.data.extend_from_slice(bytemuck::bytes_of(value));
    }

    // =========================================================================
    // Reads
    // =========================================================================

    #[inline]
    fn take(&mut self, count: usize) -> CodecResult<&[u8]> {
        let available = self.remaining();
        if count > available {
            return Err(CodecError::Truncated {
                needed: count,
                available,
            });
        }
        let start = self.read_offset;
        self.read_offset += count;
        Ok(&self.data[start..start + count])
    }

    #[inline]
    fn take_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Reads a bool; any value other than 0 or 1 is rejected.
    pub fn read_bool(&mut self) -> CodecResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidValue {
                field: "bool",
                value: u64::from(other),
            }),
        }
    }

    /// Reads a u16 in little-endian format.
    #[inline]
    pub fn read_u16(&mut self) -> CodecResult<u16> {
        self.take_array().map(u16::from_le_bytes)
    }

    /// Reads a u32 in little-endian format.
    #[inline]
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        self.take_array().map(u32::from_le_bytes)
    }

    /// Reads an i32 in little-endian format.
    #[inline]
    pub fn read_i32(&mut self) -> CodecResult<i32> {
        self.take_array().map(i32::from_le_bytes)
    }

    /// Reads a u64 in little-endian format.
    #[inline]
    pub fn read_u64(&mut self) -> CodecResult<u64> {
        self.take_array().map(u64::from_le_bytes)
    }

    /// Reads an i64 in little-endian format.
    #[inline]
    pub fn read_i64(&mut self) -> CodecResult<i64> {
        self.take_array().map(i64::from_le_bytes)
    }

    /// Reads a f32 in little-endian format.
    #[inline]
    pub fn read_f32(&mut self) -> CodecResult<f32> {
        self.take_array().map(f32::from_le_bytes)
    }

    /// Reads a f64 in little-endian format.
    #[inline]
    pub fn read_f64(&mut self) -> CodecResult<f64> {
        self.take_array().map(f64::from_le_bytes)
    }

    /// Reads `count` raw bytes.
    pub fn read_bytes(&mut self, count: usize) -> CodecResult<Vec<u8>> {
        self.take(count).map(<[u8]>::to_vec)
    }

    /// Reads a u32 length prefix and that many bytes.
    pub fn read_len_prefixed(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> CodecResult<String> {
        String::from_utf8(self.read_len_prefixed()?).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Reads a Pod type directly.
    #[inline]
    pub fn read_pod<T: Pod>(&mut self) -> CodecResult<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.take(size)?;
        // Unaligned read: the buffer makes no alignment promises.
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Reads a u32 at the read cursor without advancing.
    pub fn peek_u32(&self) -> CodecResult<u32> {
        let available = self.remaining();
        if available < 4 {
            return Err(CodecError::Truncated {
                needed: 4,
                available,
            });
        }
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.data[self.read_offset..self.read_offset + 4]);
        Ok(u32::from_le_bytes(out))
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data,
            read_offset: 0,
        }
    }
}
