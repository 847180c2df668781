//! Low-level byte cursors used by every codec in the crate.
//!
//! All multi-byte values are little-endian. [`ByteReader`] borrows its input and hands
//! out sub-slices with the same lifetime, so bounded chunk payloads never need to be
//! copied. [`ByteWriter`] tracks its own offset and supports back-patching of length
//! prefixes that are only known after the payload has been written.

use crate::error::{GbxError, Result};

/// A forward-only little-endian reader over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the unread tail without consuming it.
    pub fn rest(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or_default()
    }

    /// Consumes exactly `len` bytes. Truncated input is an I/O error.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| GbxError::eof("raw bytes"))?;
        let slice = self.data.get(self.pos..end).ok_or_else(|| GbxError::eof("raw bytes"))?;
        self.pos = end;
        Ok(slice)
    }

    /// Consumes `len` bytes announced by a length prefix.
    ///
    /// Unlike [`take`](Self::take), a length that runs past the end of the buffer is a
    /// format violation: the stream itself claims data that cannot exist.
    pub fn take_declared(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(GbxError::Format(format!(
                "{what} declares {len} bytes but only {} remain",
                self.remaining()
            )));
        }
        self.take(len)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    /// Reads a `u16`.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    /// Reads a `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// Reads an `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    /// Reads a `u64`.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// Reads an IEEE-754 `f32`.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// Looks at the next `u32` without consuming it.
    pub fn peek_u32(&self) -> Option<u32> {
        let bytes = self.data.get(self.pos..self.pos.checked_add(4)?)?;
        let mut out = [0u8; 4];
        out.copy_from_slice(bytes);
        Some(u32::from_le_bytes(out))
    }

    /// Reads an `i32` count prefix, rejecting negative values.
    pub fn read_count(&mut self, what: &str) -> Result<usize> {
        let count = self.read_i32()?;
        usize::try_from(count)
            .map_err(|_| GbxError::Format(format!("negative {what} count: {count}")))
    }

    /// Reads an `i32`-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_count("string length")?;
        let bytes = self.take_declared(len, "string")?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| GbxError::Format(format!("string is not valid UTF-8: {e}")))
    }
}

/// A growable little-endian writer that tracks its current offset.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current offset, i.e. the number of bytes written so far.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Writes a `u16`.
    pub fn write_u16(&mut self, v: u16) {
        self.write_bytes(&v.to_le_bytes());
    }

    /// Writes a `u32`.
    pub fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    /// Writes an `i32`.
    pub fn write_i32(&mut self, v: i32) {
        self.write_bytes(&v.to_le_bytes());
    }

    /// Writes a `u64`.
    pub fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    /// Writes an IEEE-754 `f32`.
    pub fn write_f32(&mut self, v: f32) {
        self.write_bytes(&v.to_le_bytes());
    }

    /// Writes an `i32` count prefix.
    pub fn write_count(&mut self, count: usize, what: &str) -> Result<()> {
        let count = i32::try_from(count)
            .map_err(|_| GbxError::Format(format!("{what} count {count} exceeds i32")))?;
        self.write_i32(count);
        Ok(())
    }

    /// Writes an `i32`-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_count(s.len(), "string length")?;
        self.write_bytes(s.as_bytes());
        Ok(())
    }

    /// Writes a placeholder `u32` and returns its offset for [`patch_u32`](Self::patch_u32).
    pub fn reserve_u32(&mut self) -> usize {
        let at = self.position();
        self.write_u32(0);
        at
    }

    /// Overwrites a previously reserved `u32`.
    pub fn patch_u32(&mut self, at: usize, v: u32) -> Result<()> {
        let slot = self
            .buf
            .get_mut(at..at + 4)
            .ok_or_else(|| GbxError::Format(format!("patch offset {at} out of bounds")))?;
        slot.copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    /// Patches the `u32` at `at` with the number of bytes written since `start`.
    pub fn patch_len_since(&mut self, at: usize, start: usize) -> Result<()> {
        let len = u32::try_from(self.position() - start)
            .map_err(|_| GbxError::format("section larger than 4 GiB"))?;
        self.patch_u32(at, len)
    }

    /// Borrows the bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer and returns its buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
