// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A bit-granular, append-only writer used to serialize OBU payloads.
//!
//! Bits are packed most-significant-bit first, matching the bit order IAMF fields are defined
//! in. A small accumulator caches up to 7 pending bits between byte flushes; full bytes are
//! pushed onto the backing `Vec<u8>` as soon as they are known.

use crate::errors::{invalid_argument, Result};
use crate::io::uleb128::{encode_uleb128, Uleb128Policy};

/// Append-only, bit-granular output buffer.
///
/// `BitWriter` owns its backing storage. OBUs serialize their payload into a scratch
/// `BitWriter`, then [`crate::obu_header::ObuHeader::validate_and_write`] learns the payload's
/// byte length and writes the preamble ahead of it.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    /// Bits accumulated since the last full byte, left-justified in the high bits.
    cache: u8,
    /// Number of valid bits currently held in `cache`, in `0..8`.
    n_cache_bits: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        BitWriter::default()
    }

    pub fn with_capacity(capacity_bytes: usize) -> Self {
        BitWriter { bytes: Vec::with_capacity(capacity_bytes), cache: 0, n_cache_bits: 0 }
    }

    /// Number of whole bits written so far.
    pub fn bit_len(&self) -> u64 {
        (self.bytes.len() as u64) * 8 + u64::from(self.n_cache_bits)
    }

    /// Number of whole bytes written so far, rounding up a partial trailing byte.
    pub fn byte_len(&self) -> usize {
        self.bytes.len() + usize::from(self.n_cache_bits > 0)
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.n_cache_bits == 0
    }

    /// Pads the stream with zero bits until it is byte-aligned.
    pub fn byte_align(&mut self) {
        if self.n_cache_bits > 0 {
            self.bytes.push(self.cache);
            self.cache = 0;
            self.n_cache_bits = 0;
        }
    }

    /// Writes a single bit.
    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        if bit {
            self.cache |= 1 << (7 - self.n_cache_bits);
        }

        self.n_cache_bits += 1;

        if self.n_cache_bits == 8 {
            self.bytes.push(self.cache);
            self.cache = 0;
            self.n_cache_bits = 0;
        }

        Ok(())
    }

    /// Writes the low `bit_count` bits of `value`, most-significant bit first.
    ///
    /// Fails if `value` has a 1-bit at a position `>= bit_count`, or if `bit_count > 64`.
    pub fn write_unsigned_literal(&mut self, value: u64, bit_count: u32) -> Result<()> {
        if bit_count > 64 {
            return invalid_argument(format!("bit_count {bit_count} exceeds 64"));
        }

        if bit_count < 64 && (value >> bit_count) != 0 {
            return invalid_argument(format!(
                "value {value} does not fit in {bit_count} bits"
            ));
        }

        for i in (0..bit_count).rev() {
            self.write_bit((value >> i) & 1 != 0)?;
        }

        Ok(())
    }

    /// Writes `value` as a two's-complement signed integer in `bit_count` bits.
    pub fn write_signed_literal(&mut self, value: i64, bit_count: u32) -> Result<()> {
        if bit_count == 0 || bit_count > 64 {
            return invalid_argument(format!("bit_count {bit_count} out of range for signed write"));
        }

        let min = if bit_count == 64 { i64::MIN } else { -(1i64 << (bit_count - 1)) };
        let max = if bit_count == 64 { i64::MAX } else { (1i64 << (bit_count - 1)) - 1 };

        if value < min || value > max {
            return invalid_argument(format!(
                "value {value} does not fit in a signed {bit_count}-bit field"
            ));
        }

        let mask = if bit_count == 64 { u64::MAX } else { (1u64 << bit_count) - 1 };
        self.write_unsigned_literal((value as u64) & mask, bit_count)
    }

    /// Writes a big-endian signed 16-bit integer.
    pub fn write_signed16(&mut self, value: i16) -> Result<()> {
        self.write_signed_literal(i64::from(value), 16)
    }

    /// Writes a big-endian signed 32-bit integer.
    pub fn write_signed32(&mut self, value: i32) -> Result<()> {
        self.write_signed_literal(i64::from(value), 32)
    }

    /// Encodes `value` as a ULEB128 integer using `policy`.
    pub fn write_uleb128(&mut self, value: u64, policy: Uleb128Policy) -> Result<()> {
        if !self.is_byte_aligned() {
            return invalid_argument("write_uleb128 requires a byte-aligned writer");
        }

        let mut out = Vec::new();
        encode_uleb128(value, policy, &mut out)?;
        self.write_uint8_span(&out)
    }

    /// Writes raw bytes. Requires the writer to currently be byte-aligned.
    pub fn write_uint8_span(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_byte_aligned() {
            return invalid_argument("write_uint8_span requires a byte-aligned writer");
        }

        self.bytes.extend_from_slice(data);
        Ok(())
    }

    /// Writes a NUL-terminated UTF-8 string. Fails if `s` contains an interior NUL.
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        if s.as_bytes().contains(&0) {
            return invalid_argument("string contains an interior NUL byte");
        }

        self.write_uint8_span(s.as_bytes())?;
        self.write_uint8_span(&[0u8])
    }

    /// Consumes the writer, returning the accumulated bytes. Pads a partial trailing byte with
    /// zero bits, mirroring `byte_align`.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.byte_align();
        self.bytes
    }

    pub fn as_bytes(&self) -> &[u8] {
        debug_assert!(self.is_byte_aligned(), "as_bytes called on a non-byte-aligned writer");
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_unsigned_literal_packs_msb_first() {
        let mut w = BitWriter::new();
        w.write_unsigned_literal(0b101, 3).unwrap();
        w.write_unsigned_literal(0b01010, 5).unwrap();
        assert_eq!(w.into_bytes(), vec![0b1010_1010]);
    }

    #[test]
    fn write_unsigned_literal_rejects_overflow() {
        let mut w = BitWriter::new();
        assert!(w.write_unsigned_literal(0b1000, 3).is_err());
    }

    #[test]
    fn write_signed_literal_two_complement() {
        let mut w = BitWriter::new();
        w.write_signed_literal(-1, 8).unwrap();
        assert_eq!(w.into_bytes(), vec![0xff]);
    }

    #[test]
    fn write_signed16_big_endian() {
        let mut w = BitWriter::new();
        w.write_signed16(-1).unwrap();
        assert_eq!(w.into_bytes(), vec![0xff, 0xff]);
    }

    #[test]
    fn write_string_null_terminates() {
        let mut w = BitWriter::new();
        w.write_string("ab").unwrap();
        assert_eq!(w.into_bytes(), vec![b'a', b'b', 0]);
    }

    #[test]
    fn write_string_rejects_interior_nul() {
        let mut w = BitWriter::new();
        assert!(w.write_string("a\0b").is_err());
    }

    #[test]
    fn byte_align_pads_with_zeros() {
        let mut w = BitWriter::new();
        w.write_bit(true).unwrap();
        w.byte_align();
        assert_eq!(w.into_bytes(), vec![0b1000_0000]);
    }
}
