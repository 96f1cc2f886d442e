// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoder config for uncompressed, integer PCM substreams.

use crate::errors::{invalid_argument, Result};
use crate::io::{BitReader, BitWriter};

bitflags::bitflags! {
    /// `sample_format_flags`: only the low bit is defined.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct SampleFormatFlags: u8 {
        const LITTLE_ENDIAN = 1 << 0;
    }
}

const VALID_SAMPLE_RATES: [u32; 5] = [16000, 32000, 44100, 48000, 96000];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LpcmDecoderConfig {
    pub sample_format_flags: SampleFormatFlags,
    pub sample_size: u8,
    pub sample_rate: u32,
}

impl LpcmDecoderConfig {
    pub fn new(sample_format_flags: SampleFormatFlags, sample_size: u8, sample_rate: u32) -> Result<Self> {
        if !matches!(sample_size, 16 | 24 | 32) {
            return invalid_argument(format!("lpcm sample_size {sample_size} must be 16, 24 or 32"));
        }
        if !VALID_SAMPLE_RATES.contains(&sample_rate) {
            return invalid_argument(format!(
                "lpcm sample_rate {sample_rate} is not one of {VALID_SAMPLE_RATES:?}"
            ));
        }
        Ok(LpcmDecoderConfig { sample_format_flags, sample_size, sample_rate })
    }

    pub fn is_little_endian(&self) -> bool {
        self.sample_format_flags.contains(SampleFormatFlags::LITTLE_ENDIAN)
    }

    pub fn write(&self, out: &mut BitWriter) -> Result<()> {
        out.write_unsigned_literal(u64::from(self.sample_format_flags.bits()), 8)?;
        out.write_unsigned_literal(u64::from(self.sample_size), 8)?;
        out.write_unsigned_literal(u64::from(self.sample_rate), 32)?;
        Ok(())
    }

    pub fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let flags_raw = reader.read_unsigned_literal(8)? as u8;
        let sample_format_flags = SampleFormatFlags::from_bits_truncate(flags_raw);
        let sample_size = reader.read_unsigned_literal(8)? as u8;
        let sample_rate = reader.read_unsigned_literal(32)? as u32;
        LpcmDecoderConfig::new(sample_format_flags, sample_size, sample_rate)
    }

    pub fn bytes_per_sample(&self) -> u32 {
        u32::from(self.sample_size) / 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_sample_size() {
        assert!(LpcmDecoderConfig::new(SampleFormatFlags::empty(), 20, 48000).is_err());
    }

    #[test]
    fn rejects_invalid_sample_rate() {
        assert!(LpcmDecoderConfig::new(SampleFormatFlags::empty(), 16, 22050).is_err());
    }

    #[test]
    fn roundtrip() {
        let config =
            LpcmDecoderConfig::new(SampleFormatFlags::LITTLE_ENDIAN, 24, 48000).unwrap();
        let mut out = BitWriter::new();
        config.write(&mut out).unwrap();
        let bytes = out.into_bytes();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(LpcmDecoderConfig::read(&mut reader).unwrap(), config);
    }
}
