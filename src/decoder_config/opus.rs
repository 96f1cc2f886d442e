// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoder config for Opus substreams: the subset of an RFC 6716/7845 ID header needed to
//! configure a decoder, minus the "OpusHead" magic and container-specific fields a demuxer would
//! otherwise supply.
//!
//! IAMF pins several Opus ID header fields to fixed values so every Opus substream in a stream
//! decodes identically: output is always 2-channel, 48 kHz, with no output gain or channel
//! remapping.

use crate::errors::{invalid_argument, Result};
use crate::io::{BitReader, BitWriter};
use crate::util::ceil_div;

const FIXED_OUTPUT_CHANNEL_COUNT: u8 = 2;
const FIXED_INPUT_SAMPLE_RATE: u32 = 48000;
const FIXED_OUTPUT_GAIN: i16 = 0;
const FIXED_MAPPING_FAMILY: u8 = 0;

/// The number of samples `-ceil(3840 / num_samples_per_frame)` is derived from.
const OPUS_ROLL_DISTANCE_SAMPLES: u32 = 3840;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpusDecoderConfig {
    pub version: u8,
    pub output_channel_count: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    pub output_gain: i16,
    pub mapping_family: u8,
}

impl OpusDecoderConfig {
    pub fn new(version: u8, pre_skip: u16) -> Result<Self> {
        Ok(OpusDecoderConfig {
            version,
            output_channel_count: FIXED_OUTPUT_CHANNEL_COUNT,
            pre_skip,
            input_sample_rate: FIXED_INPUT_SAMPLE_RATE,
            output_gain: FIXED_OUTPUT_GAIN,
            mapping_family: FIXED_MAPPING_FAMILY,
        })
    }

    /// Updates `pre_skip`. The only field `SetCodecDelay` is permitted to change for this codec.
    pub fn set_codec_delay(&mut self, pre_skip: u16) {
        self.pre_skip = pre_skip;
    }

    fn validate(&self) -> Result<()> {
        if self.output_channel_count != FIXED_OUTPUT_CHANNEL_COUNT {
            return invalid_argument("opus output_channel_count must be 2");
        }
        if self.input_sample_rate != FIXED_INPUT_SAMPLE_RATE {
            return invalid_argument("opus input_sample_rate must be 48000");
        }
        if self.output_gain != FIXED_OUTPUT_GAIN {
            return invalid_argument("opus output_gain must be 0");
        }
        if self.mapping_family != FIXED_MAPPING_FAMILY {
            return invalid_argument("opus mapping_family must be 0");
        }
        Ok(())
    }

    pub fn write(&self, out: &mut BitWriter) -> Result<()> {
        self.validate()?;
        out.write_unsigned_literal(u64::from(self.version), 8)?;
        out.write_unsigned_literal(u64::from(self.output_channel_count), 8)?;
        out.write_unsigned_literal(u64::from(self.pre_skip), 16)?;
        out.write_unsigned_literal(u64::from(self.input_sample_rate), 32)?;
        out.write_signed16(self.output_gain)?;
        out.write_unsigned_literal(u64::from(self.mapping_family), 8)?;
        Ok(())
    }

    pub fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let version = reader.read_unsigned_literal(8)? as u8;
        let output_channel_count = reader.read_unsigned_literal(8)? as u8;
        let pre_skip = reader.read_unsigned_literal(16)? as u16;
        let input_sample_rate = reader.read_unsigned_literal(32)? as u32;
        let output_gain = reader.read_signed16()?;
        let mapping_family = reader.read_unsigned_literal(8)? as u8;

        let config = OpusDecoderConfig {
            version,
            output_channel_count,
            pre_skip,
            input_sample_rate,
            output_gain,
            mapping_family,
        };
        config.validate()?;
        Ok(config)
    }

    /// The codec-mandated `audio_roll_distance`: `-ceil(3840 / num_samples_per_frame)`.
    ///
    /// Fails when `num_samples_per_frame` is zero, since the override computation in the
    /// codec-config OBU has nothing to divide by.
    pub fn recommended_audio_roll_distance(&self, num_samples_per_frame: u32) -> Result<i16> {
        if num_samples_per_frame == 0 {
            return invalid_argument("num_samples_per_frame must be non-zero to compute opus roll distance");
        }
        let frames = ceil_div(OPUS_ROLL_DISTANCE_SAMPLES, num_samples_per_frame);
        Ok(-(frames as i16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_fixed_output_gain() {
        let mut config = OpusDecoderConfig::new(1, 312).unwrap();
        config.output_gain = 5;
        assert!(config.write(&mut BitWriter::new()).is_err());
    }

    #[test]
    fn roundtrip() {
        let config = OpusDecoderConfig::new(1, 312).unwrap();
        let mut out = BitWriter::new();
        config.write(&mut out).unwrap();
        let bytes = out.into_bytes();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(OpusDecoderConfig::read(&mut reader).unwrap(), config);
    }

    #[test]
    fn roll_distance_matches_worked_examples() {
        let config = OpusDecoderConfig::new(1, 3840).unwrap();
        assert_eq!(config.recommended_audio_roll_distance(960).unwrap(), -4);
        assert_eq!(config.recommended_audio_roll_distance(120).unwrap(), -32);
    }

    #[test]
    fn roll_distance_fails_on_zero_frame_size() {
        let config = OpusDecoderConfig::new(1, 0).unwrap();
        assert!(config.recommended_audio_roll_distance(0).is_err());
    }

    #[test]
    fn set_codec_delay_updates_pre_skip_only() {
        let mut config = OpusDecoderConfig::new(1, 0).unwrap();
        config.set_codec_delay(960);
        assert_eq!(config.pre_skip, 960);
    }
}
