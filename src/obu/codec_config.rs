// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Codec Config OBU: names a codec, its frame size, and the roll distance a decoder must
//! honor, followed by the codec-specific decoder config.

use crate::decoder_config::{CodecId, DecoderConfig};
use crate::errors::{invalid_argument, Result};
use crate::io::uleb128::Uleb128Policy;
use crate::io::{BitReader, BitWriter};
use crate::obu::read_footer;
use crate::obu_header::{ObuHeader, ObuType};

/// A practical upper bound on `num_samples_per_frame`; no real codec in this library's supported
/// set produces frames anywhere near this size, but unbounded values would let a malformed
/// stream force enormous allocations downstream.
pub const MAX_PRACTICAL_FRAME_SIZE: u64 = 1 << 16;

#[derive(Clone, Debug, PartialEq)]
pub struct CodecConfigObu {
    pub header: ObuHeader,
    pub codec_config_id: u64,
    pub num_samples_per_frame: u64,
    pub audio_roll_distance: i16,
    pub decoder_config: DecoderConfig,
    pub footer: Vec<u8>,
}

impl CodecConfigObu {
    /// Builds a codec config. When `override_audio_roll_distance` is true, `audio_roll_distance`
    /// is replaced by the codec-mandated value computed from `num_samples_per_frame`.
    pub fn create(
        header: ObuHeader,
        codec_config_id: u64,
        num_samples_per_frame: u64,
        mut audio_roll_distance: i16,
        decoder_config: DecoderConfig,
        override_audio_roll_distance: bool,
    ) -> Result<Self> {
        if header.obu_type != ObuType::CodecConfig {
            return invalid_argument("header.obu_type must be CodecConfig");
        }
        if num_samples_per_frame == 0 || num_samples_per_frame > MAX_PRACTICAL_FRAME_SIZE {
            return invalid_argument(format!(
                "num_samples_per_frame {num_samples_per_frame} must be in 1..={MAX_PRACTICAL_FRAME_SIZE}"
            ));
        }

        if override_audio_roll_distance {
            audio_roll_distance =
                decoder_config.recommended_audio_roll_distance(num_samples_per_frame as u32)?;
        }

        Ok(CodecConfigObu {
            header,
            codec_config_id,
            num_samples_per_frame,
            audio_roll_distance,
            decoder_config,
            footer: Vec::new(),
        })
    }

    /// A no-op for every codec but Opus, where it updates the decoder config's `pre_skip`.
    pub fn set_codec_delay(&mut self, pre_skip: u16) {
        if let DecoderConfig::Opus(opus) = &mut self.decoder_config {
            opus.set_codec_delay(pre_skip);
        }
    }

    pub fn output_sample_rate(&self) -> u32 {
        match &self.decoder_config {
            DecoderConfig::Opus(_) => 48000,
            DecoderConfig::Lpcm(c) => c.sample_rate,
            DecoderConfig::Flac(c) => c.stream_info().sample_rate,
            DecoderConfig::AacLc(_) => 48000,
        }
    }

    pub fn input_sample_rate(&self) -> u32 {
        match &self.decoder_config {
            DecoderConfig::Opus(c) => c.input_sample_rate,
            DecoderConfig::Lpcm(c) => c.sample_rate,
            DecoderConfig::Flac(c) => c.stream_info().sample_rate,
            DecoderConfig::AacLc(_) => 48000,
        }
    }

    /// The bit depth loudness measurement should treat samples decoded from this codec as.
    pub fn bit_depth_for_loudness_measurement(&self) -> u8 {
        match &self.decoder_config {
            DecoderConfig::Opus(_) => 32,
            DecoderConfig::Lpcm(c) => c.sample_size,
            DecoderConfig::Flac(c) => c.stream_info().bits_per_sample,
            DecoderConfig::AacLc(_) => 16,
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self.decoder_config, DecoderConfig::Lpcm(_) | DecoderConfig::Flac(_))
    }

    pub fn create_from_buffer(
        header: ObuHeader,
        payload_size: u64,
        reader: &mut BitReader<'_>,
    ) -> Result<Self> {
        let payload_start = reader.byte_pos();

        let (codec_config_id, _) = reader.read_uleb128()?;

        let fourcc_bytes = reader.read_uint8_span(4)?;
        let mut fourcc = [0u8; 4];
        fourcc.copy_from_slice(fourcc_bytes);
        let codec_id = CodecId::from_fourcc(fourcc)?;

        let (num_samples_per_frame, _) = reader.read_uleb128()?;
        let audio_roll_distance = reader.read_signed16()?;
        let decoder_config = DecoderConfig::read(reader, codec_id)?;

        let footer = read_footer(reader, payload_start, payload_size)?;

        let mut obu = CodecConfigObu::create(
            header,
            codec_config_id,
            num_samples_per_frame,
            audio_roll_distance,
            decoder_config,
            false,
        )?;
        obu.footer = footer;
        Ok(obu)
    }

    pub fn validate_and_write_obu(&self, policy: Uleb128Policy, out: &mut BitWriter) -> Result<()> {
        let mut payload = BitWriter::new();
        payload.write_uleb128(self.codec_config_id, policy)?;
        payload.write_uint8_span(&self.decoder_config.codec_id().to_fourcc())?;
        payload.write_uleb128(self.num_samples_per_frame, policy)?;
        payload.write_signed16(self.audio_roll_distance)?;
        self.decoder_config.write(&mut payload)?;
        payload.write_uint8_span(&self.footer)?;
        let payload_bytes = payload.into_bytes();

        self.header.validate_and_write(payload_bytes.len() as u32, policy, out)?;
        out.write_uint8_span(&payload_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder_config::lpcm::{LpcmDecoderConfig, SampleFormatFlags};
    use crate::decoder_config::opus::OpusDecoderConfig;

    fn lpcm_config() -> DecoderConfig {
        DecoderConfig::Lpcm(LpcmDecoderConfig::new(SampleFormatFlags::empty(), 16, 48000).unwrap())
    }

    #[test]
    fn roundtrip() {
        let header = ObuHeader::new(ObuType::CodecConfig);
        let obu = CodecConfigObu::create(header, 1, 960, 0, lpcm_config(), false).unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed = CodecConfigObu::create_from_buffer(parsed_header, payload_size, &mut reader).unwrap();

        assert_eq!(parsed, obu);
    }

    #[test]
    fn opus_roll_distance_override_matches_worked_example() {
        let header = ObuHeader::new(ObuType::CodecConfig);
        let opus = DecoderConfig::Opus(OpusDecoderConfig::new(1, 0).unwrap());
        let obu = CodecConfigObu::create(header, 1, 120, 0, opus, true).unwrap();
        assert_eq!(obu.audio_roll_distance, -32);
    }

    #[test]
    fn rejects_zero_frame_size() {
        let header = ObuHeader::new(ObuType::CodecConfig);
        assert!(CodecConfigObu::create(header, 1, 0, 0, lpcm_config(), false).is_err());
    }

    #[test]
    fn is_lossless_matches_codec() {
        let header = ObuHeader::new(ObuType::CodecConfig);
        let obu = CodecConfigObu::create(header, 1, 960, 0, lpcm_config(), false).unwrap();
        assert!(obu.is_lossless());
    }
}
