// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoder config for AAC-LC substreams: an ISO/IEC 14496-1 `DecoderConfigDescriptor` wrapping
//! an `AudioSpecificConfig`, exactly as a container would hand to an AAC decoder, minus the
//! `ES_Descriptor` and `SLConfigDescriptor` wrapper a full MP4 sample entry would also carry.

use crate::errors::{invalid_argument, resource_exhausted, Result};
use crate::io::{BitReader, BitWriter};

const TAG_DECODER_CONFIG_DESCRIPTOR: u8 = 0x04;
const TAG_DECODER_SPECIFIC_INFO: u8 = 0x05;
const OBJECT_TYPE_INDICATION_AAC: u8 = 0x40;
const AUDIO_OBJECT_TYPE_AAC_LC: u8 = 2;
const SAMPLING_FREQUENCY_INDEX_ESCAPE: u8 = 0xf;
/// IAMF pins AAC-LC substreams to 2-channel output.
const FIXED_CHANNEL_CONFIGURATION: u8 = 2;

/// Writes an ISO/IEC 14496-1 8.3.3 expandable-length field: each byte carries 7 bits of value,
/// most-significant byte first, with the top bit of every byte but the last set to 1.
fn write_expandable_length(out: &mut BitWriter, mut length: u32) -> Result<()> {
    let mut chunks = [0u8; 4];
    let mut n = 0;
    loop {
        chunks[n] = (length & 0x7f) as u8;
        length >>= 7;
        n += 1;
        if length == 0 || n == 4 {
            break;
        }
    }
    for i in (0..n).rev() {
        let more = i != 0;
        out.write_unsigned_literal(u64::from(more), 1)?;
        out.write_unsigned_literal(u64::from(chunks[i]), 7)?;
    }
    Ok(())
}

fn read_expandable_length(reader: &mut BitReader<'_>) -> Result<u32> {
    let mut value: u32 = 0;
    for _ in 0..4 {
        let more = reader.read_unsigned_literal(1)? != 0;
        let chunk = reader.read_unsigned_literal(7)? as u32;
        value = (value << 7) | chunk;
        if !more {
            return Ok(value);
        }
    }
    resource_exhausted("expandable length field exceeds 4 bytes")
}

/// `AudioSpecificConfig`, restricted to the AAC-LC subset IAMF requires.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// `0xf` (escape) selects [`Self::explicit_sampling_frequency`] instead of the standard
    /// 13-entry rate table.
    pub sampling_frequency_index: u8,
    /// Present iff `sampling_frequency_index == 0xf`.
    pub explicit_sampling_frequency: Option<u32>,
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    fn validate(&self) -> Result<()> {
        if self.sampling_frequency_index > SAMPLING_FREQUENCY_INDEX_ESCAPE {
            return invalid_argument("sampling_frequency_index must fit in 4 bits");
        }
        let has_explicit = self.explicit_sampling_frequency.is_some();
        let expects_explicit = self.sampling_frequency_index == SAMPLING_FREQUENCY_INDEX_ESCAPE;
        if has_explicit != expects_explicit {
            return invalid_argument(
                "explicit_sampling_frequency must be set iff sampling_frequency_index is the escape value",
            );
        }
        if self.channel_configuration != FIXED_CHANNEL_CONFIGURATION {
            return invalid_argument("channel_configuration must be 2");
        }
        Ok(())
    }

    fn write(&self, out: &mut BitWriter) -> Result<()> {
        self.validate()?;
        out.write_unsigned_literal(u64::from(AUDIO_OBJECT_TYPE_AAC_LC), 5)?;
        out.write_unsigned_literal(u64::from(self.sampling_frequency_index), 4)?;
        if let Some(rate) = self.explicit_sampling_frequency {
            out.write_unsigned_literal(u64::from(rate), 24)?;
        }
        out.write_unsigned_literal(u64::from(self.channel_configuration), 4)?;
        // GASpecificConfig: frameLengthFlag, dependsOnCoreCoder, extensionFlag.
        out.write_unsigned_literal(0, 1)?;
        out.write_unsigned_literal(0, 1)?;
        out.write_unsigned_literal(0, 1)?;
        out.byte_align();
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let audio_object_type = reader.read_unsigned_literal(5)? as u8;
        if audio_object_type != AUDIO_OBJECT_TYPE_AAC_LC {
            return invalid_argument(format!(
                "unsupported audioObjectType {audio_object_type}, only AAC-LC (2) is supported"
            ));
        }
        let sampling_frequency_index = reader.read_unsigned_literal(4)? as u8;
        let explicit_sampling_frequency = if sampling_frequency_index == SAMPLING_FREQUENCY_INDEX_ESCAPE {
            Some(reader.read_unsigned_literal(24)? as u32)
        } else {
            None
        };
        let channel_configuration = reader.read_unsigned_literal(4)? as u8;
        reader.read_unsigned_literal(1)?;
        reader.read_unsigned_literal(1)?;
        reader.read_unsigned_literal(1)?;
        reader.byte_align();

        let config = AudioSpecificConfig {
            sampling_frequency_index,
            explicit_sampling_frequency,
            channel_configuration,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AacLcDecoderConfig {
    pub buffer_size_db: u32,
    pub max_bitrate: u32,
    pub avg_bitrate: u32,
    pub audio_specific_config: AudioSpecificConfig,
}

impl AacLcDecoderConfig {
    pub fn new(
        buffer_size_db: u32,
        max_bitrate: u32,
        avg_bitrate: u32,
        audio_specific_config: AudioSpecificConfig,
    ) -> Result<Self> {
        if buffer_size_db > 0x00ff_ffff {
            return invalid_argument("buffer_size_db must fit in 24 bits");
        }
        Ok(AacLcDecoderConfig { buffer_size_db, max_bitrate, avg_bitrate, audio_specific_config })
    }

    pub fn write(&self, out: &mut BitWriter) -> Result<()> {
        let mut asc = BitWriter::new();
        self.audio_specific_config.write(&mut asc)?;
        let asc_bytes = asc.into_bytes();

        let mut decoder_specific_info = BitWriter::new();
        decoder_specific_info.write_unsigned_literal(u64::from(TAG_DECODER_SPECIFIC_INFO), 8)?;
        write_expandable_length(&mut decoder_specific_info, asc_bytes.len() as u32)?;
        decoder_specific_info.write_uint8_span(&asc_bytes)?;
        let decoder_specific_info_bytes = decoder_specific_info.into_bytes();

        // objectTypeIndication + streamType/upStream/reserved + bufferSizeDB + two bitrates.
        let inner_len = 1 + 4 + 4 + 4 + decoder_specific_info_bytes.len() as u32;

        out.write_unsigned_literal(u64::from(TAG_DECODER_CONFIG_DESCRIPTOR), 8)?;
        write_expandable_length(out, inner_len)?;
        out.write_unsigned_literal(u64::from(OBJECT_TYPE_INDICATION_AAC), 8)?;
        // streamType = 0x05 (AudioStream), upStream = 0, reserved = 1.
        out.write_unsigned_literal(0x05, 6)?;
        out.write_unsigned_literal(0, 1)?;
        out.write_unsigned_literal(1, 1)?;
        out.write_unsigned_literal(u64::from(self.buffer_size_db), 24)?;
        out.write_unsigned_literal(u64::from(self.max_bitrate), 32)?;
        out.write_unsigned_literal(u64::from(self.avg_bitrate), 32)?;
        out.write_uint8_span(&decoder_specific_info_bytes)?;

        Ok(())
    }

    pub fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let tag = reader.read_unsigned_literal(8)? as u8;
        if tag != TAG_DECODER_CONFIG_DESCRIPTOR {
            return invalid_argument(format!("expected DecoderConfigDescriptor tag, got {tag:#x}"));
        }
        let _inner_len = read_expandable_length(reader)?;

        let object_type_indication = reader.read_unsigned_literal(8)? as u8;
        if object_type_indication != OBJECT_TYPE_INDICATION_AAC {
            return invalid_argument(format!(
                "unsupported objectTypeIndication {object_type_indication:#x}"
            ));
        }
        reader.read_unsigned_literal(6)?; // streamType
        reader.read_unsigned_literal(1)?; // upStream
        reader.read_unsigned_literal(1)?; // reserved
        let buffer_size_db = reader.read_unsigned_literal(24)? as u32;
        let max_bitrate = reader.read_unsigned_literal(32)? as u32;
        let avg_bitrate = reader.read_unsigned_literal(32)? as u32;

        let info_tag = reader.read_unsigned_literal(8)? as u8;
        if info_tag != TAG_DECODER_SPECIFIC_INFO {
            return invalid_argument(format!("expected DecoderSpecificInfo tag, got {info_tag:#x}"));
        }
        let _info_len = read_expandable_length(reader)?;
        let audio_specific_config = AudioSpecificConfig::read(reader)?;

        AacLcDecoderConfig::new(buffer_size_db, max_bitrate, avg_bitrate, audio_specific_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_explicit_frequency_flag() {
        let asc = AudioSpecificConfig {
            sampling_frequency_index: 3,
            explicit_sampling_frequency: Some(44100),
            channel_configuration: 2,
        };
        assert!(asc.validate().is_err());
    }

    #[test]
    fn roundtrip() {
        let asc = AudioSpecificConfig {
            sampling_frequency_index: 3,
            explicit_sampling_frequency: None,
            channel_configuration: 2,
        };
        let config = AacLcDecoderConfig::new(6144, 128_000, 128_000, asc).unwrap();

        let mut out = BitWriter::new();
        config.write(&mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        assert_eq!(AacLcDecoderConfig::read(&mut reader).unwrap(), config);
    }

    #[test]
    fn roundtrip_with_escape_sampling_frequency() {
        let asc = AudioSpecificConfig {
            sampling_frequency_index: 0xf,
            explicit_sampling_frequency: Some(64000),
            channel_configuration: 2,
        };
        let config = AacLcDecoderConfig::new(6144, 128_000, 128_000, asc).unwrap();

        let mut out = BitWriter::new();
        config.write(&mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        assert_eq!(AacLcDecoderConfig::read(&mut reader).unwrap(), config);
    }

    #[test]
    fn expandable_length_roundtrips_multibyte_values() {
        for len in [0u32, 1, 127, 128, 16383, 16384, 2_097_151] {
            let mut out = BitWriter::new();
            write_expandable_length(&mut out, len).unwrap();
            let bytes = out.into_bytes();
            let mut reader = BitReader::new(&bytes);
            assert_eq!(read_expandable_length(&mut reader).unwrap(), len);
        }
    }
}
