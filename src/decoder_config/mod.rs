// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-codec decoder configuration carried by a codec-config OBU.
//!
//! [`CodecId`] is the four-byte, out-of-band tag that selects which of [`DecoderConfig`]'s
//! variants follows on the wire; each variant's module owns its own field layout and
//! validation.

pub mod aac;
pub mod flac;
pub mod lpcm;
pub mod opus;

use crate::errors::{invalid_argument, Result};
use crate::io::{BitReader, BitWriter};

pub use aac::AacLcDecoderConfig;
pub use flac::FlacDecoderConfig;
pub use lpcm::LpcmDecoderConfig;
pub use opus::OpusDecoderConfig;

/// The four-character codec identifier stored at the head of a codec-config OBU.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CodecId {
    Lpcm,
    Opus,
    Flac,
    AacLc,
}

impl CodecId {
    pub fn from_fourcc(raw: [u8; 4]) -> Result<CodecId> {
        match &raw {
            b"ipcm" => Ok(CodecId::Lpcm),
            b"Opus" => Ok(CodecId::Opus),
            b"fLaC" => Ok(CodecId::Flac),
            b"mp4a" => Ok(CodecId::AacLc),
            _ => invalid_argument(format!(
                "unrecognized codec_id {:?}",
                String::from_utf8_lossy(&raw)
            )),
        }
    }

    pub fn to_fourcc(self) -> [u8; 4] {
        match self {
            CodecId::Lpcm => *b"ipcm",
            CodecId::Opus => *b"Opus",
            CodecId::Flac => *b"fLaC",
            CodecId::AacLc => *b"mp4a",
        }
    }
}

/// The decoder-config payload that follows a codec-config OBU's common fields.
#[derive(Clone, Debug, PartialEq)]
pub enum DecoderConfig {
    Lpcm(LpcmDecoderConfig),
    Opus(OpusDecoderConfig),
    Flac(FlacDecoderConfig),
    AacLc(AacLcDecoderConfig),
}

impl DecoderConfig {
    pub fn codec_id(&self) -> CodecId {
        match self {
            DecoderConfig::Lpcm(_) => CodecId::Lpcm,
            DecoderConfig::Opus(_) => CodecId::Opus,
            DecoderConfig::Flac(_) => CodecId::Flac,
            DecoderConfig::AacLc(_) => CodecId::AacLc,
        }
    }

    pub fn write(&self, out: &mut BitWriter) -> Result<()> {
        match self {
            DecoderConfig::Lpcm(c) => c.write(out),
            DecoderConfig::Opus(c) => c.write(out),
            DecoderConfig::Flac(c) => c.write(out),
            DecoderConfig::AacLc(c) => c.write(out),
        }
    }

    pub fn read(reader: &mut BitReader<'_>, codec_id: CodecId) -> Result<Self> {
        Ok(match codec_id {
            CodecId::Lpcm => DecoderConfig::Lpcm(LpcmDecoderConfig::read(reader)?),
            CodecId::Opus => DecoderConfig::Opus(OpusDecoderConfig::read(reader)?),
            CodecId::Flac => DecoderConfig::Flac(FlacDecoderConfig::read(reader)?),
            CodecId::AacLc => DecoderConfig::AacLc(AacLcDecoderConfig::read(reader)?),
        })
    }

    /// The IAMF-mandated `audio_roll_distance` for this codec's decoder config, given the
    /// codec-config OBU's `num_samples_per_frame`.
    pub fn recommended_audio_roll_distance(&self, num_samples_per_frame: u32) -> Result<i16> {
        match self {
            DecoderConfig::Opus(c) => c.recommended_audio_roll_distance(num_samples_per_frame),
            DecoderConfig::Lpcm(_) | DecoderConfig::Flac(_) => Ok(0),
            DecoderConfig::AacLc(_) => Ok(-1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_id_roundtrips_fourcc() {
        for id in [CodecId::Lpcm, CodecId::Opus, CodecId::Flac, CodecId::AacLc] {
            assert_eq!(CodecId::from_fourcc(id.to_fourcc()).unwrap(), id);
        }
    }

    #[test]
    fn unknown_fourcc_rejected() {
        assert!(CodecId::from_fourcc(*b"xxxx").is_err());
    }
}
