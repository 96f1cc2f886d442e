// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoder config for FLAC substreams: the metadata-block chain a native FLAC stream carries
//! ahead of its frames, minus the `fLaC` marker and anything beyond `STREAMINFO` that IAMF does
//! not require a decoder to see.

use crate::errors::{invalid_argument, Result};
use crate::io::{BitReader, BitWriter};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub min_block_size: u16,
    pub max_block_size: u16,
    pub min_frame_size: u32,
    pub max_frame_size: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub total_samples: u64,
    pub md5_signature: [u8; 16],
}

impl StreamInfo {
    const BLOCK_SIZE_BITS: u32 = 16;
    const FRAME_SIZE_BITS: u32 = 24;
    const SAMPLE_RATE_BITS: u32 = 20;
    const CHANNELS_BITS: u32 = 3;
    const BITS_PER_SAMPLE_BITS: u32 = 5;
    const TOTAL_SAMPLES_BITS: u32 = 36;

    /// Structural validation every StreamInfo must pass, strict or loose: values that would not
    /// round-trip through their bit-packed field widths.
    fn validate(&self) -> Result<()> {
        if !(1..=8).contains(&self.channels) {
            return invalid_argument("FLAC channels field must be in 1..=8");
        }
        if !(4..=32).contains(&self.bits_per_sample) {
            return invalid_argument("FLAC bits_per_sample must be in 4..=32");
        }
        Ok(())
    }

    /// The additional constraints IAMF imposes beyond native FLAC: frame sizes left unknown
    /// (encoded as 0, since IAMF substreams carry one frame per OBU rather than a seekable FLAC
    /// stream) and an MD5 signature IAMF does not populate.
    pub fn validate_strict(&self) -> Result<()> {
        self.validate()?;
        if self.min_frame_size != 0 {
            return invalid_argument("FLAC min_frame_size must be 0 under strict validation");
        }
        if self.max_frame_size != 0 {
            return invalid_argument("FLAC max_frame_size must be 0 under strict validation");
        }
        if self.md5_signature != [0u8; 16] {
            return invalid_argument("FLAC md5_signature must be all zeros under strict validation");
        }
        Ok(())
    }

    pub fn write(&self, out: &mut BitWriter) -> Result<()> {
        self.validate()?;
        out.write_unsigned_literal(u64::from(self.min_block_size), Self::BLOCK_SIZE_BITS)?;
        out.write_unsigned_literal(u64::from(self.max_block_size), Self::BLOCK_SIZE_BITS)?;
        out.write_unsigned_literal(u64::from(self.min_frame_size), Self::FRAME_SIZE_BITS)?;
        out.write_unsigned_literal(u64::from(self.max_frame_size), Self::FRAME_SIZE_BITS)?;
        out.write_unsigned_literal(u64::from(self.sample_rate), Self::SAMPLE_RATE_BITS)?;
        out.write_unsigned_literal(u64::from(self.channels - 1), Self::CHANNELS_BITS)?;
        out.write_unsigned_literal(u64::from(self.bits_per_sample - 1), Self::BITS_PER_SAMPLE_BITS)?;
        out.write_unsigned_literal(self.total_samples, Self::TOTAL_SAMPLES_BITS)?;
        out.write_uint8_span(&self.md5_signature)?;
        Ok(())
    }

    pub fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let min_block_size = reader.read_unsigned_literal(Self::BLOCK_SIZE_BITS)? as u16;
        let max_block_size = reader.read_unsigned_literal(Self::BLOCK_SIZE_BITS)? as u16;
        let min_frame_size = reader.read_unsigned_literal(Self::FRAME_SIZE_BITS)? as u32;
        let max_frame_size = reader.read_unsigned_literal(Self::FRAME_SIZE_BITS)? as u32;
        let sample_rate = reader.read_unsigned_literal(Self::SAMPLE_RATE_BITS)? as u32;
        let channels = reader.read_unsigned_literal(Self::CHANNELS_BITS)? as u8 + 1;
        let bits_per_sample = reader.read_unsigned_literal(Self::BITS_PER_SAMPLE_BITS)? as u8 + 1;
        let total_samples = reader.read_unsigned_literal(Self::TOTAL_SAMPLES_BITS)?;
        let md5_bytes = reader.read_uint8_span(16)?;
        let mut md5_signature = [0u8; 16];
        md5_signature.copy_from_slice(md5_bytes);

        let info = StreamInfo {
            min_block_size,
            max_block_size,
            min_frame_size,
            max_frame_size,
            sample_rate,
            channels,
            bits_per_sample,
            total_samples,
            md5_signature,
        };
        info.validate()?;
        Ok(info)
    }
}

/// A metadata block other than `STREAMINFO`, carried opaquely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpaqueMetadataBlock {
    pub block_type: u8,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataBlock {
    StreamInfo(StreamInfo),
    Opaque(OpaqueMetadataBlock),
}

const BLOCK_TYPE_STREAMINFO: u8 = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlacDecoderConfig {
    /// The full metadata-block chain. The first block must be `STREAMINFO`.
    pub metadata_blocks: Vec<MetadataBlock>,
}

impl FlacDecoderConfig {
    pub fn new(metadata_blocks: Vec<MetadataBlock>) -> Result<Self> {
        let config = FlacDecoderConfig { metadata_blocks };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        match self.metadata_blocks.first() {
            Some(MetadataBlock::StreamInfo(_)) => {}
            _ => return invalid_argument("the first FLAC metadata block must be STREAMINFO"),
        }
        Ok(())
    }

    pub fn stream_info(&self) -> &StreamInfo {
        match &self.metadata_blocks[0] {
            MetadataBlock::StreamInfo(info) => info,
            MetadataBlock::Opaque(_) => unreachable!("validated at construction"),
        }
    }

    pub fn write(&self, out: &mut BitWriter) -> Result<()> {
        self.validate()?;
        let last_index = self.metadata_blocks.len() - 1;

        for (i, block) in self.metadata_blocks.iter().enumerate() {
            let is_last = i == last_index;

            let (block_type, body) = match block {
                MetadataBlock::StreamInfo(info) => {
                    let mut body = BitWriter::new();
                    info.write(&mut body)?;
                    (BLOCK_TYPE_STREAMINFO, body.into_bytes())
                }
                MetadataBlock::Opaque(opaque) => (opaque.block_type, opaque.data.clone()),
            };

            if block_type > 0x7f {
                return invalid_argument("FLAC metadata block_type must fit in 7 bits");
            }

            out.write_unsigned_literal(u64::from(is_last), 1)?;
            out.write_unsigned_literal(u64::from(block_type), 7)?;
            out.write_unsigned_literal(body.len() as u64, 24)?;
            out.write_uint8_span(&body)?;
        }

        Ok(())
    }

    pub fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let mut metadata_blocks = Vec::new();

        loop {
            let is_last = reader.read_unsigned_literal(1)? != 0;
            let block_type = reader.read_unsigned_literal(7)? as u8;
            let length = reader.read_unsigned_literal(24)? as usize;
            let body = reader.read_uint8_span(length)?;

            let block = if block_type == BLOCK_TYPE_STREAMINFO {
                let mut body_reader = BitReader::new(body);
                MetadataBlock::StreamInfo(StreamInfo::read(&mut body_reader)?)
            } else {
                MetadataBlock::Opaque(OpaqueMetadataBlock { block_type, data: body.to_vec() })
            };

            metadata_blocks.push(block);

            if is_last {
                break;
            }
        }

        FlacDecoderConfig::new(metadata_blocks)
    }
}
