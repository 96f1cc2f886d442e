// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The common one-byte-flags + ULEB128-size preamble every OBU carries.

use crate::errors::{invalid_argument, need_more_data, unknown_error, IamfError, Result};
use crate::io::uleb128::Uleb128Policy;
use crate::io::{BitReader, BitWriter};

/// The entire encoded OBU, preamble included, must never exceed this many bytes.
pub const ENTIRE_OBU_SIZE_MAX_TWO_MEGABYTES: u64 = 2 * 1024 * 1024;

/// The `obu_type` field. Values are locked to the IAMF specification's numbering.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObuType {
    CodecConfig,
    AudioElement,
    MixPresentation,
    ParameterBlock,
    TemporalDelimiter,
    AudioFrame,
    /// `obu_type ∈ kAudioFrameId0..kAudioFrameId17`; the inner value is the substream index
    /// `0..=17` implied by `obu_type - kAudioFrameId0`.
    AudioFrameId(u8),
    /// `obu_type ∈ 24..=30`, reserved for future IAMF versions.
    Reserved(u8),
    IaSequenceHeader,
}

const OBU_TYPE_AUDIO_FRAME_ID0: u8 = 6;
const OBU_TYPE_AUDIO_FRAME_ID17: u8 = 23;

impl ObuType {
    pub fn from_u5(raw: u8) -> Result<ObuType> {
        match raw {
            0 => Ok(ObuType::CodecConfig),
            1 => Ok(ObuType::AudioElement),
            2 => Ok(ObuType::MixPresentation),
            3 => Ok(ObuType::ParameterBlock),
            4 => Ok(ObuType::TemporalDelimiter),
            5 => Ok(ObuType::AudioFrame),
            OBU_TYPE_AUDIO_FRAME_ID0..=OBU_TYPE_AUDIO_FRAME_ID17 => {
                Ok(ObuType::AudioFrameId(raw - OBU_TYPE_AUDIO_FRAME_ID0))
            }
            24..=30 => Ok(ObuType::Reserved(raw)),
            31 => Ok(ObuType::IaSequenceHeader),
            _ => invalid_argument(format!("obu_type {raw} does not fit in 5 bits")),
        }
    }

    pub fn to_u5(self) -> u8 {
        match self {
            ObuType::CodecConfig => 0,
            ObuType::AudioElement => 1,
            ObuType::MixPresentation => 2,
            ObuType::ParameterBlock => 3,
            ObuType::TemporalDelimiter => 4,
            ObuType::AudioFrame => 5,
            ObuType::AudioFrameId(n) => OBU_TYPE_AUDIO_FRAME_ID0 + n,
            ObuType::Reserved(raw) => raw,
            ObuType::IaSequenceHeader => 31,
        }
    }

    /// Any OBU that carries exactly one audio frame's raw payload, explicit or implicit-id.
    pub fn is_audio_frame(self) -> bool {
        matches!(self, ObuType::AudioFrame | ObuType::AudioFrameId(_))
    }

    /// Descriptor OBUs configure the IA sequence; everything else carries temporal data.
    pub fn is_descriptor(self) -> bool {
        matches!(
            self,
            ObuType::IaSequenceHeader
                | ObuType::CodecConfig
                | ObuType::AudioElement
                | ObuType::MixPresentation
        )
    }
}

/// The common preamble every OBU carries ahead of its type-specific payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObuHeader {
    pub obu_type: ObuType,
    pub obu_redundant_copy: bool,
    pub obu_trimming_status_flag: bool,
    /// `(num_samples_to_trim_at_end, num_samples_to_trim_at_start)`, present iff
    /// `obu_trimming_status_flag` is set.
    pub trim_info: Option<(u32, u32)>,
    /// Raw extension header bytes, present iff `obu_extension_flag` is set.
    pub extension_header_bytes: Option<Vec<u8>>,
}

impl ObuHeader {
    pub fn new(obu_type: ObuType) -> Self {
        ObuHeader {
            obu_type,
            obu_redundant_copy: false,
            obu_trimming_status_flag: false,
            trim_info: None,
            extension_header_bytes: None,
        }
    }

    pub fn with_redundant_copy(mut self, redundant: bool) -> Result<Self> {
        if redundant && !Self::redundant_copy_allowed(self.obu_type) {
            return invalid_argument(
                "obu_redundant_copy is only allowed for non-temporal OBUs",
            );
        }
        self.obu_redundant_copy = redundant;
        Ok(self)
    }

    pub fn with_trim_info(mut self, trim: Option<(u32, u32)>) -> Result<Self> {
        if trim.is_some() && !self.obu_type.is_audio_frame() {
            return invalid_argument(
                "obu_trimming_status_flag is only allowed for audio frame OBUs",
            );
        }
        self.obu_trimming_status_flag = trim.is_some();
        self.trim_info = trim;
        Ok(self)
    }

    pub fn with_extension_header(mut self, bytes: Option<Vec<u8>>) -> Self {
        self.extension_header_bytes = bytes;
        self
    }

    fn redundant_copy_allowed(obu_type: ObuType) -> bool {
        !matches!(
            obu_type,
            ObuType::TemporalDelimiter | ObuType::ParameterBlock | ObuType::AudioFrame
        ) && !matches!(obu_type, ObuType::AudioFrameId(_))
    }

    /// Serializes the trimming and extension fields (but not the preamble or `obu_size`) to
    /// learn their combined byte length.
    fn write_trim_and_extension(&self) -> Result<Vec<u8>> {
        let mut scratch = BitWriter::new();

        if let Some((end, start)) = self.trim_info {
            scratch.write_uleb128(u64::from(end), Uleb128Policy::Minimal)?;
            scratch.write_uleb128(u64::from(start), Uleb128Policy::Minimal)?;
        }

        if let Some(ext) = &self.extension_header_bytes {
            scratch.write_uleb128(ext.len() as u64, Uleb128Policy::Minimal)?;
            scratch.write_uint8_span(ext)?;
        }

        Ok(scratch.into_bytes())
    }

    /// Writes the preamble and `obu_size` (computed from `payload_size` plus the trimming and
    /// extension fields) followed by the trimming and extension fields themselves. The caller
    /// is responsible for appending the already-serialized `payload_size`-byte payload after
    /// this call returns.
    pub fn validate_and_write(
        &self,
        payload_size: u32,
        policy: Uleb128Policy,
        out: &mut BitWriter,
    ) -> Result<()> {
        let trim_and_ext = self.write_trim_and_extension()?;
        let t = trim_and_ext.len() as u64;

        let obu_size = t + u64::from(payload_size);

        let preamble_len = 1u64;
        let obu_size_len = crate::io::uleb128::minimal_encoded_len(obu_size).max(
            match policy {
                Uleb128Policy::FixedSize(n) => n as usize,
                Uleb128Policy::Minimal => 0,
            },
        ) as u64;

        let total = preamble_len + obu_size_len + obu_size;

        if total > ENTIRE_OBU_SIZE_MAX_TWO_MEGABYTES {
            return invalid_argument(format!(
                "obu of {total} bytes exceeds the 2 MiB limit"
            ));
        }

        out.write_unsigned_literal(u64::from(self.obu_type.to_u5()), 5)?;
        out.write_unsigned_literal(u64::from(self.obu_redundant_copy), 1)?;
        out.write_unsigned_literal(u64::from(self.obu_trimming_status_flag), 1)?;
        out.write_unsigned_literal(u64::from(self.extension_header_bytes.is_some()), 1)?;
        out.write_uleb128(obu_size, policy)?;
        out.write_uint8_span(&trim_and_ext)?;

        Ok(())
    }

    /// Reads the preamble and `obu_size`, returning the header and the size in bytes of the
    /// type-specific payload that follows.
    pub fn read_and_validate(reader: &mut BitReader<'_>) -> Result<(ObuHeader, u64)> {
        let obu_type = ObuType::from_u5(reader.read_unsigned_literal(5)? as u8)?;
        let obu_redundant_copy = reader.read_unsigned_literal(1)? != 0;
        let obu_trimming_status_flag = reader.read_unsigned_literal(1)? != 0;
        let obu_extension_flag = reader.read_unsigned_literal(1)? != 0;

        if obu_redundant_copy && !Self::redundant_copy_allowed(obu_type) {
            return invalid_argument("obu_redundant_copy set on a non-temporal OBU");
        }
        if obu_trimming_status_flag && !obu_type.is_audio_frame() {
            return invalid_argument("obu_trimming_status_flag set on a non-audio-frame OBU");
        }

        let (obu_size, _) = reader.read_uleb128()?;

        let mut t: u64 = 0;

        let trim_info = if obu_trimming_status_flag {
            let (end, end_len) = reader.read_uleb128()?;
            let (start, start_len) = reader.read_uleb128()?;
            t += (end_len + start_len) as u64;
            Some((end as u32, start as u32))
        } else {
            None
        };

        let extension_header_bytes = if obu_extension_flag {
            let (ext_size, ext_len) = reader.read_uleb128()?;
            t += ext_len as u64;
            let bytes = reader.read_uint8_span(ext_size as usize)?.to_vec();
            t += ext_size;
            Some(bytes)
        } else {
            None
        };

        if obu_size < t {
            return unknown_error(format!(
                "obu_size {obu_size} is smaller than the {t} bytes of trim/extension fields"
            ));
        }

        let payload_size = obu_size - t;

        let header = ObuHeader {
            obu_type,
            obu_redundant_copy,
            obu_trimming_status_flag,
            trim_info,
            extension_header_bytes,
        };

        Ok((header, payload_size))
    }

    /// Returns `(obu_type, total_obu_size_including_preamble)` without consuming any bytes from
    /// `buf`. Used by the streaming decoder to determine whether a whole OBU is buffered yet.
    ///
    /// Returns `NeedMoreData` (rather than an error) when `buf` does not yet contain enough
    /// bytes to learn the size.
    pub fn peek_type_and_total_size(buf: &[u8]) -> Result<(ObuType, u64)> {
        if buf.is_empty() {
            return need_more_data();
        }

        let preamble = buf[0];
        let obu_type = match ObuType::from_u5(preamble >> 3) {
            Ok(t) => t,
            Err(e) => return Err(e),
        };

        match crate::io::uleb128::decode_uleb128(&buf[1..]) {
            Ok((obu_size, obu_size_len)) => {
                let total = 1 + obu_size_len as u64 + obu_size;
                Ok((obu_type, total))
            }
            Err(IamfError::ResourceExhausted(_)) => need_more_data(),
            Err(e) => Err(e),
        }
    }
}
