// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Audio Frame OBU: one substream's encoded frame for one temporal unit.
//!
//! IAMF spends a ULEB128 substream id on every explicit `AudioFrame` OBU, but also reserves 18
//! `obu_type` values (`AudioFrameId(0..=17)`) that imply the substream id from the type itself,
//! saving that field for the common case of few low-numbered substreams.

use crate::errors::{invalid_argument, Result};
use crate::io::uleb128::Uleb128Policy;
use crate::io::{BitReader, BitWriter};
use crate::obu_header::{ObuHeader, ObuType};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioFrameObu {
    pub header: ObuHeader,
    pub substream_id: u64,
    pub audio_frame: Vec<u8>,
}

impl AudioFrameObu {
    pub fn create(header: ObuHeader, substream_id: u64, audio_frame: Vec<u8>) -> Result<Self> {
        if !header.obu_type.is_audio_frame() {
            return invalid_argument("header.obu_type must be AudioFrame or an implicit-id variant");
        }
        if let ObuType::AudioFrameId(implied) = header.obu_type {
            if u64::from(implied) != substream_id {
                return invalid_argument(format!(
                    "substream_id {substream_id} does not match the obu_type-implied id {implied}"
                ));
            }
        }
        Ok(AudioFrameObu { header, substream_id, audio_frame })
    }

    pub fn create_from_buffer(
        header: ObuHeader,
        payload_size: u64,
        reader: &mut BitReader<'_>,
    ) -> Result<Self> {
        let payload_start = reader.byte_pos();

        let substream_id = match header.obu_type {
            ObuType::AudioFrame => {
                let (id, _) = reader.read_uleb128()?;
                id
            }
            ObuType::AudioFrameId(implied) => u64::from(implied),
            _ => return invalid_argument("header.obu_type must be AudioFrame or an implicit-id variant"),
        };

        let consumed = (reader.byte_pos() - payload_start) as u64;
        if consumed > payload_size {
            return invalid_argument("substream id field alone exceeds the declared payload_size");
        }
        let audio_frame = reader.read_uint8_span((payload_size - consumed) as usize)?.to_vec();

        AudioFrameObu::create(header, substream_id, audio_frame)
    }

    pub fn validate_and_write_obu(&self, policy: Uleb128Policy, out: &mut BitWriter) -> Result<()> {
        let mut payload = BitWriter::new();
        if let ObuType::AudioFrame = self.header.obu_type {
            payload.write_uleb128(self.substream_id, policy)?;
        }
        payload.write_uint8_span(&self.audio_frame)?;
        let payload_bytes = payload.into_bytes();

        self.header.validate_and_write(payload_bytes.len() as u32, policy, out)?;
        out.write_uint8_span(&payload_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_explicit_substream_id() {
        let header = ObuHeader::new(ObuType::AudioFrame);
        let obu = AudioFrameObu::create(header, 42, vec![1, 2, 3, 4]).unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed = AudioFrameObu::create_from_buffer(parsed_header, payload_size, &mut reader).unwrap();
        assert_eq!(parsed, obu);
    }

    #[test]
    fn roundtrip_implicit_substream_id_omits_field() {
        let header = ObuHeader::new(ObuType::AudioFrameId(3));
        let obu = AudioFrameObu::create(header, 3, vec![9, 9, 9]).unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, &mut out).unwrap();
        let bytes = out.into_bytes();
        assert_eq!(bytes.len(), 2 + 3, "implicit-id frames must not spend a byte on substream_id");

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed = AudioFrameObu::create_from_buffer(parsed_header, payload_size, &mut reader).unwrap();
        assert_eq!(parsed, obu);
    }

    #[test]
    fn rejects_mismatched_implicit_substream_id() {
        let header = ObuHeader::new(ObuType::AudioFrameId(3));
        assert!(AudioFrameObu::create(header, 4, vec![]).is_err());
    }
}
