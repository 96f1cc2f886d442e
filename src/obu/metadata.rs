// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Metadata OBU: either an ITU-T T.35 user-data payload or a free-form set of IAMF tags.

use crate::errors::{invalid_argument, Result};
use crate::io::uleb128::Uleb128Policy;
use crate::io::{BitReader, BitWriter};
use crate::obu::read_footer;
use crate::obu_header::{ObuHeader, ObuType};

const METADATA_TYPE_ITU_T_T35: u64 = 0;
const METADATA_TYPE_IAMF_TAGS: u64 = 1;
/// Country code byte signaling a two-byte (country code + extension) T.35 provider header.
const ITU_T_T35_EXTENSION_MARKER: u8 = 0xff;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItuT35Metadata {
    pub country_code: u8,
    /// Present iff `country_code == 0xff`.
    pub country_code_extension: Option<u8>,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IamfTag {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataPayload {
    ItuT35(ItuT35Metadata),
    IamfTags(Vec<IamfTag>),
    /// Any `metadata_type >= 2`.
    Reserved { metadata_type: u64, payload: Vec<u8> },
}

impl MetadataPayload {
    fn metadata_type(&self) -> u64 {
        match self {
            MetadataPayload::ItuT35(_) => METADATA_TYPE_ITU_T_T35,
            MetadataPayload::IamfTags(_) => METADATA_TYPE_IAMF_TAGS,
            MetadataPayload::Reserved { metadata_type, .. } => *metadata_type,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataObu {
    pub header: ObuHeader,
    pub payload: MetadataPayload,
    pub footer: Vec<u8>,
}

impl MetadataObu {
    pub fn create(header: ObuHeader, payload: MetadataPayload) -> Result<Self> {
        if let MetadataPayload::IamfTags(tags) = &payload {
            if tags.len() > u8::MAX as usize {
                return invalid_argument("at most 255 IAMF tags are representable");
            }
        }
        Ok(MetadataObu { header, payload, footer: Vec::new() })
    }

    pub fn create_from_buffer(
        header: ObuHeader,
        payload_size: u64,
        reader: &mut BitReader<'_>,
    ) -> Result<Self> {
        let payload_start = reader.byte_pos();

        let (metadata_type, _) = reader.read_uleb128()?;
        let payload = match metadata_type {
            METADATA_TYPE_ITU_T_T35 => {
                let country_code = reader.read_unsigned_literal(8)? as u8;
                let country_code_extension = if country_code == ITU_T_T35_EXTENSION_MARKER {
                    Some(reader.read_unsigned_literal(8)? as u8)
                } else {
                    None
                };
                let consumed = (reader.byte_pos() - payload_start) as u64;
                if consumed > payload_size {
                    return invalid_argument("T.35 header alone exceeds the declared payload_size");
                }
                let remaining = (payload_size - consumed) as usize;
                let data = reader.read_uint8_span(remaining)?.to_vec();
                MetadataPayload::ItuT35(ItuT35Metadata {
                    country_code,
                    country_code_extension,
                    payload: data,
                })
            }
            METADATA_TYPE_IAMF_TAGS => {
                let tag_count = reader.read_unsigned_literal(8)? as usize;
                let mut tags = Vec::with_capacity(tag_count);
                for _ in 0..tag_count {
                    let name = reader.read_string()?;
                    let value = reader.read_string()?;
                    tags.push(IamfTag { name, value });
                }
                MetadataPayload::IamfTags(tags)
            }
            other => {
                let footer = read_footer(reader, payload_start, payload_size)?;
                MetadataPayload::Reserved { metadata_type: other, payload: footer }
            }
        };

        let footer = if matches!(payload, MetadataPayload::Reserved { .. }) {
            Vec::new()
        } else {
            read_footer(reader, payload_start, payload_size)?
        };

        let mut obu = MetadataObu::create(header, payload)?;
        obu.footer = footer;
        Ok(obu)
    }

    pub fn validate_and_write_obu(&self, policy: Uleb128Policy, out: &mut BitWriter) -> Result<()> {
        let mut payload = BitWriter::new();
        payload.write_uleb128(self.payload.metadata_type(), policy)?;

        match &self.payload {
            MetadataPayload::ItuT35(t35) => {
                payload.write_unsigned_literal(u64::from(t35.country_code), 8)?;
                if let Some(ext) = t35.country_code_extension {
                    payload.write_unsigned_literal(u64::from(ext), 8)?;
                }
                payload.write_uint8_span(&t35.payload)?;
            }
            MetadataPayload::IamfTags(tags) => {
                payload.write_unsigned_literal(tags.len() as u64, 8)?;
                for tag in tags {
                    payload.write_string(&tag.name)?;
                    payload.write_string(&tag.value)?;
                }
            }
            MetadataPayload::Reserved { payload: bytes, .. } => {
                payload.write_uint8_span(bytes)?;
            }
        }

        payload.write_uint8_span(&self.footer)?;
        let payload_bytes = payload.into_bytes();

        self.header.validate_and_write(payload_bytes.len() as u32, policy, out)?;
        out.write_uint8_span(&payload_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> ObuHeader {
        ObuHeader::new(ObuType::Reserved(25))
    }

    #[test]
    fn roundtrip_itu_t35_without_extension() {
        let payload = MetadataPayload::ItuT35(ItuT35Metadata {
            country_code: 0xb5,
            country_code_extension: None,
            payload: vec![1, 2, 3],
        });
        let obu = MetadataObu::create(header(), payload).unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed = MetadataObu::create_from_buffer(parsed_header, payload_size, &mut reader).unwrap();
        assert_eq!(parsed, obu);
    }

    #[test]
    fn roundtrip_itu_t35_with_extension_marker() {
        let payload = MetadataPayload::ItuT35(ItuT35Metadata {
            country_code: 0xff,
            country_code_extension: Some(0x01),
            payload: vec![9],
        });
        let obu = MetadataObu::create(header(), payload).unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed = MetadataObu::create_from_buffer(parsed_header, payload_size, &mut reader).unwrap();
        assert_eq!(parsed, obu);
    }

    #[test]
    fn roundtrip_iamf_tags() {
        let payload = MetadataPayload::IamfTags(vec![
            IamfTag { name: "title".to_string(), value: "Demo".to_string() },
            IamfTag { name: "artist".to_string(), value: "Example".to_string() },
        ]);
        let obu = MetadataObu::create(header(), payload).unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed = MetadataObu::create_from_buffer(parsed_header, payload_size, &mut reader).unwrap();
        assert_eq!(parsed, obu);
    }
}
