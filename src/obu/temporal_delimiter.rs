// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Temporal Delimiter OBU: an empty-payload marker separating one temporal unit from the
//! next.

use crate::errors::{invalid_argument, Result};
use crate::io::uleb128::Uleb128Policy;
use crate::io::{BitReader, BitWriter};
use crate::obu_header::{ObuHeader, ObuType};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemporalDelimiterObu {
    pub header: ObuHeader,
}

impl TemporalDelimiterObu {
    pub fn create(header: ObuHeader) -> Result<Self> {
        if header.obu_type != ObuType::TemporalDelimiter {
            return invalid_argument("header.obu_type must be TemporalDelimiter");
        }
        Ok(TemporalDelimiterObu { header })
    }

    pub fn create_from_buffer(
        header: ObuHeader,
        payload_size: u64,
        _reader: &mut BitReader<'_>,
    ) -> Result<Self> {
        if payload_size != 0 {
            return invalid_argument("temporal delimiter payload must be empty");
        }
        TemporalDelimiterObu::create(header)
    }

    pub fn validate_and_write_obu(&self, policy: Uleb128Policy, out: &mut BitWriter) -> Result<()> {
        self.header.validate_and_write(0, policy, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let header = ObuHeader::new(ObuType::TemporalDelimiter);
        let obu = TemporalDelimiterObu::create(header).unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed = TemporalDelimiterObu::create_from_buffer(parsed_header, payload_size, &mut reader).unwrap();
        assert_eq!(parsed, obu);
    }

    #[test]
    fn rejects_non_empty_payload() {
        let header = ObuHeader::new(ObuType::TemporalDelimiter);
        let bytes = [0u8, 1, 2];
        let mut reader = BitReader::new(&bytes);
        assert!(TemporalDelimiterObu::create_from_buffer(header, 3, &mut reader).is_err());
    }
}
