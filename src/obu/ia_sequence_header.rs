// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The IA Sequence Header OBU: the first descriptor in any IA sequence, naming the magic word
//! and the profile pair the rest of the sequence is constrained to.

use crate::errors::{invalid_argument, Result};
use crate::io::uleb128::Uleb128Policy;
use crate::io::{BitReader, BitWriter};
use crate::obu::read_footer;
use crate::obu_header::{ObuHeader, ObuType};

pub const IA_CODE: u32 = 0x6961_6d66;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Profile {
    Simple,
    Base,
    BaseEnhanced,
    BaseAdvanced,
    Advanced1,
    Advanced2,
    Reserved255,
}

impl Profile {
    pub fn from_u8(raw: u8) -> Result<Profile> {
        match raw {
            0 => Ok(Profile::Simple),
            1 => Ok(Profile::Base),
            2 => Ok(Profile::BaseEnhanced),
            3 => Ok(Profile::BaseAdvanced),
            4 => Ok(Profile::Advanced1),
            5 => Ok(Profile::Advanced2),
            255 => Ok(Profile::Reserved255),
            _ => invalid_argument(format!("profile {raw} is not a recognized IAMF profile")),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Profile::Simple => 0,
            Profile::Base => 1,
            Profile::BaseEnhanced => 2,
            Profile::BaseAdvanced => 3,
            Profile::Advanced1 => 4,
            Profile::Advanced2 => 5,
            Profile::Reserved255 => 255,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IaSequenceHeaderObu {
    pub header: ObuHeader,
    pub primary_profile: Profile,
    pub additional_profile: Profile,
    pub footer: Vec<u8>,
}

impl IaSequenceHeaderObu {
    pub fn create(
        header: ObuHeader,
        primary_profile: Profile,
        additional_profile: Profile,
    ) -> Result<Self> {
        if header.obu_type != ObuType::IaSequenceHeader {
            return invalid_argument("header.obu_type must be IaSequenceHeader");
        }
        Ok(IaSequenceHeaderObu { header, primary_profile, additional_profile, footer: Vec::new() })
    }

    pub fn create_from_buffer(
        header: ObuHeader,
        payload_size: u64,
        reader: &mut BitReader<'_>,
    ) -> Result<Self> {
        let payload_start = reader.byte_pos();

        let ia_code = reader.read_unsigned_literal(32)? as u32;
        if ia_code != IA_CODE {
            return invalid_argument(format!("ia_code {ia_code:#x} does not match {IA_CODE:#x}"));
        }
        let primary_profile = Profile::from_u8(reader.read_unsigned_literal(8)? as u8)?;
        let additional_profile = Profile::from_u8(reader.read_unsigned_literal(8)? as u8)?;

        let footer = read_footer(reader, payload_start, payload_size)?;

        let mut obu = IaSequenceHeaderObu::create(header, primary_profile, additional_profile)?;
        obu.footer = footer;
        Ok(obu)
    }

    pub fn validate_and_write_obu(&self, policy: Uleb128Policy, out: &mut BitWriter) -> Result<()> {
        let mut payload = BitWriter::new();
        payload.write_unsigned_literal(u64::from(IA_CODE), 32)?;
        payload.write_unsigned_literal(u64::from(self.primary_profile.to_u8()), 8)?;
        payload.write_unsigned_literal(u64::from(self.additional_profile.to_u8()), 8)?;
        payload.write_uint8_span(&self.footer)?;
        let payload_bytes = payload.into_bytes();

        self.header.validate_and_write(payload_bytes.len() as u32, policy, out)?;
        out.write_uint8_span(&payload_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let header = ObuHeader::new(ObuType::IaSequenceHeader);
        let obu = IaSequenceHeaderObu::create(header, Profile::Simple, Profile::Base).unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed =
            IaSequenceHeaderObu::create_from_buffer(parsed_header, payload_size, &mut reader).unwrap();

        assert_eq!(parsed, obu);
    }

    #[test]
    fn rejects_wrong_ia_code() {
        let mut raw = BitWriter::new();
        raw.write_unsigned_literal(0xdead_beef, 32).unwrap();
        raw.write_unsigned_literal(0, 8).unwrap();
        raw.write_unsigned_literal(0, 8).unwrap();
        let bytes = raw.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let header = ObuHeader::new(ObuType::IaSequenceHeader);
        assert!(IaSequenceHeaderObu::create_from_buffer(header, bytes.len() as u64, &mut reader).is_err());
    }

    #[test]
    fn reserved_profile_accepted() {
        assert_eq!(Profile::from_u8(255).unwrap(), Profile::Reserved255);
        assert!(Profile::from_u8(6).is_err());
    }
}
