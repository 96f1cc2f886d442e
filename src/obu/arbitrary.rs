// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Arbitrary OBU: an opaque payload an [`crate::sequencer::ObuSequencer`] inserts at a named
//! hook point in a sequence, used for padding, test fixtures, and deliberately malformed
//! bitstreams exercised by a decoder's error paths.

use crate::errors::{invalid_argument, Result};
use crate::io::uleb128::Uleb128Policy;
use crate::io::{BitReader, BitWriter};
use crate::obu::read_footer;
use crate::obu_header::ObuHeader;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InsertionHook {
    BeforeDescriptors,
    AfterDescriptors,
    AfterIaSequenceHeader,
    AfterCodecConfigs,
    AfterAudioElements,
    AfterMixPresentations,
    BeforeParameterBlocksAtTick,
    AfterParameterBlocksAtTick,
    AfterAudioFramesAtTick,
}

impl InsertionHook {
    pub fn from_uleb(raw: u64) -> Result<InsertionHook> {
        Ok(match raw {
            0 => InsertionHook::BeforeDescriptors,
            1 => InsertionHook::AfterDescriptors,
            2 => InsertionHook::AfterIaSequenceHeader,
            3 => InsertionHook::AfterCodecConfigs,
            4 => InsertionHook::AfterAudioElements,
            5 => InsertionHook::AfterMixPresentations,
            6 => InsertionHook::BeforeParameterBlocksAtTick,
            7 => InsertionHook::AfterParameterBlocksAtTick,
            8 => InsertionHook::AfterAudioFramesAtTick,
            other => return invalid_argument(format!("{other} is not a recognized insertion hook")),
        })
    }

    pub fn to_uleb(self) -> u64 {
        match self {
            InsertionHook::BeforeDescriptors => 0,
            InsertionHook::AfterDescriptors => 1,
            InsertionHook::AfterIaSequenceHeader => 2,
            InsertionHook::AfterCodecConfigs => 3,
            InsertionHook::AfterAudioElements => 4,
            InsertionHook::AfterMixPresentations => 5,
            InsertionHook::BeforeParameterBlocksAtTick => 6,
            InsertionHook::AfterParameterBlocksAtTick => 7,
            InsertionHook::AfterAudioFramesAtTick => 8,
        }
    }

    /// `true` for hooks anchored to a temporal unit rather than a point in the descriptor
    /// sequence.
    pub fn requires_tick(self) -> bool {
        matches!(
            self,
            InsertionHook::BeforeParameterBlocksAtTick
                | InsertionHook::AfterParameterBlocksAtTick
                | InsertionHook::AfterAudioFramesAtTick
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArbitraryObu {
    pub header: ObuHeader,
    pub hook: InsertionHook,
    pub insertion_tick: Option<u64>,
    /// When set, [`Self::validate_and_write_obu`] refuses to serialize this OBU; only
    /// [`Self::validate_and_write_obu_allow_invalid`] will, for generating deliberately
    /// malformed bitstreams to exercise a decoder's error paths.
    pub intentionally_invalid: bool,
    pub payload: Vec<u8>,
}

impl ArbitraryObu {
    pub fn create(
        header: ObuHeader,
        hook: InsertionHook,
        insertion_tick: Option<u64>,
        intentionally_invalid: bool,
        payload: Vec<u8>,
    ) -> Result<Self> {
        if hook.requires_tick() != insertion_tick.is_some() {
            return invalid_argument("insertion_tick must be present iff the hook is tick-anchored");
        }
        Ok(ArbitraryObu { header, hook, insertion_tick, intentionally_invalid, payload })
    }

    pub fn create_from_buffer(
        header: ObuHeader,
        payload_size: u64,
        reader: &mut BitReader<'_>,
    ) -> Result<Self> {
        let payload_start = reader.byte_pos();

        let (hook_raw, _) = reader.read_uleb128()?;
        let hook = InsertionHook::from_uleb(hook_raw)?;
        let insertion_tick = if hook.requires_tick() {
            let (tick, _) = reader.read_uleb128()?;
            Some(tick)
        } else {
            None
        };
        let intentionally_invalid = reader.read_unsigned_literal(8)? != 0;
        let payload = read_footer(reader, payload_start, payload_size)?;

        ArbitraryObu::create(header, hook, insertion_tick, intentionally_invalid, payload)
    }

    /// Serializes this OBU, refusing when [`Self::intentionally_invalid`] is set.
    pub fn validate_and_write_obu(&self, policy: Uleb128Policy, out: &mut BitWriter) -> Result<()> {
        if self.intentionally_invalid {
            return invalid_argument(
                "refusing to serialize an arbitrary OBU marked intentionally_invalid; use validate_and_write_obu_allow_invalid",
            );
        }
        self.write_unchecked(policy, out)
    }

    /// Serializes this OBU unconditionally, including when marked `intentionally_invalid`. Meant
    /// for generating malformed test bitstreams only.
    pub fn validate_and_write_obu_allow_invalid(
        &self,
        policy: Uleb128Policy,
        out: &mut BitWriter,
    ) -> Result<()> {
        self.write_unchecked(policy, out)
    }

    fn write_unchecked(&self, policy: Uleb128Policy, out: &mut BitWriter) -> Result<()> {
        let mut payload = BitWriter::new();
        payload.write_uleb128(self.hook.to_uleb(), policy)?;
        if let Some(tick) = self.insertion_tick {
            payload.write_uleb128(tick, policy)?;
        }
        payload.write_unsigned_literal(u64::from(self.intentionally_invalid), 8)?;
        payload.write_uint8_span(&self.payload)?;
        let payload_bytes = payload.into_bytes();

        self.header.validate_and_write(payload_bytes.len() as u32, policy, out)?;
        out.write_uint8_span(&payload_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obu_header::ObuType;

    fn header() -> ObuHeader {
        ObuHeader::new(ObuType::Reserved(26))
    }

    #[test]
    fn roundtrip_untethered_hook() {
        let obu =
            ArbitraryObu::create(header(), InsertionHook::AfterDescriptors, None, false, vec![1, 2, 3])
                .unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed = ArbitraryObu::create_from_buffer(parsed_header, payload_size, &mut reader).unwrap();
        assert_eq!(parsed, obu);
    }

    #[test]
    fn roundtrip_tick_anchored_hook() {
        let obu = ArbitraryObu::create(
            header(),
            InsertionHook::AfterAudioFramesAtTick,
            Some(7),
            false,
            vec![],
        )
        .unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed = ArbitraryObu::create_from_buffer(parsed_header, payload_size, &mut reader).unwrap();
        assert_eq!(parsed, obu);
    }

    #[test]
    fn rejects_missing_tick_for_tick_anchored_hook() {
        let result =
            ArbitraryObu::create(header(), InsertionHook::AfterAudioFramesAtTick, None, false, vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn refuses_to_write_when_intentionally_invalid() {
        let obu =
            ArbitraryObu::create(header(), InsertionHook::AfterDescriptors, None, true, vec![]).unwrap();
        let mut out = BitWriter::new();
        assert!(obu.validate_and_write_obu(Uleb128Policy::Minimal, &mut out).is_err());

        let mut out = BitWriter::new();
        assert!(obu.validate_and_write_obu_allow_invalid(Uleb128Policy::Minimal, &mut out).is_ok());
    }
}
