// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Parameter Block OBU: the per-tick values of one previously-declared parameter, carried as
//! a sequence of subblocks whose shape depends on the parameter's `param_definition_type`.
//!
//! Unlike the other descriptor-adjacent OBUs, parsing a parameter block requires context this
//! OBU alone does not carry: the parameter's type and, when `param_definition_mode == 0`, its
//! duration are read from the referenced [`ParamDefinition`] rather than the wire.

use crate::errors::{invalid_argument, Result};
use crate::io::uleb128::Uleb128Policy;
use crate::io::{BitReader, BitWriter};
use crate::mix_gain::AnimatedMixGain;
use crate::obu::read_footer;
use crate::obu_header::{ObuHeader, ObuType};
use crate::param_definition::{DemixingMode, DurationInfo, ParamDefinitionType};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParameterSubblock {
    MixGain(AnimatedMixGain),
    Demixing { mode: DemixingMode },
    /// `recon_gain_flags` is a per-channel bitmask; `recon_gains` carries one Q0.8 byte per set
    /// bit, in ascending bit-index order.
    ReconGain { recon_gain_flags: u64, recon_gains: Vec<u8> },
    Extension { payload: Vec<u8> },
}

impl ParameterSubblock {
    fn param_type(&self) -> ParamDefinitionType {
        match self {
            ParameterSubblock::MixGain(_) => ParamDefinitionType::MixGain,
            ParameterSubblock::Demixing { .. } => ParamDefinitionType::Demixing,
            ParameterSubblock::ReconGain { .. } => ParamDefinitionType::ReconGain,
            ParameterSubblock::Extension { .. } => ParamDefinitionType::Extension(3),
        }
    }

    fn write(&self, out: &mut BitWriter, policy: Uleb128Policy) -> Result<()> {
        match self {
            ParameterSubblock::MixGain(animated) => animated.write(out)?,
            ParameterSubblock::Demixing { mode } => {
                out.write_unsigned_literal(u64::from(mode.to_u3()), 3)?;
                out.write_unsigned_literal(0, 5)?;
            }
            ParameterSubblock::ReconGain { recon_gain_flags, recon_gains } => {
                out.write_uleb128(*recon_gain_flags, policy)?;
                if recon_gains.len() != recon_gain_flags.count_ones() as usize {
                    return invalid_argument(
                        "recon_gains length must equal the number of set bits in recon_gain_flags",
                    );
                }
                for &gain in recon_gains {
                    out.write_unsigned_literal(u64::from(gain), 8)?;
                }
            }
            ParameterSubblock::Extension { payload } => {
                out.write_uleb128(payload.len() as u64, policy)?;
                out.write_uint8_span(payload)?;
            }
        }
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>, param_type: ParamDefinitionType) -> Result<Self> {
        Ok(match param_type {
            ParamDefinitionType::MixGain => ParameterSubblock::MixGain(AnimatedMixGain::read(reader)?),
            ParamDefinitionType::Demixing => {
                let mode = DemixingMode::from_u3(reader.read_unsigned_literal(3)? as u8)?;
                reader.read_unsigned_literal(5)?;
                ParameterSubblock::Demixing { mode }
            }
            ParamDefinitionType::ReconGain => {
                let (recon_gain_flags, _) = reader.read_uleb128()?;
                let mut recon_gains = Vec::with_capacity(recon_gain_flags.count_ones() as usize);
                for _ in 0..recon_gain_flags.count_ones() {
                    recon_gains.push(reader.read_unsigned_literal(8)? as u8);
                }
                ParameterSubblock::ReconGain { recon_gain_flags, recon_gains }
            }
            ParamDefinitionType::Extension(_) => {
                let (len, _) = reader.read_uleb128()?;
                let payload = reader.read_uint8_span(len as usize)?.to_vec();
                ParameterSubblock::Extension { payload }
            }
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterBlockObu {
    pub header: ObuHeader,
    pub parameter_id: u64,
    pub duration_info: DurationInfo,
    pub subblocks: Vec<ParameterSubblock>,
    pub footer: Vec<u8>,
}

impl ParameterBlockObu {
    pub fn create(
        header: ObuHeader,
        parameter_id: u64,
        duration_info: DurationInfo,
        subblocks: Vec<ParameterSubblock>,
    ) -> Result<Self> {
        if header.obu_type != ObuType::ParameterBlock {
            return invalid_argument("header.obu_type must be ParameterBlock");
        }
        if subblocks.is_empty() {
            return invalid_argument("a parameter block must carry at least one subblock");
        }
        if subblocks.len() as u64 != duration_info.num_subblocks() {
            return invalid_argument(format!(
                "{} subblocks provided, but duration_info implies {}",
                subblocks.len(),
                duration_info.num_subblocks()
            ));
        }

        let param_type = subblocks[0].param_type();
        if subblocks.iter().any(|s| s.param_type() != param_type) {
            return invalid_argument("every subblock in a parameter block must share one parameter type");
        }
        if param_type == ParamDefinitionType::Demixing && subblocks.len() != 1 {
            return invalid_argument("demixing parameter blocks must carry exactly one subblock");
        }

        Ok(ParameterBlockObu { header, parameter_id, duration_info, subblocks, footer: Vec::new() })
    }

    /// Parses a parameter block. `param_type` and, when the referenced parameter definition has
    /// `param_definition_mode == 0`, `definition_duration_info` must come from the
    /// [`crate::param_definition::ParamDefinition`] this block's `parameter_id` refers to.
    pub fn create_from_buffer(
        header: ObuHeader,
        payload_size: u64,
        reader: &mut BitReader<'_>,
        param_type: ParamDefinitionType,
        definition_duration_info: Option<&DurationInfo>,
    ) -> Result<Self> {
        let payload_start = reader.byte_pos();

        let (parameter_id, _) = reader.read_uleb128()?;

        let duration_info = match definition_duration_info {
            Some(info) => info.clone(),
            None => {
                let (duration, _) = reader.read_uleb128()?;
                let (constant_subblock_duration, _) = reader.read_uleb128()?;
                let explicit_subblock_durations = if constant_subblock_duration == 0 {
                    let (num_subblocks, _) = reader.read_uleb128()?;
                    let mut durations = Vec::with_capacity(num_subblocks as usize);
                    for _ in 0..num_subblocks {
                        let (d, _) = reader.read_uleb128()?;
                        durations.push(d);
                    }
                    durations
                } else {
                    Vec::new()
                };
                DurationInfo::new(duration, constant_subblock_duration, explicit_subblock_durations)?
            }
        };

        let num_subblocks = duration_info.num_subblocks();
        let mut subblocks = Vec::with_capacity(num_subblocks as usize);
        for _ in 0..num_subblocks {
            subblocks.push(ParameterSubblock::read(reader, param_type)?);
        }

        let footer = read_footer(reader, payload_start, payload_size)?;

        let mut obu = ParameterBlockObu::create(header, parameter_id, duration_info, subblocks)?;
        obu.footer = footer;
        Ok(obu)
    }

    pub fn validate_and_write_obu(
        &self,
        policy: Uleb128Policy,
        param_definition_mode: bool,
        out: &mut BitWriter,
    ) -> Result<()> {
        let mut payload = BitWriter::new();
        payload.write_uleb128(self.parameter_id, policy)?;

        if param_definition_mode {
            payload.write_uleb128(self.duration_info.duration, policy)?;
            payload.write_uleb128(self.duration_info.constant_subblock_duration, policy)?;
            if self.duration_info.constant_subblock_duration == 0 {
                payload.write_uleb128(
                    self.duration_info.explicit_subblock_durations.len() as u64,
                    policy,
                )?;
                for d in &self.duration_info.explicit_subblock_durations {
                    payload.write_uleb128(*d, policy)?;
                }
            }
        }

        for subblock in &self.subblocks {
            subblock.write(&mut payload, policy)?;
        }

        payload.write_uint8_span(&self.footer)?;
        let payload_bytes = payload.into_bytes();

        self.header.validate_and_write(payload_bytes.len() as u32, policy, out)?;
        out.write_uint8_span(&payload_bytes)
    }

    /// The animated gain resolved at `elapsed` samples into subblock `subblock_index`, for
    /// MixGain parameter blocks.
    pub fn get_mix_gain(&self, subblock_index: u64, elapsed: u64) -> Result<i16> {
        let subblock = self.subblocks.get(subblock_index as usize).ok_or_else(|| {
            crate::errors::IamfError::InvalidArgument(format!("subblock index {subblock_index} out of range"))
        })?;
        let ParameterSubblock::MixGain(animated) = subblock else {
            return invalid_argument("get_mix_gain called on a non-MixGain parameter block");
        };
        let duration = self.duration_info.subblock_duration(subblock_index)?;
        animated.get_mix_gain(elapsed, duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::q7_8;

    fn header() -> ObuHeader {
        ObuHeader::new(ObuType::ParameterBlock)
    }

    #[test]
    fn roundtrip_with_inline_duration() {
        let duration_info = DurationInfo::new(10, 5, vec![]).unwrap();
        let subblocks = vec![
            ParameterSubblock::MixGain(AnimatedMixGain::Step { start_point_value: q7_8::from_f64(-3.0) }),
            ParameterSubblock::MixGain(AnimatedMixGain::Step { start_point_value: q7_8::from_f64(0.0) }),
        ];
        let obu = ParameterBlockObu::create(header(), 1, duration_info, subblocks).unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, true, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed = ParameterBlockObu::create_from_buffer(
            parsed_header,
            payload_size,
            &mut reader,
            ParamDefinitionType::MixGain,
            None,
        )
        .unwrap();
        assert_eq!(parsed, obu);
    }

    #[test]
    fn roundtrip_with_definition_supplied_duration() {
        let duration_info = DurationInfo::new(10, 10, vec![]).unwrap();
        let subblocks = vec![ParameterSubblock::ReconGain {
            recon_gain_flags: 0b101,
            recon_gains: vec![200, 210],
        }];
        let obu = ParameterBlockObu::create(header(), 2, duration_info.clone(), subblocks).unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, false, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed = ParameterBlockObu::create_from_buffer(
            parsed_header,
            payload_size,
            &mut reader,
            ParamDefinitionType::ReconGain,
            Some(&duration_info),
        )
        .unwrap();
        assert_eq!(parsed, obu);
    }

    #[test]
    fn rejects_demixing_with_multiple_subblocks() {
        let duration_info = DurationInfo::new(10, 5, vec![]).unwrap();
        let subblocks = vec![
            ParameterSubblock::Demixing { mode: DemixingMode::Mode1 },
            ParameterSubblock::Demixing { mode: DemixingMode::Mode1 },
        ];
        assert!(ParameterBlockObu::create(header(), 1, duration_info, subblocks).is_err());
    }

    #[test]
    fn rejects_subblock_count_mismatch() {
        let duration_info = DurationInfo::new(10, 5, vec![]).unwrap();
        let subblocks = vec![ParameterSubblock::MixGain(AnimatedMixGain::Step { start_point_value: 0 })];
        assert!(ParameterBlockObu::create(header(), 1, duration_info, subblocks).is_err());
    }

    #[test]
    fn get_mix_gain_resolves_through_subblock_duration() {
        let duration_info = DurationInfo::new(10, 10, vec![]).unwrap();
        let subblocks = vec![ParameterSubblock::MixGain(AnimatedMixGain::Linear {
            start_point_value: q7_8::from_f64(-6.0),
            end_point_value: q7_8::from_f64(2.0),
        })];
        let obu = ParameterBlockObu::create(header(), 1, duration_info, subblocks).unwrap();
        assert_eq!(obu.get_mix_gain(0, 5).unwrap(), q7_8::from_f64(-2.0));
    }
}
