// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared parameter-definition objects referenced by id from audio-element and
//! mix-presentation OBUs, and by the parameter-block OBUs that carry their per-tick values.

use crate::errors::{invalid_argument, Result};
use crate::io::uleb128::Uleb128Policy;
use crate::io::{BitReader, BitWriter};
use crate::util::ceil_div;

/// Out-of-band tag distinguishing the four parameter-definition tails. Stored by the enclosing
/// audio-element or mix-presentation entry, not on the wire inside `ParamDefinition` itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParamDefinitionType {
    MixGain,
    Demixing,
    ReconGain,
    /// Any `parameter_definition_type >= 3`, carrying an opaque payload.
    Extension(u64),
}

impl ParamDefinitionType {
    pub fn from_uleb(value: u64) -> ParamDefinitionType {
        match value {
            0 => ParamDefinitionType::MixGain,
            1 => ParamDefinitionType::Demixing,
            2 => ParamDefinitionType::ReconGain,
            other => ParamDefinitionType::Extension(other),
        }
    }

    pub fn to_uleb(self) -> u64 {
        match self {
            ParamDefinitionType::MixGain => 0,
            ParamDefinitionType::Demixing => 1,
            ParamDefinitionType::ReconGain => 2,
            ParamDefinitionType::Extension(v) => v,
        }
    }
}

/// The demixing mode discriminator carried by a demixing parameter definition's default value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DemixingMode {
    Mode1,
    Mode2,
    Mode3,
    Reserved1,
    Mode1N,
    Mode2N,
    Mode3N,
    Reserved2,
}

impl DemixingMode {
    pub fn from_u3(raw: u8) -> Result<DemixingMode> {
        match raw {
            0 => Ok(DemixingMode::Mode1),
            1 => Ok(DemixingMode::Mode2),
            2 => Ok(DemixingMode::Mode3),
            3 => Ok(DemixingMode::Reserved1),
            4 => Ok(DemixingMode::Mode1N),
            5 => Ok(DemixingMode::Mode2N),
            6 => Ok(DemixingMode::Mode3N),
            7 => Ok(DemixingMode::Reserved2),
            _ => invalid_argument(format!("demixing mode {raw} does not fit in 3 bits")),
        }
    }

    pub fn to_u3(self) -> u8 {
        match self {
            DemixingMode::Mode1 => 0,
            DemixingMode::Mode2 => 1,
            DemixingMode::Mode3 => 2,
            DemixingMode::Reserved1 => 3,
            DemixingMode::Mode1N => 4,
            DemixingMode::Mode2N => 5,
            DemixingMode::Mode3N => 6,
            DemixingMode::Reserved2 => 7,
        }
    }
}

/// The type-specific tail of a parameter definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamDefinitionTail {
    MixGain { default_mix_gain: i16 },
    Demixing { default_mode: DemixingMode },
    ReconGain,
    Extension { payload: Vec<u8> },
}

impl ParamDefinitionTail {
    pub fn param_type(&self) -> ParamDefinitionType {
        match self {
            ParamDefinitionTail::MixGain { .. } => ParamDefinitionType::MixGain,
            ParamDefinitionTail::Demixing { .. } => ParamDefinitionType::Demixing,
            ParamDefinitionTail::ReconGain => ParamDefinitionType::ReconGain,
            ParamDefinitionTail::Extension { .. } => ParamDefinitionType::Extension(3),
        }
    }
}

/// Subblock durations, present only when `param_definition_mode == 0`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DurationInfo {
    pub duration: u64,
    pub constant_subblock_duration: u64,
    /// Explicit per-subblock durations. Populated iff `constant_subblock_duration == 0`;
    /// otherwise the subblock count and per-subblock durations are computed.
    pub explicit_subblock_durations: Vec<u64>,
}

impl DurationInfo {
    pub fn new(
        duration: u64,
        constant_subblock_duration: u64,
        explicit_subblock_durations: Vec<u64>,
    ) -> Result<Self> {
        let info = DurationInfo { duration, constant_subblock_duration, explicit_subblock_durations };
        info.validate()?;
        Ok(info)
    }

    fn validate(&self) -> Result<()> {
        if self.constant_subblock_duration == 0 {
            let sum: u64 = self.explicit_subblock_durations.iter().sum();
            if sum != self.duration {
                return invalid_argument(format!(
                    "subblock durations sum to {sum}, expected {duration}",
                    duration = self.duration
                ));
            }
        } else if !self.explicit_subblock_durations.is_empty() {
            return invalid_argument(
                "explicit subblock durations must be empty when constant_subblock_duration != 0",
            );
        }
        Ok(())
    }

    pub fn num_subblocks(&self) -> u64 {
        if self.constant_subblock_duration == 0 {
            self.explicit_subblock_durations.len() as u64
        } else {
            u64::from(ceil_div(self.duration as u32, self.constant_subblock_duration as u32))
        }
    }

    pub fn subblock_duration(&self, index: u64) -> Result<u64> {
        if self.constant_subblock_duration == 0 {
            self.explicit_subblock_durations
                .get(index as usize)
                .copied()
                .ok_or_else(|| {
                    crate::errors::IamfError::InvalidArgument(format!(
                        "subblock index {index} out of range"
                    ))
                })
        } else {
            let num_subblocks = self.num_subblocks();
            if index >= num_subblocks {
                return invalid_argument(format!("subblock index {index} out of range"));
            }
            if index + 1 == num_subblocks {
                let consumed = self.constant_subblock_duration * index;
                Ok(self.duration - consumed)
            } else {
                Ok(self.constant_subblock_duration)
            }
        }
    }
}

/// A shared parameter-definition object. See module docs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamDefinition {
    pub parameter_id: u64,
    pub parameter_rate: u64,
    pub param_definition_mode: bool,
    pub duration_info: Option<DurationInfo>,
    pub tail: ParamDefinitionTail,
}

impl ParamDefinition {
    pub fn new(
        parameter_id: u64,
        parameter_rate: u64,
        duration_info: Option<DurationInfo>,
        tail: ParamDefinitionTail,
    ) -> Result<Self> {
        if parameter_rate == 0 {
            return invalid_argument("parameter_rate must be non-zero");
        }

        let param_definition_mode = duration_info.is_none();

        Ok(ParamDefinition { parameter_id, parameter_rate, param_definition_mode, duration_info, tail })
    }

    pub fn write(&self, policy: Uleb128Policy, out: &mut BitWriter) -> Result<()> {
        out.write_uleb128(self.parameter_id, policy)?;
        out.write_uleb128(self.parameter_rate, policy)?;
        out.write_unsigned_literal(u64::from(self.param_definition_mode), 1)?;
        out.write_unsigned_literal(0, 7)?;

        if let Some(info) = &self.duration_info {
            out.write_uleb128(info.duration, policy)?;
            out.write_uleb128(info.constant_subblock_duration, policy)?;

            if info.constant_subblock_duration == 0 {
                out.write_uleb128(info.explicit_subblock_durations.len() as u64, policy)?;
                for d in &info.explicit_subblock_durations {
                    out.write_uleb128(*d, policy)?;
                }
            }
        }

        match &self.tail {
            ParamDefinitionTail::MixGain { default_mix_gain } => {
                out.write_signed16(*default_mix_gain)?;
            }
            ParamDefinitionTail::Demixing { default_mode } => {
                out.write_unsigned_literal(u64::from(default_mode.to_u3()), 3)?;
                out.write_unsigned_literal(0, 5)?;
            }
            ParamDefinitionTail::ReconGain => {}
            ParamDefinitionTail::Extension { payload } => {
                out.write_uleb128(payload.len() as u64, policy)?;
                out.write_uint8_span(payload)?;
            }
        }

        Ok(())
    }

    pub fn read(reader: &mut BitReader<'_>, param_type: ParamDefinitionType) -> Result<Self> {
        let (parameter_id, _) = reader.read_uleb128()?;
        let (parameter_rate, _) = reader.read_uleb128()?;

        if parameter_rate == 0 {
            return invalid_argument("parameter_rate must be non-zero");
        }

        let param_definition_mode = reader.read_unsigned_literal(1)? != 0;
        reader.read_unsigned_literal(7)?;

        let duration_info = if !param_definition_mode {
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

            Some(DurationInfo::new(duration, constant_subblock_duration, explicit_subblock_durations)?)
        } else {
            None
        };

        let tail = match param_type {
            ParamDefinitionType::MixGain => {
                ParamDefinitionTail::MixGain { default_mix_gain: reader.read_signed16()? }
            }
            ParamDefinitionType::Demixing => {
                let mode = DemixingMode::from_u3(reader.read_unsigned_literal(3)? as u8)?;
                reader.read_unsigned_literal(5)?;
                ParamDefinitionTail::Demixing { default_mode: mode }
            }
            ParamDefinitionType::ReconGain => ParamDefinitionTail::ReconGain,
            ParamDefinitionType::Extension(_) => {
                let (len, _) = reader.read_uleb128()?;
                let payload = reader.read_uint8_span(len as usize)?.to_vec();
                ParamDefinitionTail::Extension { payload }
            }
        };

        Ok(ParamDefinition {
            parameter_id,
            parameter_rate,
            param_definition_mode,
            duration_info,
            tail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_info_rejects_mismatched_subblock_sum() {
        assert!(DurationInfo::new(10, 0, vec![3, 3, 3]).is_err());
        assert!(DurationInfo::new(10, 0, vec![3, 3, 4]).is_ok());
    }

    #[test]
    fn implicit_subblocks_last_one_shorter() {
        let info = DurationInfo::new(10, 4, vec![]).unwrap();
        assert_eq!(info.num_subblocks(), 3);
        assert_eq!(info.subblock_duration(0).unwrap(), 4);
        assert_eq!(info.subblock_duration(1).unwrap(), 4);
        assert_eq!(info.subblock_duration(2).unwrap(), 2);
    }

    #[test]
    fn roundtrip_mix_gain_definition() {
        let def = ParamDefinition::new(
            7,
            1000,
            Some(DurationInfo::new(10, 5, vec![]).unwrap()),
            ParamDefinitionTail::MixGain { default_mix_gain: -256 },
        )
        .unwrap();

        let mut out = BitWriter::new();
        def.write(Uleb128Policy::Minimal, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let parsed = ParamDefinition::read(&mut reader, ParamDefinitionType::MixGain).unwrap();
        assert_eq!(parsed, def);
    }

    #[test]
    fn zero_parameter_rate_rejected() {
        assert!(ParamDefinition::new(1, 0, None, ParamDefinitionTail::ReconGain).is_err());
    }
}
