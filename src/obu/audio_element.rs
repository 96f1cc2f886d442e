// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Audio Element OBU: the substreams and rendering config (channel-based, ambisonics, or
//! opaque extension) that make up one renderable element of a mix.

use crate::errors::{invalid_argument, Result};
use crate::io::uleb128::Uleb128Policy;
use crate::io::{BitReader, BitWriter};
use crate::obu::read_footer;
use crate::obu_header::{ObuHeader, ObuType};
use crate::param_definition::{ParamDefinition, ParamDefinitionType};
use crate::util::{ceil_div, is_valid_ambisonics_channel_count, require_unique};

/// Reserved sentinel loudspeaker layout denoting binaural rendering.
pub const LOUDSPEAKER_LAYOUT_BINAURAL: u8 = 9;
/// Sentinel `loudspeaker_layout` selecting [`LoudspeakerLayout::Expanded`].
const LOUDSPEAKER_LAYOUT_EXPANDED: u8 = 15;
/// Sentinel channel-mapping entry meaning "this ambisonics channel carries no substream".
pub const AMBISONICS_CHANNEL_DROPPED: u8 = 255;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AudioElementType {
    ChannelBased,
    SceneBased,
    /// `audio_element_type >= 2`.
    Extension(u8),
}

impl AudioElementType {
    pub fn from_u3(raw: u8) -> Result<AudioElementType> {
        match raw {
            0 => Ok(AudioElementType::ChannelBased),
            1 => Ok(AudioElementType::SceneBased),
            2..=7 => Ok(AudioElementType::Extension(raw)),
            _ => invalid_argument(format!("audio_element_type {raw} does not fit in 3 bits")),
        }
    }

    pub fn to_u3(self) -> u8 {
        match self {
            AudioElementType::ChannelBased => 0,
            AudioElementType::SceneBased => 1,
            AudioElementType::Extension(raw) => raw,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoudspeakerLayout {
    /// `0..=14`, including the reserved binaural value [`LOUDSPEAKER_LAYOUT_BINAURAL`].
    Standard(u8),
    Expanded,
}

impl LoudspeakerLayout {
    pub fn from_u4(raw: u8) -> Result<Self> {
        match raw {
            0..=14 => Ok(LoudspeakerLayout::Standard(raw)),
            LOUDSPEAKER_LAYOUT_EXPANDED => Ok(LoudspeakerLayout::Expanded),
            _ => invalid_argument(format!("loudspeaker_layout {raw} does not fit in 4 bits")),
        }
    }

    pub fn to_u4(self) -> u8 {
        match self {
            LoudspeakerLayout::Standard(raw) => raw,
            LoudspeakerLayout::Expanded => LOUDSPEAKER_LAYOUT_EXPANDED,
        }
    }

    pub fn is_binaural(self) -> bool {
        matches!(self, LoudspeakerLayout::Standard(LOUDSPEAKER_LAYOUT_BINAURAL))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelAudioLayerConfig {
    pub loudspeaker_layout: LoudspeakerLayout,
    pub recon_gain_is_present_flag: bool,
    pub substream_count: u8,
    pub coupled_substream_count: u8,
    /// `(flags, output_gain)`; present iff `output_gain_is_present_flag` was set on the wire.
    pub output_gain: Option<(u8, i16)>,
    /// Present iff `loudspeaker_layout == Expanded`.
    pub expanded_loudspeaker_layout: Option<u8>,
}

impl ChannelAudioLayerConfig {
    fn write(&self, out: &mut BitWriter) -> Result<()> {
        out.write_unsigned_literal(u64::from(self.loudspeaker_layout.to_u4()), 4)?;
        out.write_unsigned_literal(u64::from(self.output_gain.is_some()), 1)?;
        out.write_unsigned_literal(u64::from(self.recon_gain_is_present_flag), 1)?;
        out.write_unsigned_literal(0, 2)?;
        out.write_unsigned_literal(u64::from(self.substream_count), 8)?;
        out.write_unsigned_literal(u64::from(self.coupled_substream_count), 8)?;

        if let Some((flags, gain)) = self.output_gain {
            out.write_unsigned_literal(u64::from(flags), 6)?;
            out.write_unsigned_literal(0, 2)?;
            out.write_signed16(gain)?;
        }

        if let LoudspeakerLayout::Expanded = self.loudspeaker_layout {
            let expanded = self.expanded_loudspeaker_layout.ok_or_else(|| {
                crate::errors::IamfError::InvalidArgument(
                    "expanded_loudspeaker_layout required when loudspeaker_layout is Expanded".into(),
                )
            })?;
            out.write_unsigned_literal(u64::from(expanded), 8)?;
        }

        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let loudspeaker_layout = LoudspeakerLayout::from_u4(reader.read_unsigned_literal(4)? as u8)?;
        let output_gain_is_present_flag = reader.read_unsigned_literal(1)? != 0;
        let recon_gain_is_present_flag = reader.read_unsigned_literal(1)? != 0;
        reader.read_unsigned_literal(2)?;
        let substream_count = reader.read_unsigned_literal(8)? as u8;
        let coupled_substream_count = reader.read_unsigned_literal(8)? as u8;

        let output_gain = if output_gain_is_present_flag {
            let flags = reader.read_unsigned_literal(6)? as u8;
            reader.read_unsigned_literal(2)?;
            let gain = reader.read_signed16()?;
            Some((flags, gain))
        } else {
            None
        };

        let expanded_loudspeaker_layout = if matches!(loudspeaker_layout, LoudspeakerLayout::Expanded) {
            Some(reader.read_unsigned_literal(8)? as u8)
        } else {
            None
        };

        Ok(ChannelAudioLayerConfig {
            loudspeaker_layout,
            recon_gain_is_present_flag,
            substream_count,
            coupled_substream_count,
            output_gain,
            expanded_loudspeaker_layout,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AmbisonicsConfig {
    Mono { output_channel_count: u8, substream_count: u8, channel_mapping: Vec<u8> },
    Projection {
        output_channel_count: u8,
        substream_count: u8,
        coupled_substream_count: u8,
        demixing_matrix: Vec<i16>,
    },
}

const AMBISONICS_MODE_MONO: u64 = 0;
const AMBISONICS_MODE_PROJECTION: u64 = 1;

impl AmbisonicsConfig {
    fn validate(&self) -> Result<()> {
        match self {
            AmbisonicsConfig::Mono { output_channel_count, substream_count, channel_mapping } => {
                if !is_valid_ambisonics_channel_count(u32::from(*output_channel_count)) {
                    return invalid_argument("ambisonics output_channel_count must be (n+1)^2 for n in 0..=14");
                }
                if substream_count > output_channel_count {
                    return invalid_argument("ambisonics substream_count must be <= output_channel_count");
                }
                if channel_mapping.len() != *output_channel_count as usize {
                    return invalid_argument("channel_mapping length must equal output_channel_count");
                }
                let mut seen = vec![false; *substream_count as usize];
                for &entry in channel_mapping {
                    if entry == AMBISONICS_CHANNEL_DROPPED {
                        continue;
                    }
                    let idx = entry as usize;
                    if idx >= seen.len() || seen[idx] {
                        return invalid_argument(
                            "channel_mapping must reference every substream index exactly once",
                        );
                    }
                    seen[idx] = true;
                }
                if seen.iter().any(|&s| !s) {
                    return invalid_argument("channel_mapping leaves a substream index unreferenced");
                }
                Ok(())
            }
            AmbisonicsConfig::Projection {
                output_channel_count,
                substream_count,
                coupled_substream_count,
                demixing_matrix,
            } => {
                if !is_valid_ambisonics_channel_count(u32::from(*output_channel_count)) {
                    return invalid_argument("ambisonics output_channel_count must be (n+1)^2 for n in 0..=14");
                }
                if coupled_substream_count > substream_count {
                    return invalid_argument("coupled_substream_count must be <= substream_count");
                }
                if substream_count + coupled_substream_count > *output_channel_count {
                    return invalid_argument(
                        "substream_count + coupled_substream_count must be <= output_channel_count",
                    );
                }
                let expected =
                    (*substream_count as usize + *coupled_substream_count as usize) * *output_channel_count as usize;
                if demixing_matrix.len() != expected {
                    return invalid_argument(format!(
                        "demixing_matrix has {} elements, expected {expected}",
                        demixing_matrix.len()
                    ));
                }
                Ok(())
            }
        }
    }

    fn write(&self, out: &mut BitWriter, policy: Uleb128Policy) -> Result<()> {
        self.validate()?;
        match self {
            AmbisonicsConfig::Mono { output_channel_count, substream_count, channel_mapping } => {
                out.write_uleb128(AMBISONICS_MODE_MONO, policy)?;
                out.write_unsigned_literal(u64::from(*output_channel_count), 8)?;
                out.write_unsigned_literal(u64::from(*substream_count), 8)?;
                for &entry in channel_mapping {
                    out.write_unsigned_literal(u64::from(entry), 8)?;
                }
            }
            AmbisonicsConfig::Projection {
                output_channel_count,
                substream_count,
                coupled_substream_count,
                demixing_matrix,
            } => {
                out.write_uleb128(AMBISONICS_MODE_PROJECTION, policy)?;
                out.write_unsigned_literal(u64::from(*output_channel_count), 8)?;
                out.write_unsigned_literal(u64::from(*substream_count), 8)?;
                out.write_unsigned_literal(u64::from(*coupled_substream_count), 8)?;
                for &entry in demixing_matrix {
                    out.write_signed16(entry)?;
                }
            }
        }
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let (mode, _) = reader.read_uleb128()?;
        let config = match mode {
            AMBISONICS_MODE_MONO => {
                let output_channel_count = reader.read_unsigned_literal(8)? as u8;
                let substream_count = reader.read_unsigned_literal(8)? as u8;
                let mut channel_mapping = Vec::with_capacity(output_channel_count as usize);
                for _ in 0..output_channel_count {
                    channel_mapping.push(reader.read_unsigned_literal(8)? as u8);
                }
                AmbisonicsConfig::Mono { output_channel_count, substream_count, channel_mapping }
            }
            AMBISONICS_MODE_PROJECTION => {
                let output_channel_count = reader.read_unsigned_literal(8)? as u8;
                let substream_count = reader.read_unsigned_literal(8)? as u8;
                let coupled_substream_count = reader.read_unsigned_literal(8)? as u8;
                let num_entries =
                    (substream_count as usize + coupled_substream_count as usize) * output_channel_count as usize;
                let mut demixing_matrix = Vec::with_capacity(num_entries);
                for _ in 0..num_entries {
                    demixing_matrix.push(reader.read_signed16()?);
                }
                AmbisonicsConfig::Projection {
                    output_channel_count,
                    substream_count,
                    coupled_substream_count,
                    demixing_matrix,
                }
            }
            other => return invalid_argument(format!("unrecognized ambisonics_mode {other}")),
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AudioElementConfig {
    ScalableChannelLayout { layers: Vec<ChannelAudioLayerConfig> },
    Ambisonics(AmbisonicsConfig),
    Extension { payload: Vec<u8> },
}

impl AudioElementConfig {
    fn validate(&self, num_substreams: u64) -> Result<()> {
        if let AudioElementConfig::ScalableChannelLayout { layers } = self {
            if layers.is_empty() || layers.len() > 6 {
                return invalid_argument("scalable channel layout must have 1..=6 layers");
            }
            let total: u64 = layers.iter().map(|l| u64::from(l.substream_count)).sum();
            if total != num_substreams {
                return invalid_argument(format!(
                    "layers' cumulative substream_count {total} does not equal num_substreams {num_substreams}"
                ));
            }
            let binaural_layers =
                layers.iter().filter(|l| l.loudspeaker_layout.is_binaural()).count();
            if binaural_layers > 0 && layers.len() != 1 {
                return invalid_argument("binaural loudspeaker layout requires exactly one layer");
            }
        }
        Ok(())
    }

    fn write(&self, out: &mut BitWriter, policy: Uleb128Policy) -> Result<()> {
        match self {
            AudioElementConfig::ScalableChannelLayout { layers } => {
                out.write_unsigned_literal(layers.len() as u64, 3)?;
                out.write_unsigned_literal(0, 5)?;
                for layer in layers {
                    layer.write(out)?;
                }
            }
            AudioElementConfig::Ambisonics(config) => config.write(out, policy)?,
            AudioElementConfig::Extension { payload } => {
                out.write_uleb128(payload.len() as u64, policy)?;
                out.write_uint8_span(payload)?;
            }
        }
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>, audio_element_type: AudioElementType) -> Result<Self> {
        Ok(match audio_element_type {
            AudioElementType::ChannelBased => {
                let num_layers = reader.read_unsigned_literal(3)? as usize;
                reader.read_unsigned_literal(5)?;
                let mut layers = Vec::with_capacity(num_layers);
                for _ in 0..num_layers {
                    layers.push(ChannelAudioLayerConfig::read(reader)?);
                }
                AudioElementConfig::ScalableChannelLayout { layers }
            }
            AudioElementType::SceneBased => AudioElementConfig::Ambisonics(AmbisonicsConfig::read(reader)?),
            AudioElementType::Extension(_) => {
                let (len, _) = reader.read_uleb128()?;
                let payload = reader.read_uint8_span(len as usize)?.to_vec();
                AudioElementConfig::Extension { payload }
            }
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioElementParameter {
    pub param_definition_type: ParamDefinitionType,
    pub param_definition: ParamDefinition,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AudioElementObu {
    pub header: ObuHeader,
    pub audio_element_id: u64,
    pub audio_element_type: AudioElementType,
    pub codec_config_id: u64,
    pub substream_ids: Vec<u64>,
    pub parameters: Vec<AudioElementParameter>,
    pub config: AudioElementConfig,
    pub footer: Vec<u8>,
}

impl AudioElementObu {
    pub fn create(
        header: ObuHeader,
        audio_element_id: u64,
        audio_element_type: AudioElementType,
        codec_config_id: u64,
        substream_ids: Vec<u64>,
        parameters: Vec<AudioElementParameter>,
        config: AudioElementConfig,
    ) -> Result<Self> {
        if header.obu_type != ObuType::AudioElement {
            return invalid_argument("header.obu_type must be AudioElement");
        }

        require_unique(substream_ids.iter().copied(), "audio element substream_ids")?;

        for p in &parameters {
            if p.param_definition_type == ParamDefinitionType::MixGain {
                return invalid_argument("MixGain parameter definitions are forbidden on audio elements");
            }
        }
        require_unique(
            parameters.iter().map(|p| p.param_definition_type),
            "audio element parameter_definition_type",
        )?;

        config.validate(substream_ids.len() as u64)?;

        Ok(AudioElementObu {
            header,
            audio_element_id,
            audio_element_type,
            codec_config_id,
            substream_ids,
            parameters,
            config,
            footer: Vec::new(),
        })
    }

    pub fn create_from_buffer(
        header: ObuHeader,
        payload_size: u64,
        reader: &mut BitReader<'_>,
    ) -> Result<Self> {
        let payload_start = reader.byte_pos();

        let (audio_element_id, _) = reader.read_uleb128()?;
        let audio_element_type = AudioElementType::from_u3(reader.read_unsigned_literal(3)? as u8)?;
        reader.read_unsigned_literal(5)?;
        let (codec_config_id, _) = reader.read_uleb128()?;

        let (num_substreams, _) = reader.read_uleb128()?;
        let mut substream_ids = Vec::with_capacity(num_substreams as usize);
        for _ in 0..num_substreams {
            let (id, _) = reader.read_uleb128()?;
            substream_ids.push(id);
        }

        let (num_parameters, _) = reader.read_uleb128()?;
        let mut parameters = Vec::with_capacity(num_parameters as usize);
        for _ in 0..num_parameters {
            let (type_raw, _) = reader.read_uleb128()?;
            let param_definition_type = ParamDefinitionType::from_uleb(type_raw);
            let param_definition = ParamDefinition::read(reader, param_definition_type)?;
            parameters.push(AudioElementParameter { param_definition_type, param_definition });
        }

        let config = AudioElementConfig::read(reader, audio_element_type)?;

        let footer = read_footer(reader, payload_start, payload_size)?;

        let mut obu = AudioElementObu::create(
            header,
            audio_element_id,
            audio_element_type,
            codec_config_id,
            substream_ids,
            parameters,
            config,
        )?;
        obu.footer = footer;
        Ok(obu)
    }

    pub fn validate_and_write_obu(&self, policy: Uleb128Policy, out: &mut BitWriter) -> Result<()> {
        let mut payload = BitWriter::new();
        payload.write_uleb128(self.audio_element_id, policy)?;
        payload.write_unsigned_literal(u64::from(self.audio_element_type.to_u3()), 3)?;
        payload.write_unsigned_literal(0, 5)?;
        payload.write_uleb128(self.codec_config_id, policy)?;

        payload.write_uleb128(self.substream_ids.len() as u64, policy)?;
        for &id in &self.substream_ids {
            payload.write_uleb128(id, policy)?;
        }

        payload.write_uleb128(self.parameters.len() as u64, policy)?;
        for p in &self.parameters {
            payload.write_uleb128(p.param_definition_type.to_uleb(), policy)?;
            p.param_definition.write(policy, &mut payload)?;
        }

        self.config.write(&mut payload, policy)?;
        payload.write_uint8_span(&self.footer)?;
        let payload_bytes = payload.into_bytes();

        self.header.validate_and_write(payload_bytes.len() as u32, policy, out)?;
        out.write_uint8_span(&payload_bytes)
    }
}

/// The number of frames of implicit subblocks covering `duration`, used by layers whose
/// recon-gain cadence does not match the parameter rate 1:1. Exposed for callers resolving
/// recon-gain parameter blocks against this audio element's layers.
pub fn implicit_recon_gain_subblock_count(duration: u64, constant_subblock_duration: u64) -> u64 {
    if constant_subblock_duration == 0 {
        0
    } else {
        u64::from(ceil_div(duration as u32, constant_subblock_duration as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param_definition::ParamDefinitionTail;

    fn base_header() -> ObuHeader {
        ObuHeader::new(ObuType::AudioElement)
    }

    fn simple_layer() -> ChannelAudioLayerConfig {
        ChannelAudioLayerConfig {
            loudspeaker_layout: LoudspeakerLayout::Standard(1),
            recon_gain_is_present_flag: false,
            substream_count: 2,
            coupled_substream_count: 1,
            output_gain: None,
            expanded_loudspeaker_layout: None,
        }
    }

    #[test]
    fn channel_layout_roundtrip() {
        let config = AudioElementConfig::ScalableChannelLayout { layers: vec![simple_layer()] };
        let obu = AudioElementObu::create(
            base_header(),
            1,
            AudioElementType::ChannelBased,
            1,
            vec![0, 1],
            vec![],
            config,
        )
        .unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed = AudioElementObu::create_from_buffer(parsed_header, payload_size, &mut reader).unwrap();
        assert_eq!(parsed, obu);
    }

    #[test]
    fn rejects_substream_count_mismatch() {
        let config = AudioElementConfig::ScalableChannelLayout { layers: vec![simple_layer()] };
        let result = AudioElementObu::create(
            base_header(),
            1,
            AudioElementType::ChannelBased,
            1,
            vec![0, 1, 2],
            vec![],
            config,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_mix_gain_parameter() {
        let config = AudioElementConfig::ScalableChannelLayout { layers: vec![simple_layer()] };
        let param_definition = ParamDefinition::new(1, 1000, None, ParamDefinitionTail::ReconGain).unwrap();
        let parameters = vec![AudioElementParameter {
            param_definition_type: ParamDefinitionType::MixGain,
            param_definition,
        }];
        let result =
            AudioElementObu::create(base_header(), 1, AudioElementType::ChannelBased, 1, vec![0, 1], parameters, config);
        assert!(result.is_err());
    }

    #[test]
    fn ambisonics_mono_roundtrip() {
        let config = AudioElementConfig::Ambisonics(AmbisonicsConfig::Mono {
            output_channel_count: 4,
            substream_count: 4,
            channel_mapping: vec![0, 1, 2, 3],
        });
        let obu = AudioElementObu::create(
            base_header(),
            1,
            AudioElementType::SceneBased,
            1,
            vec![18, 19, 20, 21],
            vec![],
            config,
        )
        .unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed = AudioElementObu::create_from_buffer(parsed_header, payload_size, &mut reader).unwrap();
        assert_eq!(parsed, obu);
    }

    #[test]
    fn ambisonics_mono_rejects_duplicate_channel_mapping() {
        let config = AmbisonicsConfig::Mono {
            output_channel_count: 4,
            substream_count: 4,
            channel_mapping: vec![0, 0, 2, 3],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn ambisonics_projection_rejects_wrong_matrix_size() {
        let config = AmbisonicsConfig::Projection {
            output_channel_count: 4,
            substream_count: 2,
            coupled_substream_count: 1,
            demixing_matrix: vec![0; 5],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn binaural_requires_single_layer() {
        let binaural_layer = ChannelAudioLayerConfig {
            loudspeaker_layout: LoudspeakerLayout::Standard(LOUDSPEAKER_LAYOUT_BINAURAL),
            ..simple_layer()
        };
        let config = AudioElementConfig::ScalableChannelLayout {
            layers: vec![binaural_layer.clone(), simple_layer()],
        };
        let total_substreams: u64 = [&binaural_layer, &simple_layer()]
            .iter()
            .map(|l| u64::from(l.substream_count))
            .sum();
        let substream_ids = (0..total_substreams).collect();
        let result = AudioElementObu::create(
            base_header(),
            1,
            AudioElementType::ChannelBased,
            1,
            substream_ids,
            vec![],
            config,
        );
        assert!(result.is_err());
    }
}
