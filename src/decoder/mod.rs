// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A streaming IAMF decoder: feed it bytes as they arrive, and it hands back complete temporal
//! units once enough of the stream has been buffered to parse them.
//!
//! The decoder moves through three states: it starts `AwaitingDescriptors`, collecting the IA
//! Sequence Header, Codec Config, Audio Element and Mix Presentation OBUs that configure the
//! sequence; once at least one of each of the first three has arrived it becomes
//! `DescriptorProcessingComplete`; from there, the first Temporal Delimiter moves it into
//! `DecodingTemporalUnits`, where Parameter Block and Audio Frame OBUs are grouped into
//! [`TemporalUnit`]s delimited by subsequent Temporal Delimiters.

use std::collections::HashMap;

use log::{debug, trace};

use crate::errors::{failed_precondition, invalid_argument, Result};
use crate::io::uleb128::Uleb128Policy;
use crate::io::BitReader;
use crate::obu::audio_element::AudioElementObu;
use crate::obu::audio_frame::AudioFrameObu;
use crate::obu::codec_config::CodecConfigObu;
use crate::obu::ia_sequence_header::IaSequenceHeaderObu;
use crate::obu::mix_presentation::MixPresentationObu;
use crate::obu::parameter_block::ParameterBlockObu;
use crate::obu::temporal_delimiter::TemporalDelimiterObu;
use crate::obu_header::{ObuHeader, ObuType};
use crate::param_definition::{DurationInfo, ParamDefinitionType};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecoderState {
    AwaitingDescriptors,
    DescriptorProcessingComplete,
    DecodingTemporalUnits,
}

/// Everything a parameter block needs to parse, learned while descriptors are processed.
#[derive(Clone, Debug)]
struct ParamRegistryEntry {
    param_type: ParamDefinitionType,
    duration_info: Option<DurationInfo>,
}

/// One temporal unit's worth of parameter and audio-frame data, bounded by Temporal Delimiters.
#[derive(Clone, Debug, Default)]
pub struct TemporalUnit {
    pub parameter_blocks: Vec<ParameterBlockObu>,
    pub audio_frames: Vec<AudioFrameObu>,
}

pub struct Decoder {
    state: DecoderState,
    policy: Uleb128Policy,
    buffer: Vec<u8>,

    ia_sequence_header: Option<IaSequenceHeaderObu>,
    codec_configs: Vec<CodecConfigObu>,
    audio_elements: Vec<AudioElementObu>,
    mix_presentations: Vec<MixPresentationObu>,
    param_registry: HashMap<u64, ParamRegistryEntry>,

    current_unit: Option<TemporalUnit>,
}

impl Decoder {
    pub fn new(policy: Uleb128Policy) -> Self {
        Decoder {
            state: DecoderState::AwaitingDescriptors,
            policy,
            buffer: Vec::new(),
            ia_sequence_header: None,
            codec_configs: Vec::new(),
            audio_elements: Vec::new(),
            mix_presentations: Vec::new(),
            param_registry: HashMap::new(),
            current_unit: None,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn is_descriptor_processing_complete(&self) -> bool {
        !matches!(self.state, DecoderState::AwaitingDescriptors)
    }

    pub fn ia_sequence_header(&self) -> Option<&IaSequenceHeaderObu> {
        self.ia_sequence_header.as_ref()
    }

    pub fn codec_configs(&self) -> &[CodecConfigObu] {
        &self.codec_configs
    }

    pub fn audio_elements(&self) -> &[AudioElementObu] {
        &self.audio_elements
    }

    pub fn mix_presentations(&self) -> &[MixPresentationObu] {
        &self.mix_presentations
    }

    fn register_param_definitions(&mut self, audio_element: &AudioElementObu) {
        for param in &audio_element.parameters {
            self.param_registry.insert(
                param.param_definition.parameter_id,
                ParamRegistryEntry {
                    param_type: param.param_definition_type,
                    duration_info: param.param_definition.duration_info.clone(),
                },
            );
        }
    }

    fn register_mix_presentation_params(&mut self, mix_presentation: &MixPresentationObu) {
        for sub_mix in &mix_presentation.sub_mixes {
            for element in &sub_mix.audio_elements {
                self.param_registry.insert(
                    element.element_mix_gain.parameter_id,
                    ParamRegistryEntry {
                        param_type: ParamDefinitionType::MixGain,
                        duration_info: element.element_mix_gain.duration_info.clone(),
                    },
                );
            }
            self.param_registry.insert(
                sub_mix.output_mix_gain.parameter_id,
                ParamRegistryEntry {
                    param_type: ParamDefinitionType::MixGain,
                    duration_info: sub_mix.output_mix_gain.duration_info.clone(),
                },
            );
        }
    }

    /// Feeds `chunk` to the decoder, returning any temporal units that became fully available.
    ///
    /// Returns [`crate::errors::IamfError::NeedMoreData`] only in the sense that an incomplete
    /// trailing OBU is left untouched in the internal buffer for the next call; it is not
    /// surfaced as an error here; malformed data is.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<TemporalUnit>> {
        self.buffer.extend_from_slice(chunk);
        let mut completed_units = Vec::new();

        loop {
            let (obu_type, total_size) = match ObuHeader::peek_type_and_total_size(&self.buffer) {
                Ok(v) => v,
                Err(e) if matches!(e, crate::errors::IamfError::NeedMoreData) => break,
                Err(e) => return Err(e),
            };

            if total_size as usize > self.buffer.len() {
                break;
            }

            let obu_bytes = self.buffer[..total_size as usize].to_vec();
            if let Some(unit) = self.process_obu(obu_type, &obu_bytes)? {
                completed_units.push(unit);
            }
            self.buffer.drain(..total_size as usize);
        }

        Ok(completed_units)
    }

    fn process_obu(&mut self, obu_type: ObuType, bytes: &[u8]) -> Result<Option<TemporalUnit>> {
        trace!("decoding {obu_type:?}, {} bytes buffered", bytes.len());

        let mut reader = BitReader::new(bytes);
        let (header, payload_size) = ObuHeader::read_and_validate(&mut reader)?;

        if obu_type.is_descriptor() && matches!(self.state, DecoderState::DecodingTemporalUnits) {
            return invalid_argument("a descriptor OBU arrived after temporal units had begun");
        }

        match obu_type {
            ObuType::IaSequenceHeader => {
                self.ia_sequence_header =
                    Some(IaSequenceHeaderObu::create_from_buffer(header, payload_size, &mut reader)?);
            }
            ObuType::CodecConfig => {
                self.codec_configs
                    .push(CodecConfigObu::create_from_buffer(header, payload_size, &mut reader)?);
            }
            ObuType::AudioElement => {
                let audio_element = AudioElementObu::create_from_buffer(header, payload_size, &mut reader)?;
                self.register_param_definitions(&audio_element);
                self.audio_elements.push(audio_element);
            }
            ObuType::MixPresentation => {
                let mix_presentation =
                    MixPresentationObu::create_from_buffer(header, payload_size, &mut reader)?;
                self.register_mix_presentation_params(&mix_presentation);
                self.mix_presentations.push(mix_presentation);
            }
            ObuType::TemporalDelimiter => {
                let _ = TemporalDelimiterObu::create_from_buffer(header, payload_size, &mut reader)?;
                self.advance_past_descriptors()?;
                let finished = self.current_unit.take();
                self.current_unit = Some(TemporalUnit::default());
                self.state = DecoderState::DecodingTemporalUnits;
                return Ok(finished.filter(|u| !u.parameter_blocks.is_empty() || !u.audio_frames.is_empty()));
            }
            ObuType::ParameterBlock => {
                self.advance_past_descriptors()?;
                let (parameter_id, _) = reader.peek_uleb128()?;
                let entry = self.param_registry.get(&parameter_id).ok_or_else(|| {
                    crate::errors::IamfError::InvalidArgument(format!(
                        "parameter block references unknown parameter_id {parameter_id}"
                    ))
                })?;
                let block = ParameterBlockObu::create_from_buffer(
                    header,
                    payload_size,
                    &mut reader,
                    entry.param_type,
                    entry.duration_info.as_ref(),
                )?;
                self.current_unit.get_or_insert_with(TemporalUnit::default).parameter_blocks.push(block);
            }
            ObuType::AudioFrame | ObuType::AudioFrameId(_) => {
                self.advance_past_descriptors()?;
                let frame = AudioFrameObu::create_from_buffer(header, payload_size, &mut reader)?;
                self.current_unit.get_or_insert_with(TemporalUnit::default).audio_frames.push(frame);
            }
            ObuType::Reserved(_) => {
                // Metadata and Arbitrary OBUs are both carried as Reserved obu_types in this
                // library; callers needing them should parse obu_bytes themselves via
                // `crate::obu::metadata` / `crate::obu::arbitrary`.
            }
        }

        Ok(None)
    }

    fn advance_past_descriptors(&mut self) -> Result<()> {
        if matches!(self.state, DecoderState::AwaitingDescriptors) {
            if self.ia_sequence_header.is_none()
                || self.codec_configs.is_empty()
                || self.audio_elements.is_empty()
            {
                return failed_precondition(
                    "temporal data arrived before an IA Sequence Header, Codec Config and Audio Element were seen",
                );
            }
            debug!(
                "descriptor processing complete: {} codec config(s), {} audio element(s), {} mix presentation(s)",
                self.codec_configs.len(),
                self.audio_elements.len(),
                self.mix_presentations.len()
            );
            self.state = DecoderState::DescriptorProcessingComplete;
        }
        Ok(())
    }

    /// The next fully-buffered temporal unit still pending in the current chunk's partially
    /// accumulated state, if `decode` has not yet seen the Temporal Delimiter that closes it.
    pub fn next_temporal_unit(&mut self) -> Option<TemporalUnit> {
        self.current_unit.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder_config::lpcm::{LpcmDecoderConfig, SampleFormatFlags};
    use crate::decoder_config::DecoderConfig;
    use crate::io::BitWriter;
    use crate::obu::audio_element::{AudioElementType, ChannelAudioLayerConfig, AudioElementConfig, LoudspeakerLayout};

    fn encode_obu<F: FnOnce(Uleb128Policy, &mut BitWriter) -> Result<()>>(write: F) -> Vec<u8> {
        let mut out = BitWriter::new();
        write(Uleb128Policy::Minimal, &mut out).unwrap();
        out.into_bytes()
    }

    #[test]
    fn full_sequence_yields_one_temporal_unit_per_delimiter() {
        let mut decoder = Decoder::new(Uleb128Policy::Minimal);

        let ia_header = IaSequenceHeaderObu::create(
            ObuHeader::new(ObuType::IaSequenceHeader),
            crate::obu::ia_sequence_header::Profile::Simple,
            crate::obu::ia_sequence_header::Profile::Simple,
        )
        .unwrap();
        let mut stream = encode_obu(|p, out| ia_header.validate_and_write_obu(p, out));

        let codec_config = CodecConfigObu::create(
            ObuHeader::new(ObuType::CodecConfig),
            1,
            960,
            0,
            DecoderConfig::Lpcm(LpcmDecoderConfig::new(SampleFormatFlags::empty(), 16, 48000).unwrap()),
            false,
        )
        .unwrap();
        stream.extend(encode_obu(|p, out| codec_config.validate_and_write_obu(p, out)));

        let layer = ChannelAudioLayerConfig {
            loudspeaker_layout: LoudspeakerLayout::Standard(1),
            recon_gain_is_present_flag: false,
            substream_count: 1,
            coupled_substream_count: 0,
            output_gain: None,
            expanded_loudspeaker_layout: None,
        };
        let audio_element = AudioElementObu::create(
            ObuHeader::new(ObuType::AudioElement),
            1,
            AudioElementType::ChannelBased,
            1,
            vec![0],
            vec![],
            AudioElementConfig::ScalableChannelLayout { layers: vec![layer] },
        )
        .unwrap();
        stream.extend(encode_obu(|p, out| audio_element.validate_and_write_obu(p, out)));

        let delimiter = TemporalDelimiterObu::create(ObuHeader::new(ObuType::TemporalDelimiter)).unwrap();
        stream.extend(encode_obu(|p, out| delimiter.validate_and_write_obu(p, out)));

        let frame =
            AudioFrameObu::create(ObuHeader::new(ObuType::AudioFrameId(0)), 0, vec![1, 2, 3]).unwrap();
        stream.extend(encode_obu(|p, out| frame.validate_and_write_obu(p, out)));

        stream.extend(encode_obu(|p, out| delimiter.validate_and_write_obu(p, out)));

        let units = decoder.decode(&stream).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].audio_frames.len(), 1);
        assert_eq!(decoder.state(), DecoderState::DecodingTemporalUnits);
    }

    #[test]
    fn rejects_temporal_data_before_descriptors() {
        let mut decoder = Decoder::new(Uleb128Policy::Minimal);
        let delimiter = TemporalDelimiterObu::create(ObuHeader::new(ObuType::TemporalDelimiter)).unwrap();
        let stream = encode_obu(|p, out| delimiter.validate_and_write_obu(p, out));
        assert!(decoder.decode(&stream).is_err());
    }

    #[test]
    fn incomplete_trailing_obu_is_buffered_not_errored() {
        let mut decoder = Decoder::new(Uleb128Policy::Minimal);
        let partial = [0u8, 0x05];
        let units = decoder.decode(&partial).unwrap();
        assert!(units.is_empty());
    }
}
