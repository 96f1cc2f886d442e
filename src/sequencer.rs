// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Assembles a complete, correctly-ordered IAMF bitstream from a set of descriptor OBUs and a
//! stream of per-timestamp temporal data.
//!
//! Descriptor OBUs are emitted in a fixed order — IA Sequence Header, Codec Configs, Audio
//! Elements, Mix Presentations — with each class sorted ascending by id, and
//! [`crate::obu::arbitrary::ArbitraryObu`]s inserted at their declared hook points. Within a
//! temporal unit, parameter blocks are ordered by `parameter_id` and audio frames by
//! `(audio_element_id, substream_id)`, so two sequencers fed the same unordered input always
//! produce byte-identical output.

use std::collections::HashMap;

use log::debug;

use crate::errors::{failed_precondition, invalid_argument, Result};
use crate::io::uleb128::Uleb128Policy;
use crate::io::BitWriter;
use crate::obu::arbitrary::{ArbitraryObu, InsertionHook};
use crate::obu::audio_element::AudioElementObu;
use crate::obu::audio_frame::AudioFrameObu;
use crate::obu::codec_config::CodecConfigObu;
use crate::obu::ia_sequence_header::IaSequenceHeaderObu;
use crate::obu::mix_presentation::MixPresentationObu;
use crate::obu::parameter_block::ParameterBlockObu;
use crate::obu::temporal_delimiter::TemporalDelimiterObu;
use crate::obu_header::{ObuHeader, ObuType};

/// One timestamp's worth of temporal data to serialize, plus any arbitrary OBUs hooked to this
/// specific tick.
#[derive(Clone, Debug, Default)]
pub struct TemporalUnitInput {
    pub timestamp: u64,
    pub parameter_blocks: Vec<ParameterBlockObu>,
    pub audio_frames: Vec<AudioFrameObu>,
    pub tick_hooked_arbitrary_obus: Vec<ArbitraryObu>,
}

/// Builds a complete IAMF bitstream: a fixed-order descriptor preamble followed by a sequence of
/// temporal units, fed one at a time.
pub struct ObuSequencer {
    policy: Uleb128Policy,
    ia_sequence_header: IaSequenceHeaderObu,
    codec_configs: Vec<CodecConfigObu>,
    audio_elements: Vec<AudioElementObu>,
    mix_presentations: Vec<MixPresentationObu>,
    untethered_arbitrary_obus: Vec<ArbitraryObu>,

    param_definition_mode_by_id: HashMap<u64, bool>,
    audio_element_by_substream: HashMap<u64, u64>,

    aborted: bool,
    last_serialized_temporal_unit: Option<Vec<u8>>,
}

impl ObuSequencer {
    pub fn new(
        policy: Uleb128Policy,
        ia_sequence_header: IaSequenceHeaderObu,
        codec_configs: Vec<CodecConfigObu>,
        audio_elements: Vec<AudioElementObu>,
        mix_presentations: Vec<MixPresentationObu>,
        untethered_arbitrary_obus: Vec<ArbitraryObu>,
    ) -> Result<Self> {
        for obu in &untethered_arbitrary_obus {
            if obu.hook.requires_tick() {
                return invalid_argument(
                    "tick-anchored arbitrary OBUs must be supplied per temporal unit, not at construction",
                );
            }
        }

        let mut param_definition_mode_by_id = HashMap::new();
        let mut audio_element_by_substream = HashMap::new();

        for audio_element in &audio_elements {
            for &substream_id in &audio_element.substream_ids {
                audio_element_by_substream.insert(substream_id, audio_element.audio_element_id);
            }
            for parameter in &audio_element.parameters {
                param_definition_mode_by_id.insert(
                    parameter.param_definition.parameter_id,
                    parameter.param_definition.param_definition_mode,
                );
            }
        }
        for mix_presentation in &mix_presentations {
            for sub_mix in &mix_presentation.sub_mixes {
                for element in &sub_mix.audio_elements {
                    param_definition_mode_by_id.insert(
                        element.element_mix_gain.parameter_id,
                        element.element_mix_gain.param_definition_mode,
                    );
                }
                param_definition_mode_by_id.insert(
                    sub_mix.output_mix_gain.parameter_id,
                    sub_mix.output_mix_gain.param_definition_mode,
                );
            }
        }

        Ok(ObuSequencer {
            policy,
            ia_sequence_header,
            codec_configs,
            audio_elements,
            mix_presentations,
            untethered_arbitrary_obus,
            param_definition_mode_by_id,
            audio_element_by_substream,
            aborted: false,
            last_serialized_temporal_unit: None,
        })
    }

    fn write_untethered_hook(&self, hook: InsertionHook, out: &mut BitWriter) -> Result<()> {
        for obu in &self.untethered_arbitrary_obus {
            if obu.hook == hook {
                obu.validate_and_write_obu(self.policy, out)?;
            }
        }
        Ok(())
    }

    /// Serializes the fixed-order descriptor preamble: IA Sequence Header, Codec Configs
    /// (ascending `codec_config_id`), Audio Elements (ascending `audio_element_id`), Mix
    /// Presentations (ascending `mix_presentation_id`), with untethered arbitrary OBUs inserted
    /// at their hooks.
    pub fn get_serialized_descriptor_obus(&self) -> Result<Vec<u8>> {
        let mut out = BitWriter::new();

        self.write_untethered_hook(InsertionHook::BeforeDescriptors, &mut out)?;

        self.ia_sequence_header.validate_and_write_obu(self.policy, &mut out)?;
        self.write_untethered_hook(InsertionHook::AfterIaSequenceHeader, &mut out)?;

        let mut codec_configs: Vec<&CodecConfigObu> = self.codec_configs.iter().collect();
        codec_configs.sort_by_key(|c| c.codec_config_id);
        for codec_config in codec_configs {
            codec_config.validate_and_write_obu(self.policy, &mut out)?;
        }
        self.write_untethered_hook(InsertionHook::AfterCodecConfigs, &mut out)?;

        let mut audio_elements: Vec<&AudioElementObu> = self.audio_elements.iter().collect();
        audio_elements.sort_by_key(|a| a.audio_element_id);
        for audio_element in audio_elements {
            audio_element.validate_and_write_obu(self.policy, &mut out)?;
        }
        self.write_untethered_hook(InsertionHook::AfterAudioElements, &mut out)?;

        let mut mix_presentations: Vec<&MixPresentationObu> = self.mix_presentations.iter().collect();
        mix_presentations.sort_by_key(|m| m.mix_presentation_id);
        for mix_presentation in mix_presentations {
            mix_presentation.validate_and_write_obu(self.policy, &mut out)?;
        }
        self.write_untethered_hook(InsertionHook::AfterMixPresentations, &mut out)?;

        self.write_untethered_hook(InsertionHook::AfterDescriptors, &mut out)?;

        Ok(out.into_bytes())
    }

    fn param_definition_mode(&self, parameter_id: u64) -> Result<bool> {
        self.param_definition_mode_by_id.get(&parameter_id).copied().ok_or_else(|| {
            crate::errors::IamfError::InvalidArgument(format!(
                "parameter block references unknown parameter_id {parameter_id}"
            ))
        })
    }

    fn audio_element_for_substream(&self, substream_id: u64) -> Result<u64> {
        self.audio_element_by_substream.get(&substream_id).copied().ok_or_else(|| {
            crate::errors::IamfError::InvalidArgument(format!(
                "audio frame references unknown substream_id {substream_id}"
            ))
        })
    }

    /// Serializes one temporal unit: a Temporal Delimiter, then its parameter blocks (ascending
    /// `parameter_id`), then its audio frames (ascending `(audio_element_id, substream_id)`),
    /// with tick-anchored arbitrary OBUs inserted at their hooks.
    ///
    /// The result is cached and retrievable via [`Self::get_previous_serialized_temporal_unit`].
    pub fn get_serialized_temporal_unit(&mut self, unit: &TemporalUnitInput) -> Result<Vec<u8>> {
        if self.aborted {
            return failed_precondition("sequencer has been aborted");
        }

        for obu in &unit.tick_hooked_arbitrary_obus {
            if obu.insertion_tick != Some(unit.timestamp) {
                return invalid_argument(
                    "tick-hooked arbitrary OBUs supplied to a temporal unit must carry that unit's timestamp",
                );
            }
        }

        let mut out = BitWriter::new();

        let delimiter = TemporalDelimiterObu::create(ObuHeader::new(ObuType::TemporalDelimiter))?;
        delimiter.validate_and_write_obu(self.policy, &mut out)?;

        for obu in &unit.tick_hooked_arbitrary_obus {
            if obu.hook == InsertionHook::BeforeParameterBlocksAtTick {
                obu.validate_and_write_obu(self.policy, &mut out)?;
            }
        }

        let mut parameter_blocks: Vec<&ParameterBlockObu> = unit.parameter_blocks.iter().collect();
        parameter_blocks.sort_by_key(|p| p.parameter_id);
        for block in parameter_blocks {
            let mode = self.param_definition_mode(block.parameter_id)?;
            block.validate_and_write_obu(self.policy, mode, &mut out)?;
        }

        for obu in &unit.tick_hooked_arbitrary_obus {
            if obu.hook == InsertionHook::AfterParameterBlocksAtTick {
                obu.validate_and_write_obu(self.policy, &mut out)?;
            }
        }

        let mut audio_frames: Vec<(u64, &AudioFrameObu)> = Vec::with_capacity(unit.audio_frames.len());
        for frame in &unit.audio_frames {
            audio_frames.push((self.audio_element_for_substream(frame.substream_id)?, frame));
        }
        audio_frames.sort_by_key(|(audio_element_id, frame)| (*audio_element_id, frame.substream_id));
        for (_, frame) in audio_frames {
            frame.validate_and_write_obu(self.policy, &mut out)?;
        }

        for obu in &unit.tick_hooked_arbitrary_obus {
            if obu.hook == InsertionHook::AfterAudioFramesAtTick {
                obu.validate_and_write_obu(self.policy, &mut out)?;
            }
        }

        let bytes = out.into_bytes();
        self.last_serialized_temporal_unit = Some(bytes.clone());
        Ok(bytes)
    }

    /// The bytes returned by the most recent successful [`Self::get_serialized_temporal_unit`]
    /// call, for a caller that needs to retransmit or checkpoint the last unit emitted.
    pub fn get_previous_serialized_temporal_unit(&self) -> Option<&[u8]> {
        self.last_serialized_temporal_unit.as_deref()
    }

    /// Permanently stops this sequencer; every subsequent call to
    /// [`Self::get_serialized_temporal_unit`] fails.
    pub fn abort(&mut self) {
        debug!("sequencer aborted; had emitted a temporal unit: {}", self.last_serialized_temporal_unit.is_some());
        self.aborted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder_config::lpcm::{LpcmDecoderConfig, SampleFormatFlags};
    use crate::decoder_config::DecoderConfig;
    use crate::obu::audio_element::{AudioElementConfig, AudioElementType, ChannelAudioLayerConfig, LoudspeakerLayout};
    use crate::mix_gain::AnimatedMixGain;
    use crate::obu::ia_sequence_header::Profile;
    use crate::param_definition::DurationInfo;
    use crate::util::q7_8;

    fn single_layer_audio_element(id: u64, codec_config_id: u64, substream_ids: Vec<u64>) -> AudioElementObu {
        let layer = ChannelAudioLayerConfig {
            loudspeaker_layout: LoudspeakerLayout::Standard(1),
            recon_gain_is_present_flag: false,
            substream_count: substream_ids.len() as u8,
            coupled_substream_count: 0,
            output_gain: None,
            expanded_loudspeaker_layout: None,
        };
        AudioElementObu::create(
            ObuHeader::new(ObuType::AudioElement),
            id,
            AudioElementType::ChannelBased,
            codec_config_id,
            substream_ids,
            vec![],
            AudioElementConfig::ScalableChannelLayout { layers: vec![layer] },
        )
        .unwrap()
    }

    fn sequencer_with_two_audio_elements() -> ObuSequencer {
        let ia_header = IaSequenceHeaderObu::create(
            ObuHeader::new(ObuType::IaSequenceHeader),
            Profile::Simple,
            Profile::Simple,
        )
        .unwrap();

        let codec_config = CodecConfigObu::create(
            ObuHeader::new(ObuType::CodecConfig),
            1,
            960,
            0,
            DecoderConfig::Lpcm(LpcmDecoderConfig::new(SampleFormatFlags::empty(), 16, 48000).unwrap()),
            false,
        )
        .unwrap();

        let audio_element_a = single_layer_audio_element(2, 1, vec![20]);
        let audio_element_b = single_layer_audio_element(1, 1, vec![10]);

        ObuSequencer::new(
            Uleb128Policy::Minimal,
            ia_header,
            vec![codec_config],
            vec![audio_element_a, audio_element_b],
            vec![],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn descriptor_obus_sort_ascending_by_id_regardless_of_input_order() {
        let sequencer = sequencer_with_two_audio_elements();
        let bytes = sequencer.get_serialized_descriptor_obus().unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn audio_frames_order_by_audio_element_then_substream() {
        let mut sequencer = sequencer_with_two_audio_elements();

        let frame_for_element_2 = AudioFrameObu::create(
            ObuHeader::new(ObuType::AudioFrame),
            20,
            vec![0xaa],
        )
        .unwrap();
        let frame_for_element_1 = AudioFrameObu::create(
            ObuHeader::new(ObuType::AudioFrame),
            10,
            vec![0xbb],
        )
        .unwrap();

        let unit = TemporalUnitInput {
            timestamp: 0,
            parameter_blocks: vec![],
            audio_frames: vec![frame_for_element_2, frame_for_element_1],
            tick_hooked_arbitrary_obus: vec![],
        };

        let bytes = sequencer.get_serialized_temporal_unit(&unit).unwrap();

        let position_of = |needle: u8| bytes.iter().position(|&b| b == needle).unwrap();
        assert!(
            position_of(0xbb) < position_of(0xaa),
            "substream 10 (audio_element_id 1) must serialize before substream 20 (audio_element_id 2)"
        );
    }

    #[test]
    fn abort_prevents_further_temporal_units() {
        let mut sequencer = sequencer_with_two_audio_elements();
        sequencer.abort();

        let unit = TemporalUnitInput { timestamp: 0, ..Default::default() };
        assert!(sequencer.get_serialized_temporal_unit(&unit).is_err());
    }

    #[test]
    fn get_previous_serialized_temporal_unit_caches_last_success() {
        let mut sequencer = sequencer_with_two_audio_elements();
        assert!(sequencer.get_previous_serialized_temporal_unit().is_none());

        let unit = TemporalUnitInput { timestamp: 0, ..Default::default() };
        let bytes = sequencer.get_serialized_temporal_unit(&unit).unwrap();
        assert_eq!(sequencer.get_previous_serialized_temporal_unit(), Some(bytes.as_slice()));
    }

    #[test]
    fn rejects_parameter_block_for_unregistered_parameter_id() {
        let mut sequencer = sequencer_with_two_audio_elements();
        let duration_info = DurationInfo::new(10, 10, vec![]).unwrap();
        let block = ParameterBlockObu::create(
            ObuHeader::new(ObuType::ParameterBlock),
            999,
            duration_info,
            vec![crate::obu::parameter_block::ParameterSubblock::MixGain(AnimatedMixGain::Step {
                start_point_value: q7_8::from_f64(0.0),
            })],
        )
        .unwrap();

        let unit = TemporalUnitInput {
            timestamp: 0,
            parameter_blocks: vec![block],
            audio_frames: vec![],
            tick_hooked_arbitrary_obus: vec![],
        };
        assert!(sequencer.get_serialized_temporal_unit(&unit).is_err());
    }
}
