// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Mix Presentation OBU: one or more playback-ready sub-mixes, each combining a set of
//! audio elements under a shared mix gain and reporting measured loudness per target layout.

use crate::errors::{invalid_argument, Result};
use crate::io::uleb128::Uleb128Policy;
use crate::io::{BitReader, BitWriter};
use crate::obu::read_footer;
use crate::obu_header::{ObuHeader, ObuType};
use crate::param_definition::ParamDefinition;
use crate::util::require_unique;

/// A named loudspeaker arrangement a sub-mix can report loudness for. Roughly follows the
/// channel-count-labeled sound systems (`0+2+0`, `0+5+0`, ... up to `14+5+7+4`) every mix
/// presentation layout picks from; systems this library doesn't enumerate round-trip through
/// [`SoundSystem::Other`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SoundSystem {
    /// `0+2+0`: stereo.
    A,
    /// `0+5+0`: 5.1.
    B,
    /// `2+5+0`: 5.1.2.
    C,
    /// `4+5+0`: 5.1.4.
    D,
    /// `4+5+1`: 7.1.4.
    E,
    /// `3+7+0`: 7.1.2 variant.
    F,
    /// `4+9+0`: 9.1.4.
    G,
    /// `9+10+3`: 22.2-adjacent.
    H,
    /// `0+7+0`: 7.1.
    I,
    /// `4+7+0`: 7.1.4 variant.
    J,
    Binaural,
    /// Any other raw 5-bit sound_system_id this library does not name.
    Other(u8),
}

impl SoundSystem {
    pub fn from_u5(raw: u8) -> Result<SoundSystem> {
        Ok(match raw {
            0 => SoundSystem::A,
            1 => SoundSystem::B,
            2 => SoundSystem::C,
            3 => SoundSystem::D,
            4 => SoundSystem::E,
            5 => SoundSystem::F,
            6 => SoundSystem::G,
            7 => SoundSystem::H,
            8 => SoundSystem::I,
            9 => SoundSystem::J,
            10 => SoundSystem::Binaural,
            0..=31 => SoundSystem::Other(raw),
            _ => return invalid_argument(format!("sound_system_id {raw} does not fit in 5 bits")),
        })
    }

    pub fn to_u5(self) -> u8 {
        match self {
            SoundSystem::A => 0,
            SoundSystem::B => 1,
            SoundSystem::C => 2,
            SoundSystem::D => 3,
            SoundSystem::E => 4,
            SoundSystem::F => 5,
            SoundSystem::G => 6,
            SoundSystem::H => 7,
            SoundSystem::I => 8,
            SoundSystem::J => 9,
            SoundSystem::Binaural => 10,
            SoundSystem::Other(raw) => raw,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnchorElement {
    Content,
    Dialogue,
    Reserved(u8),
}

impl AnchorElement {
    fn from_u8(raw: u8) -> AnchorElement {
        match raw {
            0 => AnchorElement::Content,
            1 => AnchorElement::Dialogue,
            other => AnchorElement::Reserved(other),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            AnchorElement::Content => 0,
            AnchorElement::Dialogue => 1,
            AnchorElement::Reserved(raw) => raw,
        }
    }
}

const INFO_TYPE_TRUE_PEAK: u8 = 1 << 0;
const INFO_TYPE_ANCHORED_LOUDNESS: u8 = 1 << 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnchoredLoudnessElement {
    pub anchor_element: AnchorElement,
    pub anchored_loudness: i16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoudnessInfo {
    pub integrated_loudness: i16,
    pub digital_peak: i16,
    pub true_peak: Option<i16>,
    pub anchored_loudness: Option<Vec<AnchoredLoudnessElement>>,
}

impl LoudnessInfo {
    fn info_type(&self) -> u8 {
        let mut flags = 0u8;
        if self.true_peak.is_some() {
            flags |= INFO_TYPE_TRUE_PEAK;
        }
        if self.anchored_loudness.is_some() {
            flags |= INFO_TYPE_ANCHORED_LOUDNESS;
        }
        flags
    }

    fn write(&self, out: &mut BitWriter, policy: Uleb128Policy) -> Result<()> {
        out.write_unsigned_literal(u64::from(self.info_type()), 8)?;
        out.write_signed16(self.integrated_loudness)?;
        out.write_signed16(self.digital_peak)?;

        if let Some(true_peak) = self.true_peak {
            out.write_signed16(true_peak)?;
        }
        if let Some(elements) = &self.anchored_loudness {
            out.write_uleb128(elements.len() as u64, policy)?;
            for element in elements {
                out.write_unsigned_literal(u64::from(element.anchor_element.to_u8()), 8)?;
                out.write_signed16(element.anchored_loudness)?;
            }
        }
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let info_type = reader.read_unsigned_literal(8)? as u8;
        let integrated_loudness = reader.read_signed16()?;
        let digital_peak = reader.read_signed16()?;

        let true_peak = if info_type & INFO_TYPE_TRUE_PEAK != 0 {
            Some(reader.read_signed16()?)
        } else {
            None
        };

        let anchored_loudness = if info_type & INFO_TYPE_ANCHORED_LOUDNESS != 0 {
            let (count, _) = reader.read_uleb128()?;
            let mut elements = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let anchor_element = AnchorElement::from_u8(reader.read_unsigned_literal(8)? as u8);
                let anchored_loudness = reader.read_signed16()?;
                elements.push(AnchoredLoudnessElement { anchor_element, anchored_loudness });
            }
            Some(elements)
        } else {
            None
        };

        Ok(LoudnessInfo { integrated_loudness, digital_peak, true_peak, anchored_loudness })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MixPresentationLayout {
    pub sound_system: SoundSystem,
    pub loudness: LoudnessInfo,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HeadphonesRenderingMode {
    Stereo,
    Binaural,
    Reserved(u8),
}

impl HeadphonesRenderingMode {
    fn from_u2(raw: u8) -> HeadphonesRenderingMode {
        match raw {
            0 => HeadphonesRenderingMode::Stereo,
            1 => HeadphonesRenderingMode::Binaural,
            other => HeadphonesRenderingMode::Reserved(other),
        }
    }

    fn to_u2(self) -> u8 {
        match self {
            HeadphonesRenderingMode::Stereo => 0,
            HeadphonesRenderingMode::Binaural => 1,
            HeadphonesRenderingMode::Reserved(raw) => raw,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubMixAudioElement {
    pub audio_element_id: u64,
    pub localized_element_annotations: Vec<String>,
    pub headphones_rendering_mode: HeadphonesRenderingMode,
    pub element_mix_gain: ParamDefinition,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubMix {
    pub audio_elements: Vec<SubMixAudioElement>,
    pub output_mix_gain: ParamDefinition,
    pub layouts: Vec<MixPresentationLayout>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MixPresentationObu {
    pub header: ObuHeader,
    pub mix_presentation_id: u64,
    pub languages: Vec<String>,
    pub localized_presentation_annotations: Vec<String>,
    pub sub_mixes: Vec<SubMix>,
    pub footer: Vec<u8>,
}

impl MixPresentationObu {
    pub fn create(
        header: ObuHeader,
        mix_presentation_id: u64,
        languages: Vec<String>,
        localized_presentation_annotations: Vec<String>,
        sub_mixes: Vec<SubMix>,
    ) -> Result<Self> {
        if header.obu_type != ObuType::MixPresentation {
            return invalid_argument("header.obu_type must be MixPresentation");
        }
        if localized_presentation_annotations.len() != languages.len() {
            return invalid_argument(
                "localized_presentation_annotations must have one entry per language",
            );
        }
        if sub_mixes.is_empty() {
            return invalid_argument("a mix presentation must have at least one sub-mix");
        }
        for sub_mix in &sub_mixes {
            if sub_mix.audio_elements.is_empty() {
                return invalid_argument("a sub-mix must reference at least one audio element");
            }
            require_unique(
                sub_mix.audio_elements.iter().map(|e| e.audio_element_id),
                "sub-mix audio_element_id",
            )?;
            for element in &sub_mix.audio_elements {
                if element.localized_element_annotations.len() != languages.len() {
                    return invalid_argument(
                        "localized_element_annotations must have one entry per language",
                    );
                }
            }
            if sub_mix.layouts.is_empty() {
                return invalid_argument("a sub-mix must report at least one loudness layout");
            }
        }

        Ok(MixPresentationObu {
            header,
            mix_presentation_id,
            languages,
            localized_presentation_annotations,
            sub_mixes,
            footer: Vec::new(),
        })
    }

    fn write_localized_strings(out: &mut BitWriter, strings: &[String]) -> Result<()> {
        for s in strings {
            out.write_string(s)?;
        }
        Ok(())
    }

    fn read_localized_strings(reader: &mut BitReader<'_>, count: usize) -> Result<Vec<String>> {
        let mut strings = Vec::with_capacity(count);
        for _ in 0..count {
            strings.push(reader.read_string()?);
        }
        Ok(strings)
    }

    pub fn create_from_buffer(
        header: ObuHeader,
        payload_size: u64,
        reader: &mut BitReader<'_>,
    ) -> Result<Self> {
        let payload_start = reader.byte_pos();

        let (mix_presentation_id, _) = reader.read_uleb128()?;
        let (count_label, _) = reader.read_uleb128()?;
        let count_label = count_label as usize;

        let mut languages = Vec::with_capacity(count_label);
        for _ in 0..count_label {
            languages.push(reader.read_string()?);
        }
        let localized_presentation_annotations = Self::read_localized_strings(reader, count_label)?;

        let (num_sub_mixes, _) = reader.read_uleb128()?;
        let mut sub_mixes = Vec::with_capacity(num_sub_mixes as usize);
        for _ in 0..num_sub_mixes {
            let (num_audio_elements, _) = reader.read_uleb128()?;
            let mut audio_elements = Vec::with_capacity(num_audio_elements as usize);
            for _ in 0..num_audio_elements {
                let (audio_element_id, _) = reader.read_uleb128()?;
                let localized_element_annotations = Self::read_localized_strings(reader, count_label)?;
                let headphones_rendering_mode =
                    HeadphonesRenderingMode::from_u2(reader.read_unsigned_literal(2)? as u8);
                reader.read_unsigned_literal(6)?;
                let element_mix_gain = ParamDefinition::read(
                    reader,
                    crate::param_definition::ParamDefinitionType::MixGain,
                )?;
                audio_elements.push(SubMixAudioElement {
                    audio_element_id,
                    localized_element_annotations,
                    headphones_rendering_mode,
                    element_mix_gain,
                });
            }

            let output_mix_gain = ParamDefinition::read(
                reader,
                crate::param_definition::ParamDefinitionType::MixGain,
            )?;

            let (num_layouts, _) = reader.read_uleb128()?;
            let mut layouts = Vec::with_capacity(num_layouts as usize);
            for _ in 0..num_layouts {
                let sound_system = SoundSystem::from_u5(reader.read_unsigned_literal(5)? as u8)?;
                reader.read_unsigned_literal(3)?;
                let loudness = LoudnessInfo::read(reader)?;
                layouts.push(MixPresentationLayout { sound_system, loudness });
            }

            sub_mixes.push(SubMix { audio_elements, output_mix_gain, layouts });
        }

        let footer = read_footer(reader, payload_start, payload_size)?;

        let mut obu = MixPresentationObu::create(
            header,
            mix_presentation_id,
            languages,
            localized_presentation_annotations,
            sub_mixes,
        )?;
        obu.footer = footer;
        Ok(obu)
    }

    pub fn validate_and_write_obu(&self, policy: Uleb128Policy, out: &mut BitWriter) -> Result<()> {
        let mut payload = BitWriter::new();
        payload.write_uleb128(self.mix_presentation_id, policy)?;
        payload.write_uleb128(self.languages.len() as u64, policy)?;
        Self::write_localized_strings(&mut payload, &self.languages)?;
        Self::write_localized_strings(&mut payload, &self.localized_presentation_annotations)?;

        payload.write_uleb128(self.sub_mixes.len() as u64, policy)?;
        for sub_mix in &self.sub_mixes {
            payload.write_uleb128(sub_mix.audio_elements.len() as u64, policy)?;
            for element in &sub_mix.audio_elements {
                payload.write_uleb128(element.audio_element_id, policy)?;
                Self::write_localized_strings(&mut payload, &element.localized_element_annotations)?;
                payload.write_unsigned_literal(u64::from(element.headphones_rendering_mode.to_u2()), 2)?;
                payload.write_unsigned_literal(0, 6)?;
                element.element_mix_gain.write(policy, &mut payload)?;
            }

            sub_mix.output_mix_gain.write(policy, &mut payload)?;

            payload.write_uleb128(sub_mix.layouts.len() as u64, policy)?;
            for layout in &sub_mix.layouts {
                payload.write_unsigned_literal(u64::from(layout.sound_system.to_u5()), 5)?;
                payload.write_unsigned_literal(0, 3)?;
                layout.loudness.write(&mut payload, policy)?;
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
    use crate::param_definition::ParamDefinitionTail;

    fn mix_gain(parameter_id: u64, default_mix_gain: i16) -> ParamDefinition {
        ParamDefinition::new(parameter_id, 1000, None, ParamDefinitionTail::MixGain { default_mix_gain })
            .unwrap()
    }

    fn sample_sub_mix() -> SubMix {
        SubMix {
            audio_elements: vec![SubMixAudioElement {
                audio_element_id: 1,
                localized_element_annotations: vec!["Stereo".to_string()],
                headphones_rendering_mode: HeadphonesRenderingMode::Stereo,
                element_mix_gain: mix_gain(10, 0),
            }],
            output_mix_gain: mix_gain(11, 0),
            layouts: vec![MixPresentationLayout {
                sound_system: SoundSystem::A,
                loudness: LoudnessInfo {
                    integrated_loudness: -1800,
                    digital_peak: -200,
                    true_peak: Some(-150),
                    anchored_loudness: Some(vec![AnchoredLoudnessElement {
                        anchor_element: AnchorElement::Dialogue,
                        anchored_loudness: -2000,
                    }]),
                },
            }],
        }
    }

    #[test]
    fn roundtrip() {
        let header = ObuHeader::new(ObuType::MixPresentation);
        let obu = MixPresentationObu::create(
            header,
            1,
            vec!["en".to_string()],
            vec!["Main mix".to_string()],
            vec![sample_sub_mix()],
        )
        .unwrap();

        let mut out = BitWriter::new();
        obu.validate_and_write_obu(Uleb128Policy::Minimal, &mut out).unwrap();
        let bytes = out.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let (parsed_header, payload_size) = ObuHeader::read_and_validate(&mut reader).unwrap();
        let parsed = MixPresentationObu::create_from_buffer(parsed_header, payload_size, &mut reader).unwrap();
        assert_eq!(parsed, obu);
    }

    #[test]
    fn rejects_duplicate_audio_element_ids_in_sub_mix() {
        let mut sub_mix = sample_sub_mix();
        let duplicate = sub_mix.audio_elements[0].clone();
        sub_mix.audio_elements.push(duplicate);

        let header = ObuHeader::new(ObuType::MixPresentation);
        let result = MixPresentationObu::create(
            header,
            1,
            vec!["en".to_string()],
            vec!["Main mix".to_string()],
            vec![sub_mix],
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_annotation_count_mismatch() {
        let header = ObuHeader::new(ObuType::MixPresentation);
        let result = MixPresentationObu::create(
            header,
            1,
            vec!["en".to_string(), "fr".to_string()],
            vec!["Main mix".to_string()],
            vec![sample_sub_mix()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn loudness_without_optional_fields_roundtrips() {
        let mut out = BitWriter::new();
        let info = LoudnessInfo {
            integrated_loudness: -1800,
            digital_peak: -100,
            true_peak: None,
            anchored_loudness: None,
        };
        info.write(&mut out, Uleb128Policy::Minimal).unwrap();
        let bytes = out.into_bytes();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(LoudnessInfo::read(&mut reader).unwrap(), info);
    }
}
