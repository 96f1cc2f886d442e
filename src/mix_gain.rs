// iamf-core
// Copyright (c) 2024 The iamf-core Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Animated mix gain: the per-subblock interpolation curve a MixGain parameter block subblock
//! carries, and the logic to resolve it to a single Q7.8 gain value at a given tick.

use crate::errors::{invalid_argument, Result};
use crate::io::{BitReader, BitWriter};
use crate::util::q7_8;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnimationType {
    Step,
    Linear,
    Bezier,
}

impl AnimationType {
    pub fn from_u8(raw: u8) -> Result<AnimationType> {
        match raw {
            0 => Ok(AnimationType::Step),
            1 => Ok(AnimationType::Linear),
            2 => Ok(AnimationType::Bezier),
            _ => invalid_argument(format!("animation_type {raw} is not recognized")),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            AnimationType::Step => 0,
            AnimationType::Linear => 1,
            AnimationType::Bezier => 2,
        }
    }
}

/// An animated mix gain curve over one subblock, in Q7.8.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnimatedMixGain {
    Step { start_point_value: i16 },
    Linear { start_point_value: i16, end_point_value: i16 },
    Bezier { start_point_value: i16, end_point_value: i16, control_point_value: i16, control_point_relative_time: u8 },
}

impl AnimatedMixGain {
    pub fn animation_type(&self) -> AnimationType {
        match self {
            AnimatedMixGain::Step { .. } => AnimationType::Step,
            AnimatedMixGain::Linear { .. } => AnimationType::Linear,
            AnimatedMixGain::Bezier { .. } => AnimationType::Bezier,
        }
    }

    pub fn write(&self, out: &mut BitWriter) -> Result<()> {
        out.write_unsigned_literal(u64::from(self.animation_type().to_u8()), 8)?;
        match self {
            AnimatedMixGain::Step { start_point_value } => {
                out.write_signed16(*start_point_value)?;
            }
            AnimatedMixGain::Linear { start_point_value, end_point_value } => {
                out.write_signed16(*start_point_value)?;
                out.write_signed16(*end_point_value)?;
            }
            AnimatedMixGain::Bezier {
                start_point_value,
                end_point_value,
                control_point_value,
                control_point_relative_time,
            } => {
                out.write_signed16(*start_point_value)?;
                out.write_signed16(*end_point_value)?;
                out.write_signed16(*control_point_value)?;
                out.write_unsigned_literal(u64::from(*control_point_relative_time), 8)?;
            }
        }
        Ok(())
    }

    pub fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let animation_type = AnimationType::from_u8(reader.read_unsigned_literal(8)? as u8)?;
        Ok(match animation_type {
            AnimationType::Step => {
                AnimatedMixGain::Step { start_point_value: reader.read_signed16()? }
            }
            AnimationType::Linear => AnimatedMixGain::Linear {
                start_point_value: reader.read_signed16()?,
                end_point_value: reader.read_signed16()?,
            },
            AnimationType::Bezier => AnimatedMixGain::Bezier {
                start_point_value: reader.read_signed16()?,
                end_point_value: reader.read_signed16()?,
                control_point_value: reader.read_signed16()?,
                control_point_relative_time: reader.read_unsigned_literal(8)? as u8,
            },
        })
    }

    /// Resolves the mix gain at `elapsed / duration` through the subblock, in Q7.8.
    ///
    /// `elapsed` and `duration` are measured in samples at the parameter's rate; `elapsed` must
    /// be `<= duration`.
    pub fn get_mix_gain(&self, elapsed: u64, duration: u64) -> Result<i16> {
        if duration == 0 {
            return invalid_argument("duration must be non-zero");
        }
        if elapsed > duration {
            return invalid_argument("elapsed must not exceed duration");
        }

        match self {
            AnimatedMixGain::Step { start_point_value } => Ok(*start_point_value),
            AnimatedMixGain::Linear { start_point_value, end_point_value } => {
                let t = elapsed as f64 / duration as f64;
                let start = q7_8::to_f64(*start_point_value);
                let end = q7_8::to_f64(*end_point_value);
                Ok(q7_8::from_f64(start + t * (end - start)))
            }
            AnimatedMixGain::Bezier {
                start_point_value,
                end_point_value,
                control_point_value,
                control_point_relative_time,
            } => {
                // Solve alpha*a^2 + beta*a + gamma = 0 for the Bezier parameter `a`, per the
                // IAMF spec's rounding convention round(x) = floor(x + 0.5).
                let control_point_float = crate::util::q0_8::to_f64(*control_point_relative_time);
                let n_1 = q7_8::round_half_up(duration as f64 * control_point_float);
                let n_2 = duration as f64;
                let n = elapsed as f64;

                let alpha = -2.0 * n_1 + n_2;
                let beta = 2.0 * n_1;
                let gamma = -n;
                let a = if alpha == 0.0 {
                    -gamma / beta
                } else {
                    (-beta + (beta * beta - 4.0 * alpha * gamma).sqrt()) / (2.0 * alpha)
                };

                let p0 = q7_8::to_f64(*start_point_value);
                let p1 = q7_8::to_f64(*control_point_value);
                let p2 = q7_8::to_f64(*end_point_value);
                let value = (1.0 - a).powi(2) * p0 + 2.0 * (1.0 - a) * a * p1 + a.powi(2) * p2;
                Ok(q7_8::from_f64(value))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_every_variant() {
        let variants = [
            AnimatedMixGain::Step { start_point_value: q7_8::from_f64(-6.0) },
            AnimatedMixGain::Linear {
                start_point_value: q7_8::from_f64(-6.0),
                end_point_value: q7_8::from_f64(0.0),
            },
            AnimatedMixGain::Bezier {
                start_point_value: q7_8::from_f64(-6.0),
                end_point_value: q7_8::from_f64(0.0),
                control_point_value: q7_8::from_f64(-3.0),
                control_point_relative_time: 128,
            },
        ];

        for variant in variants {
            let mut out = BitWriter::new();
            variant.write(&mut out).unwrap();
            let bytes = out.into_bytes();
            let mut reader = BitReader::new(&bytes);
            assert_eq!(AnimatedMixGain::read(&mut reader).unwrap(), variant);
        }
    }

    #[test]
    fn step_returns_start_value_for_any_target() {
        let gain = AnimatedMixGain::Step { start_point_value: q7_8::from_f64(-6.0) };
        assert_eq!(gain.get_mix_gain(0, 10).unwrap(), q7_8::from_f64(-6.0));
        assert_eq!(gain.get_mix_gain(10, 10).unwrap(), q7_8::from_f64(-6.0));
    }

    #[test]
    fn linear_at_midpoint_is_arithmetic_mean() {
        let gain = AnimatedMixGain::Linear {
            start_point_value: q7_8::from_f64(-6.0),
            end_point_value: q7_8::from_f64(2.0),
        };
        assert_eq!(gain.get_mix_gain(5, 10).unwrap(), q7_8::from_f64(-2.0));
    }

    #[test]
    fn bezier_solves_quadratic_rather_than_reusing_linear_t() {
        // duration=16, control_point_relative_time=64 (0.25) => n_1 = round_half_up(16*0.25) = 4.
        // At elapsed=6: alpha=16-2*4=8, beta=2*4=8, gamma=-6, discriminant=8^2-4*8*(-6)=256,
        // giving the solved parameter a = (-8+16)/16 = 0.5 exactly. A naive `t = elapsed/duration`
        // substitution would instead use t = 6/16 = 0.375 and produce a different result.
        let gain = AnimatedMixGain::Bezier {
            start_point_value: q7_8::from_f64(-6.0),
            control_point_value: q7_8::from_f64(10.0),
            end_point_value: q7_8::from_f64(2.0),
            control_point_relative_time: 64,
        };
        assert_eq!(gain.get_mix_gain(6, 16).unwrap(), q7_8::from_f64(4.0));
    }

    #[test]
    fn bezier_with_start_equal_end_equal_control_returns_that_value() {
        let value = q7_8::from_f64(1.5);
        let gain = AnimatedMixGain::Bezier {
            start_point_value: value,
            end_point_value: value,
            control_point_value: value,
            control_point_relative_time: 64,
        };
        assert_eq!(gain.get_mix_gain(3, 10).unwrap(), value);
    }

    #[test]
    fn rejects_elapsed_past_duration() {
        let gain = AnimatedMixGain::Step { start_point_value: 0 };
        assert!(gain.get_mix_gain(11, 10).is_err());
    }
}
