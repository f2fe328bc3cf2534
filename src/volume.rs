//! DAC volume conversion table
//!
//! The chip's analog output stage sums the three voice DACs through a
//! shared load, so the combined level is not the sum of the per-voice
//! levels. This module builds the 32x32x32 table that converts the three
//! 5-bit voice volumes into one signed output sample, either by
//! interpolating the 16x16x16 grid measured on real hardware or by a
//! linear per-voice mean. The table is built once at chip construction
//! and is read-only afterwards.

use crate::config::VolumeMixing;
use crate::tables::{DAC_LEVELS_5BIT, FIXED_VOL_4BIT};

/// Mask of one 5-bit voice slot in a merged volume word
pub const VOICE_A_MASK: u16 = 0x1f;
/// Voice B slot in a merged volume word
pub const VOICE_B_MASK: u16 = 0x1f << 5;
/// Voice C slot in a merged volume word
pub const VOICE_C_MASK: u16 = 0x1f << 10;

/// Output ceiling the table is normalized to
const OUTPUT_LEVEL: u32 = 0x7fff;

/// Center the normalized table around zero (subtract `OUTPUT_LEVEL/2`).
/// Off: samples stay in `[0, OUTPUT_LEVEL]` and the DC adjuster removes
/// the offset downstream when the output filter is enabled.
const OUTPUT_CENTERED: bool = false;

const TABLE_LEN: usize = 32 * 32 * 32;

/// Merge three 5-bit voice volumes into one table index.
#[inline]
pub const fn merge_voices(c: u16, b: u16, a: u16) -> u16 {
    (c << 10) | (b << 5) | a
}

/// The 32x32x32 volume conversion table.
///
/// Indexed by a merged volume word (`merge_voices`); each entry is the
/// signed sample for that combination of voice levels.
#[derive(Clone, PartialEq, Eq)]
pub struct DacTable {
    samples: Box<[i16]>,
}

impl DacTable {
    /// Build the table with the given mixing strategy, then normalize it
    /// into the output range.
    pub fn build(mixing: VolumeMixing) -> Self {
        let mut raw = vec![0u16; TABLE_LEN];
        match mixing {
            VolumeMixing::Measured => interpolate_measured(&mut raw),
            VolumeMixing::Linear => build_linear(&mut raw),
        }

        Self {
            samples: normalize(&raw, OUTPUT_LEVEL, OUTPUT_CENTERED),
        }
    }

    /// Look up the sample for a merged 3x5-bit volume word.
    #[inline]
    pub fn lookup(&self, merged: u16) -> i16 {
        self.samples[(merged as usize) & (TABLE_LEN - 1)]
    }
}

impl std::fmt::Debug for DacTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DacTable")
            .field("len", &self.samples.len())
            .field("max", &self.samples[TABLE_LEN - 1])
            .finish()
    }
}

/// Read the measured grid; accesses at the 16 boundary clamp to the last
/// measured point.
fn measured_at(i: usize, j: usize, k: usize) -> u32 {
    let i = i.min(15);
    let j = j.min(15);
    let k = k.min(15);
    FIXED_VOL_4BIT[i + 16 * j + 256 * k] as u32
}

fn set(out: &mut [u16], i: usize, j: usize, k: usize, value: u32) {
    out[i + 32 * j + 1024 * k] = value.min(65535) as u16;
}

/// The grid is exponential in nature, so the in-between point leans
/// towards the lower neighbour rather than sitting halfway.
fn blend(low: u32, high: u32) -> u32 {
    (low * 4 + high * 6) / 10
}

/// Expand the 16x16x16 measured grid to 32x32x32.
///
/// Every measured point yields eight output points: itself plus the
/// half-steps along each single axis and each axis combination.
fn interpolate_measured(out: &mut [u16]) {
    for k in 0..16 {
        for j in 0..16 {
            for i in 0..16 {
                let base = measured_at(i, j, k);
                set(out, i * 2, j * 2, k * 2, base);

                let next = measured_at(i + 1, j, k);
                set(out, i * 2 + 1, j * 2, k * 2, blend(base, next));

                let next = measured_at(i, j + 1, k);
                set(out, i * 2, j * 2 + 1, k * 2, blend(base, next));

                let next = measured_at(i, j, k + 1);
                set(out, i * 2, j * 2, k * 2 + 1, blend(base, next));

                let next = measured_at(i + 1, j + 1, k);
                set(out, i * 2 + 1, j * 2 + 1, k * 2, blend(base, next));

                let next = measured_at(i + 1, j, k + 1);
                set(out, i * 2 + 1, j * 2, k * 2 + 1, blend(base, next));

                let next = measured_at(i, j + 1, k + 1);
                set(out, i * 2, j * 2 + 1, k * 2 + 1, blend(base, next));

                let next = measured_at(i + 1, j + 1, k + 1);
                set(out, i * 2 + 1, j * 2 + 1, k * 2 + 1, blend(base, next));
            }
        }
    }
}

/// Linear variant: every entry is the mean of the three per-voice DAC
/// levels.
fn build_linear(out: &mut [u16]) {
    for k in 0..32 {
        for j in 0..32 {
            for i in 0..32 {
                let sum = DAC_LEVELS_5BIT[i] as u32
                    + DAC_LEVELS_5BIT[j] as u32
                    + DAC_LEVELS_5BIT[k] as u32;
                set(out, i, j, k, sum / 3);
            }
        }
    }
}

/// Scale the table so its maximum entry maps to `level`, optionally
/// re-centering around zero to turn the unsigned table into a signed one.
fn normalize(raw: &[u16], level: u32, center: bool) -> Box<[i16]> {
    let max = raw[TABLE_LEN - 1] as u64;
    let half = (level / 2) as i32;

    raw.iter()
        .map(|&v| {
            let mut res = (v as u64 * level as u64 / max) as i32;
            if center {
                res -= half;
            }
            res as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_is_idempotent() {
        for mixing in [VolumeMixing::Measured, VolumeMixing::Linear] {
            let a = DacTable::build(mixing);
            let b = DacTable::build(mixing);
            assert_eq!(a, b, "rebuild with identical config must match");
        }
    }

    #[test]
    fn test_normalized_range() {
        for mixing in [VolumeMixing::Measured, VolumeMixing::Linear] {
            let table = DacTable::build(mixing);
            assert_eq!(table.lookup(0), 0);
            assert_eq!(
                table.lookup(merge_voices(31, 31, 31)),
                OUTPUT_LEVEL as i16
            );
        }
    }

    #[test]
    fn test_linear_monotonic_along_one_voice() {
        let table = DacTable::build(VolumeMixing::Linear);
        for a in 1..32u16 {
            assert!(table.lookup(merge_voices(0, 0, a)) > table.lookup(merge_voices(0, 0, a - 1)));
        }
    }

    #[test]
    fn test_interpolation_keeps_measured_points() {
        let mut raw = vec![0u16; TABLE_LEN];
        interpolate_measured(&mut raw);
        for k in 0..16 {
            for j in 0..16 {
                for i in 0..16 {
                    assert_eq!(
                        raw[i * 2 + 32 * (j * 2) + 1024 * (k * 2)] as u32,
                        measured_at(i, j, k),
                        "even index ({i},{j},{k}) must carry the measurement"
                    );
                }
            }
        }
    }

    #[test]
    fn test_interpolation_boundary_clamps() {
        let mut raw = vec![0u16; TABLE_LEN];
        interpolate_measured(&mut raw);
        // The final half-step interpolates the corner with itself.
        assert_eq!(
            raw[31 + 32 * 31 + 1024 * 31] as u32,
            blend(measured_at(15, 15, 15), measured_at(15, 15, 15))
        );
    }

    #[test]
    fn test_blend_leans_low() {
        assert_eq!(blend(0, 10), 6);
        assert_eq!(blend(10, 0), 4);
        assert_eq!(blend(65535, 65535), 65535);
    }
}
