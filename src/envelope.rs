//! Envelope generator
//!
//! The envelope produces a 5-bit volume that evolves over time in one of
//! 16 hardware shapes. Every shape is described declaratively as three
//! blocks of 32 volumes drawn from four primitive ramps; the first block
//! (the attack) plays once, the second and third loop forever. The
//! expanded waves are built once per process and shared.

use std::sync::OnceLock;

use crate::steps::ENV_FRAC_BITS;
use crate::volume::merge_voices;

/// Volumes per envelope block
pub const BLOCK_LEN: usize = 32;

/// Positions per expanded envelope wave (3 blocks)
pub const WAVE_LEN: usize = 3 * BLOCK_LEN;

/// Phase value one past the last wave position
const WAVE_END: u32 = (WAVE_LEN as u32) << ENV_FRAC_BITS;

/// Phase span of the two looping blocks
const LOOP_SPAN: u32 = (2 * BLOCK_LEN as u32) << ENV_FRAC_BITS;

/// Primitive volume ramps an envelope block is built from
#[derive(Debug, Clone, Copy)]
enum Ramp {
    /// 31 down to 0
    Fall,
    /// 0 up to 31
    Rise,
    /// Hold at 0
    Bottom,
    /// Hold at 31
    Top,
}

use Ramp::{Bottom, Fall, Rise, Top};

/// The 16 envelope shapes: one attack block, then two blocks that repeat.
const SHAPE_BLOCKS: [[Ramp; 3]; 16] = [
    [Fall, Bottom, Bottom], // 0 \___
    [Fall, Bottom, Bottom], // 1 \___
    [Fall, Bottom, Bottom], // 2 \___
    [Fall, Bottom, Bottom], // 3 \___
    [Rise, Bottom, Bottom], // 4 /___
    [Rise, Bottom, Bottom], // 5 /___
    [Rise, Bottom, Bottom], // 6 /___
    [Rise, Bottom, Bottom], // 7 /___
    [Fall, Fall, Fall],     // 8 \\\\
    [Fall, Bottom, Bottom], // 9 \___
    [Fall, Rise, Fall],     // A \/\/
    [Fall, Top, Top],       // B \---
    [Rise, Rise, Rise],     // C ////
    [Rise, Top, Top],       // D /---
    [Rise, Fall, Rise],     // E /\/\
    [Rise, Bottom, Bottom], // F /___
];

fn expand_block(ramp: Ramp, wave: &mut [u16]) {
    let (mut vol, inc): (i32, i32) = match ramp {
        Fall => (31, -1),
        Rise => (0, 1),
        Bottom => (0, 0),
        Top => (31, 0),
    };

    for slot in wave.iter_mut().take(BLOCK_LEN) {
        let v = vol.clamp(0, 31) as u16;
        // Pre-merged into all three voice slots; the per-voice envelope
        // mask selects which ones apply at runtime.
        *slot = merge_voices(v, v, v);
        vol += inc;
    }
}

fn build_waves() -> [[u16; WAVE_LEN]; 16] {
    let mut waves = [[0u16; WAVE_LEN]; 16];
    for (shape, blocks) in SHAPE_BLOCKS.iter().enumerate() {
        for (block, &ramp) in blocks.iter().enumerate() {
            expand_block(ramp, &mut waves[shape][block * BLOCK_LEN..]);
        }
    }
    waves
}

static WAVES: OnceLock<[[u16; WAVE_LEN]; 16]> = OnceLock::new();

/// The 16 expanded envelope waves, built on first use.
///
/// Each entry holds a 5-bit volume replicated into all three voice slots
/// of a merged volume word.
pub fn envelope_waves() -> &'static [[u16; WAVE_LEN]; 16] {
    WAVES.get_or_init(build_waves)
}

/// Runtime envelope state: a fixed-point phase accumulator and the
/// selected shape.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeState {
    /// Phase advance per sample ([`ENV_FRAC_BITS`] fractional bits)
    pub(crate) step: u32,
    /// Phase accumulator; integer part is the wave position
    pub(crate) pos: u32,
    /// Selected shape (0-15)
    pub(crate) shape: u8,
}

impl EnvelopeState {
    /// Select a shape. Writing the shape register always restarts the
    /// envelope from position 0, whatever the previous phase was.
    #[inline]
    pub fn set_shape(&mut self, shape: u8) {
        self.shape = shape & 0x0f;
        self.pos = 0;
    }

    /// Current integer position into the expanded wave (0-95)
    #[inline]
    pub fn position(&self) -> usize {
        (self.pos >> ENV_FRAC_BITS) as usize
    }

    /// Currently selected shape index
    #[inline]
    pub fn shape(&self) -> u8 {
        self.shape
    }

    /// Advance the phase by one sample.
    ///
    /// Once the accumulator passes the end of the third block it is
    /// pulled back by two blocks, so blocks 2 and 3 repeat and the attack
    /// block never replays.
    #[inline]
    pub fn advance(&mut self) {
        self.pos = self.pos.wrapping_add(self.step);
        if self.pos >= WAVE_END {
            self.pos -= LOOP_SPAN;
        }
    }

    /// Restore the phase accumulator, kept inside the wave range.
    #[inline]
    pub(crate) fn set_phase(&mut self, pos: u32) {
        self.pos = pos % WAVE_END;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::envelope_step;
    use crate::volume::VOICE_A_MASK;

    fn voice_a(level: u16) -> u16 {
        level & VOICE_A_MASK
    }

    #[test]
    fn test_wave_expansion_shape_0() {
        let waves = envelope_waves();
        // Shape 0: fall 31..0 then flat zero
        for i in 0..BLOCK_LEN {
            assert_eq!(voice_a(waves[0][i]), (31 - i) as u16);
        }
        for &v in &waves[0][BLOCK_LEN..] {
            assert_eq!(voice_a(v), 0);
        }
    }

    #[test]
    fn test_wave_expansion_shape_d_holds_top() {
        let waves = envelope_waves();
        for i in 0..BLOCK_LEN {
            assert_eq!(voice_a(waves[0x0d][i]), i as u16);
        }
        for &v in &waves[0x0d][BLOCK_LEN..] {
            assert_eq!(voice_a(v), 31);
        }
    }

    #[test]
    fn test_all_waves_in_range() {
        for wave in envelope_waves() {
            for &v in wave {
                assert!(voice_a(v) <= 31);
                // All three slots carry the same volume
                assert_eq!(v, merge_voices(voice_a(v), voice_a(v), voice_a(v)));
            }
        }
    }

    #[test]
    fn test_shape_write_resets_phase() {
        let mut env = EnvelopeState {
            step: 0x0100_0000,
            pos: 0x5000_0000,
            shape: 3,
        };
        env.set_shape(0x0a);
        assert_eq!(env.pos, 0);
        assert_eq!(env.shape(), 0x0a);
    }

    #[test]
    fn test_attack_block_never_repeats() {
        let mut env = EnvelopeState::default();
        env.step = envelope_step(0, 1, 44_100);
        env.set_shape(8);

        let mut wrapped = false;
        for _ in 0..1_000_000 {
            let before = env.position();
            env.advance();
            if env.position() < before {
                wrapped = true;
            }
            if wrapped {
                assert!(
                    (BLOCK_LEN..WAVE_LEN).contains(&env.position()),
                    "position {} re-entered the attack block",
                    env.position()
                );
            }
        }
        assert!(wrapped, "envelope never looped");
    }
}
