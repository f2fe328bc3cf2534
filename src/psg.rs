//! The YM2149 chip: register file, generators and the synthesis hot path
//!
//! All generator state lives in one owned value with explicit
//! construction, [`Psg::reset`] and snapshot import/export. Register
//! writes update the derived steps and masks immediately; one call to
//! [`Psg::next_sample`] advances every generator by one output sample.
//!
//! The mixing stage works on branch-free bitmask words: boolean gates are
//! held as all-zeros/all-ones values so the per-voice tone/noise
//! combination is a couple of AND/OR ops on the packed 3x5-bit volume
//! word, followed by a single DAC table lookup.

use serde::{Deserialize, Serialize};

use crate::config::SoundConfig;
use crate::dc_filter::{DcAdjuster, LowPassFilter};
use crate::envelope::{envelope_waves, EnvelopeState};
use crate::noise::NoiseState;
use crate::steps::{envelope_step, noise_step, tone_step};
use crate::tables::{REG_MASK, VOLUME_4_TO_5};
use crate::volume::{DacTable, VOICE_A_MASK, VOICE_B_MASK, VOICE_C_MASK};

/// Number of voices
pub const NUM_VOICES: usize = 3;

/// Number of sound registers (R0-R13; the I/O ports are not sound state)
pub const NUM_REGISTERS: usize = 14;

/// Phase accumulator value whose sign bit pins a voice's square output
/// high. Used for sub-floor tone periods, where a real chip holds the
/// line at 1 - the behaviour digi-sample replay routines abuse to use
/// the chip as a crude DAC.
const PINNED_HIGH: u32 = 1 << 31;

bitflags::bitflags! {
    /// Mixer control register (R7). A set bit disables the source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MixerControl: u8 {
        /// Tone off, voice A
        const TONE_A_OFF = 1 << 0;
        /// Tone off, voice B
        const TONE_B_OFF = 1 << 1;
        /// Tone off, voice C
        const TONE_C_OFF = 1 << 2;
        /// Noise off, voice A
        const NOISE_A_OFF = 1 << 3;
        /// Noise off, voice B
        const NOISE_B_OFF = 1 << 4;
        /// Noise off, voice C
        const NOISE_C_OFF = 1 << 5;
    }
}

const TONE_OFF: [MixerControl; NUM_VOICES] = [
    MixerControl::TONE_A_OFF,
    MixerControl::TONE_B_OFF,
    MixerControl::TONE_C_OFF,
];

const NOISE_OFF: [MixerControl; NUM_VOICES] = [
    MixerControl::NOISE_A_OFF,
    MixerControl::NOISE_B_OFF,
    MixerControl::NOISE_C_OFF,
];

const VOICE_MASKS: [u16; NUM_VOICES] = [VOICE_A_MASK, VOICE_B_MASK, VOICE_C_MASK];

/// Complete generator state for emulator save-states.
///
/// Restoring this resumes the sample stream exactly: it carries the raw
/// registers plus every derived step, phase and mask, so no write replay
/// is needed and mid-frame phase is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsgSnapshot {
    /// Raw register file
    pub regs: [u8; NUM_REGISTERS],
    /// Tone phase steps per voice
    pub tone_step: [u32; NUM_VOICES],
    /// Tone phase accumulators per voice
    pub tone_pos: [u32; NUM_VOICES],
    /// Noise phase step
    pub noise_step: u32,
    /// Noise phase accumulator
    pub noise_pos: u32,
    /// Noise LFSR seed
    pub noise_seed: u32,
    /// Noise binary output level
    pub noise_level: u16,
    /// Envelope phase step
    pub env_step: u32,
    /// Envelope phase accumulator
    pub env_pos: u32,
    /// Envelope shape index
    pub env_shape: u8,
    /// Packed per-voice envelope-mode mask
    pub envelope_mask: u16,
    /// Packed per-voice fixed volumes
    pub fixed_volume: u16,
}

/// The YM2149 Programmable Sound Generator.
#[derive(Debug, Clone)]
pub struct Psg {
    regs: [u8; NUM_REGISTERS],
    sample_rate: u32,

    // Tone voices
    tone_step: [u32; NUM_VOICES],
    tone_pos: [u32; NUM_VOICES],
    tone_gate: [u32; NUM_VOICES],
    noise_gate: [u32; NUM_VOICES],

    noise: NoiseState,
    envelope: EnvelopeState,

    /// 0x1f in a voice's slot when that voice follows the envelope
    envelope_mask: u16,
    /// 5-bit fixed volume in a voice's slot when it does not
    fixed_volume: u16,

    dac: DacTable,
    dc: DcAdjuster,
    low_pass: LowPassFilter,
    filter_enabled: bool,
}

impl Psg {
    /// Create a chip for the given configuration and reset it.
    ///
    /// The DAC table is built here, once; it is immutable for the
    /// lifetime of the chip.
    pub fn new(config: &SoundConfig) -> Self {
        let mut psg = Self {
            regs: [0; NUM_REGISTERS],
            sample_rate: config.sample_rate,
            tone_step: [0; NUM_VOICES],
            tone_pos: [0; NUM_VOICES],
            tone_gate: [0; NUM_VOICES],
            noise_gate: [0; NUM_VOICES],
            noise: NoiseState::new(),
            envelope: EnvelopeState::default(),
            envelope_mask: 0,
            fixed_volume: 0,
            dac: DacTable::build(config.mixing),
            dc: DcAdjuster::new(),
            low_pass: LowPassFilter::new(),
            filter_enabled: config.low_pass_filter,
        };
        psg.reset();
        psg
    }

    /// Reset all registers and generator state.
    ///
    /// Registers end up cleared except the mixer (everything disabled),
    /// the noise LFSR is reseeded, the envelope restarts at shape 0 and
    /// the filter history is emptied.
    pub fn reset(&mut self) {
        for reg in 0..NUM_REGISTERS as u8 {
            self.write_register(reg, 0);
        }
        self.write_register(7, 0xff);

        self.noise = NoiseState::new();
        self.envelope.set_shape(0);
        self.dc.reset();
        self.low_pass.reset();
    }

    /// Write a sound register (0-13). Out-of-range indices are ignored.
    pub fn write_register(&mut self, reg: u8, value: u8) {
        let reg = reg as usize;
        if reg >= NUM_REGISTERS {
            return;
        }
        let value = value & REG_MASK[reg];
        self.regs[reg] = value;

        match reg {
            0..=5 => {
                let voice = reg >> 1;
                self.tone_step[voice] = tone_step(
                    self.regs[voice * 2 + 1],
                    self.regs[voice * 2],
                    self.sample_rate,
                );
                if self.tone_step[voice] == 0 {
                    self.tone_pos[voice] = PINNED_HIGH;
                }
            }

            6 => {
                self.noise.step = noise_step(value, self.sample_rate);
                if self.noise.step == 0 {
                    self.noise.pin_high();
                }
            }

            7 => {
                let ctrl = MixerControl::from_bits_truncate(value);
                for voice in 0..NUM_VOICES {
                    self.tone_gate[voice] = gate(ctrl.contains(TONE_OFF[voice]));
                    self.noise_gate[voice] = gate(ctrl.contains(NOISE_OFF[voice]));
                }
            }

            8..=10 => {
                let slot = VOICE_MASKS[reg - 8];
                if value & 0x10 != 0 {
                    self.envelope_mask |= slot;
                    self.fixed_volume &= !slot;
                } else {
                    self.envelope_mask &= !slot;
                    self.fixed_volume &= !slot;
                    self.fixed_volume |= VOLUME_4_TO_5[(value & 0x0f) as usize] << (5 * (reg - 8));
                }
            }

            11 | 12 => {
                self.envelope.step = envelope_step(self.regs[12], self.regs[11], self.sample_rate);
            }

            13 => {
                self.envelope.set_shape(value);
            }

            _ => {}
        }
    }

    /// Read back a sound register (0 for out-of-range indices).
    pub fn read_register(&self, reg: u8) -> u8 {
        self.regs.get(reg as usize).copied().unwrap_or(0)
    }

    /// The raw register file.
    pub fn registers(&self) -> &[u8; NUM_REGISTERS] {
        &self.regs
    }

    /// The immutable DAC table.
    pub fn dac_table(&self) -> &DacTable {
        &self.dac
    }

    /// Synthesize the next output sample.
    ///
    /// This is the per-sample hot path: bounded integer arithmetic and
    /// table lookups only, no branches in the mixing itself.
    #[inline]
    pub fn next_sample(&mut self) -> i16 {
        // Fold any completed noise tick into the binary level first
        self.noise.refresh();
        let noise_level = self.noise.level() as u32;

        // Envelope volume, masked to the voices that follow it
        let env_word =
            envelope_waves()[self.envelope.shape() as usize][self.envelope.position()]
                & self.envelope_mask;

        // Per-voice output state as 0 or 0x1f: the square's sign bit ORed
        // with the tone gate, ANDed with the noise level ORed with the
        // noise gate. Both-disabled voices sit permanently high, which is
        // what makes fixed-volume sample replay audible.
        let mut active: u16 = 0;
        for voice in 0..NUM_VOICES {
            let high = (((self.tone_pos[voice] as i32) >> 31) as u32 | self.tone_gate[voice])
                & (noise_level | self.noise_gate[voice]);
            active |= (high as u16 & VOICE_A_MASK) << (5 * voice);
        }

        let merged = active & (env_word | self.fixed_volume);
        let sample = self.dac.lookup(merged);

        // Advance every phase accumulator for the next sample
        for voice in 0..NUM_VOICES {
            self.tone_pos[voice] = self.tone_pos[voice].wrapping_add(self.tone_step[voice]);
        }
        self.noise.advance();
        self.envelope.advance();

        if self.filter_enabled {
            self.dc.push(sample);
            let adjusted = (sample as i32 - self.dc.level() as i32) as i16;
            self.low_pass.filter(adjusted)
        } else {
            sample
        }
    }

    /// Export the full generator state for a save-state.
    pub fn export_state(&self) -> PsgSnapshot {
        PsgSnapshot {
            regs: self.regs,
            tone_step: self.tone_step,
            tone_pos: self.tone_pos,
            noise_step: self.noise.step,
            noise_pos: self.noise.pos,
            noise_seed: self.noise.seed,
            noise_level: self.noise.level,
            env_step: self.envelope.step,
            env_pos: self.envelope.pos,
            env_shape: self.envelope.shape,
            envelope_mask: self.envelope_mask,
            fixed_volume: self.fixed_volume,
        }
    }

    /// Restore generator state from a save-state.
    ///
    /// The mixer gates are re-derived from the restored R7; every other
    /// field is taken verbatim so playback resumes sample-exact.
    pub fn import_state(&mut self, snapshot: &PsgSnapshot) {
        self.regs = snapshot.regs;
        self.tone_step = snapshot.tone_step;
        self.tone_pos = snapshot.tone_pos;
        self.noise.step = snapshot.noise_step;
        self.noise.pos = snapshot.noise_pos;
        self.noise.seed = snapshot.noise_seed;
        self.noise.level = snapshot.noise_level;
        self.envelope.step = snapshot.env_step;
        self.envelope.set_phase(snapshot.env_pos);
        self.envelope.shape = snapshot.env_shape & 0x0f;
        self.envelope_mask = snapshot.envelope_mask;
        self.fixed_volume = snapshot.fixed_volume;

        let ctrl = MixerControl::from_bits_truncate(self.regs[7]);
        for voice in 0..NUM_VOICES {
            self.tone_gate[voice] = gate(ctrl.contains(TONE_OFF[voice]));
            self.noise_gate[voice] = gate(ctrl.contains(NOISE_OFF[voice]));
        }
    }
}

/// Disabled sources pass permanently (all-ones); enabled ones gate on the
/// generator output (all-zeros contributes nothing to the OR).
#[inline]
const fn gate(disabled: bool) -> u32 {
    if disabled {
        0xffff
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::merge_voices;

    fn psg() -> Psg {
        Psg::new(&SoundConfig::default())
    }

    #[test]
    fn test_reset_register_state() {
        let mut chip = psg();
        chip.write_register(0, 0x55);
        chip.write_register(8, 0x0f);
        chip.reset();

        assert_eq!(chip.read_register(0), 0);
        assert_eq!(chip.read_register(8), 0);
        // Mixer: everything disabled, I/O direction bits dropped
        assert_eq!(chip.read_register(7), 0x3f);
    }

    #[test]
    fn test_register_write_masking() {
        let mut chip = psg();
        chip.write_register(1, 0xff);
        assert_eq!(chip.read_register(1), 0x0f);
        chip.write_register(6, 0xff);
        assert_eq!(chip.read_register(6), 0x1f);
        chip.write_register(13, 0xff);
        assert_eq!(chip.read_register(13), 0x0f);
        assert_eq!(chip.read_register(14), 0);
    }

    #[test]
    fn test_amplitude_modes_are_exclusive() {
        let mut chip = psg();

        chip.write_register(8, 0x0f);
        let snap = chip.export_state();
        assert_eq!(snap.fixed_volume & VOICE_A_MASK, 31);
        assert_eq!(snap.envelope_mask & VOICE_A_MASK, 0);

        chip.write_register(8, 0x10);
        let snap = chip.export_state();
        assert_eq!(snap.fixed_volume & VOICE_A_MASK, 0);
        assert_eq!(snap.envelope_mask & VOICE_A_MASK, VOICE_A_MASK);

        chip.write_register(8, 0x07);
        let snap = chip.export_state();
        assert_eq!(snap.fixed_volume & VOICE_A_MASK, VOLUME_4_TO_5[7]);
        assert_eq!(snap.envelope_mask & VOICE_A_MASK, 0);
    }

    #[test]
    fn test_sub_floor_period_pins_output_high() {
        let mut chip = psg();
        // Period 0 on voice A, tone A enabled, fixed volume 15: the voice
        // sits at a constant high level instead of oscillating.
        chip.write_register(0, 0);
        chip.write_register(1, 0);
        chip.write_register(7, 0x3e);
        chip.write_register(8, 0x0f);

        let expected = chip.dac_table().lookup(merge_voices(0, 0, 31));
        for _ in 0..500 {
            assert_eq!(chip.next_sample(), expected);
        }
    }

    #[test]
    fn test_noise_sub_floor_pins_level() {
        let mut chip = psg();
        chip.write_register(6, 10);
        for _ in 0..50 {
            chip.next_sample();
        }
        chip.write_register(6, 2);
        let snap = chip.export_state();
        assert_eq!(snap.noise_step, 0);
        assert_eq!(snap.noise_pos, 0);
        assert_eq!(snap.noise_level, 0xffff);
    }

    #[test]
    fn test_shape_write_resets_envelope_phase() {
        let mut chip = psg();
        chip.write_register(11, 0x10);
        chip.write_register(13, 0x0a);
        for _ in 0..200 {
            chip.next_sample();
        }
        assert!(chip.export_state().env_pos > 0);
        chip.write_register(13, 0x0a);
        assert_eq!(chip.export_state().env_pos, 0);
    }

    #[test]
    fn test_snapshot_round_trip_resumes_exactly() {
        let mut chip = psg();
        chip.write_register(0, 0x34);
        chip.write_register(1, 0x01);
        chip.write_register(6, 0x08);
        chip.write_register(7, 0x2e);
        chip.write_register(8, 0x10);
        chip.write_register(11, 0x40);
        chip.write_register(13, 0x0e);
        for _ in 0..1000 {
            chip.next_sample();
        }

        let snapshot = chip.export_state();
        let mut restored = psg();
        restored.import_state(&snapshot);

        for _ in 0..2000 {
            assert_eq!(chip.next_sample(), restored.next_sample());
        }
    }

    #[test]
    fn test_mixer_gates_from_register() {
        let mut chip = psg();
        chip.write_register(7, 0x15); // tone A+C off, noise B off
        assert_eq!(chip.tone_gate, [0xffff, 0, 0xffff]);
        assert_eq!(chip.noise_gate, [0, 0xffff, 0]);
    }
}
