//! Sound core configuration
//!
//! The configuration is consumed, not owned: the host emulator decides the
//! replay rate, the video refresh rate it schedules frames at, and which
//! DAC model to build. Everything here is plain data with serde derives so
//! the emulator's preference layer can persist it.

use serde::{Deserialize, Serialize};

/// YM2149 master clock on the Atari ST (2 MHz)
pub const YM_MASTER_CLOCK: u32 = 2_000_000;

/// CPU cycles per PAL video frame (8 MHz / 50 Hz, as counted by the
/// video timing)
pub const CYCLES_PER_FRAME_PAL: u32 = 160_256;

/// Strategy used to build the 32x32x32 volume conversion table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeMixing {
    /// Interpolate the 16x16x16 table measured on real hardware.
    ///
    /// Models the nonlinear loading between the three voice DACs.
    Measured,
    /// Mean of the three per-voice DAC output levels.
    Linear,
}

/// Configuration inputs for the sound core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundConfig {
    /// Audio output sample rate in Hz
    pub sample_rate: u32,
    /// Video refresh rate in Hz (frame scheduling granularity)
    pub frame_rate: u32,
    /// Emulated CPU cycles per video frame
    pub cycles_per_frame: u32,
    /// Volume table construction strategy
    pub mixing: VolumeMixing,
    /// Run the DC adjuster + low-pass filter over the output
    pub low_pass_filter: bool,
}

impl SoundConfig {
    /// Number of samples generated per video frame (e.g. 882 at
    /// 44.1 kHz / 50 Hz)
    #[inline]
    pub fn samples_per_frame(&self) -> u32 {
        (self.sample_rate + 35) / self.frame_rate
    }
}

impl Default for SoundConfig {
    /// PAL Atari ST defaults: 44.1 kHz output, 50 Hz VBL, linear mixing,
    /// no output filter.
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            frame_rate: 50,
            cycles_per_frame: CYCLES_PER_FRAME_PAL,
            mixing: VolumeMixing::Linear,
            low_pass_filter: false,
        }
    }
}
