//! YM2149 PSG sound core for Atari ST emulation
//!
//! A cycle-accurate emulation of the Yamaha YM2149 Programmable Sound
//! Generator as wired into the Atari ST: a stream of hardware register
//! writes, timed against the emulated CPU's cycle counter, becomes a
//! continuous signed sample stream suitable for live playback and for
//! replay-format recording.
//!
//! The crate is organised around two entry points:
//!
//! - [`Psg`] is the chip itself: the 14-byte register file, the three
//!   tone voices, the noise LFSR, the envelope generator and the DAC
//!   volume table. [`Psg::next_sample`] produces one signed sample.
//! - [`SoundEngine`] wraps a [`Psg`] with frame-paced scheduling: once
//!   per video frame it converts elapsed CPU cycles into a sample count
//!   and fills the shared [`MixBuffer`] that the audio backend drains
//!   from its callback thread.
//!
//! # Quick start
//! ```
//! use st_sound::{SoundConfig, SoundEngine};
//!
//! let config = SoundConfig::default();
//! let mut engine = SoundEngine::new(config.clone());
//!
//! // Program a tone on voice A at fixed volume 15
//! engine.write_register(0, 0x00); // Period low
//! engine.write_register(1, 0x01); // Period high
//! engine.write_register(8, 0x0F); // Volume
//! engine.write_register(7, 0x3E); // Mixer: tone A on
//!
//! // One PAL frame's worth of CPU time elapses, then the VBL fires
//! engine.advance_cycles(config.cycles_per_frame as u64);
//! engine.update_frame();
//!
//! let mut out = vec![[0i16; 2]; 1024];
//! let n = engine.buffer().read_samples(&mut out);
//! assert!(n > 0);
//! ```
//!
//! The audio device callback, save-state persistence and replay-file
//! encoders live in the host emulator; this crate only exposes the seams
//! they plug into ([`MixBuffer::read_samples`], [`PsgSnapshot`],
//! [`SampleSink`]/[`RegisterSink`]).

#![warn(missing_docs)]

pub mod buffer;
pub mod config;
pub mod dc_filter;
pub mod engine;
pub mod envelope;
pub mod noise;
pub mod psg;
pub mod recorder;
pub mod steps;
pub mod tables;
pub mod volume;

/// Error type for sound core operations
///
/// Synthesis itself is infallible: register writes are pre-masked and all
/// table indices are range-guaranteed by construction. The only fallible
/// surface is recording-session setup.
#[derive(thiserror::Error, Debug)]
pub enum SoundError {
    /// The recording destination is missing or matches no supported format
    #[error("invalid recording destination `{path}`: expected a .ym or .wav file")]
    InvalidRecordingDestination {
        /// The offending destination path
        path: String,
    },

    /// IO error from the filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WAV encoding error
    #[error("WAV write error: {0}")]
    Wav(#[from] hound::Error),
}

/// Result type for sound core operations
pub type Result<T> = std::result::Result<T, SoundError>;

// Public API exports
pub use buffer::{MixBuffer, StereoFrame, MIX_BUFFER_LEN};
pub use config::{SoundConfig, VolumeMixing, YM_MASTER_CLOCK};
pub use engine::SoundEngine;
pub use psg::{MixerControl, Psg, PsgSnapshot};
pub use recorder::{RegisterSink, SampleSink};
pub use volume::DacTable;
