//! Frame-paced sound engine
//!
//! Ties the chip to the emulated machine's timing: the CPU context feeds
//! register writes and elapsed cycles in, and once per video frame (plus
//! optionally mid-frame, after bursts of writes) the engine converts the
//! pending cycles into a sample count and synthesizes exactly that many
//! samples into the shared ring buffer.
//!
//! The cycle-to-sample conversion truncates, so the cycles actually
//! consumed are converted back and the remainder stays pending; over many
//! frames the sample stream tracks the cycle stream exactly.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use crate::buffer::{MixBuffer, StereoFrame};
use crate::config::SoundConfig;
use crate::psg::{Psg, PsgSnapshot};
use crate::recorder::{RegisterLog, RegisterSink, SampleSink, WavRecorder};
use crate::{Result, SoundError};

/// The frame scheduler around one [`Psg`].
pub struct SoundEngine {
    config: SoundConfig,
    psg: Psg,
    buffer: Arc<MixBuffer>,
    /// Emulated CPU cycles not yet converted into samples
    pending_cycles: u64,
    /// R13 was written since the last frame notification
    env_shape_written: bool,
    sample_sink: Option<Box<dyn SampleSink>>,
    register_sink: Option<Box<dyn RegisterSink>>,
    scratch: Vec<StereoFrame>,
}

impl SoundEngine {
    /// Create an engine (and its chip) for the given configuration.
    pub fn new(config: SoundConfig) -> Self {
        let psg = Psg::new(&config);
        let mut engine = Self {
            config,
            psg,
            buffer: Arc::new(MixBuffer::new()),
            pending_cycles: 0,
            env_shape_written: false,
            sample_sink: None,
            register_sink: None,
            scratch: Vec::new(),
        };
        engine.reset();
        engine
    }

    /// The ring buffer shared with the audio backend.
    pub fn buffer(&self) -> Arc<MixBuffer> {
        Arc::clone(&self.buffer)
    }

    /// The chip, for register reads and diagnostics.
    pub fn psg(&self) -> &Psg {
        &self.psg
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &SoundConfig {
        &self.config
    }

    /// Forward a hardware register write to the chip.
    ///
    /// Writes take effect immediately; call [`SoundEngine::update`]
    /// first if samples up to this point in time should still use the
    /// previous register values.
    pub fn write_register(&mut self, reg: u8, value: u8) {
        if reg == 13 {
            self.env_shape_written = true;
        }
        self.psg.write_register(reg, value);
    }

    /// Read back a register for the memory-mapped I/O layer.
    pub fn read_register(&self, reg: u8) -> u8 {
        self.psg.read_register(reg)
    }

    /// Account for emulated CPU time.
    pub fn advance_cycles(&mut self, cycles: u64) {
        self.pending_cycles += cycles;
    }

    /// Generate samples for the cycles accumulated so far.
    ///
    /// Safe to call at any point within a frame; generation is clamped
    /// to one frame's worth of samples and to the room left in the ring
    /// buffer, and unconverted cycle remainders carry forward.
    pub fn update(&mut self) {
        let count = self.generate();
        if count > 0 {
            self.feed_sample_sink(count);
        }
    }

    /// Per-VBL update: generate the frame's samples and notify the
    /// register-log recorder with the frame's register snapshot.
    pub fn update_frame(&mut self) {
        self.update();

        if let Some(sink) = self.register_sink.as_mut() {
            if let Err(err) = sink.frame(self.psg.registers(), self.env_shape_written) {
                log::warn!("register recording stopped: {err}");
                self.register_sink = None;
            }
        }
        self.env_shape_written = false;
    }

    /// Convert pending cycles to a sample count and synthesize into the
    /// ring buffer. Returns the number of samples written; when a sample
    /// sink is installed the written region is staged in `scratch`.
    ///
    /// The buffer lock spans the count computation and the generation,
    /// so the consumer always sees a consistent cursor pair; it is
    /// released on return by scope.
    fn generate(&mut self) -> usize {
        let samples_per_frame = self.config.samples_per_frame() as u64;
        let cycles_per_frame = self.config.cycles_per_frame as u64;

        let mut state = self.buffer.lock();

        let mut count =
            (self.pending_cycles * samples_per_frame / cycles_per_frame).min(samples_per_frame);

        // Give back the cycles the truncated count actually covers; the
        // remainder keeps the long-run timing exact.
        let used_cycles = count * cycles_per_frame / samples_per_frame;
        self.pending_cycles -= used_cycles;

        let room = state.free_len() as u64;
        if count > room {
            log::warn!("mix buffer full: dropping {} samples", count - room);
            count = room;
        }

        let start = state.write_index();
        for _ in 0..count {
            let sample = self.psg.next_sample();
            state.push([sample, sample]);
        }

        let count = count as usize;
        if count > 0 && self.sample_sink.is_some() {
            state.copy_region(start, count, &mut self.scratch);
        }

        count
    }

    fn feed_sample_sink(&mut self, count: usize) {
        if let Some(sink) = self.sample_sink.as_mut() {
            debug_assert_eq!(self.scratch.len(), count);
            if let Err(err) = sink.append(&self.scratch) {
                log::warn!("sample recording stopped: {err}");
                self.sample_sink = None;
            }
        }
    }

    /// Reinitialize the chip and clear the buffer, atomically with
    /// respect to the consumer.
    pub fn reset(&mut self) {
        let mut state = self.buffer.lock();
        state.clear();
        state.prefill_silence(self.config.samples_per_frame() as usize);
        self.pending_cycles = 0;
        self.env_shape_written = false;
        self.psg.reset();
    }

    /// Export the chip state for a save-state.
    pub fn export_state(&self) -> PsgSnapshot {
        self.psg.export_state()
    }

    /// Restore chip state from a save-state.
    pub fn import_state(&mut self, snapshot: &PsgSnapshot) {
        self.psg.import_state(snapshot);
    }

    /// Start recording to `destination`.
    ///
    /// The extension selects the format: `.wav` records the mixed sample
    /// stream, `.ym` records one register frame per VBL. Anything else
    /// (including a missing name) fails with
    /// [`SoundError::InvalidRecordingDestination`] and leaves playback
    /// untouched.
    pub fn begin_recording(&mut self, destination: &Path) -> Result<()> {
        match destination.extension().and_then(OsStr::to_str) {
            Some(ext) if ext.eq_ignore_ascii_case("wav") => {
                self.sample_sink = Some(Box::new(WavRecorder::create(
                    destination,
                    self.config.sample_rate,
                )?));
            }
            Some(ext) if ext.eq_ignore_ascii_case("ym") => {
                self.register_sink = Some(Box::new(RegisterLog::create(destination)?));
            }
            _ => {
                return Err(SoundError::InvalidRecordingDestination {
                    path: destination.display().to_string(),
                });
            }
        }

        log::debug!("recording to {}", destination.display());
        Ok(())
    }

    /// Install a custom sample recorder in place of the built-in one.
    pub fn set_sample_sink(&mut self, sink: Box<dyn SampleSink>) {
        self.sample_sink = Some(sink);
    }

    /// Install a custom register recorder in place of the built-in one.
    pub fn set_register_sink(&mut self, sink: Box<dyn RegisterSink>) {
        self.register_sink = Some(sink);
    }

    /// Finish any active recording and flush it to disk.
    pub fn end_recording(&mut self) -> Result<()> {
        if let Some(mut sink) = self.sample_sink.take() {
            sink.finalize()?;
        }
        if let Some(mut sink) = self.register_sink.take() {
            sink.finalize()?;
        }
        Ok(())
    }

    /// Is a recording session active?
    pub fn is_recording(&self) -> bool {
        self.sample_sink.is_some() || self.register_sink.is_some()
    }
}

impl std::fmt::Debug for SoundEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundEngine")
            .field("config", &self.config)
            .field("pending_cycles", &self.pending_cycles)
            .field("recording", &self.is_recording())
            .finish_non_exhaustive()
    }
}
