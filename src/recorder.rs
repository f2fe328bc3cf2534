//! Sound recording sinks
//!
//! The engine notifies recorders of exactly what it produced each frame:
//! a [`SampleSink`] receives every ring-buffer region as it is written, a
//! [`RegisterSink`] receives one register snapshot per VBL. The built-in
//! implementations cover the two traditional capture formats - a WAV of
//! the mixed output and a planar register log replayable as a chiptune
//! dump - and host emulators can install their own sinks for anything
//! fancier.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::buffer::StereoFrame;
use crate::psg::NUM_REGISTERS;
use crate::Result;

/// Consumer of the mixed sample stream, region by region.
pub trait SampleSink: Send {
    /// Append freshly generated frames, in stream order.
    fn append(&mut self, frames: &[StereoFrame]) -> Result<()>;
    /// Flush and close the destination.
    fn finalize(&mut self) -> Result<()>;
}

/// Consumer of per-frame register snapshots.
pub trait RegisterSink: Send {
    /// Record one video frame's register state.
    ///
    /// `shape_written` is true when R13 was written during the frame;
    /// the envelope restarts on every R13 write, so a log format must
    /// distinguish "R13 is 0" from "R13 was not touched".
    fn frame(&mut self, regs: &[u8; NUM_REGISTERS], shape_written: bool) -> Result<()>;
    /// Flush and close the destination.
    fn finalize(&mut self) -> Result<()>;
}

/// WAV recorder for the mixed output (16-bit stereo).
pub struct WavRecorder {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
}

impl WavRecorder {
    /// Create the destination file and write the WAV header.
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        Ok(Self {
            writer: Some(hound::WavWriter::create(path, spec)?),
        })
    }
}

impl SampleSink for WavRecorder {
    fn append(&mut self, frames: &[StereoFrame]) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            for frame in frames {
                writer.write_sample(frame[0])?;
                writer.write_sample(frame[1])?;
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}

/// Register-log recorder in the planar `YM3!` layout.
///
/// Frames are collected in memory (the format stores all values of R0,
/// then all values of R1, and so on, so nothing can be written until the
/// frame count is known) and the file is produced on finalize. R13 is
/// logged as 0xff on frames where the shape register was not written, so
/// replay does not spuriously restart the envelope.
pub struct RegisterLog {
    path: PathBuf,
    frames: Vec<[u8; NUM_REGISTERS]>,
}

impl RegisterLog {
    /// Validate the destination by creating it, then start collecting.
    pub fn create(path: &Path) -> Result<Self> {
        // Fail now, not minutes into a session
        File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            frames: Vec::new(),
        })
    }

    /// Number of frames collected so far.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl RegisterSink for RegisterLog {
    fn frame(&mut self, regs: &[u8; NUM_REGISTERS], shape_written: bool) -> Result<()> {
        let mut snapshot = *regs;
        if !shape_written {
            snapshot[13] = 0xff;
        }
        self.frames.push(snapshot);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let mut out = BufWriter::new(File::create(&self.path)?);
        out.write_all(b"YM3!")?;
        for reg in 0..NUM_REGISTERS {
            for frame in &self.frames {
                out.write_all(&[frame[reg]])?;
            }
        }
        out.flush()?;
        self.frames.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_recorder_writes_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.wav");

        let mut recorder = WavRecorder::create(&path, 44_100).unwrap();
        recorder.append(&[[100, 100], [-100, -100]]).unwrap();
        recorder.finalize().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44_100);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![100, 100, -100, -100]);
    }

    #[test]
    fn test_register_log_planar_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.ym");

        let mut log = RegisterLog::create(&path).unwrap();
        let mut regs = [0u8; NUM_REGISTERS];
        regs[0] = 0x11;
        log.frame(&regs, false).unwrap();
        regs[0] = 0x22;
        regs[13] = 0x0a;
        log.frame(&regs, true).unwrap();
        assert_eq!(log.frame_count(), 2);
        log.finalize().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[..4], b"YM3!");
        // R0 values for both frames come first
        assert_eq!(&data[4..6], &[0x11, 0x22]);
        // R13: untouched frame logs 0xff, written frame logs the value
        let r13 = 4 + 13 * 2;
        assert_eq!(&data[r13..r13 + 2], &[0xff, 0x0a]);
    }
}
