//! WAV export
//!
//! Samples are quantized one at a time as they are written, so a segment
//! never exists twice in memory.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::info;

use crate::engine::buffer::{quantize_i24, SampleBuffer};
use crate::error::{EngineError, Result};

/// Export bit depths: 16/24-bit integer or 32-bit float
pub const SUPPORTED_BIT_DEPTHS: [u16; 3] = [16, 24, 32];

fn wav_spec(channels: u16, sample_rate: u32, bit_depth: u16) -> Result<WavSpec> {
    if !SUPPORTED_BIT_DEPTHS.contains(&bit_depth) {
        return Err(EngineError::invalid("bit_depth", bit_depth, "16, 24 or 32"));
    }
    Ok(WavSpec {
        channels,
        sample_rate,
        bits_per_sample: bit_depth,
        sample_format: if bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    })
}

/// Incremental WAV writer for segment-by-segment output
pub struct WavSink {
    writer: WavWriter<BufWriter<File>>,
    bit_depth: u16,
    channels: usize,
    frames: u64,
}

impl WavSink {
    /// Create a WAV file ready to receive segments
    ///
    /// # Arguments
    /// * `path` - Output file path
    /// * `channels` - Channel count of every segment
    /// * `sample_rate` - Sample rate in Hz
    /// * `bit_depth` - 16, 24 or 32
    pub fn create(path: &Path, channels: u16, sample_rate: u32, bit_depth: u16) -> Result<Self> {
        let spec = wav_spec(channels, sample_rate, bit_depth)?;
        Ok(Self {
            writer: WavWriter::create(path, spec)?,
            bit_depth,
            channels: channels as usize,
            frames: 0,
        })
    }

    /// Append a buffer's samples
    pub fn write(&mut self, buffer: &SampleBuffer) -> Result<()> {
        if buffer.channels() != self.channels {
            return Err(EngineError::invalid(
                "channels",
                buffer.channels(),
                &format!("{} channels", self.channels),
            ));
        }
        match self.bit_depth {
            16 => {
                for sample in buffer.pcm_i16() {
                    self.writer.write_sample(sample)?;
                }
            }
            24 => {
                for sample in buffer.interleaved().map(quantize_i24) {
                    self.writer.write_sample(sample)?;
                }
            }
            _ => {
                for sample in buffer.interleaved() {
                    self.writer.write_sample(sample.clamp(-1.0, 1.0))?;
                }
            }
        }
        self.frames += buffer.len() as u64;
        Ok(())
    }

    /// Flush the header and close the file
    pub fn finalize(self) -> Result<u64> {
        self.writer.finalize()?;
        Ok(self.frames)
    }
}

/// Write a whole buffer to a WAV file
pub fn write_wav(path: &Path, buffer: &SampleBuffer, bit_depth: u16) -> Result<()> {
    let mut sink = WavSink::create(path, buffer.channels() as u16, buffer.sample_rate, bit_depth)?;
    sink.write(buffer)?;
    let frames = sink.finalize()?;
    info!(
        "Wrote {} frames ({}-bit, {} ch) to {}",
        frames,
        bit_depth,
        buffer.channels(),
        path.display()
    );
    Ok(())
}
