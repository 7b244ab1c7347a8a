
use anyhow::{anyhow, Result};
use hound::{WavSpec, WavWriter};
use std::i16;

/// WAV file writer with silence detection
pub struct WavOutput {
    writer: Option<WavWriter<std::io::BufWriter<std::fs::File>>>,
    spec: WavSpec,
    silence_samples: usize,
    silence_threshold_samples: usize,
    silence_threshold_amplitude: f32,
}

impl WavOutput {
    /// Create a new WAV output file
    ///
    /// # Arguments
    /// * `filename` - Output WAV filename
    /// * `sample_rate` - Sample rate in Hz
    /// * `silence_duration_us` - Silence threshold in microseconds
    pub fn new(filename: &str, sample_rate: u32, silence_duration_us: u32) -> Result<Self> {
        let spec = WavSpec {
            channels: 1,           // Mono output
            sample_rate,
            bits_per_sample: 16,   // 16-bit PCM
            sample_format: hound::SampleFormat::Int,
        };

        let writer = WavWriter::create(filename, spec)
            .map_err(|e| anyhow!("Failed to create WAV file '{}': {}", filename, e))?;

        // Calculate silence threshold in samples
        let silence_threshold_samples = ((silence_duration_us as u64 * sample_rate as u64) / 1_000_000) as usize;

        Ok(Self {
            writer: Some(writer),
            spec,
            silence_samples: 0,
            silence_threshold_samples,
            silence_threshold_amplitude: 1.0 / 32768.0, // Very quiet threshold
        })
    }

    /// Write audio samples to the WAV file
    ///
    /// Returns `true` if silence threshold has been exceeded, `false` otherwise
    pub fn write_samples(&mut self, samples: &[f32]) -> Result<bool> {
        let writer = self.writer.as_mut()
            .ok_or_else(|| anyhow!("WAV writer is closed"))?;

        for &sample in samples {
            // Convert float sample to 16-bit PCM
            let pcm_sample = if sample.is_finite() {
                let clamped = sample.clamp(-1.0, 1.0);
                (clamped * 32767.0) as i16
            } else {
                0
            };

            writer.write_sample(pcm_sample)
                .map_err(|e| anyhow!("Failed to write WAV sample: {}", e))?;

            // Check for silence
            if sample.abs() <= self.silence_threshold_amplitude {
                self.silence_samples += 1;
            } else {
                self.silence_samples = 0; // Reset silence counter
            }

            // Check if we've exceeded the silence threshold
            if self.silence_samples >= self.silence_threshold_samples {
                return Ok(true); // Silence threshold exceeded
            }
        }

        Ok(false) // Still have audio
    }

    /// Finalize and close the WAV file
    pub fn finalize(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()
                .map_err(|e| anyhow!("Failed to finalize WAV file: {}", e))?;
        }
        Ok(())
    }

    /// Get the current sample rate
    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    /// Get silence threshold in samples
    pub fn silence_threshold_samples(&self) -> usize {
        self.silence_threshold_samples
    }

    /// Get current silence sample count
    pub fn current_silence_samples(&self) -> usize {
        self.silence_samples
    }

    /// Reset silence detection
    pub fn reset_silence_detection(&mut self) {
        self.silence_samples = 0;
    }
}

impl Drop for WavOutput {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            let _ = writer.finalize(); // Ignore errors in destructor
        }
    }
}

