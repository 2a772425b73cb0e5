//! Linear and mel spectrograms via STFT + mel filterbank.
//!
//! All settings come from [`Params`]:
//! - Window: Hann of `stft_window_ms`, zero-padded to `num_fft` and centered
//! - Hop: `stft_shift_ms`
//! - Padding: reflect by `num_fft / 2` on both sides (librosa `center=True`)
//! - Mel scale/norm: Slaney, `num_mels` bins over `[0, sample_rate / 2]`
//! - Magnitude → dB: `20·log10(max(1e-5, x)) − reference_spectrogram_db`
//! - Optional normalisation into `[−scaling, scaling]` or `[0, scaling]`

use std::sync::Arc;

use candle_core::{Device, Tensor};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::Params;
use crate::{Error, Result};

/// Spectrogram settings resolved from [`Params`].
#[derive(Debug, Clone)]
pub struct SpectrogramConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub win_length: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub f_min: f64,
    pub f_max: f64,
    pub reference_db: f64,
    pub normalize: bool,
    pub symmetric: bool,
    pub scaling: f64,
    pub min_db: f64,
    /// Pre-emphasis coefficient, `None` when disabled.
    pub preemphasis: Option<f64>,
}

impl SpectrogramConfig {
    pub fn from_params(params: &Params) -> Self {
        Self {
            sample_rate: params.sample_rate,
            n_fft: params.num_fft,
            win_length: params.stft_window_length(),
            hop_length: params.stft_shift_length(),
            n_mels: params.num_mels,
            f_min: 0.0,
            f_max: params.sample_rate as f64 / 2.0,
            reference_db: params.reference_spectrogram_db,
            normalize: params.normalize_spectrogram,
            symmetric: params.normalize_symetric,
            scaling: params.normalize_scaling,
            min_db: params.normalize_minimal_db,
            preemphasis: params.use_preemphasis.then_some(params.preemphasis),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.n_fft == 0 || self.hop_length == 0 || self.win_length == 0 {
            return Err(Error::Config(format!(
                "STFT sizes must be positive (n_fft={}, win={}, hop={})",
                self.n_fft, self.win_length, self.hop_length
            )));
        }
        if self.n_fft % 2 != 0 {
            return Err(Error::Config(format!(
                "num_fft must be even, got {}",
                self.n_fft
            )));
        }
        if self.win_length > self.n_fft {
            return Err(Error::Config(format!(
                "STFT window ({}) is longer than num_fft ({})",
                self.win_length, self.n_fft
            )));
        }
        if self.min_db >= 0.0 {
            return Err(Error::Config(format!(
                "normalize_minimal_db must be negative, got {}",
                self.min_db
            )));
        }
        Ok(())
    }
}

/// Spectrogram processor.
///
/// Pre-computes the padded Hann window, FFT plans, and mel filterbank on
/// construction. Spectrograms are laid out `[bins][frames]`.
pub struct AudioProcessor {
    config: SpectrogramConfig,
    window: Vec<f64>,
    filterbank: Vec<Vec<f64>>,
    fft: Arc<dyn Fft<f64>>,
    ifft: Arc<dyn Fft<f64>>,
}

impl AudioProcessor {
    pub fn from_params(params: &Params) -> Result<Self> {
        Self::new(SpectrogramConfig::from_params(params))
    }

    pub fn new(config: SpectrogramConfig) -> Result<Self> {
        config.validate()?;
        let window = padded_hann_window(config.win_length, config.n_fft);
        let filterbank = mel_filterbank(
            config.n_fft,
            config.n_mels,
            config.sample_rate,
            config.f_min,
            config.f_max,
        );
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.n_fft);
        let ifft = planner.plan_fft_inverse(config.n_fft);

        tracing::debug!(
            "AudioProcessor: n_fft={} win={} hop={} mels={}",
            config.n_fft,
            config.win_length,
            config.hop_length,
            config.n_mels
        );

        Ok(Self {
            config,
            window,
            filterbank,
            fft,
            ifft,
        })
    }

    pub fn config(&self) -> &SpectrogramConfig {
        &self.config
    }

    /// Number of STFT frames produced for `num_samples` input samples.
    pub fn num_frames(&self, num_samples: usize) -> usize {
        1 + num_samples / self.config.hop_length
    }

    /// Apply the pre-emphasis filter `y[n] = x[n] − a·x[n−1]` when enabled.
    pub fn preemphasis(&self, samples: &[f32]) -> Vec<f32> {
        match self.config.preemphasis {
            Some(a) => {
                let a = a as f32;
                let mut prev = 0.0f32;
                samples
                    .iter()
                    .map(|&x| {
                        let y = x - a * prev;
                        prev = x;
                        y
                    })
                    .collect()
            }
            None => samples.to_vec(),
        }
    }

    /// Invert [`AudioProcessor::preemphasis`].
    pub fn deemphasis(&self, samples: &[f32]) -> Vec<f32> {
        match self.config.preemphasis {
            Some(a) => {
                let a = a as f32;
                let mut prev = 0.0f32;
                samples
                    .iter()
                    .map(|&x| {
                        prev = x + a * prev;
                        prev
                    })
                    .collect()
            }
            None => samples.to_vec(),
        }
    }

    /// Linear magnitude spectrogram in (normalised) dB, `[n_fft/2 + 1][frames]`.
    pub fn linear_spectrogram(&self, samples: &[f32]) -> Result<Vec<Vec<f64>>> {
        let magnitudes = self.magnitudes(samples)?;
        let num_bins = self.config.n_fft / 2 + 1;
        let mut spec = vec![vec![0.0; magnitudes.len()]; num_bins];
        for (frame_idx, frame) in magnitudes.iter().enumerate() {
            for (bin_idx, &m) in frame.iter().enumerate() {
                spec[bin_idx][frame_idx] = self.compress(m);
            }
        }
        Ok(spec)
    }

    /// Mel spectrogram in (normalised) dB, `[n_mels][frames]`.
    pub fn mel_spectrogram(&self, samples: &[f32]) -> Result<Vec<Vec<f64>>> {
        let magnitudes = self.magnitudes(samples)?;
        let mut spec = vec![vec![0.0; magnitudes.len()]; self.config.n_mels];
        for (frame_idx, frame) in magnitudes.iter().enumerate() {
            for (mel_idx, filter) in self.filterbank.iter().enumerate() {
                let sum: f64 = filter
                    .iter()
                    .zip(frame.iter())
                    .filter(|(w, _)| **w > 0.0)
                    .map(|(w, m)| w * m)
                    .sum();
                spec[mel_idx][frame_idx] = self.compress(sum);
            }
        }
        Ok(spec)
    }

    /// Map dB values (already shifted by the reference level) into the
    /// configured normalised range, clipping outliers.
    pub fn normalize(&self, db: f64) -> f64 {
        let c = &self.config;
        let ratio = (db - c.min_db) / -c.min_db;
        if c.symmetric {
            (2.0 * c.scaling * ratio - c.scaling).clamp(-c.scaling, c.scaling)
        } else {
            (c.scaling * ratio).clamp(0.0, c.scaling)
        }
    }

    /// Invert [`AudioProcessor::normalize`] (up to clipping).
    pub fn denormalize(&self, value: f64) -> f64 {
        let c = &self.config;
        let ratio = if c.symmetric {
            (value.clamp(-c.scaling, c.scaling) + c.scaling) / (2.0 * c.scaling)
        } else {
            value.clamp(0.0, c.scaling) / c.scaling
        };
        ratio * -c.min_db + c.min_db
    }

    /// Convert a spectrogram value back to linear amplitude.
    pub fn to_amplitude(&self, value: f64) -> f64 {
        let db = if self.config.normalize {
            self.denormalize(value)
        } else {
            value
        };
        db_to_amplitude(db + self.config.reference_db)
    }

    /// `[bins][frames]` spectrogram as an f32 `[bins, frames]` tensor.
    pub fn to_tensor(spec: &[Vec<f64>], device: &Device) -> Result<Tensor> {
        let rows = spec.len();
        let cols = spec.first().map_or(0, Vec::len);
        let data: Vec<f32> = spec
            .iter()
            .flat_map(|row| row.iter().map(|&v| v as f32))
            .collect();
        Ok(Tensor::from_vec(data, (rows, cols), device)?)
    }

    fn compress(&self, magnitude: f64) -> f64 {
        let db = amplitude_to_db(magnitude) - self.config.reference_db;
        if self.config.normalize {
            self.normalize(db)
        } else {
            db
        }
    }

    fn magnitudes(&self, samples: &[f32]) -> Result<Vec<Vec<f64>>> {
        let emphasized = self.preemphasis(samples);
        let frames = self.stft(&emphasized)?;
        Ok(frames
            .iter()
            .map(|frame| frame.iter().map(|c| c.norm()).collect())
            .collect())
    }

    /// Centered short-time Fourier transform, one-sided.
    ///
    /// Each inner vec has `n_fft/2 + 1` elements.
    pub(crate) fn stft(&self, samples: &[f32]) -> Result<Vec<Vec<Complex<f64>>>> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let num_bins = n_fft / 2 + 1;
        let pad = n_fft / 2;
        if samples.len() <= pad {
            return Err(Error::Audio(format!(
                "signal of {} samples is too short for num_fft={n_fft}",
                samples.len()
            )));
        }

        let signal: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        let padded = reflect_pad(&signal, pad, pad);
        let num_frames = self.num_frames(samples.len());

        let mut frames = Vec::with_capacity(num_frames);
        for frame_idx in 0..num_frames {
            let start = frame_idx * hop;
            let mut buffer: Vec<Complex<f64>> = (0..n_fft)
                .map(|i| Complex::new(padded[start + i] * self.window[i], 0.0))
                .collect();
            self.fft.process(&mut buffer);
            buffer.truncate(num_bins);
            frames.push(buffer);
        }

        Ok(frames)
    }

    /// Inverse of [`AudioProcessor::stft`] by weighted overlap-add.
    ///
    /// `frames` holds one-sided spectra; returns `(frames - 1) * hop` samples.
    pub(crate) fn istft(&self, frames: &[Vec<Complex<f64>>]) -> Vec<f32> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let pad = n_fft / 2;
        let total = n_fft + hop * frames.len().saturating_sub(1);

        let mut signal = vec![0.0f64; total];
        let mut norm = vec![0.0f64; total];
        let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];

        for (frame_idx, half) in frames.iter().enumerate() {
            // Rebuild the conjugate-symmetric full spectrum.
            for (k, slot) in buffer.iter_mut().enumerate() {
                *slot = if k < half.len() {
                    half[k]
                } else {
                    half[n_fft - k].conj()
                };
            }
            self.ifft.process(&mut buffer);

            let start = frame_idx * hop;
            for i in 0..n_fft {
                let w = self.window[i];
                signal[start + i] += buffer[i].re / n_fft as f64 * w;
                norm[start + i] += w * w;
            }
        }

        let len = hop * frames.len().saturating_sub(1);
        (pad..pad + len)
            .map(|i| {
                if norm[i] > 1e-8 {
                    (signal[i] / norm[i]) as f32
                } else {
                    signal[i] as f32
                }
            })
            .collect()
    }
}

/// `20·log10(max(1e-5, x))`.
pub fn amplitude_to_db(amplitude: f64) -> f64 {
    20.0 * amplitude.max(1e-5).log10()
}

/// `10^(db / 20)`.
pub fn db_to_amplitude(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Periodic Hann window of `win_length`, zero-padded and centered in `n_fft`.
fn padded_hann_window(win_length: usize, n_fft: usize) -> Vec<f64> {
    let offset = (n_fft - win_length) / 2;
    let mut window = vec![0.0; n_fft];
    for i in 0..win_length {
        let phase = 2.0 * std::f64::consts::PI * i as f64 / win_length as f64;
        window[offset + i] = 0.5 * (1.0 - phase.cos());
    }
    window
}

/// Reflect-pad a signal on both sides.
fn reflect_pad(signal: &[f64], pad_left: usize, pad_right: usize) -> Vec<f64> {
    let len = signal.len();
    let mut padded = Vec::with_capacity(pad_left + len + pad_right);

    // Left reflection: signal[pad_left], signal[pad_left-1], ..., signal[1]
    for i in (1..=pad_left).rev() {
        padded.push(signal[i.min(len - 1)]);
    }

    padded.extend_from_slice(signal);

    // Right reflection: signal[len-2], signal[len-3], ...
    for i in 0..pad_right {
        let idx = len.saturating_sub(2 + i);
        padded.push(signal[idx]);
    }

    padded
}

/// Build a Slaney-normalized mel filterbank.
///
/// Returns `n_mels` filters, each with `n_fft/2 + 1` weights.
fn mel_filterbank(
    n_fft: usize,
    n_mels: usize,
    sample_rate: u32,
    f_min: f64,
    f_max: f64,
) -> Vec<Vec<f64>> {
    let num_bins = n_fft / 2 + 1;
    let sr = sample_rate as f64;

    let mel_min = hz_to_mel_slaney(f_min);
    let mel_max = hz_to_mel_slaney(f_max);
    let hz_points: Vec<f64> = (0..=(n_mels + 1))
        .map(|i| mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64)
        .map(mel_to_hz_slaney)
        .collect();

    let bin_freqs: Vec<f64> = (0..num_bins)
        .map(|i| sr * i as f64 / n_fft as f64)
        .collect();

    (0..n_mels)
        .map(|i| {
            let (f_left, f_center, f_right) = (hz_points[i], hz_points[i + 1], hz_points[i + 2]);
            let norm = 2.0 / (f_right - f_left);
            bin_freqs
                .iter()
                .map(|&f| {
                    if f < f_left || f > f_right {
                        0.0
                    } else if f <= f_center {
                        norm * (f - f_left) / (f_center - f_left)
                    } else {
                        norm * (f_right - f) / (f_right - f_center)
                    }
                })
                .collect()
        })
        .collect()
}

/// Hz → Slaney mel: linear below 1 kHz, logarithmic above.
fn hz_to_mel_slaney(hz: f64) -> f64 {
    if hz < 1000.0 {
        3.0 * hz / 200.0
    } else {
        15.0 + 27.0 * (hz / 1000.0).ln() / (6.4_f64).ln()
    }
}

fn mel_to_hz_slaney(mel: f64) -> f64 {
    if mel < 15.0 {
        200.0 * mel / 3.0
    } else {
        1000.0 * ((mel - 15.0) * (6.4_f64).ln() / 27.0).exp()
    }
}
