//! Griffin-Lim phase reconstruction.
//!
//! Turns a linear spectrogram produced by
//! [`AudioProcessor::linear_spectrogram`] back into a waveform:
//! denormalise → dB → amplitude → `^griffin_lim_power` → alternate between
//! iSTFT and STFT, keeping the target magnitude and the estimated phase →
//! de-emphasis.

use rustfft::num_complex::Complex;

use super::spectrogram::AudioProcessor;
use crate::{Error, Result};

/// Griffin-Lim settings.
#[derive(Debug, Clone, Copy)]
pub struct GriffinLimConfig {
    pub iterations: usize,
    pub power: f64,
}

impl GriffinLimConfig {
    pub fn from_params(params: &crate::config::Params) -> Self {
        Self {
            iterations: params.griffin_lim_iters,
            power: params.griffin_lim_power,
        }
    }
}

/// Reconstruct a waveform from a `[n_fft/2 + 1][frames]` linear spectrogram.
pub fn griffin_lim(
    processor: &AudioProcessor,
    spectrogram: &[Vec<f64>],
    config: GriffinLimConfig,
) -> Result<Vec<f32>> {
    let num_bins = processor.config().n_fft / 2 + 1;
    if spectrogram.len() != num_bins {
        return Err(Error::Audio(format!(
            "expected {num_bins} frequency bins, got {}",
            spectrogram.len()
        )));
    }
    let num_frames = spectrogram[0].len();
    if let Some(k) = spectrogram.iter().position(|row| row.len() != num_frames) {
        return Err(Error::Audio(format!(
            "frequency bin {k} has {} frames, expected {num_frames}",
            spectrogram[k].len()
        )));
    }
    if num_frames < 2 {
        return Err(Error::Audio(
            "Griffin-Lim needs at least two frames".to_string(),
        ));
    }

    // [frames][bins] target magnitudes
    let magnitudes: Vec<Vec<f64>> = (0..num_frames)
        .map(|t| {
            (0..num_bins)
                .map(|k| processor.to_amplitude(spectrogram[k][t]).powf(config.power))
                .collect()
        })
        .collect();

    // Zero-phase start.
    let mut estimate: Vec<Vec<Complex<f64>>> = magnitudes
        .iter()
        .map(|frame| frame.iter().map(|&m| Complex::new(m, 0.0)).collect())
        .collect();

    for _ in 0..config.iterations {
        let signal = processor.istft(&estimate);
        let rebuilt = processor.stft(&signal)?;
        for (frame, (target, current)) in estimate
            .iter_mut()
            .zip(magnitudes.iter().zip(rebuilt.iter()))
        {
            for (slot, (&m, c)) in frame.iter_mut().zip(target.iter().zip(current.iter())) {
                let norm = c.norm();
                *slot = if norm > 1e-12 {
                    *c * (m / norm)
                } else {
                    Complex::new(m, 0.0)
                };
            }
        }
    }

    tracing::debug!(
        "Griffin-Lim: {} frames, {} iterations",
        num_frames,
        config.iterations
    );

    let signal = processor.istft(&estimate);
    Ok(processor.deemphasis(&signal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Params;

    #[test]
    fn reconstructs_expected_length() {
        let params = Params {
            griffin_lim_iters: 5,
            ..Params::default()
        };
        let processor = AudioProcessor::from_params(&params).unwrap();
        let samples: Vec<f32> = (0..275 * 20)
            .map(|i| (0.5 * (2.0 * std::f64::consts::PI * 440.0 * i as f64 / 22050.0).sin()) as f32)
            .collect();

        let spec = processor.linear_spectrogram(&samples).unwrap();
        let audio = griffin_lim(&processor, &spec, GriffinLimConfig::from_params(&params)).unwrap();

        assert_eq!(audio.len(), samples.len());
        assert!(audio.iter().all(|s| s.is_finite()));
        assert!(audio.iter().any(|s| s.abs() > 1e-3));
    }

    #[test]
    fn rejects_ragged_spectrogram() {
        let processor = AudioProcessor::from_params(&Params::default()).unwrap();
        let mut spec = vec![vec![0.0; 10]; 1025];
        spec[700].truncate(6);
        let result = griffin_lim(
            &processor,
            &spec,
            GriffinLimConfig {
                iterations: 1,
                power: 1.0,
            },
        );
        assert!(matches!(result, Err(Error::Audio(_))));
    }

    #[test]
    fn rejects_wrong_bin_count() {
        let processor = AudioProcessor::from_params(&Params::default()).unwrap();
        let spec = vec![vec![0.0; 10]; 80];
        let result = griffin_lim(
            &processor,
            &spec,
            GriffinLimConfig {
                iterations: 1,
                power: 1.0,
            },
        );
        assert!(matches!(result, Err(Error::Audio(_))));
    }
}
