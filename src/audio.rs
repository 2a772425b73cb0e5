//! Audio feature extraction.
//!
//! - [`wav`] — mono WAV read/write
//! - [`spectrogram`] — STFT, mel filterbank, dB conversion and normalisation
//! - [`griffin_lim`] — phase reconstruction from a linear spectrogram

pub mod griffin_lim;
pub mod spectrogram;
pub mod wav;

pub use spectrogram::AudioProcessor;
pub use wav::{read_wav, write_wav};
