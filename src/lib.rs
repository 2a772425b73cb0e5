//! Multilingual text-to-speech text encoding in pure Rust.
//!
//! A candle-based implementation of the text side of a multilingual
//! Tacotron-style TTS model: symbol alphabet, convolutional + bidirectional
//! LSTM encoders over padded batches, per-language encoders with output
//! masking, and the spectrogram front end used to prepare training targets.
//!
//! ## Architecture
//!
//! ```text
//! params.json → Params ──────────────┬──────────────────────────┐
//!                                    ↓                          ↓
//! text → Alphabet → ids [B, T] → TextEncoder               AudioProcessor
//!                                    │                          │
//!                  ┌─────────────────┼──────────────┐     wav → mel / linear
//!                  ↓                 ↓              ↓           ↓
//!               simple           separate       generated   Griffin-Lim
//!              Encoder         MultiEncoder      Encoder        ↓
//!                  └─────────────────┼──────────────┘          wav
//!                                    ↓
//!                      [B, T, encoder_dimension]
//! ```
//!
//! ## Modules
//!
//! - [`config`] — parameter registry with JSON load/save
//! - [`text`] — normalisation, alphabet, batch collation
//! - [`audio`] — WAV I/O, STFT / mel spectrograms, Griffin-Lim
//! - [`model`] — convolutional blocks, encoders, generated layers

pub mod audio;
pub mod config;
pub mod model;
pub mod text;

mod error;

pub use error::{Error, Result};
