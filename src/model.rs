//! Model components.
//!
//! ## Components
//!
//! - [`encoder`] — convolutional + BiLSTM [`encoder::Encoder`] and the per-language [`encoder::MultiEncoder`]
//! - [`layers`] — the convolutional block shared by all encoder variants
//! - [`generated`] — language-conditioned layers whose weights come from a generator network
//! - [`packing`] — variable-length handling for the bidirectional LSTM
//! - [`text_encoder`] — symbol embedding + encoder, assembled from [`crate::config::Params`]

pub mod encoder;
pub mod generated;
pub mod layers;
pub mod packing;
pub mod text_encoder;

pub use encoder::{Encoder, EncoderConfig, MultiEncoder};
pub use text_encoder::TextEncoder;
