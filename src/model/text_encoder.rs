//! Symbol embedding + encoder, assembled from [`Params`].
//!
//! ```text
//! ids [B, T] → Embedding(num_symbols, embedding_dimension) → encoder → [B, T, encoder_dimension]
//! ```
//!
//! `encoder_type` picks the encoder:
//! - `simple` — one [`Encoder`] for every language
//! - `separate` — a [`MultiEncoder`] with one encoder per language
//! - `generated` — one [`Encoder`] whose layers are generated per language

use std::path::Path;

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Embedding, VarBuilder};

use super::encoder::{Encoder, MultiEncoder};
use crate::config::{EncoderType, Params};
use crate::{Error, Result};

#[derive(Debug, Clone)]
enum EncoderBody {
    Simple(Encoder),
    Separate(MultiEncoder),
    Generated(Encoder),
}

/// Text encoder of the TTS model.
#[derive(Debug, Clone)]
pub struct TextEncoder {
    embedding: Embedding,
    body: EncoderBody,
}

impl TextEncoder {
    pub fn new(params: &Params, num_symbols: usize, vb: VarBuilder) -> Result<Self> {
        let embedding = candle_nn::embedding(
            num_symbols,
            params.embedding_dimension,
            vb.pp("_embedding"),
        )?;
        let config = params.encoder_config();
        let vb = vb.pp("_encoder");
        let body = match params.encoder_type {
            EncoderType::Simple => EncoderBody::Simple(Encoder::new(&config, vb)?),
            EncoderType::Separate => {
                EncoderBody::Separate(MultiEncoder::new(params.num_languages(), &config, false, vb)?)
            }
            EncoderType::Generated => EncoderBody::Generated(Encoder::new(&config, vb)?),
        };

        tracing::info!(
            "TextEncoder: {:?}, {} symbols, {} languages, {} → {}",
            params.encoder_type,
            num_symbols,
            params.num_languages(),
            params.embedding_dimension,
            params.encoder_dimension
        );

        Ok(Self { embedding, body })
    }

    /// Load weights from a safetensors checkpoint.
    pub fn load(
        params: &Params,
        num_symbols: usize,
        weights_path: &Path,
        device: &Device,
        dtype: DType,
    ) -> Result<Self> {
        tracing::info!("Loading text encoder weights from {:?}", weights_path);
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], dtype, device)
                .map_err(|e| Error::WeightLoad(format!("text encoder weights: {e}")))?
        };
        Self::new(params, num_symbols, vb)
            .map_err(|e| Error::WeightLoad(format!("text encoder init: {e}")))
    }

    pub fn output_dim(&self) -> usize {
        match &self.body {
            EncoderBody::Simple(encoder) | EncoderBody::Generated(encoder) => encoder.output_dim(),
            EncoderBody::Separate(multi) => multi.output_dim(),
        }
    }

    /// Inference forward pass.
    ///
    /// - `ids`: `[B, T]` u32 symbol ids, padded
    /// - `lengths`: `[B]` valid symbols per row
    /// - `langs`: `[B]` language tags; required by `separate` and `generated`
    pub fn forward(&self, ids: &Tensor, lengths: &Tensor, langs: Option<&Tensor>) -> Result<Tensor> {
        self.forward_t(ids, lengths, langs, false)
    }

    pub fn forward_t(
        &self,
        ids: &Tensor,
        lengths: &Tensor,
        langs: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor> {
        let x = self.embedding.forward(ids)?;
        match &self.body {
            EncoderBody::Simple(encoder) | EncoderBody::Generated(encoder) => {
                encoder.forward_t(&x, lengths, langs, train)
            }
            EncoderBody::Separate(multi) => {
                let langs = langs.ok_or_else(|| {
                    Error::InvalidInput("per-language encoders need language tags".to_string())
                })?;
                multi.forward_t(&x, lengths, langs, train)
            }
        }
    }
}
