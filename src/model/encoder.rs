//! Convolutional + bidirectional LSTM text encoder.
//!
//! ## Architecture
//!
//! ```text
//! x [B, T, input_dim]
//!   → transpose → [B, input_dim, T]
//!   → ConvBlock(input_dim → output_dim, k) → (num_blocks - 1) × ConvBlock(output_dim → output_dim, k)
//!   → transpose → [B, T, output_dim]
//!   → BiLSTM(output_dim → 2 × output_dim/2) over the valid frames of each row
//!   → [B, T, output_dim], zero beyond each row's length
//! ```
//!
//! [`MultiEncoder`] holds one [`Encoder`] per language and assembles each
//! output row from the encoder matching that row's language tag.
//!
//! ## Weight key paths
//!
//! ```text
//! _convs.{i}._block.{1,2}.*                     — ConvBlock i
//! _lstm.{weight,bias}_{ih,hh}_l0[_reverse]      — standard BiLSTM
//! _lstm.{forward,reverse}._{bottleneck,generator}.*   — generated BiLSTM
//! _embedding.weight                             — language embedding (generated only)
//! _encoders.{l}.*                               — MultiEncoder, encoder for language l
//! ```

use candle_core::{DType, Device, Tensor};
use candle_nn::rnn::{Direction, LSTM, LSTMConfig, RNN};
use candle_nn::{Activation, VarBuilder};

use super::generated::{GeneratedLstm, GeneratorConfig, LanguageEmbedding};
use super::layers::ConvBlock;
use super::packing;
use crate::{Error, Result};

/// Encoder hyper-parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    /// Size of the input features (symbol embedding size).
    pub input_dim: usize,
    /// Channels of the convolutional blocks and of the BiLSTM output; even.
    pub output_dim: usize,
    /// Number of convolutional blocks, at least one.
    pub num_blocks: usize,
    pub kernel_size: usize,
    /// Dropout rate after each convolutional block.
    pub dropout: f64,
    /// Generate block and LSTM weights from a language embedding.
    pub generator: Option<GeneratorConfig>,
    /// Build blocks `1..num_blocks` as one module applied repeatedly
    /// (tied weights) instead of independent blocks.
    pub share_block_weights: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            input_dim: 512,
            output_dim: 512,
            num_blocks: 3,
            kernel_size: 5,
            dropout: 0.5,
            generator: None,
            share_block_weights: false,
        }
    }
}

impl EncoderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_blocks == 0 {
            return Err(Error::Config(
                "there must be at least one convolutional block in the encoder".to_string(),
            ));
        }
        if self.output_dim % 2 != 0 {
            return Err(Error::Config(format!(
                "bidirectional LSTM output dimension must be divisible by 2, got {}",
                self.output_dim
            )));
        }
        if self.kernel_size == 0 {
            return Err(Error::Config("kernel size must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Recurrent {
    Standard { forward: LSTM, backward: LSTM },
    Generated(GeneratedLstm),
}

impl Recurrent {
    fn run(
        &self,
        direction: Direction,
        x: &Tensor,
        language_embedding: Option<&Tensor>,
    ) -> Result<Tensor> {
        match self {
            Recurrent::Standard { forward, backward } => {
                let lstm = match direction {
                    Direction::Forward => forward,
                    Direction::Backward => backward,
                };
                let states = lstm.seq(x)?;
                Ok(lstm.states_to_tensor(&states)?)
            }
            Recurrent::Generated(lstm) => {
                let embedding = language_embedding.ok_or_else(|| {
                    Error::InvalidInput("generated LSTM needs language embeddings".to_string())
                })?;
                lstm.run(direction, x, embedding)
            }
        }
    }
}

/// Convolutional blocks followed by a bidirectional LSTM.
#[derive(Debug, Clone)]
pub struct Encoder {
    convs: Vec<ConvBlock>,
    lstm: Recurrent,
    language_embedding: Option<LanguageEmbedding>,
    config: EncoderConfig,
}

impl Encoder {
    pub fn new(config: &EncoderConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let generator = config.generator.as_ref();
        let block = |in_dim: usize, vb: VarBuilder| {
            ConvBlock::new(
                in_dim,
                config.output_dim,
                config.kernel_size,
                config.dropout,
                Activation::Relu,
                generator,
                vb,
            )
        };

        let mut convs = Vec::with_capacity(config.num_blocks);
        convs.push(block(config.input_dim, vb.pp("_convs.0"))?);
        if config.share_block_weights {
            if config.num_blocks > 1 {
                let shared = block(config.output_dim, vb.pp("_convs.1"))?;
                convs.extend(std::iter::repeat_n(shared, config.num_blocks - 1));
            }
        } else {
            for i in 1..config.num_blocks {
                convs.push(block(config.output_dim, vb.pp(format!("_convs.{i}")))?);
            }
        }

        let hidden_dim = config.output_dim / 2;
        let lstm = match generator {
            Some(generator) => Recurrent::Generated(GeneratedLstm::new(
                config.output_dim,
                hidden_dim,
                generator,
                vb.pp("_lstm"),
            )?),
            None => {
                let lstm_config = |direction| LSTMConfig {
                    direction,
                    ..Default::default()
                };
                Recurrent::Standard {
                    forward: LSTM::new(
                        config.output_dim,
                        hidden_dim,
                        lstm_config(Direction::Forward),
                        vb.pp("_lstm"),
                    )?,
                    backward: LSTM::new(
                        config.output_dim,
                        hidden_dim,
                        lstm_config(Direction::Backward),
                        vb.pp("_lstm"),
                    )?,
                }
            }
        };

        let language_embedding = generator
            .map(|g| LanguageEmbedding::new(g, vb.pp("_embedding")))
            .transpose()?;

        tracing::debug!(
            "Encoder: {} → {}, {} blocks (k={}, shared={}), generated={}",
            config.input_dim,
            config.output_dim,
            config.num_blocks,
            config.kernel_size,
            config.share_block_weights,
            generator.is_some()
        );

        Ok(Self {
            convs,
            lstm,
            language_embedding,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn output_dim(&self) -> usize {
        self.config.output_dim
    }

    /// Inference forward pass.
    ///
    /// - `x`: `[B, T, input_dim]` input embeddings
    /// - `lengths`: `[B]` valid frames per row, each in `1..=T`
    /// - `langs`: `[B]` language tags; required by generated encoders,
    ///   ignored otherwise
    ///
    /// Returns `[B, T, output_dim]`, zero beyond each row's length.
    pub fn forward(&self, x: &Tensor, lengths: &Tensor, langs: Option<&Tensor>) -> Result<Tensor> {
        self.forward_t(x, lengths, langs, false)
    }

    /// Forward pass; `train` enables dropout and batch statistics.
    pub fn forward_t(
        &self,
        x: &Tensor,
        lengths: &Tensor,
        langs: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor> {
        let (batch, time, channels) = x.dims3()?;
        if channels != self.config.input_dim {
            return Err(Error::InvalidInput(format!(
                "expected {} input channels, got {channels}",
                self.config.input_dim
            )));
        }
        let lengths = packing::lengths_to_vec(lengths)?;
        if lengths.len() != batch {
            return Err(Error::InvalidInput(format!(
                "{} lengths for a batch of {batch}",
                lengths.len()
            )));
        }
        packing::validate_lengths(&lengths, time)?;

        let language_embedding = match &self.language_embedding {
            Some(embedding) => {
                let langs = langs.ok_or_else(|| {
                    Error::InvalidInput("generated encoder needs language tags".to_string())
                })?;
                Some(embedding.forward(langs)?)
            }
            None => None,
        };

        // [B, T, C] → [B, C, T] for the convolutions
        let mut h = x.transpose(1, 2)?;
        for conv in &self.convs {
            h = conv.forward_t(&h, language_embedding.as_ref(), train)?;
        }
        let h = h.transpose(1, 2)?.contiguous()?;

        packing::bidirectional(&h, &lengths, |direction, input| {
            self.lstm.run(direction, input, language_embedding.as_ref())
        })
    }
}

/// One encoder per language with output masking.
#[derive(Debug, Clone)]
pub struct MultiEncoder {
    encoders: Vec<Encoder>,
}

impl MultiEncoder {
    /// Build `num_langs` encoders from one configuration.
    ///
    /// With `share_encoders` every language uses the same encoder instance
    /// (one set of weights under `_encoders.0`); otherwise each language gets
    /// an independently initialised encoder under `_encoders.{l}`.
    pub fn new(
        num_langs: usize,
        config: &EncoderConfig,
        share_encoders: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        if num_langs == 0 {
            return Err(Error::Config(
                "multi-encoder needs at least one language".to_string(),
            ));
        }
        if let Some(generator) = &config.generator
            && generator.num_langs < num_langs
        {
            return Err(Error::Config(format!(
                "generated encoders embed {} languages, multi-encoder has {num_langs}",
                generator.num_langs
            )));
        }
        let encoders = if share_encoders {
            let shared = Encoder::new(config, vb.pp("_encoders.0"))?;
            vec![shared; num_langs]
        } else {
            (0..num_langs)
                .map(|l| Encoder::new(config, vb.pp(format!("_encoders.{l}"))))
                .collect::<Result<Vec<_>>>()?
        };
        tracing::debug!(
            "MultiEncoder: {} languages (shared={})",
            num_langs,
            share_encoders
        );
        Ok(Self { encoders })
    }

    pub fn num_langs(&self) -> usize {
        self.encoders.len()
    }

    pub fn output_dim(&self) -> usize {
        self.encoders[0].output_dim()
    }

    /// Encoder used for language `lang`.
    pub fn encoder(&self, lang: usize) -> Option<&Encoder> {
        self.encoders.get(lang)
    }

    /// Inference forward pass; see [`MultiEncoder::forward_t`].
    pub fn forward(&self, x: &Tensor, lengths: &Tensor, langs: &Tensor) -> Result<Tensor> {
        self.forward_t(x, lengths, langs, false)
    }

    /// Encode the batch with every encoder whose language occurs in `langs`
    /// and keep, per row, the output of that row's encoder.
    ///
    /// Rows tagged outside `0..num_langs` are all-zero.
    pub fn forward_t(
        &self,
        x: &Tensor,
        lengths: &Tensor,
        langs: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        let (batch, time, _) = x.dims3()?;
        let tags = langs.to_dtype(DType::I64)?.to_vec1::<i64>()?;
        if tags.len() != batch {
            return Err(Error::InvalidInput(format!(
                "{} language tags for a batch of {batch}",
                tags.len()
            )));
        }

        let mut output: Option<Tensor> = None;
        for (lang, encoder) in self.encoders.iter().enumerate() {
            let rows: Vec<u8> = tags.iter().map(|&t| u8::from(t == lang as i64)).collect();
            if !rows.contains(&1) {
                continue;
            }
            // Rows of other languages are discarded, so tag the whole batch as `lang`.
            let tags = Tensor::full(lang as u32, batch, x.device())?;
            let encoded = encoder.forward_t(x, lengths, Some(&tags), train)?;
            let mask = row_mask(rows, x.device())?.broadcast_as(encoded.shape())?;
            let base = match output.take() {
                Some(previous) => previous,
                None => encoded.zeros_like()?,
            };
            output = Some(mask.where_cond(&encoded, &base)?);
        }

        match output {
            Some(output) => Ok(output),
            None => {
                tracing::debug!("MultiEncoder: no row matched a known language");
                Ok(Tensor::zeros(
                    (batch, time, self.output_dim()),
                    x.dtype(),
                    x.device(),
                )?)
            }
        }
    }
}

/// `[B]` row selection → `[B, 1, 1]` u8 mask.
fn row_mask(rows: Vec<u8>, device: &Device) -> Result<Tensor> {
    let batch = rows.len();
    Ok(Tensor::from_vec(rows, (batch, 1, 1), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::IndexOp;
    use candle_nn::VarMap;

    fn small_config() -> EncoderConfig {
        EncoderConfig {
            input_dim: 6,
            output_dim: 8,
            num_blocks: 3,
            kernel_size: 5,
            dropout: 0.5,
            generator: None,
            share_block_weights: false,
        }
    }

    fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
        (a - b)
            .unwrap()
            .abs()
            .unwrap()
            .flatten_all()
            .unwrap()
            .max(0)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap()
    }

    fn batch(device: &Device) -> (Tensor, Tensor) {
        let x = Tensor::randn(0f32, 1.0, (3, 7, 6), device).unwrap();
        let lengths = Tensor::new(&[7u32, 4, 1], device).unwrap();
        (x, lengths)
    }

    #[test]
    fn zero_blocks_is_rejected() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let config = EncoderConfig {
            num_blocks: 0,
            ..small_config()
        };
        assert!(matches!(Encoder::new(&config, vb), Err(Error::Config(_))));
    }

    #[test]
    fn odd_output_dim_is_rejected() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let config = EncoderConfig {
            output_dim: 7,
            ..small_config()
        };
        assert!(matches!(Encoder::new(&config, vb), Err(Error::Config(_))));
    }

    #[test]
    fn output_shape_for_any_kernel() {
        let device = Device::Cpu;
        let (x, lengths) = batch(&device);
        for kernel_size in [1, 2, 3, 4, 5, 6] {
            let varmap = VarMap::new();
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            let config = EncoderConfig {
                kernel_size,
                ..small_config()
            };
            let encoder = Encoder::new(&config, vb).unwrap();
            let out = encoder.forward(&x, &lengths, None).unwrap();
            assert_eq!(out.dims(), &[3, 7, 8], "kernel {kernel_size}");
        }
    }

    #[test]
    fn padding_frames_are_exactly_zero() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let encoder = Encoder::new(&small_config(), vb).unwrap();
        let (x, lengths) = batch(&device);

        let out = encoder.forward(&x, &lengths, None).unwrap();
        let padded: Vec<f32> = out
            .i((1, 4.., ..))
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        assert!(padded.iter().all(|&v| v == 0.0));
        let padded: Vec<f32> = out
            .i((2, 1.., ..))
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        assert!(padded.iter().all(|&v| v == 0.0));

        let valid = out.i((0, .., ..)).unwrap().abs().unwrap();
        let total = valid.sum_all().unwrap().to_scalar::<f32>().unwrap();
        assert!(total > 0.0);
    }

    #[test]
    fn rows_are_encoded_independently() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let encoder = Encoder::new(&small_config(), vb).unwrap();
        let (x, lengths) = batch(&device);

        let out = encoder.forward(&x, &lengths, None).unwrap();
        let single = encoder
            .forward(
                &x.i(1..2).unwrap(),
                &Tensor::new(&[4u32], &device).unwrap(),
                None,
            )
            .unwrap();
        assert_eq!(single.dims(), &[1, 7, 8]);
        assert!(max_abs_diff(&out.i(1).unwrap(), &single.i(0).unwrap()) < 1e-5);
    }

    #[test]
    fn lengths_larger_than_time_are_rejected() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let encoder = Encoder::new(&small_config(), vb).unwrap();
        let x = Tensor::randn(0f32, 1.0, (2, 5, 6), &device).unwrap();

        let too_long = Tensor::new(&[5u32, 6], &device).unwrap();
        assert!(matches!(
            encoder.forward(&x, &too_long, None),
            Err(Error::InvalidInput(_))
        ));
        let zeros = Tensor::new(&[0u32, 0], &device).unwrap();
        assert!(matches!(
            encoder.forward(&x, &zeros, None),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn unsorted_lengths_are_accepted() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let encoder = Encoder::new(&small_config(), vb).unwrap();
        let x = Tensor::randn(0f32, 1.0, (3, 5, 6), &device).unwrap();
        let lengths = Tensor::new(&[2u32, 5, 3], &device).unwrap();
        let out = encoder.forward(&x, &lengths, None).unwrap();
        assert_eq!(out.dims(), &[3, 5, 8]);
    }

    #[test]
    fn independent_blocks_have_their_own_weights() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        Encoder::new(&small_config(), vb).unwrap();
        let vars = varmap.data().lock().unwrap();
        for i in 0..3 {
            assert!(vars.contains_key(&format!("_convs.{i}._block.1.weight")));
        }
        assert_eq!(vars["_lstm.weight_ih_l0"].dims(), &[16, 8]);
        assert_eq!(vars["_lstm.weight_hh_l0_reverse"].dims(), &[16, 4]);
    }

    #[test]
    fn shared_blocks_reuse_one_module() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let config = EncoderConfig {
            num_blocks: 4,
            share_block_weights: true,
            ..small_config()
        };
        let encoder = Encoder::new(&config, vb).unwrap();
        assert_eq!(encoder.convs.len(), 4);
        let vars = varmap.data().lock().unwrap();
        assert!(vars.contains_key("_convs.1._block.1.weight"));
        assert!(!vars.contains_key("_convs.2._block.1.weight"));
        assert!(!vars.contains_key("_convs.3._block.1.weight"));
    }

    #[test]
    fn training_mode_runs() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let encoder = Encoder::new(&small_config(), vb).unwrap();
        let (x, lengths) = batch(&device);
        let out = encoder.forward_t(&x, &lengths, None, true).unwrap();
        assert_eq!(out.dims(), &[3, 7, 8]);
    }

    #[test]
    fn generated_encoder_needs_language_tags() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let config = EncoderConfig {
            generator: Some(GeneratorConfig {
                num_langs: 2,
                embedding_dim: 3,
                bottleneck_dim: 2,
            }),
            ..small_config()
        };
        let encoder = Encoder::new(&config, vb).unwrap();
        let (x, lengths) = batch(&device);

        assert!(matches!(
            encoder.forward(&x, &lengths, None),
            Err(Error::InvalidInput(_))
        ));
        let langs = Tensor::new(&[0u32, 1, 1], &device).unwrap();
        let out = encoder.forward(&x, &lengths, Some(&langs)).unwrap();
        assert_eq!(out.dims(), &[3, 7, 8]);
        let padded = out.i((2, 1.., ..)).unwrap().abs().unwrap();
        assert_eq!(padded.sum_all().unwrap().to_scalar::<f32>().unwrap(), 0.0);
    }

    #[test]
    fn multi_encoder_rows_match_their_language_encoder() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let multi = MultiEncoder::new(3, &small_config(), false, vb).unwrap();
        let (x, lengths) = batch(&device);
        let langs = Tensor::new(&[2u32, 0, 2], &device).unwrap();

        let out = multi.forward(&x, &lengths, &langs).unwrap();
        assert_eq!(out.dims(), &[3, 7, 8]);

        for (row, lang) in [(0usize, 2usize), (1, 0), (2, 2)] {
            let direct = multi
                .encoder(lang)
                .unwrap()
                .forward(&x, &lengths, None)
                .unwrap();
            let diff = max_abs_diff(&out.i(row).unwrap(), &direct.i(row).unwrap());
            assert!(diff < 1e-6, "row {row} differs by {diff}");
        }
    }

    #[test]
    fn independent_encoders_differ_per_language() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let multi = MultiEncoder::new(2, &small_config(), false, vb).unwrap();

        let row = Tensor::randn(0f32, 1.0, (1, 5, 6), &device).unwrap();
        let x = Tensor::cat(&[&row, &row], 0).unwrap();
        let lengths = Tensor::new(&[5u32, 5], &device).unwrap();
        let langs = Tensor::new(&[0u32, 1], &device).unwrap();

        let out = multi.forward(&x, &lengths, &langs).unwrap();
        assert!(max_abs_diff(&out.i(0).unwrap(), &out.i(1).unwrap()) > 1e-6);
    }

    #[test]
    fn shared_encoders_give_identical_rows() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let multi = MultiEncoder::new(3, &small_config(), true, vb).unwrap();

        let row = Tensor::randn(0f32, 1.0, (1, 5, 6), &device).unwrap();
        let x = Tensor::cat(&[&row, &row, &row], 0).unwrap();
        let lengths = Tensor::new(&[5u32, 5, 5], &device).unwrap();
        let langs = Tensor::new(&[0u32, 1, 2], &device).unwrap();

        let out = multi.forward(&x, &lengths, &langs).unwrap();
        assert!(max_abs_diff(&out.i(0).unwrap(), &out.i(1).unwrap()) < 1e-6);
        assert!(max_abs_diff(&out.i(1).unwrap(), &out.i(2).unwrap()) < 1e-6);
        let vars = varmap.data().lock().unwrap();
        assert!(vars.contains_key("_encoders.0._lstm.weight_ih_l0"));
        assert!(!vars.contains_key("_encoders.1._lstm.weight_ih_l0"));
    }

    #[test]
    fn unknown_language_rows_are_zero() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let multi = MultiEncoder::new(2, &small_config(), false, vb).unwrap();
        let (x, lengths) = batch(&device);

        let langs = Tensor::new(&[1u32, 5, 0], &device).unwrap();
        let out = multi.forward(&x, &lengths, &langs).unwrap();
        let unknown = out.i(1).unwrap().abs().unwrap();
        assert_eq!(unknown.sum_all().unwrap().to_scalar::<f32>().unwrap(), 0.0);

        let none = Tensor::new(&[7u32, 9, 9], &device).unwrap();
        let out = multi.forward(&x, &lengths, &none).unwrap();
        assert_eq!(out.dims(), &[3, 7, 8]);
        assert_eq!(
            out.abs().unwrap().sum_all().unwrap().to_scalar::<f32>().unwrap(),
            0.0
        );
    }

    #[test]
    fn generated_multi_encoder_zeroes_unknown_rows() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let config = EncoderConfig {
            generator: Some(GeneratorConfig {
                num_langs: 2,
                embedding_dim: 3,
                bottleneck_dim: 2,
            }),
            ..small_config()
        };
        let multi = MultiEncoder::new(2, &config, false, vb).unwrap();

        let x = Tensor::randn(0f32, 1.0, (2, 4, 6), &device).unwrap();
        let lengths = Tensor::new(&[4u32, 3], &device).unwrap();
        let langs = Tensor::new(&[0u32, 5], &device).unwrap();
        let out = multi.forward(&x, &lengths, &langs).unwrap();
        assert_eq!(out.dims(), &[2, 4, 8]);

        let unknown = out.i(1).unwrap().abs().unwrap();
        assert_eq!(unknown.sum_all().unwrap().to_scalar::<f32>().unwrap(), 0.0);
        let known = out.i(0).unwrap().abs().unwrap();
        assert!(known.sum_all().unwrap().to_scalar::<f32>().unwrap() > 0.0);
    }

    #[test]
    fn generator_must_cover_every_language() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let config = EncoderConfig {
            generator: Some(GeneratorConfig {
                num_langs: 2,
                embedding_dim: 3,
                bottleneck_dim: 2,
            }),
            ..small_config()
        };
        assert!(matches!(
            MultiEncoder::new(3, &config, false, vb),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn zero_languages_is_rejected() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        assert!(MultiEncoder::new(0, &small_config(), false, vb).is_err());
    }
}
