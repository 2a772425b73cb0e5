//! Generated layers for the meta-learning encoder variant.
//!
//! Instead of owning its weights directly, a generated layer owns a small
//! generator network that maps a per-example language embedding to the
//! layer's parameters:
//!
//! ```text
//! lang tag → LanguageEmbedding [B, E]
//!          → Linear(E → bottleneck) → Linear(bottleneck → numel)
//!          → per-example weights [B, ...]
//! ```
//!
//! Every example in a batch is processed with the weights generated for its
//! own language, so languages share the generators but not the layers.

use candle_core::{DType, Module, Tensor};
use candle_nn::rnn::Direction;
use candle_nn::{Embedding, Linear, VarBuilder};

use crate::{Error, Result};

/// Size of the language embedding and of the generator bottleneck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Number of languages; valid tags are `0..num_langs`.
    pub num_langs: usize,
    pub embedding_dim: usize,
    pub bottleneck_dim: usize,
}

/// Learned embedding per language id.
#[derive(Debug, Clone)]
pub struct LanguageEmbedding {
    embedding: Embedding,
    num_langs: usize,
}

impl LanguageEmbedding {
    pub fn new(config: &GeneratorConfig, vb: VarBuilder) -> Result<Self> {
        if config.num_langs == 0 {
            return Err(Error::Config(
                "generated layers need at least one language".to_string(),
            ));
        }
        let embedding = candle_nn::embedding(config.num_langs, config.embedding_dim, vb)?;
        Ok(Self {
            embedding,
            num_langs: config.num_langs,
        })
    }

    /// `[B]` language tags → `[B, E]` embeddings.
    pub fn forward(&self, langs: &Tensor) -> Result<Tensor> {
        let tags = langs.to_dtype(DType::I64)?.to_vec1::<i64>()?;
        if let Some(bad) = tags
            .iter()
            .find(|&&t| t < 0 || t as usize >= self.num_langs)
        {
            return Err(Error::InvalidInput(format!(
                "language tag {bad} outside 0..{}",
                self.num_langs
            )));
        }
        Ok(self.embedding.forward(&langs.to_dtype(DType::U32)?)?)
    }
}

/// Two-layer generator producing `numel` parameters per example.
#[derive(Debug, Clone)]
pub struct WeightGenerator {
    bottleneck: Linear,
    generator: Linear,
    numel: usize,
}

impl WeightGenerator {
    pub fn new(config: &GeneratorConfig, numel: usize, vb: VarBuilder) -> Result<Self> {
        let bottleneck = candle_nn::linear(
            config.embedding_dim,
            config.bottleneck_dim,
            vb.pp("_bottleneck"),
        )?;
        let generator = candle_nn::linear(config.bottleneck_dim, numel, vb.pp("_generator"))?;
        Ok(Self {
            bottleneck,
            generator,
            numel,
        })
    }

    /// `[B, E]` → `[B, numel]`.
    pub fn forward(&self, embedding: &Tensor) -> Result<Tensor> {
        Ok(embedding.apply(&self.bottleneck)?.apply(&self.generator)?)
    }

    pub fn numel(&self) -> usize {
        self.numel
    }
}

/// Bias-free 1D convolution with per-example generated kernels.
#[derive(Debug, Clone)]
pub struct GeneratedConv1d {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    generator: WeightGenerator,
}

impl GeneratedConv1d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        config: &GeneratorConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        let numel = out_channels * in_channels * kernel_size;
        let generator = WeightGenerator::new(config, numel, vb)?;
        Ok(Self {
            in_channels,
            out_channels,
            kernel_size,
            generator,
        })
    }

    /// `x: [B, C_in, T]`, `embedding: [B, E]` → `[B, C_out, T - k + 1]`.
    pub fn forward(&self, x: &Tensor, embedding: &Tensor) -> Result<Tensor> {
        let batch = x.dim(0)?;
        if embedding.dim(0)? != batch {
            return Err(Error::InvalidInput(format!(
                "{} language embeddings for a batch of {batch}",
                embedding.dim(0)?
            )));
        }
        let kernels = self.generator.forward(embedding)?.reshape((
            batch,
            self.out_channels,
            self.in_channels,
            self.kernel_size,
        ))?;
        let rows = (0..batch)
            .map(|i| {
                x.narrow(0, i, 1)?
                    .contiguous()?
                    .conv1d(&kernels.get(i)?, 0, 1, 1, 1)
            })
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Tensor::cat(&rows, 0)?)
    }
}

/// Single-layer bidirectional LSTM with per-example generated weights.
///
/// Each direction generates `w_ih [4H, in]`, `w_hh [4H, H]` and a bias
/// `[4H]`; gates follow the (input, forget, cell, output) order.
#[derive(Debug, Clone)]
pub struct GeneratedLstm {
    input_dim: usize,
    hidden_dim: usize,
    forward: WeightGenerator,
    backward: WeightGenerator,
}

impl GeneratedLstm {
    pub fn new(
        input_dim: usize,
        hidden_dim: usize,
        config: &GeneratorConfig,
        vb: VarBuilder,
    ) -> Result<Self> {
        let gates = 4 * hidden_dim;
        let numel = gates * input_dim + gates * hidden_dim + gates;
        Ok(Self {
            input_dim,
            hidden_dim,
            forward: WeightGenerator::new(config, numel, vb.pp("forward"))?,
            backward: WeightGenerator::new(config, numel, vb.pp("reverse"))?,
        })
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Run one direction front to back: `[B, T, in]` → `[B, T, H]`.
    pub fn run(&self, direction: Direction, x: &Tensor, embedding: &Tensor) -> Result<Tensor> {
        let generator = match direction {
            Direction::Forward => &self.forward,
            Direction::Backward => &self.backward,
        };
        let (batch, time, _) = x.dims3()?;
        let (h, gates) = (self.hidden_dim, 4 * self.hidden_dim);

        let params = generator.forward(embedding)?;
        let w_ih = params
            .narrow(1, 0, gates * self.input_dim)?
            .reshape((batch, gates, self.input_dim))?;
        let w_hh = params
            .narrow(1, gates * self.input_dim, gates * h)?
            .reshape((batch, gates, h))?;
        let bias = params.narrow(1, gates * (self.input_dim + h), gates)?;

        // Input projections for all steps at once: [B, T, 4H]
        let projected = x
            .contiguous()?
            .matmul(&w_ih.t()?.contiguous()?)?
            .broadcast_add(&bias.unsqueeze(1)?)?;
        let w_hh_t = w_hh.t()?.contiguous()?;

        let mut hidden = Tensor::zeros((batch, 1, h), x.dtype(), x.device())?;
        let mut cell = Tensor::zeros((batch, h), x.dtype(), x.device())?;
        let mut outputs = Vec::with_capacity(time);
        for t in 0..time {
            let step = (projected.narrow(1, t, 1)? + hidden.matmul(&w_hh_t)?)?.squeeze(1)?;
            let chunks = step.chunk(4, 1)?;
            let input_gate = candle_nn::ops::sigmoid(&chunks[0])?;
            let forget_gate = candle_nn::ops::sigmoid(&chunks[1])?;
            let candidate = chunks[2].tanh()?;
            let output_gate = candle_nn::ops::sigmoid(&chunks[3])?;

            cell = (forget_gate.mul(&cell)? + input_gate.mul(&candidate)?)?;
            let out = output_gate.mul(&cell.tanh()?)?;
            hidden = out.unsqueeze(1)?;
            outputs.push(out);
        }
        Ok(Tensor::stack(&outputs, 1)?)
    }
}
