//! Convolutional block: zero padding → Conv1d → BatchNorm1d → activation → dropout.
//!
//! ```text
//! x [B, C_in, T]
//!   → pad ((k-1)/2, k/2) on the time axis
//!   → Conv1d(C_in → C_out, k, no bias)        (standard or generated)
//!   → BatchNorm1d(C_out)
//!   → activation
//!   → dropout                                 (training only)
//!   → [B, C_out, T]
//! ```
//!
//! Padding is asymmetric for even kernels, so the time length is preserved
//! for every kernel size.
//!
//! ## Weight key paths
//!
//! ```text
//! _block.1.weight                               — Conv1d (C_out, C_in, k)
//! _block.1._bottleneck / _block.1._generator    — generated conv instead
//! _block.2.{weight,bias,running_mean,running_var}
//! ```

use candle_core::{Module, ModuleT, Tensor};
use candle_nn::{Activation, BatchNorm, Conv1d, Conv1dConfig, Dropout, VarBuilder};

use super::generated::{GeneratedConv1d, GeneratorConfig};
use crate::{Error, Result};

#[derive(Debug, Clone)]
enum BlockConv {
    Standard(Conv1d),
    Generated(GeneratedConv1d),
}

/// One convolutional block over the time axis.
#[derive(Debug, Clone)]
pub struct ConvBlock {
    conv: BlockConv,
    norm: BatchNorm,
    activation: Activation,
    dropout: Dropout,
    padding: (usize, usize),
    out_channels: usize,
}

impl ConvBlock {
    /// Build a block; `generator` selects generated convolution weights.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        dropout: f64,
        activation: Activation,
        generator: Option<&GeneratorConfig>,
        vb: VarBuilder,
    ) -> Result<Self> {
        if kernel_size == 0 {
            return Err(Error::Config("kernel size must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&dropout) {
            return Err(Error::Config(format!(
                "dropout rate must be in [0, 1), got {dropout}"
            )));
        }

        let vb = vb.pp("_block");
        let conv = match generator {
            Some(config) => BlockConv::Generated(GeneratedConv1d::new(
                in_channels,
                out_channels,
                kernel_size,
                config,
                vb.pp("1"),
            )?),
            None => BlockConv::Standard(candle_nn::conv1d_no_bias(
                in_channels,
                out_channels,
                kernel_size,
                Conv1dConfig::default(),
                vb.pp("1"),
            )?),
        };
        let norm = candle_nn::batch_norm(out_channels, 1e-5, vb.pp("2"))?;

        Ok(Self {
            conv,
            norm,
            activation,
            dropout: Dropout::new(dropout as f32),
            padding: ((kernel_size - 1) / 2, kernel_size / 2),
            out_channels,
        })
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// `x: [B, C_in, T]` → `[B, C_out, T]`.
    ///
    /// `language_embedding` (`[B, E]`) is required by generated blocks and
    /// ignored otherwise.
    pub fn forward_t(
        &self,
        x: &Tensor,
        language_embedding: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor> {
        let (left, right) = self.padding;
        let x = x.pad_with_zeros(2, left, right)?;
        let x = match &self.conv {
            BlockConv::Standard(conv) => conv.forward(&x)?,
            BlockConv::Generated(conv) => {
                let embedding = language_embedding.ok_or_else(|| {
                    Error::InvalidInput("generated block needs language embeddings".to_string())
                })?;
                conv.forward(&x, embedding)?
            }
        };
        let x = self.norm.forward_t(&x, train)?;
        let x = self.activation.forward(&x)?;
        Ok(self.dropout.forward_t(&x, train)?)
    }
}
