//! Training and model parameters.
//!
//! A single explicit [`Params`] value replaces a process-wide mutable
//! registry: it is loaded once from JSON at startup and handed to whatever
//! needs it (feature extraction, text processing, model construction).
//! Defaults match the reference LJSpeech setup.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::model::encoder::EncoderConfig;
use crate::model::generated::GeneratorConfig;

/// Which encoder architecture the text encoder is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderType {
    /// One encoder shared by all languages.
    Simple,
    /// One independent encoder per language.
    Separate,
    /// One encoder whose layers are generated from a language embedding.
    Generated,
}

/// Flat set of dataset, text, audio and model parameters.
///
/// Every key present in a loaded JSON file overrides the default; missing
/// keys keep their defaults. Keys that are not part of the schema are kept
/// in [`Params::extra`] and written back on [`Params::save`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    // --- Dataset ---
    pub dataset: String,
    pub cache_spectrograms: bool,
    pub cache_phonemes: bool,
    pub sort_by_length: bool,

    // --- Text ---
    /// espeak language code, see `phonemize --help`.
    pub language: String,
    /// `punctuations_out` and `punctuations_in` are used only if set.
    pub use_punctuation: bool,
    /// `phonemes` are used instead of `characters` only if set.
    pub use_phonemes: bool,
    pub case_sensitive: bool,
    pub remove_multiple_wspaces: bool,
    pub characters: String,
    pub phonemes: String,
    pub punctuations_out: String,
    pub punctuations_in: String,

    // --- Audio ---
    pub sample_rate: u32,
    pub stft_window_ms: f64,
    pub stft_shift_ms: f64,
    pub num_fft: usize,
    pub num_mels: usize,
    pub griffin_lim_iters: usize,
    pub griffin_lim_power: f64,
    pub reference_spectrogram_db: f64,
    pub normalize_spectrogram: bool,
    pub normalize_symetric: bool,
    pub normalize_scaling: f64,
    pub normalize_minimal_db: f64,
    pub use_preemphasis: bool,
    pub preemphasis: f64,

    // --- Model ---
    pub languages: Vec<String>,
    pub encoder_type: EncoderType,
    pub embedding_dimension: usize,
    pub encoder_dimension: usize,
    pub encoder_blocks: usize,
    pub encoder_kernel_size: usize,
    pub dropout: f64,
    pub language_embedding_dimension: usize,
    pub generator_bottleneck_dim: usize,

    /// Keys outside the schema, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            dataset: "ljspeech".to_string(),
            cache_spectrograms: true,
            cache_phonemes: true,
            sort_by_length: false,

            language: "en-gb".to_string(),
            use_punctuation: true,
            use_phonemes: false,
            case_sensitive: true,
            remove_multiple_wspaces: false,
            characters: "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz ".to_string(),
            phonemes: "pbtdkɡfvθðszʃʒhmnŋn̩ll̩rjwʔɪeœɒʌʊiᵻːaɔuəɑɜˌˈ ".to_string(),
            punctuations_out: "\"(),.:;?!".to_string(),
            punctuations_in: "'-".to_string(),

            sample_rate: 22050,
            stft_window_ms: 50.0,
            stft_shift_ms: 12.5,
            num_fft: 2048,
            num_mels: 80,
            griffin_lim_iters: 50,
            griffin_lim_power: 1.5,
            reference_spectrogram_db: 20.0,
            normalize_spectrogram: true,
            normalize_symetric: true,
            normalize_scaling: 4.0,
            normalize_minimal_db: -100.0,
            use_preemphasis: true,
            preemphasis: 0.97,

            languages: vec!["en-gb".to_string()],
            encoder_type: EncoderType::Simple,
            embedding_dimension: 512,
            encoder_dimension: 512,
            encoder_blocks: 3,
            encoder_kernel_size: 5,
            dropout: 0.5,
            language_embedding_dimension: 8,
            generator_bottleneck_dim: 4,

            extra: serde_json::Map::new(),
        }
    }
}

impl Params {
    /// Load parameters from a JSON object file on top of the defaults.
    pub fn load(json_path: impl AsRef<Path>) -> Result<Self> {
        let json_path = json_path.as_ref();
        let file = std::fs::File::open(json_path)?;
        let params: Params = serde_json::from_reader(std::io::BufReader::new(file))?;
        tracing::debug!(
            "Loaded params from {:?} ({} extra keys)",
            json_path,
            params.extra.len()
        );
        Ok(params)
    }

    /// Parse parameters from a JSON string on top of the defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write all parameters as a JSON object indented with four spaces.
    pub fn save(&self, json_path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(json_path)?;
        let mut writer = std::io::BufWriter::new(file);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
        self.serialize(&mut serializer)?;
        writer.flush()?;
        Ok(())
    }

    /// STFT window length in samples.
    pub fn stft_window_length(&self) -> usize {
        (self.sample_rate as f64 * self.stft_window_ms / 1000.0) as usize
    }

    /// STFT hop length in samples.
    pub fn stft_shift_length(&self) -> usize {
        (self.sample_rate as f64 * self.stft_shift_ms / 1000.0) as usize
    }

    pub fn num_languages(&self) -> usize {
        self.languages.len()
    }

    /// Index of `language` in [`Params::languages`].
    pub fn language_id(&self, language: &str) -> Option<usize> {
        self.languages.iter().position(|l| l == language)
    }

    /// Encoder hyper-parameters derived from the model section.
    pub fn encoder_config(&self) -> EncoderConfig {
        let generator = match self.encoder_type {
            EncoderType::Generated => Some(GeneratorConfig {
                num_langs: self.num_languages(),
                embedding_dim: self.language_embedding_dimension,
                bottleneck_dim: self.generator_bottleneck_dim,
            }),
            EncoderType::Simple | EncoderType::Separate => None,
        };
        EncoderConfig {
            input_dim: self.embedding_dimension,
            output_dim: self.encoder_dimension,
            num_blocks: self.encoder_blocks,
            kernel_size: self.encoder_kernel_size,
            dropout: self.dropout,
            generator,
            share_block_weights: false,
        }
    }
}
