//! multitts CLI: parameter files, spectrograms, text encoding and
//! Griffin-Lim reconstruction.
//!
//! # Output
//!
//! Every subcommand prints a one-line JSON summary to stdout on success:
//!
//! ```json
//! {"command":"encode","shape":[1,12,512],"encoder_type":"simple"}
//! ```
//!
//! Exit code 0 on success, non-zero on error.

use std::path::PathBuf;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use clap::{Parser, Subcommand};
use multitts::{
    audio::{AudioProcessor, griffin_lim, read_wav, wav, write_wav},
    config::Params,
    model::TextEncoder,
    text::{Alphabet, collate},
};

#[derive(Parser, Debug)]
#[command(
    name = "multitts",
    about = "Multilingual TTS text encoder and feature extraction",
    long_about = "Inspect and write parameter files, extract spectrograms, run the\n\
                  text encoder and reconstruct audio with Griffin-Lim.\n\
                  A JSON summary line is printed to stdout."
)]
struct Args {
    /// Parameter file. Defaults are used when omitted.
    #[arg(long, short = 'p', global = true)]
    params: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the (loaded or default) parameters to a JSON file.
    Params {
        #[arg(long, short = 'o')]
        output: PathBuf,
    },
    /// Compute the normalised mel spectrogram of a WAV file.
    Spectrogram {
        #[arg(long, short = 'i')]
        input: PathBuf,
    },
    /// Encode text with the text encoder.
    Encode {
        #[arg(long, short = 't')]
        text: String,

        /// Language of the text; must be one of `languages` in the params.
        #[arg(long, short = 'l')]
        language: Option<String>,

        /// safetensors checkpoint. Randomly initialised weights when omitted.
        #[arg(long, short = 'w')]
        weights: Option<PathBuf>,
    },
    /// Round-trip a WAV file through its linear spectrogram and Griffin-Lim.
    Reconstruct {
        #[arg(long, short = 'i')]
        input: PathBuf,

        #[arg(long, short = 'o')]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let params = match &args.params {
        Some(path) => Params::load(path)
            .map_err(|e| anyhow::anyhow!("failed to load params {}: {e}", path.display()))?,
        None => Params::default(),
    };

    match args.command {
        Command::Params { output } => {
            if let Some(parent) = output.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            params.save(&output)?;
            println!(
                r#"{{"command":"params","path":{path},"extra_keys":{extra}}}"#,
                path = serde_json::to_string(&output.display().to_string())?,
                extra = params.extra.len(),
            );
        }
        Command::Spectrogram { input } => {
            let (samples, sample_rate) = read_wav(&input)?;
            if sample_rate != params.sample_rate {
                anyhow::bail!(
                    "{} is sampled at {sample_rate} Hz, params expect {} Hz",
                    input.display(),
                    params.sample_rate
                );
            }
            let processor = AudioProcessor::from_params(&params)?;
            let mel = processor.mel_spectrogram(&samples)?;
            let frames = mel.first().map_or(0, Vec::len);
            let (min, max) = mel
                .iter()
                .flatten()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            println!(
                r#"{{"command":"spectrogram","shape":[{bins},{frames}],"min":{min},"max":{max}}}"#,
                bins = mel.len(),
            );
        }
        Command::Encode {
            text,
            language,
            weights,
        } => {
            let lang = match &language {
                Some(language) => params.language_id(language).ok_or_else(|| {
                    anyhow::anyhow!(
                        "unknown language '{language}', expected one of {:?}",
                        params.languages
                    )
                })?,
                None => 0,
            };

            let device = Device::cuda_if_available(0)?;
            tracing::info!("Using device: {:?}", device);

            let alphabet = Alphabet::from_params(&params);
            let ids = alphabet.encode(&text);
            let batch = collate(&[(ids, lang as u32)], &device)?;

            let encoder = match &weights {
                Some(path) => TextEncoder::load(&params, alphabet.len(), path, &device, DType::F32)
                    .map_err(|e| anyhow::anyhow!("failed to load encoder: {e}"))?,
                None => {
                    tracing::warn!("No weights given, using a randomly initialised encoder");
                    let varmap = VarMap::new();
                    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
                    TextEncoder::new(&params, alphabet.len(), vb)?
                }
            };

            let encoded = encoder.forward(&batch.ids, &batch.lengths, Some(&batch.langs))?;
            let shape = encoded
                .dims()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            println!(
                r#"{{"command":"encode","shape":[{shape}],"encoder_type":{encoder_type}}}"#,
                encoder_type = serde_json::to_string(&params.encoder_type)?,
            );
        }
        Command::Reconstruct { input, output } => {
            let (samples, sample_rate) = read_wav(&input)?;
            if sample_rate != params.sample_rate {
                anyhow::bail!(
                    "{} is sampled at {sample_rate} Hz, params expect {} Hz",
                    input.display(),
                    params.sample_rate
                );
            }
            let processor = AudioProcessor::from_params(&params)?;
            let linear = processor.linear_spectrogram(&samples)?;

            tracing::info!(
                "Running Griffin-Lim ({} iterations)...",
                params.griffin_lim_iters
            );
            let mut audio = griffin_lim::griffin_lim(
                &processor,
                &linear,
                griffin_lim::GriffinLimConfig::from_params(&params),
            )?;
            wav::peak_normalize(&mut audio);
            write_wav(&output, &audio, sample_rate)?;

            println!(
                r#"{{"command":"reconstruct","path":{path},"duration_s":{duration:.3},"sample_rate":{sample_rate}}}"#,
                path = serde_json::to_string(&output.display().to_string())?,
                duration = audio.len() as f64 / sample_rate as f64,
            );
        }
    }

    Ok(())
}
