//! Text normalisation and symbol alphabet.
//!
//! Turns raw text (or phonemised text) into id sequences consumed by the
//! symbol embedding of [`crate::model::text_encoder::TextEncoder`], and
//! collates id sequences into padded batch tensors.

use std::collections::HashMap;

use candle_core::{Device, Tensor};

use crate::Result;
use crate::config::Params;

/// Padding symbol, always id 0.
pub const PAD: char = '_';
/// Symbol substituted for characters outside the alphabet, always id 1.
pub const UNK: char = '@';
/// End-of-sequence symbol, always id 2.
pub const EOS: char = '~';

const RESERVED: [char; 3] = [PAD, UNK, EOS];

pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;
pub const EOS_ID: u32 = 2;

/// Symbol inventory and normalisation rules derived from [`Params`].
#[derive(Debug, Clone)]
pub struct Alphabet {
    symbols: Vec<char>,
    ids: HashMap<char, u32>,
    punctuation: Vec<char>,
    case_sensitive: bool,
    use_punctuation: bool,
    remove_multiple_wspaces: bool,
}

impl Alphabet {
    pub fn from_params(params: &Params) -> Self {
        let base = if params.use_phonemes {
            &params.phonemes
        } else {
            &params.characters
        };
        let punctuation: Vec<char> = params
            .punctuations_out
            .chars()
            .chain(params.punctuations_in.chars())
            .collect();

        let mut symbols: Vec<char> = RESERVED.to_vec();
        let mut push = |c: char| {
            if !symbols.contains(&c) {
                symbols.push(c);
            }
        };
        for c in base.chars() {
            if params.case_sensitive {
                push(c);
            } else {
                c.to_lowercase().for_each(&mut push);
            }
        }
        if params.use_punctuation {
            punctuation.iter().copied().for_each(&mut push);
        }

        let ids = symbols
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as u32))
            .collect();

        Self {
            symbols,
            ids,
            punctuation,
            case_sensitive: params.case_sensitive,
            use_punctuation: params.use_punctuation,
            remove_multiple_wspaces: params.remove_multiple_wspaces,
        }
    }

    /// Number of symbols including the reserved ones.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    /// Apply case folding, whitespace collapsing and punctuation stripping.
    pub fn normalize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut prev_space = false;
        for c in text.chars() {
            if !self.use_punctuation && self.punctuation.contains(&c) {
                continue;
            }
            if c.is_whitespace() {
                if self.remove_multiple_wspaces && prev_space {
                    continue;
                }
                prev_space = true;
                out.push(' ');
                continue;
            }
            prev_space = false;
            if self.case_sensitive {
                out.push(c);
            } else {
                out.extend(c.to_lowercase());
            }
        }
        if self.remove_multiple_wspaces {
            out.trim().to_string()
        } else {
            out
        }
    }

    /// Normalise `text` and map it to ids, terminated by [`EOS_ID`].
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let normalized = self.normalize(text);
        let mut ids: Vec<u32> = normalized
            .chars()
            .map(|c| match self.ids.get(&c) {
                Some(&id) if id > EOS_ID => id,
                _ => {
                    tracing::debug!("Symbol {c:?} not in alphabet, using UNK");
                    UNK_ID
                }
            })
            .collect();
        ids.push(EOS_ID);
        ids
    }

    /// Map ids back to text, skipping reserved and out-of-range ids.
    pub fn decode(&self, ids: &[u32]) -> String {
        ids.iter()
            .filter(|&&id| id > EOS_ID)
            .filter_map(|&id| self.symbols.get(id as usize))
            .collect()
    }
}

/// Batched and padded id sequences.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[B, T]` u32 ids, padded with [`PAD_ID`].
    pub ids: Tensor,
    /// `[B]` u32 valid lengths.
    pub lengths: Tensor,
    /// `[B]` u32 language tags.
    pub langs: Tensor,
}

/// Collate `(ids, language)` pairs into a zero-padded batch.
pub fn collate(items: &[(Vec<u32>, u32)], device: &Device) -> Result<Batch> {
    let batch = items.len();
    let max_len = items.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0);

    let mut flat = Vec::with_capacity(batch * max_len);
    let mut lengths = Vec::with_capacity(batch);
    let mut langs = Vec::with_capacity(batch);
    for (ids, lang) in items {
        flat.extend_from_slice(ids);
        flat.extend(std::iter::repeat_n(PAD_ID, max_len - ids.len()));
        lengths.push(ids.len() as u32);
        langs.push(*lang);
    }

    Ok(Batch {
        ids: Tensor::from_vec(flat, (batch, max_len), device)?,
        lengths: Tensor::from_vec(lengths, batch, device)?,
        langs: Tensor::from_vec(langs, batch, device)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_symbols_first() {
        let alphabet = Alphabet::from_params(&Params::default());
        assert_eq!(&alphabet.symbols()[..3], &[PAD, UNK, EOS]);
        // 53 characters + 11 punctuation marks
        assert_eq!(alphabet.len(), 3 + 53 + 11);
    }

    #[test]
    fn test_case_insensitive_alphabet_is_deduplicated() {
        let params = Params {
            case_sensitive: false,
            use_punctuation: false,
            ..Params::default()
        };
        let alphabet = Alphabet::from_params(&params);
        // 26 lowercase letters + space
        assert_eq!(alphabet.len(), 3 + 27);
        assert_eq!(alphabet.normalize("Hello World"), "hello world");
    }

    #[test]
    fn test_phoneme_alphabet() {
        let params = Params {
            use_phonemes: true,
            ..Params::default()
        };
        let alphabet = Alphabet::from_params(&params);
        assert!(alphabet.symbols().contains(&'ʃ'));
        assert!(!alphabet.symbols().contains(&'A'));
    }

    #[test]
    fn test_normalize_whitespace_and_punctuation() {
        let params = Params {
            use_punctuation: false,
            remove_multiple_wspaces: true,
            ..Params::default()
        };
        let alphabet = Alphabet::from_params(&params);
        assert_eq!(alphabet.normalize("  Hi,   there!  "), "Hi there");
    }

    #[test]
    fn test_encode_decode() {
        let alphabet = Alphabet::from_params(&Params::default());
        let ids = alphabet.encode("Hello, world.");
        assert_eq!(*ids.last().unwrap(), EOS_ID);
        assert_eq!(ids.len(), "Hello, world.".chars().count() + 1);
        assert_eq!(alphabet.decode(&ids), "Hello, world.");
    }

    #[test]
    fn test_unknown_symbols_map_to_unk() {
        let alphabet = Alphabet::from_params(&Params::default());
        let ids = alphabet.encode("a#b");
        assert_eq!(ids[1], UNK_ID);
        // reserved characters in the input are not treated as real symbols
        assert_eq!(alphabet.encode("_")[0], UNK_ID);
    }

    #[test]
    fn test_collate_pads_with_zeros() {
        let device = Device::Cpu;
        let batch = collate(&[(vec![5, 6, 7], 0), (vec![8], 1)], &device).unwrap();
        assert_eq!(batch.ids.dims(), &[2, 3]);
        assert_eq!(
            batch.ids.to_vec2::<u32>().unwrap(),
            vec![vec![5, 6, 7], vec![8, 0, 0]]
        );
        assert_eq!(batch.lengths.to_vec1::<u32>().unwrap(), vec![3, 1]);
        assert_eq!(batch.langs.to_vec1::<u32>().unwrap(), vec![0, 1]);
    }
}
