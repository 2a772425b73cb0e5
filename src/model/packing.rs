//! Packed-sequence emulation for variable-length recurrent passes.
//!
//! A bidirectional pass over a padded batch behaves as if the batch had
//! been packed by length: the forward direction reads each row from its
//! first frame, the backward direction starts at each row's last *valid*
//! frame, and every position past a row's length is zero in the result.

use candle_core::{DType, Device, Tensor};
use candle_nn::rnn::Direction;

use crate::{Error, Result};

/// Read a `[B]` length tensor (any integer dtype) into host memory.
pub fn lengths_to_vec(lengths: &Tensor) -> Result<Vec<usize>> {
    let lengths = lengths.to_dtype(DType::I64)?.to_vec1::<i64>()?;
    lengths
        .into_iter()
        .map(|l| {
            usize::try_from(l)
                .map_err(|_| Error::InvalidInput(format!("negative sequence length {l}")))
        })
        .collect()
}

/// Every length must lie in `1..=max_time`. Order does not matter.
pub fn validate_lengths(lengths: &[usize], max_time: usize) -> Result<()> {
    if lengths.is_empty() {
        return Err(Error::InvalidInput("empty batch".to_string()));
    }
    for (row, &len) in lengths.iter().enumerate() {
        if len == 0 {
            return Err(Error::InvalidInput(format!(
                "sequence {row} has zero length"
            )));
        }
        if len > max_time {
            return Err(Error::InvalidInput(format!(
                "sequence {row} has length {len} but the batch has only {max_time} frames"
            )));
        }
    }
    Ok(())
}

/// `[B, T]` mask with ones on valid frames and zeros on padding.
pub fn sequence_mask(
    lengths: &[usize],
    max_time: usize,
    dtype: DType,
    device: &Device,
) -> Result<Tensor> {
    let data: Vec<f32> = lengths
        .iter()
        .flat_map(|&len| (0..max_time).map(move |t| if t < len { 1.0 } else { 0.0 }))
        .collect();
    Ok(Tensor::from_vec(data, (lengths.len(), max_time), device)?.to_dtype(dtype)?)
}

/// `[B, T]` u32 gather indices reversing each row inside its valid prefix.
fn reverse_indices(lengths: &[usize], max_time: usize, device: &Device) -> Result<Tensor> {
    let data: Vec<u32> = lengths
        .iter()
        .flat_map(|&len| {
            (0..max_time).map(move |t| if t < len { (len - 1 - t) as u32 } else { t as u32 })
        })
        .collect();
    Ok(Tensor::from_vec(data, (lengths.len(), max_time), device)?)
}

/// Reverse each row of `x: [B, T, D]` within its first `lengths[b]` frames.
///
/// Padding frames stay where they are, so applying it twice is the identity.
pub fn reverse_padded(x: &Tensor, lengths: &[usize]) -> Result<Tensor> {
    let (b, t, d) = x.dims3()?;
    let index = reverse_indices(lengths, t, x.device())?
        .unsqueeze(2)?
        .broadcast_as((b, t, d))?
        .contiguous()?;
    Ok(x.contiguous()?.gather(&index, 1)?)
}

/// Run a recurrent layer over both directions of a padded batch.
///
/// `run(direction, input)` must map `[B, T, D]` to `[B, T, H]` reading the
/// time axis front to back. Returns `[B, T, 2H]` (forward then backward
/// features) with padding frames zeroed.
pub fn bidirectional<F>(x: &Tensor, lengths: &[usize], mut run: F) -> Result<Tensor>
where
    F: FnMut(Direction, &Tensor) -> Result<Tensor>,
{
    let (_b, t, _d) = x.dims3()?;
    validate_lengths(lengths, t)?;

    let forward = run(Direction::Forward, x)?;
    let reversed = reverse_padded(x, lengths)?;
    let backward = reverse_padded(&run(Direction::Backward, &reversed)?, lengths)?;

    let mask = sequence_mask(lengths, t, x.dtype(), x.device())?.unsqueeze(2)?;
    Ok(Tensor::cat(&[&forward, &backward], 2)?.broadcast_mul(&mask)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::IndexOp;

    #[test]
    fn lengths_are_validated() {
        assert!(validate_lengths(&[3, 1, 2], 3).is_ok());
        assert!(matches!(
            validate_lengths(&[3, 0], 3),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            validate_lengths(&[4, 2], 3),
            Err(Error::InvalidInput(_))
        ));
        assert!(validate_lengths(&[], 3).is_err());
    }

    #[test]
    fn negative_lengths_are_rejected() {
        let lengths = Tensor::new(&[2i64, -1], &Device::Cpu).unwrap();
        assert!(lengths_to_vec(&lengths).is_err());
        let lengths = Tensor::new(&[2u32, 5], &Device::Cpu).unwrap();
        assert_eq!(lengths_to_vec(&lengths).unwrap(), vec![2, 5]);
    }

    #[test]
    fn mask_marks_valid_frames() {
        let mask = sequence_mask(&[2, 4], 4, DType::F32, &Device::Cpu).unwrap();
        assert_eq!(
            mask.to_vec2::<f32>().unwrap(),
            vec![vec![1., 1., 0., 0.], vec![1., 1., 1., 1.]]
        );
    }

    #[test]
    fn reverse_within_length() {
        let x = Tensor::arange(0f32, 8., &Device::Cpu)
            .unwrap()
            .reshape((2, 4, 1))
            .unwrap();
        let reversed = reverse_padded(&x, &[3, 4]).unwrap();
        assert_eq!(
            reversed.squeeze(2).unwrap().to_vec2::<f32>().unwrap(),
            vec![vec![2., 1., 0., 3.], vec![7., 6., 5., 4.]]
        );
        let restored = reverse_padded(&reversed, &[3, 4]).unwrap();
        assert_eq!(
            restored.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            x.flatten_all().unwrap().to_vec1::<f32>().unwrap()
        );
    }

    #[test]
    fn bidirectional_cumulative_sum() {
        // A running sum as the "recurrent layer" makes both directions easy to check.
        let x = Tensor::new(
            &[[[1f32], [2.], [3.], [9.]], [[1.], [1.], [1.], [1.]]],
            &Device::Cpu,
        )
        .unwrap();
        let out = bidirectional(&x, &[3, 4], |_, input| Ok(input.cumsum(1)?)).unwrap();
        assert_eq!(out.dims(), &[2, 4, 2]);
        assert_eq!(
            out.i(0).unwrap().to_vec2::<f32>().unwrap(),
            vec![vec![1., 6.], vec![3., 5.], vec![6., 3.], vec![0., 0.]]
        );
        assert_eq!(
            out.i(1).unwrap().to_vec2::<f32>().unwrap(),
            vec![vec![1., 4.], vec![2., 3.], vec![3., 2.], vec![4., 1.]]
        );
    }
}
