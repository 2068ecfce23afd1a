//! Producer side signal conditioning
//!
//! A batch is a handful of consecutive acquisition windows from one channel.
//! Every window is smoothed on its own, then windows are averaged in groups
//! (downsampling in time, not in samples) and finally quantized back to the
//! wire's integer type.

use tracing::warn;

use crate::{
    error::{Error, Result},
    savgol::{SavitzkyGolay, SmoothingParams},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConditioningParams {
    pub smoothing: SmoothingParams,
    /// How many consecutive windows are averaged into one
    pub group_size: usize,
}

impl Default for ConditioningParams {
    fn default() -> Self {
        Self {
            smoothing: SmoothingParams::new(41, 3),
            group_size: 32,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Conditioner {
    filter: SavitzkyGolay,
    group_size: usize,
    len: usize,
}

impl Conditioner {
    /// Validate everything up front for windows of `len` samples. Parameters are
    /// static, so an error here is a misconfiguration.
    pub fn new(params: ConditioningParams, len: usize) -> Result<Self> {
        let filter = SavitzkyGolay::new(params.smoothing)?;
        filter.check_len(len)?;
        if params.group_size == 0 {
            return Err(Error::InvalidFilterParameters {
                window_length: params.smoothing.window_length,
                poly_order: params.smoothing.poly_order,
                len,
                reason: "group size must be at least one",
            });
        }
        Ok(Self {
            filter,
            group_size: params.group_size,
            len,
        })
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Smooth, group-average and quantize. Returns one vector per group.
    ///
    /// Every vector must have the length the conditioner was built for.
    pub fn condition(&self, batch: &[Vec<f64>]) -> Result<Vec<Vec<u16>>> {
        if let Some(v) = batch.iter().find(|v| v.len() != self.len) {
            return Err(Error::WindowLengthMismatch {
                expected: self.len,
                actual: v.len(),
            });
        }
        let smoothed = batch
            .iter()
            .map(|v| self.filter.apply(v))
            .collect::<Result<Vec<_>>>()?;
        let averaged = avg_groups(&smoothed, self.group_size);
        Ok(averaged
            .iter()
            .map(|v| {
                let (q, clamped) = quantize(v);
                if clamped > 0 {
                    warn!(clamped, "Conditioned samples outside the u16 range were clamped");
                }
                q
            })
            .collect())
    }
}

/// Element-wise mean of every `group` consecutive vectors. A short final group
/// is averaged over what it has. Vectors in a group are expected to share a
/// length.
pub fn avg_groups(vectors: &[Vec<f64>], group: usize) -> Vec<Vec<f64>> {
    vectors
        .chunks(group)
        .map(|chunk| {
            let mut acc = vec![0f64; chunk[0].len()];
            for v in chunk {
                acc.iter_mut().zip(v).for_each(|(a, x)| *a += x);
            }
            let n = chunk.len() as f64;
            acc.iter_mut().for_each(|a| *a /= n);
            acc
        })
        .collect()
}

/// Truncate toward zero into `u16`, clamping to its range. Also returns how
/// many values had to be clamped (NaN counts as out of range).
pub fn quantize(values: &[f64]) -> (Vec<u16>, usize) {
    let hi = f64::from(u16::MAX);
    let mut clamped = 0usize;
    let out = values
        .iter()
        .map(|&x| {
            let x = x.trunc();
            if x.is_nan() {
                clamped += 1;
                0
            } else if x < 0.0 || x > hi {
                clamped += 1;
                x.clamp(0.0, hi) as u16
            } else {
                x as u16
            }
        })
        .collect();
    (out, clamped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_groups() {
        let batch = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![10.0, 10.0]];
        let out = avg_groups(&batch, 2);
        assert_eq!(out, vec![vec![2.0, 3.0], vec![10.0, 10.0]]);
    }

    #[test]
    fn quantize_truncates_and_clamps() {
        let (q, clamped) = quantize(&[1.9, -4.0, 70000.0, f64::NAN, 65535.0, 65535.9, -0.5]);
        assert_eq!(q, vec![1, 0, 65535, 0, 65535, 65535, 0]);
        assert_eq!(clamped, 3);
    }

    #[test]
    fn constant_batch_survives_conditioning() {
        let params = ConditioningParams {
            smoothing: SmoothingParams::new(41, 3),
            group_size: 8,
        };
        let cond = Conditioner::new(params, 1000).unwrap();
        let batch = vec![vec![30000.0; 1000]; 8];
        let out = cond.condition(&batch).unwrap();
        assert_eq!(out.len(), 1);
        // Float noise may land just under the integer
        assert!(out[0].iter().all(|&v| v == 30000 || v == 29999));
    }

    #[test]
    fn group_averaging_reduces_noise() {
        let params = ConditioningParams {
            smoothing: SmoothingParams::IDENTITY,
            group_size: 2,
        };
        let cond = Conditioner::new(params, 4).unwrap();
        let batch = vec![
            vec![100.0, 200.0, 300.0, 400.0],
            vec![300.0, 200.0, 100.0, 0.0],
            vec![5.0, 5.0, 5.0, 5.0],
            vec![7.0, 7.0, 7.0, 7.0],
        ];
        assert_eq!(
            cond.condition(&batch).unwrap(),
            vec![vec![200, 200, 200, 200], vec![6, 6, 6, 6]]
        );
    }

    #[test]
    fn misconfiguration_is_rejected() {
        let bad_window = ConditioningParams {
            smoothing: SmoothingParams::new(40, 3),
            group_size: 8,
        };
        assert!(Conditioner::new(bad_window, 1000).is_err());
        let too_long = ConditioningParams {
            smoothing: SmoothingParams::new(41, 3),
            group_size: 8,
        };
        assert!(Conditioner::new(too_long, 20).is_err());
        let no_group = ConditioningParams {
            smoothing: SmoothingParams::new(41, 3),
            group_size: 0,
        };
        assert!(Conditioner::new(no_group, 1000).is_err());
    }

    #[test]
    fn wrong_length_vector_is_an_error() {
        let cond = Conditioner::new(ConditioningParams::default(), 1000).unwrap();
        assert!(cond.condition(&[vec![0.0; 20]]).is_err());
    }

    #[test]
    fn ragged_batch_is_an_error() {
        let params = ConditioningParams {
            smoothing: SmoothingParams::IDENTITY,
            group_size: 2,
        };
        let cond = Conditioner::new(params, 4).unwrap();
        assert!(matches!(
            cond.condition(&[vec![100.0; 4], vec![100.0; 2]]),
            Err(Error::WindowLengthMismatch {
                expected: 4,
                actual: 2
            })
        ));
        assert!(matches!(
            cond.condition(&[vec![100.0; 4], vec![100.0; 6]]),
            Err(Error::WindowLengthMismatch { actual: 6, .. })
        ));
        assert_eq!(
            cond.condition(&[vec![100.0; 4], vec![100.0; 4]]).unwrap(),
            vec![vec![100; 4]]
        );
    }
}
