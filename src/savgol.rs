//! Savitzky-Golay smoothing
//!
//! Each output sample is the value, at that position, of the least-squares
//! polynomial fitted over a window of neighbours. Near the ends the polynomial
//! fitted to the first (or last) full window is evaluated instead of padding
//! the input, which is what scipy calls the `interp` mode.

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SmoothingParams {
    pub window_length: usize,
    pub poly_order: usize,
}

impl SmoothingParams {
    /// Window of one sample: the output is the input
    pub const IDENTITY: SmoothingParams = SmoothingParams {
        window_length: 1,
        poly_order: 0,
    };

    pub const fn new(window_length: usize, poly_order: usize) -> Self {
        Self {
            window_length,
            poly_order,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SavitzkyGolay {
    params: SmoothingParams,
    /// Projection matrix of the window fit, row `i` evaluates the fit at
    /// window position `i`
    hat: Vec<Vec<f64>>,
}

impl SavitzkyGolay {
    pub fn new(params: SmoothingParams) -> Result<Self> {
        let SmoothingParams {
            window_length: n,
            poly_order: p,
        } = params;
        let invalid = |reason| Error::InvalidFilterParameters {
            window_length: n,
            poly_order: p,
            len: 0,
            reason,
        };
        if n % 2 == 0 {
            return Err(invalid("window length must be odd"));
        }
        if p >= n {
            return Err(invalid("polynomial order must be less than the window length"));
        }
        let half = n / 2;
        // Positions scaled into [-1, 1] to keep the normal equations well conditioned
        let scale = half.max(1) as f64;
        let vander: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let x = (i as f64 - half as f64) / scale;
                (0..=p).map(|k| x.powi(k as i32)).collect()
            })
            .collect();
        // Normal equations: (V^T V) X = V^T
        let gram: Vec<Vec<f64>> = (0..=p)
            .map(|r| (0..=p).map(|c| vander.iter().map(|row| row[r] * row[c]).sum()).collect())
            .collect();
        let vt: Vec<Vec<f64>> = (0..=p)
            .map(|r| vander.iter().map(|row| row[r]).collect())
            .collect();
        let pinv = solve(gram, vt).ok_or_else(|| invalid("singular polynomial fit"))?;
        let hat: Vec<Vec<f64>> = vander
            .iter()
            .map(|row| {
                (0..n)
                    .map(|j| (0..=p).map(|k| row[k] * pinv[k][j]).sum())
                    .collect()
            })
            .collect();
        Ok(Self { params, hat })
    }

    pub fn params(&self) -> SmoothingParams {
        self.params
    }

    /// Fails if vectors of `len` samples can't hold a full window
    pub fn check_len(&self, len: usize) -> Result<()> {
        if self.params.window_length > len {
            return Err(Error::InvalidFilterParameters {
                window_length: self.params.window_length,
                poly_order: self.params.poly_order,
                len,
                reason: "window length exceeds the vector length",
            });
        }
        Ok(())
    }

    pub fn apply(&self, input: &[f64]) -> Result<Vec<f64>> {
        self.check_len(input.len())?;
        let n = self.params.window_length;
        let half = n / 2;
        let len = input.len();
        let dot = |row: &[f64], window: &[f64]| -> f64 {
            row.iter().zip(window).map(|(h, x)| h * x).sum()
        };
        let mut output = Vec::with_capacity(len);
        let head = &input[..n];
        for row in &self.hat[..half] {
            output.push(dot(row, head));
        }
        let center = &self.hat[half];
        for window in input.windows(n) {
            output.push(dot(center, window));
        }
        let tail = &input[len - n..];
        for row in &self.hat[half + 1..] {
            output.push(dot(row, tail));
        }
        Ok(output)
    }
}

/// Gauss-Jordan elimination with partial pivoting, solving `a x = b` for all
/// columns of `b` at once
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        let div = a[col][col];
        a[col].iter_mut().for_each(|v| *v /= div);
        b[col].iter_mut().for_each(|v| *v /= div);
        let (pivot_a, pivot_b) = (a[col].clone(), b[col].clone());
        for row in (0..n).filter(|&r| r != col) {
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            a[row].iter_mut().zip(&pivot_a).for_each(|(v, p)| *v -= factor * p);
            b[row].iter_mut().zip(&pivot_b).for_each(|(v, p)| *v -= factor * p);
        }
    }
    Some(b)
}
