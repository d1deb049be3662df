//! Spatial least-squares fit of a small kernel.
//!
//! Every interior pixel of the measured field contributes one linear equation
//! `measured(i, j) = Σ k(p, q)·ideal(i − p + cy, j − q + cx)` with `(cy, cx)` the zero lag of
//! the kernel. The overdetermined system is solved through its ridge-regularized normal
//! equations `(AᵀA + λI)·k = Aᵀb` by Cholesky factorization.

use crate::error::{Error, Result};
use crate::field::Field;
use crate::monitor::Monitor;
use crate::solvers::centre_kernel;
use cancellable_loops::par_for_each_cancellable;
use nalgebra::{DMatrix, DVector};
use ndarray::{s, Array2, ArrayView2, Zip};
use rayon::prelude::*;

/// Normal equations of the least-squares kernel fit, assembled once and solved for any
/// regularization parameter.
#[derive(Clone, Debug)]
pub struct NormalEquations {
    pub txres: usize,
    pub tyres: usize,
    /// Row-major `AᵀA`, `size` x `size`.
    pub matrix: Vec<f64>,
    /// `Aᵀb`.
    pub rhs: Vec<f64>,
    /// `bᵀb`, the sum of squared measured values over the fitted interior.
    pub yy: f64,
    /// Number of equations.
    pub count: usize,
    /// Mean of the diagonal of `AᵀA`, the scale the ridge term is measured against.
    pub diag_mean: f64,
}

impl NormalEquations {
    /// Number of unknowns.
    pub fn size(&self) -> usize {
        self.txres * self.tyres
    }

    /// Solves `(AᵀA + λI)·k = Aᵀb` and returns the kernel in discrete normalization,
    /// row-major `tyres` x `txres`.
    pub fn solve(&self, lambda: f64) -> Result<Vec<f64>> {
        let n = self.size();
        let mut matrix = DMatrix::from_row_slice(n, n, &self.matrix);
        for d in 0..n {
            matrix[(d, d)] += lambda;
        }
        let cholesky = matrix.cholesky().ok_or_else(|| Error::SingularSystem {
            size: n,
            reason: format!("matrix is not positive definite (lambda = {lambda:e})"),
        })?;
        let solution = cholesky.solve(&DVector::from_column_slice(&self.rhs));
        Ok(solution.iter().copied().collect())
    }

    /// Kernel field in integral normalization for the ridge `λ = σ²·mean(diag(AᵀA))`, sampled
    /// like `like`.
    pub fn kernel(&self, sigma: f64, like: &Field) -> Result<Field> {
        let solution = self.solve(sigma * sigma * self.diag_mean)?;
        let data = Array2::from_shape_vec((self.tyres, self.txres), solution)?;
        let mut kernel = like.with_data(data);
        kernel.multiply(1.0 / (like.dx * like.dy));
        centre_kernel(&mut kernel);
        Ok(kernel)
    }

    /// `‖A·k − b‖²`, evaluated from the normal equations without revisiting the fields.
    pub fn residual_sum_of_squares(&self, kernel: &[f64]) -> f64 {
        let n = self.size();
        let quadratic: f64 = self
            .matrix
            .par_chunks(n)
            .zip(kernel.par_iter())
            .map(|(row, &ka)| ka * row.iter().zip(kernel).map(|(a, kb)| a * kb).sum::<f64>())
            .sum();
        let linear: f64 = self.rhs.iter().zip(kernel).map(|(b, k)| b * k).sum();
        (self.yy - 2.0 * linear + quadratic).max(0.0)
    }
}

/// Interior rows (or columns) for which every kernel tap stays inside the field and at least
/// `border` pixels away from its edge.
fn interior(res: usize, tres: usize, border: usize) -> Option<(usize, usize)> {
    let c = tres / 2;
    let start = border + (tres - 1 - c);
    let end = res.checked_sub(border + c)?;
    (start < end).then_some((start, end))
}

/// Builds the normal equations of a `txres` x `tyres` kernel fit.
///
/// Both fields are expected to be prepared (mean-removed) and of equal shape.
pub fn assemble_normal_equations(
    measured: &Field,
    ideal: &Field,
    txres: usize,
    tyres: usize,
    border: usize,
    monitor: &Monitor,
) -> Result<NormalEquations> {
    let n = txres * tyres;
    let (Some((r0, r1)), Some((c0, c1))) = (
        interior(measured.yres(), tyres, border),
        interior(measured.xres(), txres, border),
    ) else {
        return Err(Error::SingularSystem {
            size: n,
            reason: format!(
                "a {txres}x{tyres} kernel with border {border} leaves no interior in a {}x{} field",
                measured.xres(),
                measured.yres()
            ),
        });
    };
    let (cy, cx) = (tyres / 2, txres / 2);
    let (h, w) = (r1 - r0, c1 - c0);

    // ideal window paired with each kernel tap, by its top-left corner
    let windows: Vec<ArrayView2<f64>> = (0..n)
        .map(|a| {
            let (i, j) = (r0 + cy - a / txres, c0 + cx - a % txres);
            ideal.data.slice(s![i..i + h, j..j + w])
        })
        .collect();
    let target = measured.data.slice(s![r0..r1, c0..c1]);

    let mut matrix = vec![0.0; n * n];
    let mut rhs = vec![0.0; n];
    par_for_each_cancellable(
        matrix.par_chunks_mut(n).zip(rhs.par_iter_mut()).enumerate(),
        monitor,
        |(a, (row, r))| {
            let wa = &windows[a];
            *r = Zip::from(wa)
                .and(&target)
                .fold(0.0, |acc, &x, &y| acc + x * y);
            for (b, value) in row.iter_mut().enumerate().skip(a) {
                *value = Zip::from(wa)
                    .and(&windows[b])
                    .fold(0.0, |acc, &x, &y| acc + x * y);
            }
        },
    )?;
    for a in 0..n {
        for b in 0..a {
            matrix[a * n + b] = matrix[b * n + a];
        }
    }

    let diag_mean = (0..n).map(|a| matrix[a * n + a]).sum::<f64>() / n as f64;
    let yy = target.iter().map(|v| v * v).sum();
    log::debug!(
        "assembled {n}x{n} normal equations from {} equations, mean diagonal {diag_mean:e}",
        h * w
    );
    Ok(NormalEquations {
        txres,
        tyres,
        matrix,
        rhs,
        yy,
        count: h * w,
        diag_mean,
    })
}
