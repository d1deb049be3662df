//! Automatic choice of the regularization parameter σ.
//!
//! * Regularized filter: generalized cross-validation of the filtered spectrum, minimized
//!   over `ln σ`.
//! * Least squares: ridge parameter from the residual variance of an almost unregularized fit
//!   (Hoerl–Kennard–Baldwin), in closed form.
//! * Pseudo-Wiener: bounded 1-D minimization of the kernel spread over `ln σ`.
//!
//! All strategies expect prepared fields.

use crate::error::{Error, Result};
use crate::field::Field;
use crate::minimize::find_minimum_1d;
use crate::monitor::Monitor;
use crate::reconstruct::dispersion;
use crate::regions::Region;
use crate::solvers::frequency::deconvolve_wiener;
use crate::solvers::least_squares::NormalEquations;
use crate::spectral::SpectralEngine;
use rayon::prelude::*;

pub const SIGMA_MIN: f64 = 1e-8;
pub const SIGMA_MAX: f64 = 1e3;

/// Empirical correction of the optimum of the Wiener spread minimization.
pub const WIENER_FUDGE: f64 = 0.375;

/// Ridge of the reference fit, relative to the mean diagonal.
const REFERENCE_RIDGE: f64 = 1e-12;

/// Bracket width in `ln σ` at which the 1-D searches stop.
const LOG_SIGMA_TOLERANCE: f64 = 1e-3;

/// σ of the regularized filter by generalized cross-validation.
///
/// With `a = |O|²` and `p = |F|²` per frequency bin, the filter leaves the residual
/// `λ/(a + λ)·F` in every bin, and the score
///
/// `V(λ) = Σ p/(a + λ)² / (Σ 1/(a + λ))²`
///
/// is minimized over `λ = σ²·‖O‖²·‖F‖²`. Only magnitudes enter, so a measurement that is an
/// exact convolution scores the same for any kernel phase, in particular for any shift.
/// Bins of the half spectrum that stand for two conjugate bins are counted twice, and the
/// zero frequency is left out.
pub fn regularized_sigma(
    measured: &Field,
    ideal: &Field,
    engine: &dyn SpectralEngine,
) -> Result<f64> {
    let orms = ideal.rms();
    if orms == 0.0 {
        return Err(Error::DegenerateInput("ideal"));
    }
    let frms = measured.rms();
    if frms == 0.0 {
        return Err(Error::DegenerateInput("measured"));
    }

    let fspectrum = engine.forward(measured.data.view())?;
    let ospectrum = engine.forward(ideal.data.view())?;
    let xres = measured.xres();
    let cw = fspectrum.ncols();
    // (multiplicity, |O|², |F|²)
    let bins: Vec<(f64, f64, f64)> = fspectrum
        .indexed_iter()
        .filter(|&((i, j), _)| (i, j) != (0, 0))
        .map(|((i, j), f)| {
            let paired = j == 0 || (xres % 2 == 0 && j + 1 == cw);
            let weight = if paired { 1.0 } else { 2.0 };
            (weight, ospectrum[(i, j)].norm_sqr(), f.norm_sqr())
        })
        .collect();
    if bins.is_empty() {
        return Ok(SIGMA_MIN);
    }

    let n = (xres * measured.yres()) as f64;
    let scale = (orms * orms * n) * (frms * frms * n);
    let score = |logsigma: f64| -> Result<f64> {
        let lambda = (2.0 * logsigma).exp() * scale;
        let (residual, trace) = bins
            .par_iter()
            .map(|&(w, a, p)| {
                let d = a + lambda;
                (w * p / (d * d), w / d)
            })
            .reduce(|| (0.0, 0.0), |x, y| (x.0 + y.0, x.1 + y.1));
        Ok(residual / (trace * trace))
    };
    let logsigma = find_minimum_1d(score, SIGMA_MIN.ln(), SIGMA_MAX.ln(), LOG_SIGMA_TOLERANCE)?;
    let sigma = logsigma.exp().clamp(SIGMA_MIN, SIGMA_MAX);
    log::debug!("cross-validation over {} bins: sigma {sigma:e}", bins.len());
    Ok(sigma)
}

/// Closed-form ridge σ for the least-squares fit.
///
/// With `k₀` the reference fit, `s² = RSS/(M − n)` the residual variance over `M` equations
/// and `n` unknowns, `λ = n·s²/‖k₀‖²`, expressed as σ relative to the mean diagonal.
pub fn least_squares_sigma(equations: &NormalEquations) -> Result<f64> {
    let n = equations.size();
    let kernel = equations.solve(REFERENCE_RIDGE * equations.diag_mean)?;
    let rss = equations.residual_sum_of_squares(&kernel);
    let dof = if equations.count > n {
        equations.count - n
    } else {
        equations.count.max(1)
    };
    let s2 = rss / dof as f64;
    let knorm2: f64 = kernel.iter().map(|k| k * k).sum();
    let sigma = if knorm2 > 0.0 && equations.diag_mean > 0.0 {
        (n as f64 * s2 / knorm2 / equations.diag_mean).sqrt()
    } else {
        SIGMA_MAX
    };
    let sigma = sigma.clamp(SIGMA_MIN, SIGMA_MAX);
    log::debug!("residual variance {s2:e} over {dof} degrees of freedom, sigma {sigma:e}");
    Ok(sigma)
}

/// Bounded number of objective evaluations of [`wiener_sigma`], for progress reporting.
const WIENER_EVALUATIONS: usize = 75;

/// Spread `sqrt(s_x² + s_y²)` of `|kernel|` inside `region` for the pseudo-Wiener kernel at
/// `sigma`.
pub fn wiener_spread(
    measured: &Field,
    ideal: &Field,
    region: &Region,
    sigma: f64,
    engine: &dyn SpectralEngine,
    monitor: &Monitor,
) -> Result<f64> {
    let kernel = deconvolve_wiener(measured, ideal, sigma, engine)?;
    let (sx2, sy2) = dispersion(&kernel.crop(region), None, monitor)?;
    Ok((sx2 + sy2).sqrt())
}

/// σ of the pseudo-Wiener filter minimizing [`wiener_spread`].
///
/// The spread is minimized over `ln σ ∈ [ln SIGMA_MIN, ln SIGMA_MAX]`; the optimum is scaled
/// by [`WIENER_FUDGE`].
pub fn wiener_sigma(
    measured: &Field,
    ideal: &Field,
    region: &Region,
    engine: &dyn SpectralEngine,
    monitor: &Monitor,
) -> Result<f64> {
    let mut evaluations = 0usize;
    let objective = |logsigma: f64| -> Result<f64> {
        monitor.check()?;
        monitor.set_progress(Some((evaluations as f32 / WIENER_EVALUATIONS as f32).min(1.0)));
        evaluations += 1;
        wiener_spread(measured, ideal, region, logsigma.exp(), engine, monitor)
    };
    let logsigma =
        find_minimum_1d(objective, SIGMA_MIN.ln(), SIGMA_MAX.ln(), LOG_SIGMA_TOLERANCE)?;
    log::debug!(
        "Wiener spread minimized at ln(sigma) = {logsigma:.4} after {evaluations} evaluations"
    );
    Ok(WIENER_FUDGE * logsigma.exp())
}
