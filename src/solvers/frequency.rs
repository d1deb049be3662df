//! Frequency-domain transfer function estimation.
//!
//! With `F` and `O` the spectra of the measured and ideal fields, the regularized filter is
//! `K = conj(O)·F / (|O|² + λ)` and the pseudo-Wiener filter replaces `λ` by `λ/|F|²`,
//! corresponding to uncorrelated point noise. In both cases `λ = σ²·‖O‖²·‖F‖²`.

use crate::error::{Error, Result};
use crate::field::Field;
use crate::solvers::centre_kernel;
use crate::spectral::{fft_shift, SpectralEngine};
use ndarray::{Array2, Zip};
use num_complex::Complex64;
use num_traits::Zero;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FilterKind {
    Regularized,
    Wiener,
}

/// Full-sized kernel from the regularized inverse filter.
pub fn deconvolve_regularized(
    measured: &Field,
    ideal: &Field,
    sigma: f64,
    engine: &dyn SpectralEngine,
) -> Result<Field> {
    deconvolve(measured, ideal, sigma, FilterKind::Regularized, engine)
}

/// Full-sized kernel from the pseudo-Wiener filter.
pub fn deconvolve_wiener(
    measured: &Field,
    ideal: &Field,
    sigma: f64,
    engine: &dyn SpectralEngine,
) -> Result<Field> {
    deconvolve(measured, ideal, sigma, FilterKind::Wiener, engine)
}

fn deconvolve(
    measured: &Field,
    ideal: &Field,
    sigma: f64,
    kind: FilterKind,
    engine: &dyn SpectralEngine,
) -> Result<Field> {
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

    // compensate the unnormalized forward transform
    let n = (measured.xres() * measured.yres()) as f64;
    let onorm2 = orms * orms * n;
    let fnorm2 = frms * frms * n;
    let lambda = sigma * sigma * onorm2 * fnorm2;

    let mut kspectrum = Array2::<Complex64>::zeros(fspectrum.raw_dim());
    Zip::from(&mut kspectrum)
        .and(&fspectrum)
        .and(&ospectrum)
        .par_for_each(|k, &f, &o| {
            let inorm = o.norm_sqr();
            let q = match kind {
                FilterKind::Regularized => {
                    let d = inorm + lambda;
                    if d > 0.0 {
                        1.0 / d
                    } else {
                        0.0
                    }
                }
                FilterKind::Wiener => {
                    let fnorm = f.norm_sqr();
                    let d = inorm * fnorm + lambda;
                    if d > 0.0 {
                        fnorm / d
                    } else {
                        0.0
                    }
                }
            };
            *k = o.conj() * f * q;
        });
    // fields are mean-removed
    kspectrum[(0, 0)] = Complex64::zero();

    let kernel = engine.inverse(&kspectrum)?;
    let mut out = measured.with_data(fft_shift(&kernel));
    out.multiply(1.0 / (measured.dx * measured.dy));
    centre_kernel(&mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math_tools::{prepare_field, Windowing};
    use crate::spectral::RealFft2d;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noise_field(xres: usize, yres: usize, seed: u64) -> Field {
        let mut rng = StdRng::seed_from_u64(seed);
        Field::from_array(
            Array2::from_shape_fn((yres, xres), |_| rng.random_range(-1.0..1.0)),
            1.0,
            1.0,
        )
    }

    #[test]
    fn test_identity_gives_centred_impulse() {
        let ideal = prepare_field(&noise_field(48, 40, 3), Windowing::Hann);
        let engine = RealFft2d::new(48, 40);
        for kernel in [
            deconvolve_regularized(&ideal, &ideal, 1e-6, &engine).unwrap(),
            deconvolve_wiener(&ideal, &ideal, 1e-6, &engine).unwrap(),
        ] {
            assert_eq!(kernel.data.dim(), (40, 48));
            assert_relative_eq!(kernel.data[(20, 24)], 1.0, epsilon = 1e-3);
            assert_relative_eq!(kernel.data[(20, 25)], 0.0, epsilon = 1e-3);
            assert_relative_eq!(kernel.data[(3, 7)], 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_integral_normalization_scales_with_sampling() {
        let mut ideal = prepare_field(&noise_field(32, 32, 5), Windowing::None);
        ideal.dx = 0.5;
        ideal.dy = 0.25;
        let engine = RealFft2d::new(32, 32);
        let kernel = deconvolve_regularized(&ideal, &ideal, 1e-6, &engine).unwrap();
        assert_relative_eq!(kernel.data[(16, 16)], 8.0, epsilon = 1e-2);
        assert_relative_eq!(kernel.x_offset, -8.25, epsilon = 1e-12);
    }

    #[test]
    fn test_shift_moves_the_peak() {
        let ideal = prepare_field(&noise_field(32, 32, 11), Windowing::None);
        let mut shifted = ideal.new_alike();
        for ((i, j), v) in shifted.data.indexed_iter_mut() {
            *v = 2.0 * ideal.data[((i + 32 - 1) % 32, (j + 32 - 3) % 32)];
        }
        let engine = RealFft2d::new(32, 32);
        let kernel = deconvolve_regularized(&shifted, &ideal, 1e-6, &engine).unwrap();
        let (col, row, value) = kernel.max_abs();
        assert_eq!((col, row), (16 + 3, 16 + 1));
        assert_relative_eq!(value, 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_constant_field_is_degenerate() {
        let engine = RealFft2d::new(8, 8);
        let flat = Field::new(8, 8, 1.0, 1.0);
        let ideal = noise_field(8, 8, 1);
        assert!(matches!(
            deconvolve_regularized(&ideal, &flat, 1.0, &engine),
            Err(Error::DegenerateInput("ideal"))
        ));
        assert!(matches!(
            deconvolve_wiener(&flat, &ideal, 1.0, &engine),
            Err(Error::DegenerateInput("measured"))
        ));
    }
}
