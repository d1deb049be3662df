//! Forward and inverse 2D real-to-complex Fourier transforms.
//!
//! The rest of the crate only talks to the [`SpectralEngine`] trait. [`RealFft2d`] implements
//! it with `realfft` along rows and `rustfft` along the columns of the half spectrum.

use crate::error::Result;
use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;
use num_traits::Zero;
use rayon::prelude::*;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Two-dimensional real-input Fourier transform of a fixed field size.
///
/// Spectra have shape `(yres, xres/2 + 1)`. The inverse applies the `1/(xres·yres)`
/// normalization, so `inverse(forward(f))` reproduces `f`.
pub trait SpectralEngine: Send + Sync {
    fn forward(&self, field: ArrayView2<f64>) -> Result<Array2<Complex64>>;
    fn inverse(&self, spectrum: &Array2<Complex64>) -> Result<Array2<f64>>;
}

/// Row-column FFT built on `realfft` and `rustfft`, planned once per field size.
pub struct RealFft2d {
    xres: usize,
    yres: usize,
    r2c: Arc<dyn RealToComplex<f64>>,
    c2r: Arc<dyn ComplexToReal<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl RealFft2d {
    pub fn new(xres: usize, yres: usize) -> RealFft2d {
        let mut real_planner = RealFftPlanner::<f64>::new();
        let mut planner = FftPlanner::<f64>::new();
        RealFft2d {
            xres,
            yres,
            r2c: real_planner.plan_fft_forward(xres),
            c2r: real_planner.plan_fft_inverse(xres),
            col_forward: planner.plan_fft_forward(yres),
            col_inverse: planner.plan_fft_inverse(yres),
        }
    }

    /// Number of complex columns of the half spectrum.
    pub fn spectrum_width(&self) -> usize {
        self.xres / 2 + 1
    }

    /// Transforms every column of a row-major `(yres, cw)` buffer in place.
    fn transform_columns(&self, data: &mut [Complex64], fft: &Arc<dyn Fft<f64>>) {
        let cw = self.spectrum_width();
        let yres = self.yres;
        let mut columns = vec![Complex64::zero(); cw * yres];
        for i in 0..yres {
            for j in 0..cw {
                columns[j * yres + i] = data[i * cw + j];
            }
        }
        columns
            .par_chunks_mut(yres)
            .for_each(|column| fft.process(column));
        for j in 0..cw {
            for i in 0..yres {
                data[i * cw + j] = columns[j * yres + i];
            }
        }
    }
}

impl SpectralEngine for RealFft2d {
    fn forward(&self, field: ArrayView2<f64>) -> Result<Array2<Complex64>> {
        let cw = self.spectrum_width();
        let mut data = vec![Complex64::zero(); self.yres * cw];
        data.par_chunks_mut(cw)
            .enumerate()
            .try_for_each(|(i, out)| {
                let mut input = field.row(i).to_vec();
                self.r2c.process(&mut input, out)
            })?;
        self.transform_columns(&mut data, &self.col_forward);
        Ok(Array2::from_shape_vec((self.yres, cw), data)?)
    }

    fn inverse(&self, spectrum: &Array2<Complex64>) -> Result<Array2<f64>> {
        let cw = self.spectrum_width();
        let xres = self.xres;
        let mut data: Vec<Complex64> = spectrum.iter().copied().collect();
        self.transform_columns(&mut data, &self.col_inverse);

        let mut out = vec![0.0; self.yres * xres];
        data.par_chunks_mut(cw)
            .zip(out.par_chunks_mut(xres))
            .try_for_each(|(row, out)| {
                // the zero and Nyquist bins of a real signal are real
                row[0].im = 0.0;
                if xres % 2 == 0 {
                    row[cw - 1].im = 0.0;
                }
                self.c2r.process(row, out)
            })?;

        let norm = 1.0 / (xres * self.yres) as f64;
        out.par_iter_mut().for_each(|v| *v *= norm);
        Ok(Array2::from_shape_vec((self.yres, xres), out)?)
    }
}

/// Moves the zero-lag sample of a full-sized array from `(0, 0)` to `(yres/2, xres/2)`.
pub fn fft_shift(data: &Array2<f64>) -> Array2<f64> {
    let (yres, xres) = data.dim();
    let (im, jm) = (yres / 2, xres / 2);
    Array2::from_shape_fn((yres, xres), |(i, j)| {
        data[((i + yres - im) % yres, (j + xres - jm) % xres)]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_array(yres: usize, xres: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((yres, xres), |_| rng.random_range(-1.0..1.0))
    }

    #[test]
    fn test_roundtrip_various_sizes() {
        for (k, &(yres, xres)) in [(8, 8), (7, 12), (15, 9), (1, 5), (33, 20)]
            .iter()
            .enumerate()
        {
            let input = random_array(yres, xres, 100 + k as u64);
            let engine = RealFft2d::new(xres, yres);
            let spectrum = engine.forward(input.view()).unwrap();
            assert_eq!(spectrum.dim(), (yres, xres / 2 + 1));
            let output = engine.inverse(&spectrum).unwrap();
            for (a, b) in input.iter().zip(output.iter()) {
                assert_relative_eq!(a, b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_forward_dc_is_the_sum() {
        let input = random_array(6, 10, 7);
        let engine = RealFft2d::new(10, 6);
        let spectrum = engine.forward(input.view()).unwrap();
        assert_relative_eq!(spectrum[(0, 0)].re, input.sum(), epsilon = 1e-12);
        assert_relative_eq!(spectrum[(0, 0)].im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fft_shift_centres_zero_lag() {
        let mut even = Array2::zeros((4, 6));
        even[(0, 0)] = 1.0;
        assert_eq!(fft_shift(&even)[(2, 3)], 1.0);

        let odd = array![[0.0, 1.0, 2.0], [3.0, 4.0, 5.0], [6.0, 7.0, 8.0]];
        let shifted = fft_shift(&odd);
        assert_eq!(shifted[(1, 1)], 0.0);
        assert_eq!(shifted[(1, 2)], 1.0);
        assert_eq!(shifted[(0, 0)], 8.0);
    }
}
