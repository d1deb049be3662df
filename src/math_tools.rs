//! This module provides the windowing functions used to suppress edge leakage before the
//! FFT-based steps, and the field preparation (mean removal plus separable windowing)
//! applied to both measured and ideal fields.

use crate::field::Field;
use ndarray::{Array1, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::{Display, Formatter};

/// Enum representing the different types of FFT window functions supported.
///
/// Windows are evaluated on a periodic grid `i/n`, `i = 0..n`, and applied
/// separably along rows and columns.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub enum Windowing {
    /// No windowing, the field is only mean-corrected.
    None,
    /// Hann window
    Hann,
    /// Hamming window
    Hamming,
    /// Blackman window
    Blackman,
    /// Lanczos (sinc) window
    Lanczos,
    /// Welch (parabolic) window
    #[default]
    Welch,
    /// Rectangular window with halved end samples
    Rect,
    /// Nuttall window
    Nuttall,
    /// Flat Top window
    FlatTop,
    /// Kaiser window with alpha = 2.5
    Kaiser25,
}

impl Display for Windowing {
    /// Provides a user-friendly string representation of each window type.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Windowing::None => write!(f, "None"),
            Windowing::Hann => write!(f, "Hann"),
            Windowing::Hamming => write!(f, "Hamming"),
            Windowing::Blackman => write!(f, "Blackman"),
            Windowing::Lanczos => write!(f, "Lanczos"),
            Windowing::Welch => write!(f, "Welch"),
            Windowing::Rect => write!(f, "Rect"),
            Windowing::Nuttall => write!(f, "Nuttall"),
            Windowing::FlatTop => write!(f, "Flat Top"),
            Windowing::Kaiser25 => write!(f, "Kaiser 2.5"),
        }
    }
}

/// Zeroth order modified Bessel function of the first kind, by its power series.
fn bessel_i0(x: f64) -> f64 {
    let q = 0.25 * x * x;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;
    while term > 1e-16 * sum {
        term *= q / (k * k);
        sum += term;
        k += 1.0;
    }
    sum
}

/// Computes the value of window `windowing` for sample `i` out of `n`.
fn window_value(windowing: Windowing, i: usize, n: usize) -> f64 {
    let t = i as f64 / n as f64;
    // symmetric coordinate in [-1, 1)
    let x = 2.0 * t - 1.0;
    let c = |k: f64| (2.0 * PI * k * t).cos();
    match windowing {
        Windowing::None => 1.0,
        Windowing::Hann => 0.5 - 0.5 * c(1.0),
        Windowing::Hamming => 0.54 - 0.46 * c(1.0),
        Windowing::Blackman => 0.42 - 0.5 * c(1.0) + 0.08 * c(2.0),
        Windowing::Lanczos => {
            if x.abs() < 1e-20 {
                1.0
            } else {
                (PI * x).sin() / (PI * x)
            }
        }
        Windowing::Welch => 1.0 - x * x,
        Windowing::Rect => {
            if i == 0 || i + 1 == n {
                0.5
            } else {
                1.0
            }
        }
        Windowing::Nuttall => 0.355768 - 0.487396 * c(1.0) + 0.144232 * c(2.0) - 0.012604 * c(3.0),
        Windowing::FlatTop => {
            (1.0 - 1.93 * c(1.0) + 1.29 * c(2.0) - 0.388 * c(3.0) + 0.028 * c(4.0)) / 4.636
        }
        Windowing::Kaiser25 => {
            let alpha = 2.5 * PI;
            bessel_i0(alpha * (1.0 - x * x).max(0.0).sqrt()) / bessel_i0(alpha)
        }
    }
}

/// Window coefficients for a signal of length `n`.
pub fn window_coefficients(windowing: Windowing, n: usize) -> Array1<f64> {
    if n <= 1 {
        return Array1::ones(n);
    }
    Array1::from_shape_fn(n, |i| window_value(windowing, i, n))
}

/// Applies `windowing` along rows and along columns of `field`, in place.
pub fn apply_window(field: &mut Field, windowing: Windowing) {
    if windowing == Windowing::None {
        return;
    }
    let wx = window_coefficients(windowing, field.xres());
    let wy = window_coefficients(windowing, field.yres());
    Zip::from(field.data.axis_iter_mut(Axis(0)))
        .and(&wy)
        .par_for_each(|mut row, &qy| {
            Zip::from(&mut row).and(&wx).for_each(|v, &qx| *v *= qx * qy);
        });
}

/// Removes the mean of `field` and windows it in both directions.
///
/// Returns a new field; the input is left untouched.
pub fn prepare_field(field: &Field, windowing: Windowing) -> Field {
    let mut prepared = field.clone();
    prepared.add_scalar(-field.mean());
    apply_window(&mut prepared, windowing);
    prepared
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_windows_peak_in_the_middle() {
        for windowing in [
            Windowing::Hann,
            Windowing::Hamming,
            Windowing::Blackman,
            Windowing::Lanczos,
            Windowing::Welch,
            Windowing::Nuttall,
            Windowing::Kaiser25,
        ] {
            let w = window_coefficients(windowing, 16);
            assert_relative_eq!(w[8], 1.0, epsilon = 1e-3);
            assert!(w[0] < w[4], "{windowing} does not taper");
        }
        let flat_top = window_coefficients(Windowing::FlatTop, 16);
        assert_relative_eq!(flat_top[8], 1.0, epsilon = 1e-12);
        assert_relative_eq!(flat_top[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_welch_values() {
        let w = window_coefficients(Windowing::Welch, 4);
        assert_relative_eq!(w[0], 0.0);
        assert_relative_eq!(w[1], 0.75);
        assert_relative_eq!(w[2], 1.0);
        assert_relative_eq!(w[3], 0.75);
    }

    #[test]
    fn test_prepare_field_removes_mean_without_touching_input() {
        let field = Field::from_array(
            Array2::from_shape_fn((6, 8), |(i, j)| 5.0 + (i * 8 + j) as f64),
            1.0,
            1.0,
        );
        let prepared = prepare_field(&field, Windowing::None);
        assert_relative_eq!(prepared.mean(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(field.data[(0, 0)], 5.0);

        let windowed = prepare_field(&field, Windowing::Hann);
        assert_relative_eq!(windowed.data[(0, 3)], 0.0);
        assert_relative_eq!(windowed.data[(2, 0)], 0.0);
    }

    #[test]
    fn test_bessel_i0() {
        assert_relative_eq!(bessel_i0(0.0), 1.0);
        assert_relative_eq!(bessel_i0(1.0), 1.2660658777520082, epsilon = 1e-12);
    }
}
