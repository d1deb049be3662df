//! This module defines the sampled two-dimensional field that flows through the estimator,
//! together with the elementary statistics and geometry helpers the solvers rely on.

use crate::regions::Region;
use ndarray::parallel::prelude::*;
use ndarray::{s, Array2, Zip};
use serde::{Deserialize, Serialize};

/// A real-valued field sampled on a regular grid.
///
/// The data array is stored row-major with shape `(yres, xres)`, so `data[(row, col)]`
/// addresses the sample in row `row` and column `col`.
///
/// # Fields
/// - `data`: The sample values.
/// - `dx`, `dy`: Lateral sample spacing in the x and y directions.
/// - `x_offset`, `y_offset`: Physical position of the top-left corner of the grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub data: Array2<f64>,
    pub dx: f64,
    pub dy: f64,
    pub x_offset: f64,
    pub y_offset: f64,
}

impl Field {
    /// Creates a zero-filled field with `xres` columns and `yres` rows.
    pub fn new(xres: usize, yres: usize, dx: f64, dy: f64) -> Field {
        Field::from_array(Array2::zeros((yres, xres)), dx, dy)
    }

    /// Wraps an existing `(yres, xres)` array.
    pub fn from_array(data: Array2<f64>, dx: f64, dy: f64) -> Field {
        Field {
            data,
            dx,
            dy,
            x_offset: 0.0,
            y_offset: 0.0,
        }
    }

    /// Creates a field with the same sampling and offsets but new values.
    pub fn with_data(&self, data: Array2<f64>) -> Field {
        Field {
            data,
            dx: self.dx,
            dy: self.dy,
            x_offset: self.x_offset,
            y_offset: self.y_offset,
        }
    }

    /// Creates a zero-filled field with the same shape and sampling.
    pub fn new_alike(&self) -> Field {
        self.with_data(Array2::zeros(self.data.raw_dim()))
    }

    pub fn xres(&self) -> usize {
        self.data.ncols()
    }

    pub fn yres(&self) -> usize {
        self.data.nrows()
    }

    /// Physical width of the field.
    pub fn xreal(&self) -> f64 {
        self.xres() as f64 * self.dx
    }

    /// Physical height of the field.
    pub fn yreal(&self) -> f64 {
        self.yres() as f64 * self.dy
    }

    /// Index `(col, row)` of the geometric centre, which is also where a shifted spectrum
    /// keeps its zero-frequency sample.
    pub fn center(&self) -> (usize, usize) {
        (self.xres() / 2, self.yres() / 2)
    }

    /// Checks that both fields have identical resolution and lateral sampling.
    pub fn is_compatible(&self, other: &Field) -> bool {
        fn same(a: f64, b: f64) -> bool {
            (a - b).abs() <= 1e-9 * a.abs().max(b.abs())
        }
        self.data.dim() == other.data.dim() && same(self.dx, other.dx) && same(self.dy, other.dy)
    }

    pub fn mean(&self) -> f64 {
        self.data.mean().unwrap_or(0.0)
    }

    /// Root mean square deviation from the mean.
    pub fn rms(&self) -> f64 {
        let mean = self.mean();
        let n = self.data.len().max(1) as f64;
        let sum: f64 = self.data.par_iter().map(|&v| (v - mean) * (v - mean)).sum();
        (sum / n).sqrt()
    }

    pub fn sum_of_squares(&self) -> f64 {
        self.data.par_iter().map(|&v| v * v).sum()
    }

    /// L2 norm, either as an integral `sqrt(Σ v² dx dy)` or as a plain sum `sqrt(Σ v²)`.
    pub fn l2_norm(&self, as_integral: bool) -> f64 {
        let q = if as_integral { self.dx * self.dy } else { 1.0 };
        (q * self.sum_of_squares()).sqrt()
    }

    /// Position `(col, row)` and magnitude of the largest absolute value.
    pub fn max_abs(&self) -> (usize, usize, f64) {
        self.max_abs_in(&Region::full(self.xres(), self.yres()))
    }

    /// Like [`Field::max_abs`] but restricted to `region`. Ties keep the first sample in
    /// row-major order.
    pub fn max_abs_in(&self, region: &Region) -> (usize, usize, f64) {
        let mut best = (region.col, region.row, f64::NEG_INFINITY);
        for i in region.row..region.row + region.height {
            for j in region.col..region.col + region.width {
                let v = self.data[(i, j)].abs();
                if v > best.2 {
                    best = (j, i, v);
                }
            }
        }
        best
    }

    pub fn add_scalar(&mut self, value: f64) {
        self.data.par_mapv_inplace(|v| v + value);
    }

    pub fn multiply(&mut self, factor: f64) {
        self.data.par_mapv_inplace(|v| v * factor);
    }

    /// Elementwise `self - other`. Both fields must have the same shape.
    pub fn subtract(&self, other: &Field) -> Field {
        let mut out = self.data.clone();
        Zip::from(&mut out)
            .and(&other.data)
            .par_for_each(|o, &b| *o -= b);
        self.with_data(out)
    }

    /// Copies the rectangle `region` into a new field and moves the offsets with it.
    pub fn crop(&self, region: &Region) -> Field {
        let data = self
            .data
            .slice(s![
                region.row..region.row + region.height,
                region.col..region.col + region.width
            ])
            .to_owned();
        Field {
            data,
            dx: self.dx,
            dy: self.dy,
            x_offset: self.x_offset + region.col as f64 * self.dx,
            y_offset: self.y_offset + region.row as f64 * self.dy,
        }
    }

    /// Enlarges the field by replicating its border samples.
    pub fn pad_extend(&self, left: usize, right: usize, top: usize, bottom: usize) -> Field {
        let (xres, yres) = (self.xres(), self.yres());
        let data = Array2::from_shape_fn((yres + top + bottom, xres + left + right), |(i, j)| {
            let si = i.saturating_sub(top).min(yres - 1);
            let sj = j.saturating_sub(left).min(xres - 1);
            self.data[(si, sj)]
        });
        Field {
            data,
            dx: self.dx,
            dy: self.dy,
            x_offset: self.x_offset - left as f64 * self.dx,
            y_offset: self.y_offset - top as f64 * self.dy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_statistics() {
        let field = Field::from_array(array![[1.0, 2.0], [3.0, 6.0]], 0.5, 2.0);
        assert_relative_eq!(field.mean(), 3.0);
        assert_relative_eq!(field.rms(), (14.0f64 / 4.0).sqrt());
        assert_relative_eq!(field.l2_norm(false), 50.0f64.sqrt());
        assert_relative_eq!(field.l2_norm(true), 50.0f64.sqrt());
        assert_eq!(field.max_abs(), (1, 1, 6.0));
        assert_relative_eq!(field.xreal(), 1.0);
        assert_relative_eq!(field.yreal(), 4.0);
    }

    #[test]
    fn test_compatibility_checks_shape_and_sampling() {
        let a = Field::new(4, 3, 1.0, 1.0);
        assert!(a.is_compatible(&Field::new(4, 3, 1.0, 1.0)));
        assert!(!a.is_compatible(&Field::new(3, 4, 1.0, 1.0)));
        assert!(!a.is_compatible(&Field::new(4, 3, 1.0, 2.0)));
    }

    #[test]
    fn test_crop_moves_offsets() {
        let field = Field::from_array(
            Array2::from_shape_fn((4, 5), |(i, j)| (10 * i + j) as f64),
            0.5,
            0.25,
        );
        let cropped = field.crop(&Region::new(1, 2, 3, 2));
        assert_eq!(cropped.data, array![[21.0, 22.0, 23.0], [31.0, 32.0, 33.0]]);
        assert_relative_eq!(cropped.x_offset, 0.5);
        assert_relative_eq!(cropped.y_offset, 0.5);
    }

    #[test]
    fn test_pad_extend_replicates_borders() {
        let field = Field::from_array(array![[1.0, 2.0], [3.0, 4.0]], 1.0, 1.0);
        let padded = field.pad_extend(1, 0, 0, 2);
        assert_eq!(
            padded.data,
            array![
                [1.0, 1.0, 2.0],
                [3.0, 3.0, 4.0],
                [3.0, 3.0, 4.0],
                [3.0, 3.0, 4.0]
            ]
        );
        assert_relative_eq!(padded.x_offset, -1.0);
    }
}
