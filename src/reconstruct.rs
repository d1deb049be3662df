//! Reconstruction of the measured field from an estimated kernel, and the scalar diagnostics
//! reported with every estimate.

use crate::error::Result;
use crate::field::Field;
use crate::monitor::Monitor;
use crate::regions::{extract_region, grow, threshold_abs, Mask};
use cancellable_loops::{par_for_each_cancellable, par_map_reduce_cancellable};
use ndarray::parallel::prelude::*;
use ndarray::{Axis, Zip};
use serde::{Deserialize, Serialize};

/// Fraction of the kernel peak above which pixels belong to the measured core.
const WIDTH_THRESHOLD: f64 = 0.15;

/// Scalar summary of one estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Spread `sqrt(s_x² + s_y²)` of the kernel core, in physical units.
    pub width_estimate: f64,
    /// Largest kernel magnitude.
    pub height_estimate: f64,
    pub kernel_norm: f64,
    pub residual_norm: f64,
}

/// Output grids of the reconstruction step.
#[derive(Clone, Debug)]
pub struct Reconstruction {
    pub kernel: Field,
    pub convolved: Field,
    pub residual: Field,
    pub diagnostics: Diagnostics,
}

/// Convolves `field` with `kernel` (integral normalization, zero lag at `(tyres/2, txres/2)`),
/// replicating the border samples of `field` outside of it.
pub fn convolve_extend(field: &Field, kernel: &Field, monitor: &Monitor) -> Result<Field> {
    let (txres, tyres) = (kernel.xres(), kernel.yres());
    let (cx, cy) = (txres / 2, tyres / 2);
    let extended = field.pad_extend(txres - 1 - cx, cx, tyres - 1 - cy, cy);
    let weights = kernel.data.mapv(|k| k * field.dx * field.dy);

    let mut out = field.new_alike();
    par_for_each_cancellable(
        out.data.axis_iter_mut(Axis(0)).into_par_iter().enumerate(),
        monitor,
        |(i, mut row)| {
            for (j, value) in row.iter_mut().enumerate() {
                let mut sum = 0.0;
                for ((p, q), &w) in weights.indexed_iter() {
                    sum += w * extended.data[(i + tyres - 1 - p, j + txres - 1 - q)];
                }
                *value = sum;
            }
        },
    )?;
    Ok(out)
}

/// `|field|`-weighted spatial variances `(s_x², s_y²)` around the weighted centroid, in
/// physical units, optionally restricted to `mask`. Zero total weight gives `(0, 0)`.
pub fn dispersion(
    field: &Field,
    mask: Option<&Mask>,
    monitor: &Monitor,
) -> Result<(f64, f64)> {
    let weights = match mask {
        Some(mask) => Zip::from(&field.data)
            .and(mask)
            .map_collect(|&v, &set| if set { v.abs() } else { 0.0 }),
        None => field.data.mapv(f64::abs),
    };
    let (dx, dy) = (field.dx, field.dy);
    let [w, wx, wy, wxx, wyy] = par_map_reduce_cancellable(
        weights.axis_iter(Axis(0)).into_par_iter().enumerate(),
        monitor,
        |(i, row)| {
            let y = i as f64 * dy;
            let mut acc = [0.0; 5];
            for (j, &w) in row.iter().enumerate() {
                let x = j as f64 * dx;
                acc[0] += w;
                acc[1] += w * x;
                acc[2] += w * y;
                acc[3] += w * x * x;
                acc[4] += w * y * y;
            }
            acc
        },
        || [0.0; 5],
        |mut a, b| {
            for (x, y) in a.iter_mut().zip(b) {
                *x += y;
            }
            a
        },
    )?;
    if w <= 0.0 {
        return Ok((0.0, 0.0));
    }
    let (mx, my) = (wx / w, wy / w);
    Ok(((wxx / w - mx * mx).max(0.0), (wyy / w - my * my).max(0.0)))
}

/// Width `sqrt(s_x² + s_y²)` of the kernel core around its centre pixel.
///
/// The core is the connected component above 15% of the peak magnitude that contains the
/// centre, grown by `round(0.5·ln(xres·yres))` pixels. A centre pixel below the threshold
/// gives 0.
pub fn measure_width(kernel: &Field, monitor: &Monitor) -> Result<f64> {
    let (xres, yres) = (kernel.xres(), kernel.yres());
    let (_, _, peak) = kernel.max_abs();
    let (col, row) = kernel.center();
    let mask = threshold_abs(kernel, WIDTH_THRESHOLD * peak);
    if peak <= 0.0 || !mask[(row, col)] {
        log::warn!("kernel centre is below {WIDTH_THRESHOLD} of its peak, width estimate is zero");
        return Ok(0.0);
    }
    let core = extract_region(&mask, col, row);
    let core = grow(&core, (0.5 * ((xres * yres) as f64).ln()).round());
    let (sx2, sy2) = dispersion(kernel, Some(&core), monitor)?;
    Ok((sx2 + sy2).sqrt())
}

/// Convolves the mean-removed ideal field with `kernel`, forms the residual against
/// `measured` and collects the diagnostics.
///
/// `kernel` is in integral normalization; with `as_integral == false` it is converted to
/// discrete normalization before being returned.
pub fn reconstruct(
    measured: &Field,
    ideal: &Field,
    mut kernel: Field,
    as_integral: bool,
    monitor: &Monitor,
) -> Result<Reconstruction> {
    let mut centred = ideal.clone();
    centred.add_scalar(-ideal.mean());
    let mut convolved = convolve_extend(&centred, &kernel, monitor)?;
    convolved.add_scalar(measured.mean());
    let residual = measured.subtract(&convolved);

    if !as_integral {
        kernel.multiply(measured.dx * measured.dy);
    }
    let (_, _, peak) = kernel.max_abs();
    let diagnostics = Diagnostics {
        width_estimate: measure_width(&kernel, monitor)?,
        height_estimate: peak,
        kernel_norm: kernel.l2_norm(as_integral),
        residual_norm: residual.l2_norm(as_integral),
    };
    Ok(Reconstruction {
        kernel,
        convolved,
        residual,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_convolution_with_impulse_shifts() {
        let field = Field::from_array(
            Array2::from_shape_fn((5, 6), |(i, j)| (10 * i + j) as f64),
            0.5,
            0.5,
        );
        // impulse at lag (+1 row, -1 col), integral normalization
        let mut kernel = Field::new(3, 3, 0.5, 0.5);
        kernel.data[(2, 0)] = 4.0;
        let out = convolve_extend(&field, &kernel, &Monitor::new()).unwrap();
        assert_relative_eq!(out.data[(2, 2)], 13.0);
        // replicated top edge and right edge
        assert_relative_eq!(out.data[(0, 0)], 1.0);
        assert_relative_eq!(out.data[(3, 5)], 25.0);
    }

    #[test]
    fn test_convolution_can_be_cancelled() {
        let field = Field::new(8, 8, 1.0, 1.0);
        let kernel = Field::new(3, 3, 1.0, 1.0);
        let monitor = Monitor::with_hook(|| true);
        assert!(matches!(
            convolve_extend(&field, &kernel, &monitor),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn test_dispersion_of_two_points() {
        let field = Field::from_array(array![[1.0, 0.0, -1.0], [0.0, 0.0, 0.0]], 2.0, 1.0);
        let monitor = Monitor::new();
        let (sx2, sy2) = dispersion(&field, None, &monitor).unwrap();
        assert_relative_eq!(sx2, 4.0);
        assert_relative_eq!(sy2, 0.0);
        let mut mask = Mask::from_elem((2, 3), false);
        mask[(0, 0)] = true;
        assert_eq!(dispersion(&field, Some(&mask), &monitor).unwrap(), (0.0, 0.0));
        assert_eq!(
            dispersion(&Field::new(3, 3, 1.0, 1.0), None, &monitor).unwrap(),
            (0.0, 0.0)
        );
        assert!(matches!(
            dispersion(&field, None, &Monitor::with_hook(|| true)),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn test_width_of_impulse_and_off_centre_kernel() {
        let mut kernel = Field::new(9, 9, 1.0, 1.0);
        kernel.data[(4, 4)] = 1.0;
        let monitor = Monitor::new();
        assert_eq!(measure_width(&kernel, &monitor).unwrap(), 0.0);

        // plus-shaped core: s_x² = s_y² = 2/5
        let mut wide = Field::new(9, 9, 1.0, 1.0);
        for (i, j) in [(4, 3), (4, 4), (4, 5), (3, 4), (5, 4)] {
            wide.data[(i, j)] = 1.0;
        }
        assert_relative_eq!(
            measure_width(&wide, &monitor).unwrap(),
            (0.8f64).sqrt(),
            epsilon = 1e-12
        );

        let mut off = Field::new(9, 9, 1.0, 1.0);
        off.data[(0, 0)] = 1.0;
        assert_eq!(measure_width(&off, &monitor).unwrap(), 0.0);
    }

    #[test]
    fn test_reconstruction_of_exact_kernel() {
        let ideal = Field::from_array(
            Array2::from_shape_fn((6, 7), |(i, j)| ((i * 7 + j) % 5) as f64),
            1.0,
            1.0,
        );
        let mut measured = ideal.clone();
        measured.add_scalar(2.0);
        let mut kernel = Field::new(3, 3, 1.0, 1.0);
        kernel.data[(1, 1)] = 1.0;
        let result = reconstruct(&measured, &ideal, kernel, false, &Monitor::new()).unwrap();
        assert_relative_eq!(result.diagnostics.residual_norm, 0.0, epsilon = 1e-12);
        assert_relative_eq!(result.diagnostics.kernel_norm, 1.0);
        assert_relative_eq!(result.diagnostics.height_estimate, 1.0);
        assert_eq!(result.diagnostics.width_estimate, 0.0);
        assert_relative_eq!(result.convolved.data[(2, 3)], measured.data[(2, 3)]);
    }
}
