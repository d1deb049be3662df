//! Deconvolution solvers recovering the kernel `k` in `measured ≈ ideal ⊛ k`.
//!
//! # Solvers
//!
//! * **Frequency domain**: regularized inverse filter and pseudo-Wiener filter. Both produce a
//!   full-sized kernel that is cropped to the requested size afterwards.
//!
//! * **Spatial domain**: least-squares fit of a kernel of fixed size over the interior of the
//!   field.
//!
//! All solvers expect mean-removed (prepared) fields and return kernels in integral
//! normalization, with the zero lag at `(tyres/2, txres/2)`.

use crate::field::Field;
use crate::regions::Region;

/// Regularized and pseudo-Wiener filters.
pub mod frequency;

/// Spatial least-squares kernel fit.
pub mod least_squares;

/// Sets the kernel offsets so that the zero-lag pixel is centred at the physical origin.
pub fn centre_kernel(kernel: &mut Field) {
    kernel.x_offset = -((kernel.xres() / 2) as f64 + 0.5) * kernel.dx;
    kernel.y_offset = -((kernel.yres() / 2) as f64 + 0.5) * kernel.dy;
}

/// Cuts a `txres` x `tyres` window around the zero lag out of a full-sized kernel.
pub fn crop_kernel(kernel: &Field, txres: usize, tyres: usize) -> Field {
    let region = Region::centered(kernel.xres(), kernel.yres(), txres, tyres);
    let mut cropped = kernel.crop(&region);
    centre_kernel(&mut cropped);
    cropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_crop_keeps_zero_lag_in_the_centre() {
        for &(xres, yres, txres, tyres) in &[(64, 63, 5, 4), (63, 64, 4, 5), (9, 9, 9, 9)] {
            let mut data = Array2::zeros((yres, xres));
            data[(yres / 2, xres / 2)] = 1.0;
            let kernel = Field::from_array(data, 0.5, 2.0);
            let cropped = crop_kernel(&kernel, txres, tyres);
            assert_eq!(cropped.data.dim(), (tyres, txres));
            assert_eq!(cropped.data[(tyres / 2, txres / 2)], 1.0);
            // centre of the zero-lag pixel sits at the origin
            let x = cropped.x_offset + (txres / 2) as f64 * 0.5 + 0.25;
            let y = cropped.y_offset + (tyres / 2) as f64 * 2.0 + 1.0;
            assert_relative_eq!(x, 0.0, epsilon = 1e-12);
            assert_relative_eq!(y, 0.0, epsilon = 1e-12);
        }
    }
}
