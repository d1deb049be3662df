//! Support estimation: where the transfer function lives inside a full-sized kernel and how
//! large a centred, odd-sized kernel window must be to cover it.

use crate::error::Result;
use crate::field::Field;
use crate::regions::{bounding_box, extract_region, threshold_abs, Region};
use crate::solvers::frequency::deconvolve_regularized;
use crate::spectral::SpectralEngine;

/// Deliberately large regularization of the rough kernel, erring on the side of a too large
/// support.
const ROUGH_SIGMA: f64 = 4.0;

/// Fraction of the maximum above which the rough kernel counts as support.
const SUPPORT_THRESHOLD: f64 = 0.05;

/// Estimates the bounding box of the transfer function support from prepared fields.
///
/// The result is clamped to the field and capped at `xres/6` x `yres/6`. When the rough
/// kernel has no usable maximum the capped box centred in the field is returned instead.
pub fn estimate_region(
    measured: &Field,
    ideal: &Field,
    engine: &dyn SpectralEngine,
) -> Result<Region> {
    let (xres, yres) = (measured.xres(), measured.yres());
    let fallback = Region::centered(xres, yres, xres / 6, yres / 6);

    let rough = deconvolve_regularized(measured, ideal, ROUGH_SIGMA, engine)?;
    let (jmax, imax, m) = rough.max_abs_in(&Region::central_third(xres, yres));
    log::debug!("rough kernel maximum {m:e} at ({jmax}, {imax})");
    if !m.is_finite() || m <= 0.0 {
        log::warn!("rough kernel vanishes, falling back to {fallback:?}");
        return Ok(fallback);
    }

    let mask = extract_region(&threshold_abs(&rough, SUPPORT_THRESHOLD * m), jmax, imax);
    let Some(bbox) = bounding_box(&mask) else {
        log::warn!("no support region found, falling back to {fallback:?}");
        return Ok(fallback);
    };

    let ext = (0.5 * ((xres * yres) as f64).ln()).round() as usize + 1;
    let col = bbox.col.saturating_sub(ext);
    let row = bbox.row.saturating_sub(ext);
    let width = (bbox.col + bbox.width + ext).min(xres) - col;
    let height = (bbox.row + bbox.height + ext).min(yres) - row;
    log::debug!(
        "estimated region: {width}x{height} centred at ({}, {})",
        col + width / 2,
        row + height / 2
    );

    Ok(Region::new(
        col,
        row,
        width.min(xres / 6).max(1),
        height.min(yres / 6).max(1),
    ))
}

/// Smallest odd length of a window centred in `0..res` that covers `pos..pos + len`.
///
/// The extent is measured from whichever end lies farther from the opposite edge and the result
/// never exceeds the largest odd length fitting into `res`.
pub fn symmetrize(pos: usize, len: usize, res: usize) -> usize {
    if res == 0 {
        return 1;
    }
    let last = res - 1;
    let pos = pos.min(last);
    let epos = (pos + len.max(1) - 1).min(last);
    let len = epos.max(last - pos) - pos.min(last - epos) + 1;
    let odd_cap = if res % 2 == 1 { res } else { res - 1 };
    (len | 1).min(odd_cap.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math_tools::{prepare_field, Windowing};
    use crate::spectral::RealFft2d;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_symmetrize() {
        // 30..35 mirrored around the centre of 64 samples spans 29..35
        assert_eq!(symmetrize(30, 5, 64), 7);
        assert_eq!(symmetrize(0, 1, 9), 9);
        assert_eq!(symmetrize(4, 1, 9), 1);
        assert_eq!(symmetrize(3, 3, 9), 3);
        assert_eq!(symmetrize(0, 64, 64), 63);
        assert_eq!(symmetrize(2, 2, 8), 5);
        for res in 1..20 {
            for pos in 0..res {
                for len in 1..=res - pos {
                    let tres = symmetrize(pos, len, res);
                    assert_eq!(tres % 2, 1);
                    assert!(tres <= res);
                }
            }
        }
    }

    fn blurred_pair(seed: u64) -> (Field, Field) {
        let mut rng = StdRng::seed_from_u64(seed);
        let ideal = Array2::from_shape_fn((256, 256), |_| rng.random_range(-1.0..1.0));
        // 3x3 box blur with periodic wrap-around
        let measured = Array2::from_shape_fn((256, 256), |(i, j)| {
            let mut sum = 0.0;
            for di in 0..3 {
                for dj in 0..3 {
                    sum += ideal[((i + 255 + di) % 256, (j + 255 + dj) % 256)];
                }
            }
            sum / 9.0
        });
        (
            Field::from_array(measured, 1.0, 1.0),
            Field::from_array(ideal, 1.0, 1.0),
        )
    }

    #[test]
    fn test_region_contains_centre_and_is_capped() {
        let (measured, ideal) = blurred_pair(21);
        let measured = prepare_field(&measured, Windowing::None);
        let ideal = prepare_field(&ideal, Windowing::None);
        let region = estimate_region(&measured, &ideal, &RealFft2d::new(256, 256)).unwrap();
        assert!(region.contains(128, 128));
        assert!(region.width <= 42 && region.height <= 42);
        assert!(region.width >= 3 && region.height >= 3);
        assert!(region.col + region.width <= 256);
        assert!(region.row + region.height <= 256);
    }
}
