//! Rectangular regions and boolean masks: thresholding, connected-region extraction,
//! Euclidean growth and bounding boxes.

use crate::field::Field;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Boolean mask with the same `(yres, xres)` layout as [`Field::data`].
pub type Mask = Array2<bool>;

/// A rectangle inside a field, given by its top-left corner and size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub col: usize,
    pub row: usize,
    pub width: usize,
    pub height: usize,
}

impl Region {
    pub fn new(col: usize, row: usize, width: usize, height: usize) -> Region {
        Region {
            col,
            row,
            width,
            height,
        }
    }

    /// The whole `xres` x `yres` field.
    pub fn full(xres: usize, yres: usize) -> Region {
        Region::new(0, 0, xres, yres)
    }

    /// The central third of the field, used when looking for a kernel maximum.
    pub fn central_third(xres: usize, yres: usize) -> Region {
        let col = xres / 3;
        let row = yres / 3;
        Region::new(col, row, xres - 2 * col, yres - 2 * row)
    }

    /// Box of size `width` x `height` centred on the field centre.
    pub fn centered(xres: usize, yres: usize, width: usize, height: usize) -> Region {
        let width = width.clamp(1, xres);
        let height = height.clamp(1, yres);
        Region::new(xres / 2 - width / 2, yres / 2 - height / 2, width, height)
    }

    pub fn contains(&self, col: usize, row: usize) -> bool {
        col >= self.col
            && col < self.col + self.width
            && row >= self.row
            && row < self.row + self.height
    }
}

/// Marks every sample whose magnitude reaches `threshold`.
pub fn threshold_abs(field: &Field, threshold: f64) -> Mask {
    field.data.mapv(|v| v.abs() >= threshold)
}

/// Keeps only the 4-connected component of `mask` that contains `(col, row)`.
///
/// Returns an empty mask when the seed itself is not set.
pub fn extract_region(mask: &Mask, col: usize, row: usize) -> Mask {
    let (yres, xres) = mask.dim();
    let mut region = Mask::from_elem((yres, xres), false);
    if row >= yres || col >= xres || !mask[(row, col)] {
        return region;
    }

    let mut stack = vec![(row, col)];
    region[(row, col)] = true;
    while let Some((i, j)) = stack.pop() {
        let mut visit = |ni: usize, nj: usize| {
            if mask[(ni, nj)] && !region[(ni, nj)] {
                region[(ni, nj)] = true;
                stack.push((ni, nj));
            }
        };
        if i > 0 {
            visit(i - 1, j);
        }
        if i + 1 < yres {
            visit(i + 1, j);
        }
        if j > 0 {
            visit(i, j - 1);
        }
        if j + 1 < xres {
            visit(i, j + 1);
        }
    }
    region
}

/// Grows `mask` by all pixels within Euclidean distance `distance` of a set pixel.
pub fn grow(mask: &Mask, distance: f64) -> Mask {
    let (yres, xres) = mask.dim();
    let reach = distance.max(0.0).floor() as isize;
    let limit = distance * distance;
    let offsets: Vec<(isize, isize)> = (-reach..=reach)
        .flat_map(|di| (-reach..=reach).map(move |dj| (di, dj)))
        .filter(|&(di, dj)| ((di * di + dj * dj) as f64) <= limit)
        .collect();

    let mut grown = Mask::from_elem((yres, xres), false);
    Zip::indexed(&mut grown).par_for_each(|(i, j), out| {
        *out = offsets.iter().any(|&(di, dj)| {
            let ni = i as isize + di;
            let nj = j as isize + dj;
            ni >= 0
                && nj >= 0
                && (ni as usize) < yres
                && (nj as usize) < xres
                && mask[(ni as usize, nj as usize)]
        });
    });
    grown
}

/// Tight bounding box of the set pixels, `None` for an empty mask.
pub fn bounding_box(mask: &Mask) -> Option<Region> {
    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for ((i, j), &set) in mask.indexed_iter() {
        if !set {
            continue;
        }
        bounds = Some(match bounds {
            None => (j, i, j, i),
            Some((jmin, imin, jmax, imax)) => (jmin.min(j), imin.min(i), jmax.max(j), imax.max(i)),
        });
    }
    bounds.map(|(jmin, imin, jmax, imax)| Region::new(jmin, imin, jmax + 1 - jmin, imax + 1 - imin))
}
