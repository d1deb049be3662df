//! Bounded one-dimensional minimization.

/// Number of equidistant samples of the coarse scan that brackets the minimum.
const SCAN_POINTS: usize = 13;

/// Upper bound on the golden-section refinement steps.
const MAX_ITERATIONS: usize = 60;

/// `(√5 − 1)/2`
const INV_PHI: f64 = 0.618_033_988_749_894_8;

/// Finds an approximate minimizer of `f` on `[from, to]`.
///
/// A coarse scan over [`SCAN_POINTS`] samples, both bounds included, picks the best sample,
/// whose two neighbours bracket the minimum. The bracket is then narrowed by golden-section
/// search until it is smaller than `tolerance` or [`MAX_ITERATIONS`] steps have been taken, so
/// `f` is evaluated at most `SCAN_POINTS + MAX_ITERATIONS + 2` times. The returned argument is
/// the best one evaluated, so its value never exceeds `f(from)` or `f(to)`. Errors returned by
/// `f` abort the search.
pub fn find_minimum_1d<F, E>(mut f: F, from: f64, to: f64, tolerance: f64) -> Result<f64, E>
where
    F: FnMut(f64) -> Result<f64, E>,
{
    let (from, to) = if from <= to { (from, to) } else { (to, from) };
    let step = (to - from) / (SCAN_POINTS - 1) as f64;
    let sample = |k: usize| if k + 1 == SCAN_POINTS { to } else { from + k as f64 * step };

    let mut best_index = 0;
    let mut best = (from, f64::INFINITY);
    for k in 0..SCAN_POINTS {
        let x = sample(k);
        let value = f(x)?;
        // NaN never wins
        if value < best.1 {
            best_index = k;
            best = (x, value);
        }
    }
    if !best.1.is_finite() {
        log::debug!("objective not finite anywhere on [{from}, {to}], using the midpoint");
        return Ok(0.5 * (from + to));
    }

    let mut a = sample(best_index.saturating_sub(1));
    let mut b = sample((best_index + 1).min(SCAN_POINTS - 1));
    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = f(c)?;
    let mut fd = f(d)?;
    let mut keep = |x: f64, value: f64| {
        if value < best.1 {
            best = (x, value);
        }
    };
    keep(c, fc);
    keep(d, fd);
    let mut iterations = 0;
    while (b - a).abs() > tolerance && iterations < MAX_ITERATIONS {
        if fc <= fd || fd.is_nan() {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = f(c)?;
            keep(c, fc);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = f(d)?;
            keep(d, fd);
        }
        iterations += 1;
    }
    log::debug!("minimum bracketed in [{a}, {b}] after {iterations} golden-section steps");
    Ok(best.0)
}
