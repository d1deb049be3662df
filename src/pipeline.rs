//! Top-level estimation calls: validation, field preparation, kernel sizing, σ selection,
//! solving and reconstruction.

use crate::config::{default_border, EstimationConfig, Method};
use crate::error::{Error, Result};
use crate::field::Field;
use crate::math_tools::{prepare_field, Windowing};
use crate::monitor::Monitor;
use crate::reconstruct::{reconstruct, Diagnostics};
use crate::regions::Region;
use crate::sigma::{least_squares_sigma, regularized_sigma, wiener_sigma};
use crate::solvers::crop_kernel;
use crate::solvers::frequency::{deconvolve_regularized, deconvolve_wiener};
use crate::solvers::least_squares::{assemble_normal_equations, NormalEquations};
use crate::spectral::{RealFft2d, SpectralEngine};
use crate::support::{self, symmetrize};
use once_cell::unsync::OnceCell;

/// Result of one [`estimate`] call. Every grid is a fresh allocation owned by the caller.
#[derive(Clone, Debug)]
pub struct Estimate {
    /// Transfer function, zero lag at `(kernel_height/2, kernel_width/2)`.
    pub kernel: Field,
    /// Mean-removed ideal field convolved with the kernel, plus the mean of the measured field.
    pub convolved: Field,
    /// `measured − convolved`.
    pub residual: Field,
    pub diagnostics: Diagnostics,
    pub method: Method,
    /// Regularization actually used, configured or found automatically.
    pub sigma: f64,
    pub kernel_width: usize,
    pub kernel_height: usize,
    /// Border excluded from the least-squares fit.
    pub border: usize,
}

/// Full-sized frequency-domain solver.
type Deconvolve = fn(&Field, &Field, f64, &dyn SpectralEngine) -> Result<Field>;

/// Dimensions of a full-sized kernel for `field`.
pub fn full_size(field: &Field) -> (usize, usize) {
    (field.xres(), field.yres())
}

/// Both fields prepared for solving, the transform planned for their size and the
/// intermediate results shared by kernel sizing, σ selection and solving.
struct Prepared {
    measured: Field,
    ideal: Field,
    engine: RealFft2d,
    region: OnceCell<Region>,
    equations: OnceCell<NormalEquations>,
}

impl Prepared {
    /// Support region of a rough kernel, estimated on first use.
    fn region(&self) -> Result<&Region> {
        self.region
            .get_or_try_init(|| support::estimate_region(&self.measured, &self.ideal, &self.engine))
    }

    /// Least-squares normal equations, assembled on first use. One call only ever asks for a
    /// single kernel size and border.
    fn normal_equations(
        &self,
        txres: usize,
        tyres: usize,
        border: usize,
        monitor: &Monitor,
    ) -> Result<&NormalEquations> {
        self.equations.get_or_try_init(|| {
            assemble_normal_equations(&self.measured, &self.ideal, txres, tyres, border, monitor)
        })
    }
}

fn check_compatible(measured: &Field, ideal: &Field) -> Result<()> {
    if measured.is_compatible(ideal) {
        return Ok(());
    }
    Err(Error::ShapeMismatch {
        measured_xres: measured.xres(),
        measured_yres: measured.yres(),
        measured_dx: measured.dx,
        measured_dy: measured.dy,
        ideal_xres: ideal.xres(),
        ideal_yres: ideal.yres(),
        ideal_dx: ideal.dx,
        ideal_dy: ideal.dy,
    })
}

/// Expects compatible fields.
fn prepare(measured: &Field, ideal: &Field, windowing: Windowing) -> Result<Prepared> {
    if measured.data.is_empty() {
        return Err(Error::InvalidConfig("fields must not be empty".to_string()));
    }
    if ideal.rms() == 0.0 {
        return Err(Error::DegenerateInput("ideal"));
    }
    if measured.rms() == 0.0 {
        return Err(Error::DegenerateInput("measured"));
    }
    Ok(Prepared {
        measured: prepare_field(measured, windowing),
        ideal: prepare_field(ideal, windowing),
        engine: RealFft2d::new(measured.xres(), measured.yres()),
        region: OnceCell::new(),
        equations: OnceCell::new(),
    })
}

/// Kernel size `(txres, tyres)` from the configuration, estimating missing dimensions from the
/// support of a rough kernel.
fn resolve_kernel_size(
    method: Method,
    config: &EstimationConfig,
    prepared: &Prepared,
) -> Result<(usize, usize)> {
    let (xres, yres) = full_size(&prepared.measured);
    if let (Some(width), Some(height)) = (config.kernel_width, config.kernel_height) {
        if width > xres || height > yres {
            log::debug!("clamping kernel size {width}x{height} to the field size {xres}x{yres}");
        }
        return Ok((width.min(xres), height.min(yres)));
    }

    let region = prepared.region()?;
    let mut txres = symmetrize(region.col, region.width, xres);
    let mut tyres = symmetrize(region.row, region.height, yres);
    if !method.is_full_sized() {
        txres = txres.min((xres / 3) | 1);
        tyres = tyres.min((yres / 3) | 1);
    }
    log::debug!("estimated kernel size {txres}x{tyres} from region {region:?}");
    Ok((
        config.kernel_width.map_or(txres, |w| w.min(xres)),
        config.kernel_height.map_or(tyres, |h| h.min(yres)),
    ))
}

/// σ for `method`, configured or found automatically from the prepared fields.
fn resolve_sigma(
    method: Method,
    config: &EstimationConfig,
    prepared: &Prepared,
    (txres, tyres, border): (usize, usize, usize),
    monitor: &Monitor,
) -> Result<f64> {
    if let Some(sigma) = config.sigma {
        return Ok(sigma);
    }
    let sigma = match method {
        Method::Regularized => {
            regularized_sigma(&prepared.measured, &prepared.ideal, &prepared.engine)?
        }
        Method::LeastSquares => {
            least_squares_sigma(prepared.normal_equations(txres, tyres, border, monitor)?)?
        }
        Method::Wiener => wiener_sigma(
            &prepared.measured,
            &prepared.ideal,
            prepared.region()?,
            &prepared.engine,
            monitor,
        )?,
    };
    log::debug!("{method}: automatic sigma {sigma:e}");
    Ok(sigma)
}

/// Estimates the transfer function `k` with `measured ≈ ideal ⊛ k`.
///
/// # Arguments
/// * `measured` - The measured (blurred) field.
/// * `ideal` - The ideal (sharp) field, same shape and sampling as `measured`.
/// * `method` - Solver and σ selection strategy.
/// * `config` - Kernel size, border, σ, windowing and normalization. `None` entries are
///   determined automatically.
///
/// # Errors
/// [`Error::ShapeMismatch`], [`Error::InvalidConfig`], [`Error::DegenerateInput`] and, for
/// least squares, [`Error::SingularSystem`].
pub fn estimate(
    measured: &Field,
    ideal: &Field,
    method: Method,
    config: &EstimationConfig,
) -> Result<Estimate> {
    estimate_with_monitor(measured, ideal, method, config, &Monitor::new())
}

/// Like [`estimate`], but polls `monitor` between row chunks and reports progress through it.
pub fn estimate_with_monitor(
    measured: &Field,
    ideal: &Field,
    method: Method,
    config: &EstimationConfig,
    monitor: &Monitor,
) -> Result<Estimate> {
    check_compatible(measured, ideal)?;
    config.validate()?;
    let prepared = prepare(measured, ideal, config.windowing)?;
    monitor.set_progress(Some(0.0));
    let outcome = run(measured, ideal, method, config, &prepared, monitor);
    monitor.set_progress(None);
    outcome
}

fn run(
    measured: &Field,
    ideal: &Field,
    method: Method,
    config: &EstimationConfig,
    prepared: &Prepared,
    monitor: &Monitor,
) -> Result<Estimate> {
    let (txres, tyres) = resolve_kernel_size(method, config, prepared)?;
    let border = config.border.unwrap_or_else(|| default_border(txres, tyres));
    monitor.check()?;
    let sigma = resolve_sigma(method, config, prepared, (txres, tyres, border), monitor)?;
    monitor.set_progress(Some(0.5));
    monitor.check()?;

    let kernel = if method.is_full_sized() {
        let deconvolve: Deconvolve = match method {
            Method::Wiener => deconvolve_wiener,
            _ => deconvolve_regularized,
        };
        let full = deconvolve(&prepared.measured, &prepared.ideal, sigma, &prepared.engine)?;
        crop_kernel(&full, txres, tyres)
    } else {
        prepared
            .normal_equations(txres, tyres, border, monitor)?
            .kernel(sigma, &prepared.measured)?
    };
    monitor.set_progress(Some(0.75));

    let result = reconstruct(measured, ideal, kernel, config.normalize_as_integral, monitor)?;
    log::info!(
        "{method}: {txres}x{tyres} kernel, sigma {sigma:e}, residual norm {:e}",
        result.diagnostics.residual_norm
    );
    Ok(Estimate {
        kernel: result.kernel,
        convolved: result.convolved,
        residual: result.residual,
        diagnostics: result.diagnostics,
        method,
        sigma,
        kernel_width: txres,
        kernel_height: tyres,
        border,
    })
}

/// Finds the regularization parameter `method` would use when `config.sigma` is `None`.
///
/// A configured σ is ignored. Least squares needs the kernel size and border; missing values
/// are determined as in [`estimate`].
pub fn find_sigma(
    measured: &Field,
    ideal: &Field,
    method: Method,
    config: &EstimationConfig,
) -> Result<f64> {
    find_sigma_with_monitor(measured, ideal, method, config, &Monitor::new())
}

/// Like [`find_sigma`] with cancellation and progress reporting.
pub fn find_sigma_with_monitor(
    measured: &Field,
    ideal: &Field,
    method: Method,
    config: &EstimationConfig,
    monitor: &Monitor,
) -> Result<f64> {
    check_compatible(measured, ideal)?;
    let config = EstimationConfig {
        sigma: None,
        ..config.clone()
    };
    config.validate()?;
    let prepared = prepare(measured, ideal, config.windowing)?;
    monitor.set_progress(Some(0.0));
    let outcome = resolve_kernel_size(method, &config, &prepared).and_then(|(txres, tyres)| {
        let border = config.border.unwrap_or_else(|| default_border(txres, tyres));
        resolve_sigma(method, &config, &prepared, (txres, tyres, border), monitor)
    });
    monitor.set_progress(None);
    outcome
}

/// Bounding box `(col, row, width, height)` of the transfer function support, using the
/// default Welch windowing.
pub fn estimate_region(measured: &Field, ideal: &Field) -> Result<Region> {
    estimate_region_with_monitor(measured, ideal, Windowing::default(), &Monitor::new())
}

/// Like [`estimate_region`] with an explicit windowing and a monitor.
pub fn estimate_region_with_monitor(
    measured: &Field,
    ideal: &Field,
    windowing: Windowing,
    monitor: &Monitor,
) -> Result<Region> {
    check_compatible(measured, ideal)?;
    let prepared = prepare(measured, ideal, windowing)?;
    monitor.check()?;
    prepared.region().copied()
}
