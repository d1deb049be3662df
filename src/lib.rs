//! # psf-estimator
//!
//! Estimation of the transfer function (point spread function) `k` that relates a measured
//! field to an ideal one, `measured ≈ ideal ⊛ k`.
//!
//! Three methods are available, see [`Method`]:
//! - a regularized inverse filter and a pseudo-Wiener filter in the frequency domain, producing
//!   a full-sized kernel that is cropped to the requested size,
//! - a least-squares fit of a small kernel in the spatial domain.
//!
//! Missing kernel sizes and regularization parameters are determined automatically.
//!
//! ## Example
//!
//! ```
//! use ndarray::Array2;
//! use psf_estimator::{estimate, EstimationConfig, Field, Method, Windowing};
//!
//! let ideal = Field::from_array(
//!     Array2::from_shape_fn((32, 32), |(i, j)| {
//!         let (x, y) = (j as f64, i as f64);
//!         (0.37 * y * y + 1.3 * x).sin() + (0.71 * x * x + 0.5 * y).cos()
//!     }),
//!     1.0,
//!     1.0,
//! );
//! let config = EstimationConfig::default()
//!     .with_kernel_size(5, 5)
//!     .with_sigma(1e-6)
//!     .with_windowing(Windowing::None);
//! let result = estimate(&ideal, &ideal, Method::LeastSquares, &config).unwrap();
//! assert!(result.diagnostics.residual_norm < 1e-6);
//! ```
//!
//! Long-running calls can be cancelled and observed through a [`Monitor`], e.g.
//! [`estimate_with_monitor`].

pub mod config;
pub mod error;
pub mod field;
pub mod math_tools;
pub mod minimize;
pub mod monitor;
pub mod pipeline;
pub mod reconstruct;
pub mod regions;
pub mod sigma;
pub mod solvers;
pub mod spectral;
pub mod support;

pub use config::{EstimationConfig, Method};
pub use error::{Error, Result};
pub use field::Field;
pub use math_tools::Windowing;
pub use monitor::Monitor;
pub use pipeline::{
    estimate, estimate_region, estimate_region_with_monitor, estimate_with_monitor, find_sigma,
    find_sigma_with_monitor, full_size, Estimate,
};
pub use reconstruct::Diagnostics;
pub use regions::Region;
pub use support::symmetrize;
