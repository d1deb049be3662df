//! Error type shared by every estimation entry point.

use cancellable_loops::Cancelled;
use thiserror::Error;

/// Failures reported by [`estimate`](crate::estimate), [`find_sigma`](crate::find_sigma)
/// and [`estimate_region`](crate::estimate_region).
///
/// None of them is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// Measured and ideal fields differ in resolution or lateral sampling.
    #[error("measured field is {measured_xres}x{measured_yres} (dx={measured_dx}, dy={measured_dy}) but ideal field is {ideal_xres}x{ideal_yres} (dx={ideal_dx}, dy={ideal_dy})")]
    ShapeMismatch {
        measured_xres: usize,
        measured_yres: usize,
        measured_dx: f64,
        measured_dy: f64,
        ideal_xres: usize,
        ideal_yres: usize,
        ideal_dx: f64,
        ideal_dy: f64,
    },
    /// One of the fields has zero variance.
    #[error("the {0} field has zero variance")]
    DegenerateInput(&'static str),
    /// The least-squares normal equations are not positive definite.
    #[error("least-squares normal equations of size {size} cannot be solved: {reason}")]
    SingularSystem { size: usize, reason: String },
    /// Kernel size, border or sigma out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The abort hook fired.
    #[error("estimation cancelled")]
    Cancelled,
    /// The FFT backend rejected a buffer.
    #[error("FFT failed: {0}")]
    Fft(#[from] realfft::FftError),
    /// A buffer did not match the array shape it was reshaped to.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl From<Cancelled> for Error {
    fn from(_: Cancelled) -> Self {
        Error::Cancelled
    }
}

pub type Result<T> = std::result::Result<T, Error>;
