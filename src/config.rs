use crate::error::{Error, Result};
use crate::math_tools::Windowing;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Transfer function estimation method.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub enum Method {
    /// Regularized inverse filter in the frequency domain.
    #[default]
    Regularized,
    /// Least-squares fit of a small kernel in the spatial domain.
    LeastSquares,
    /// Pseudo-Wiener filter with a point-noise model.
    Wiener,
}

impl Method {
    /// Frequency-domain methods produce a full-sized kernel that is cropped afterwards.
    pub fn is_full_sized(self) -> bool {
        matches!(self, Method::Regularized | Method::Wiener)
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Regularized => write!(f, "Regularized filter"),
            Method::LeastSquares => write!(f, "Least squares"),
            Method::Wiener => write!(f, "Wiener filter"),
        }
    }
}

/// Caller-held configuration of one estimation.
///
/// `None` values are determined automatically: the kernel size from the support of a rough
/// estimate, the border from the kernel size and sigma by the regularization optimizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimationConfig {
    pub kernel_width: Option<usize>,
    pub kernel_height: Option<usize>,
    /// Margin excluded from the least-squares fit, in pixels.
    pub border: Option<usize>,
    pub sigma: Option<f64>,
    pub windowing: Windowing,
    /// Report the kernel and norms in integral rather than discrete normalization.
    pub normalize_as_integral: bool,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        EstimationConfig {
            kernel_width: None,
            kernel_height: None,
            border: Some(3),
            sigma: None,
            windowing: Windowing::Welch,
            normalize_as_integral: true,
        }
    }
}

impl EstimationConfig {
    pub fn with_kernel_size(mut self, width: usize, height: usize) -> Self {
        self.kernel_width = Some(width);
        self.kernel_height = Some(height);
        self
    }

    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = Some(sigma);
        self
    }

    pub fn with_border(mut self, border: usize) -> Self {
        self.border = Some(border);
        self
    }

    pub fn with_windowing(mut self, windowing: Windowing) -> Self {
        self.windowing = windowing;
        self
    }

    pub fn with_integral_normalization(mut self, as_integral: bool) -> Self {
        self.normalize_as_integral = as_integral;
        self
    }

    /// Rejects zero kernel dimensions and sigma values that are not finite and positive.
    pub fn validate(&self) -> Result<()> {
        if self.kernel_width == Some(0) || self.kernel_height == Some(0) {
            return Err(Error::InvalidConfig(format!(
                "kernel size {:?}x{:?} must be positive",
                self.kernel_width, self.kernel_height
            )));
        }
        if let Some(sigma) = self.sigma {
            if !sigma.is_finite() || sigma <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "sigma {sigma} must be finite and positive"
                )));
            }
        }
        Ok(())
    }
}

/// Border derived from the kernel size when none is configured.
pub fn default_border(txres: usize, tyres: usize) -> usize {
    (0.5 * (txres.max(tyres).max(1) as f64).ln() + 0.5).round() as usize
}
