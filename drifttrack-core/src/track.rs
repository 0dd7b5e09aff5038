//! Tracklets, fitted tracks and fit-quality reporting.

use nalgebra::{Point3, Vector3};

use crate::hit::TruthLink;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Local position/direction estimate built from clusters of one station.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tracklet {
    /// Reference point (mm).
    pub offset: Point3<f64>,
    /// Per-axis position uncertainty (mm).
    pub sigma_pos: Vector3<f64>,
    /// Unit direction.
    pub direction: Vector3<f64>,
    /// Per-component direction uncertainty.
    pub sigma_dir: Vector3<f64>,
    /// chi²/NDF of the local estimate, 0 when exactly determined.
    pub quality: f64,
    /// Representative time (ns).
    pub time: f64,
    /// Truth hits behind the tracklet.
    pub truth: TruthLink,
}

impl Tracklet {
    /// Creates a tracklet with a normalized direction and an empty truth link.
    pub fn new(
        offset: Point3<f64>,
        sigma_pos: Vector3<f64>,
        direction: Vector3<f64>,
        sigma_dir: Vector3<f64>,
    ) -> Self {
        Self {
            offset,
            sigma_pos,
            direction: direction.try_normalize(0.0).unwrap_or(direction),
            sigma_dir,
            quality: 0.0,
            time: 0.0,
            truth: TruthLink::new(),
        }
    }

    /// Sets the representative time.
    #[must_use]
    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    /// Sets the local fit quality.
    #[must_use]
    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = quality;
        self
    }

    /// Sets the truth link.
    #[must_use]
    pub fn with_truth(mut self, truth: TruthLink) -> Self {
        self.truth = truth;
        self
    }
}

/// Lifecycle of a fit stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FitState {
    /// Seeded, nothing processed yet.
    #[default]
    Initialized,
    /// Transporting the state to the next measurement.
    Predicting,
    /// Folding a measurement into the state.
    Updating,
    /// All measurements processed with a finite result.
    Converged,
    /// Stopped early; see the stage status.
    Failed,
}

/// Sentinel status codes of a fit stage.
///
/// Non-negative values report success (the number of measurements used);
/// negative values name the failure.
pub mod status {
    /// Fewer tracklets than the stage needs.
    pub const NOT_ENOUGH_MEASUREMENTS: i32 = -1;
    /// Singular innovation covariance or non-finite state.
    pub const DIVERGED: i32 = -2;
    /// Transport reached |sinφ| ≥ 1.
    pub const LOOPING: i32 = -3;
    /// Curvature compatible with zero: infinite radius.
    pub const DEGENERATE: i32 = -4;
}

/// Outcome of one fit stage.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StageFit {
    /// Measurements used (≥ 0) or a negative [`status`] code.
    pub status: i32,
    /// Accumulated chi², NaN when the stage failed.
    pub chi2: f64,
    /// Degrees of freedom.
    pub ndf: usize,
    /// Final lifecycle state.
    pub state: FitState,
}

impl StageFit {
    /// A failed stage with the given sentinel.
    pub fn failed(status: i32) -> Self {
        Self {
            status,
            chi2: f64::NAN,
            ndf: 0,
            state: FitState::Failed,
        }
    }

    /// A converged stage.
    pub fn converged(measurements: usize, chi2: f64, ndf: usize) -> Self {
        Self {
            status: i32::try_from(measurements).unwrap_or(i32::MAX),
            chi2,
            ndf,
            state: FitState::Converged,
        }
    }

    /// Returns true for a converged stage with finite chi².
    pub fn is_valid(&self) -> bool {
        self.status >= 0 && self.chi2.is_finite() && self.state == FitState::Converged
    }

    /// chi² per degree of freedom, NaN when undefined.
    #[allow(clippy::cast_precision_loss)]
    pub fn reduced_chi2(&self) -> f64 {
        if self.ndf == 0 {
            f64::NAN
        } else {
            self.chi2 / self.ndf as f64
        }
    }
}

impl Default for StageFit {
    fn default() -> Self {
        Self {
            status: 0,
            chi2: 0.0,
            ndf: 0,
            state: FitState::Initialized,
        }
    }
}

/// Straight line `x = a·z + b` in the x–z projection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LineParams {
    /// Slope dx/dz.
    pub a: f64,
    /// Intercept at z = 0.
    pub b: f64,
}

impl LineParams {
    /// Parameters marking a failed linear stage.
    pub const INVALID: Self = Self {
        a: f64::NAN,
        b: f64::NAN,
    };

    /// Evaluates the line at `z`.
    #[inline]
    pub fn x_at(&self, z: f64) -> f64 {
        self.a * z + self.b
    }
}

/// Circle in the z–y bending plane.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CircleParams {
    /// Centre z.
    pub zc: f64,
    /// Centre y.
    pub yc: f64,
    /// Radius (mm).
    pub r: f64,
    /// Sense of rotation, ±1.
    pub helicity: i8,
}

impl CircleParams {
    /// Parameters marking a failed or degenerate circular stage.
    pub const INVALID: Self = Self {
        zc: f64::NAN,
        yc: f64::NAN,
        r: f64::NAN,
        helicity: 0,
    };
}

/// A fitted helical trajectory.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Track {
    /// Track number within the event.
    pub id: u32,
    /// Linear (x–z) projection.
    pub linear: LineParams,
    /// Circular (z–y) projection.
    pub circle: CircleParams,
    /// Reference point x.
    pub x0: f64,
    /// Reference point y.
    pub y0: f64,
    /// Reference point z.
    pub z0: f64,
    /// Reference time.
    pub t0: f64,
    /// Linear stage outcome.
    pub linear_fit: StageFit,
    /// Circular stage outcome.
    pub circular_fit: StageFit,
    /// `Converged` iff both stages converged.
    pub state: FitState,
    /// Truth hits of all tracklets.
    pub truth: TruthLink,
}

impl Track {
    /// Returns true if both stages converged.
    pub fn is_converged(&self) -> bool {
        self.state == FitState::Converged
    }

    /// Transverse momentum estimate (GeV/c) for a field of `b_tesla`,
    /// NaN when the circle is not available.
    pub fn momentum_yz(&self, b_tesla: f64) -> f64 {
        // p[GeV] = 0.3 · B[T] · R[m]
        0.3 * b_tesla * self.circle.r * 1e-3
    }
}
