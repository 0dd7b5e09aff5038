//! Sequential (Kalman) track fitting.
//!
//! The fit runs two independent stages over the same ordered tracklets:
//! a linear stage in the x–z projection and a circular stage in the z–y
//! bending plane. A stage that cannot complete reports a negative status
//! and a NaN chi² without affecting the other one.

use drifttrack_core::{
    status, CircleParams, Error, FitState, LineParams, Result, StageFit, Track, Tracklet,
    TruthLink,
};
use log::debug;
use nalgebra::{Matrix2, Matrix2x3, Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Smallest variance given to a measurement component.
const MIN_VARIANCE: f64 = 1e-12;

/// Order in which tracklets are fed to the filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalOrder {
    /// Upstream to downstream.
    #[default]
    IncreasingZ,
    /// Downstream to upstream.
    DecreasingZ,
    /// As provided.
    AsGiven,
}

/// Fitter parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Tracklet order.
    pub order: TraversalOrder,
    /// Angular process noise per mm of transport (rad²/mm).
    pub process_noise: f64,
    /// Prior uncertainty of the seed curvature (1/mm).
    pub initial_sigma_curvature: f64,
    /// Curvatures below this are reported as infinite radius (1/mm).
    ///
    /// This is an absolute cut, not a significance test: a fitted |κ| at or
    /// above it is always reported as a curved track, however large its
    /// uncertainty.
    pub min_curvature: f64,
    /// Passes of the circular stage; later passes start from the previous
    /// curvature.
    pub iterations: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            order: TraversalOrder::IncreasingZ,
            process_noise: 0.0,
            initial_sigma_curvature: 1e-2,
            min_curvature: 1e-8,
            iterations: 2,
        }
    }
}

impl FitConfig {
    /// Sets the traversal order.
    #[must_use]
    pub fn with_order(mut self, order: TraversalOrder) -> Self {
        self.order = order;
        self
    }

    /// Sets the process noise.
    #[must_use]
    pub fn with_process_noise(mut self, noise: f64) -> Self {
        self.process_noise = noise;
        self
    }

    /// Sets the prior uncertainty of the seed curvature.
    #[must_use]
    pub fn with_initial_sigma_curvature(mut self, sigma: f64) -> Self {
        self.initial_sigma_curvature = sigma;
        self
    }

    /// Sets the degenerate-curvature threshold.
    #[must_use]
    pub fn with_min_curvature(mut self, curvature: f64) -> Self {
        self.min_curvature = curvature;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if a noise, prior or threshold is negative, zero
    /// where it must be positive, or not finite.
    pub fn validate(&self) -> Result<()> {
        if !(self.process_noise >= 0.0 && self.process_noise.is_finite()) {
            return Err(Error::ConfigError(format!(
                "process_noise must be finite and non-negative, got {}",
                self.process_noise
            )));
        }
        if !(self.initial_sigma_curvature > 0.0 && self.initial_sigma_curvature.is_finite()) {
            return Err(Error::ConfigError(format!(
                "initial_sigma_curvature must be finite and positive, got {}",
                self.initial_sigma_curvature
            )));
        }
        if !(self.min_curvature > 0.0 && self.min_curvature.is_finite()) {
            return Err(Error::ConfigError(format!(
                "min_curvature must be finite and positive, got {}",
                self.min_curvature
            )));
        }
        Ok(())
    }
}

/// Circular-stage state `(y, sinφ, κ)` at some z.
#[derive(Debug, Clone, Copy)]
struct HelixState {
    z: f64,
    x: Vector3<f64>,
    p: Matrix3<f64>,
}

/// Exact circle transport over `dz`, with its Jacobian.
///
/// Returns `None` when the track would turn past |sinφ| = 1.
fn transport(x: &Vector3<f64>, dz: f64) -> Option<(Vector3<f64>, Matrix3<f64>)> {
    let (y, s0, k) = (x[0], x[1], x[2]);
    let s1 = s0 + k * dz;
    if s0.abs() >= 1.0 || s1.abs() >= 1.0 {
        return None;
    }
    let c0 = (1.0 - s0 * s0).sqrt();
    let c1 = (1.0 - s1 * s1).sqrt();
    let num = s0 + s1;
    let den = c0 + c1;
    let y1 = y + dz * num / den;

    let dg_ds = (2.0 * den + num * (s0 / c0 + s1 / c1)) / (den * den);
    let dg_dk = dz * (den + num * s1 / c1) / (den * den);
    let jacobian = Matrix3::new(
        1.0, dz * dg_ds, dz * dg_dk, //
        0.0, 1.0, dz, //
        0.0, 0.0, 1.0,
    );
    Some((Vector3::new(y1, s1, k), jacobian))
}

/// Slope `dx/dz` measured by a tracklet, with its variance.
fn slope_xz(t: &Tracklet) -> Option<(f64, f64)> {
    let (d, s) = (t.direction, t.sigma_dir);
    if d.z.abs() < f64::EPSILON {
        return None;
    }
    let slope = d.x / d.z;
    let var = (s.x * s.x) / (d.z * d.z) + (d.x * d.x * s.z * s.z) / d.z.powi(4);
    Some((slope, var.max(MIN_VARIANCE)))
}

/// `sinφ` of the tracklet direction in the z–y plane, with its variance.
fn sin_phi_zy(t: &Tracklet) -> Option<(f64, f64)> {
    let (d, s) = (t.direction, t.sigma_dir);
    let rho2 = d.y * d.y + d.z * d.z;
    if rho2 < f64::EPSILON || d.z <= 0.0 {
        return None;
    }
    let rho3 = rho2 * rho2.sqrt();
    let sin = d.y / rho2.sqrt();
    let var = ((d.z * d.z * s.y).powi(2) + (d.y * d.z * s.z).powi(2)) / (rho3 * rho3);
    Some((sin, var.max(MIN_VARIANCE)))
}

fn scattering(noise: f64, dz: f64) -> Matrix2<f64> {
    let q = noise * dz.abs();
    Matrix2::new(q * dz * dz / 3.0, q * dz / 2.0, q * dz / 2.0, q)
}

fn stage_failure(stage: &str, code: i32, phase: FitState) -> StageFit {
    debug!("{stage} stage failed while {phase:?}: status {code}");
    StageFit::failed(code)
}

/// Kalman track fitter.
#[derive(Debug, Clone, Default)]
pub struct TrackFitter {
    config: FitConfig,
}

impl TrackFitter {
    /// Creates a fitter.
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Fits one track. Never fails: stage failures are reported on the
    /// returned track.
    pub fn fit(&self, id: u32, tracklets: &[Tracklet]) -> Track {
        let mut ordered: Vec<&Tracklet> = tracklets.iter().collect();
        match self.config.order {
            TraversalOrder::IncreasingZ => {
                ordered.sort_by(|a, b| a.offset.z.total_cmp(&b.offset.z));
            }
            TraversalOrder::DecreasingZ => {
                ordered.sort_by(|a, b| b.offset.z.total_cmp(&a.offset.z));
            }
            TraversalOrder::AsGiven => {}
        }

        let (linear, linear_fit) = self.fit_linear(&ordered);
        let (circle, circular_fit, y_first) = self.fit_circular(&ordered);

        let mut truth = TruthLink::new();
        for t in &ordered {
            truth.merge(&t.truth);
        }

        let (mut x0, mut y0, z0) = ordered
            .first()
            .map_or((f64::NAN, f64::NAN, f64::NAN), |t| (t.offset.x, t.offset.y, t.offset.z));
        if linear_fit.is_valid() {
            x0 = linear.x_at(z0);
        }
        if let Some(y) = y_first {
            y0 = y;
        }
        let t0 = ordered
            .iter()
            .map(|t| t.time)
            .fold(f64::INFINITY, f64::min);

        let state = if linear_fit.is_valid() && circular_fit.is_valid() {
            FitState::Converged
        } else {
            FitState::Failed
        };
        debug!(
            "Track {id}: linear status {} chi2 {:.3}, circular status {} chi2 {:.3}",
            linear_fit.status, linear_fit.chi2, circular_fit.status, circular_fit.chi2
        );

        Track {
            id,
            linear,
            circle,
            x0,
            y0,
            z0,
            t0: if t0.is_finite() { t0 } else { f64::NAN },
            linear_fit,
            circular_fit,
            state,
            truth,
        }
    }

    fn fit_linear(&self, tracklets: &[&Tracklet]) -> (LineParams, StageFit) {
        if tracklets.len() < 2 {
            return (LineParams::INVALID, StageFit::failed(status::NOT_ENOUGH_MEASUREMENTS));
        }
        let first = tracklets[0];
        let Some((slope, slope_var)) = slope_xz(first) else {
            return (
                LineParams::INVALID,
                stage_failure("Linear", status::DIVERGED, FitState::Initialized),
            );
        };
        let mut z = first.offset.z;
        let mut x = Vector2::new(first.offset.x, slope);
        let mut p = Matrix2::new(
            (first.sigma_pos.x * first.sigma_pos.x).max(MIN_VARIANCE),
            0.0,
            0.0,
            slope_var,
        );
        let mut chi2 = 0.0;

        for t in &tracklets[1..] {
            let dz = t.offset.z - z;
            let f = Matrix2::new(1.0, dz, 0.0, 1.0);
            let x_pred = f * x;
            let p_pred = f * p * f.transpose() + scattering(self.config.process_noise, dz);

            let Some((m_slope, m_slope_var)) = slope_xz(t) else {
                return (
                    LineParams::INVALID,
                    stage_failure("Linear", status::DIVERGED, FitState::Updating),
                );
            };
            let m = Vector2::new(t.offset.x, m_slope);
            let r = Matrix2::new(
                (t.sigma_pos.x * t.sigma_pos.x).max(MIN_VARIANCE),
                0.0,
                0.0,
                m_slope_var,
            );
            let residual = m - x_pred;
            let s = p_pred + r;
            let Some(s_inv) = s.try_inverse() else {
                return (
                    LineParams::INVALID,
                    stage_failure("Linear", status::DIVERGED, FitState::Updating),
                );
            };
            let k = p_pred * s_inv;
            x = x_pred + k * residual;
            p = (Matrix2::identity() - k) * p_pred;
            chi2 += (residual.transpose() * s_inv * residual)[(0, 0)];
            z = t.offset.z;

            if !x.iter().all(|v| v.is_finite()) || !chi2.is_finite() {
                return (
                    LineParams::INVALID,
                    stage_failure("Linear", status::DIVERGED, FitState::Updating),
                );
            }
        }

        let line = LineParams {
            a: x[1],
            b: x[0] - x[1] * z,
        };
        let n = tracklets.len();
        (line, StageFit::converged(n, chi2, 2 * n - 2))
    }

    /// Returns the circle, the stage outcome and the fitted y at the first
    /// tracklet.
    fn fit_circular(&self, tracklets: &[&Tracklet]) -> (CircleParams, StageFit, Option<f64>) {
        if tracklets.len() < 2 {
            return (
                CircleParams::INVALID,
                StageFit::failed(status::NOT_ENOUGH_MEASUREMENTS),
                None,
            );
        }

        let mut outcome = self.circular_pass(tracklets, 0.0);
        for _ in 1..self.config.iterations.max(1) {
            match outcome {
                Ok((previous, _)) => outcome = self.circular_pass(tracklets, previous.x[2]),
                Err(_) => break,
            }
        }

        let (end, chi2) = match outcome {
            Ok(v) => v,
            Err((code, phase)) => {
                return (
                    CircleParams::INVALID,
                    stage_failure("Circular", code, phase),
                    None,
                );
            }
        };

        let k = end.x[2];
        if k.abs() < self.config.min_curvature {
            debug!("Circular stage: curvature {k:e} is compatible with a straight line");
            return (
                CircleParams::INVALID,
                StageFit::failed(status::DEGENERATE),
                None,
            );
        }
        let (y, s) = (end.x[0], end.x[1]);
        let c = (1.0 - s * s).sqrt();
        let circle = CircleParams {
            zc: end.z - s / k,
            yc: y + c / k,
            r: 1.0 / k.abs(),
            helicity: if k > 0.0 { 1 } else { -1 },
        };
        if !(circle.r.is_finite() && circle.zc.is_finite() && circle.yc.is_finite()) {
            debug!("Circular stage: non-finite circle for curvature {k:e}");
            return (
                CircleParams::INVALID,
                StageFit::failed(status::DEGENERATE),
                None,
            );
        }

        let y_first = transport(&end.x, tracklets[0].offset.z - end.z).map(|(x, _)| x[0]);
        let n = tracklets.len();
        (circle, StageFit::converged(n, chi2, 2 * n - 3), y_first)
    }

    fn circular_pass(
        &self,
        tracklets: &[&Tracklet],
        seed_curvature: f64,
    ) -> std::result::Result<(HelixState, f64), (i32, FitState)> {
        use FitState::{Initialized, Predicting, Updating};

        let first = tracklets[0];
        let (sin, sin_var) = sin_phi_zy(first).ok_or((status::DIVERGED, Initialized))?;
        let sk = self.config.initial_sigma_curvature;
        let mut state = HelixState {
            z: first.offset.z,
            x: Vector3::new(first.offset.y, sin, seed_curvature),
            p: Matrix3::from_diagonal(&Vector3::new(
                (first.sigma_pos.y * first.sigma_pos.y).max(MIN_VARIANCE),
                sin_var,
                sk * sk,
            )),
        };
        let h = Matrix2x3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0);
        let mut chi2 = 0.0;

        for t in &tracklets[1..] {
            let dz = t.offset.z - state.z;
            let (x_pred, f) = transport(&state.x, dz).ok_or((status::LOOPING, Predicting))?;
            let mut q = Matrix3::zeros();
            q.fixed_view_mut::<2, 2>(0, 0)
                .copy_from(&scattering(self.config.process_noise, dz));
            let p_pred = f * state.p * f.transpose() + q;

            let (m_sin, m_sin_var) = sin_phi_zy(t).ok_or((status::DIVERGED, Updating))?;
            let m = Vector2::new(t.offset.y, m_sin);
            let r = Matrix2::new(
                (t.sigma_pos.y * t.sigma_pos.y).max(MIN_VARIANCE),
                0.0,
                0.0,
                m_sin_var,
            );
            let residual = m - h * x_pred;
            let s = h * p_pred * h.transpose() + r;
            let s_inv = s.try_inverse().ok_or((status::DIVERGED, Updating))?;
            let k = p_pred * h.transpose() * s_inv;

            state.x = x_pred + k * residual;
            state.p = (Matrix3::identity() - k * h) * p_pred;
            state.z = t.offset.z;
            chi2 += (residual.transpose() * s_inv * residual)[(0, 0)];

            if !state.x.iter().all(|v| v.is_finite()) || !chi2.is_finite() {
                return Err((status::DIVERGED, Updating));
            }
            if state.x[1].abs() >= 1.0 {
                return Err((status::LOOPING, Updating));
            }
        }
        Ok((state, chi2))
    }
}
