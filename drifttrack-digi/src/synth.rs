//! Conversion of per-wire deposits into digitized signals.

use drifttrack_core::{Error, Result, Signal, SignalTiming, TimeRange, TruthHit, TruthLink};
use drifttrack_geometry::Wire;
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// How the deposits of one wire combine into a single arrival time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalPolicy {
    /// The earliest arrival wins.
    #[default]
    Earliest,
    /// Energy-weighted mean of the arrivals.
    ChargeWeighted,
}

/// Digitization parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigitizationConfig {
    /// Ionization drift velocity (mm/ns).
    pub drift_velocity: f64,
    /// Signal propagation velocity along the wire (mm/ns).
    pub wire_velocity: f64,
    /// Gaussian timing resolution (ns); 0 disables the noise.
    pub sigma_tdc: f64,
    /// Charge calibration applied to the deposited energy.
    pub adc_calibration: f64,
    /// Longest drift time (ns), used for the signal time window.
    pub max_drift_window: f64,
    /// Largest distance (mm) from a sense wire that still produces a signal.
    pub max_drift_distance: Option<f64>,
    /// Combination of several deposits on one wire.
    pub arrival_policy: ArrivalPolicy,
}

impl Default for DigitizationConfig {
    fn default() -> Self {
        Self {
            drift_velocity: 0.05,
            wire_velocity: 200.0,
            sigma_tdc: 1.0,
            adc_calibration: 1.0,
            max_drift_window: 200.0,
            max_drift_distance: None,
            arrival_policy: ArrivalPolicy::Earliest,
        }
    }
}

impl DigitizationConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the drift velocity.
    #[must_use]
    pub fn with_drift_velocity(mut self, v: f64) -> Self {
        self.drift_velocity = v;
        self
    }

    /// Sets the wire propagation velocity.
    #[must_use]
    pub fn with_wire_velocity(mut self, v: f64) -> Self {
        self.wire_velocity = v;
        self
    }

    /// Sets the timing resolution.
    #[must_use]
    pub fn with_sigma_tdc(mut self, sigma: f64) -> Self {
        self.sigma_tdc = sigma;
        self
    }

    /// Sets the charge calibration.
    #[must_use]
    pub fn with_adc_calibration(mut self, calibration: f64) -> Self {
        self.adc_calibration = calibration;
        self
    }

    /// Sets the maximum drift distance of sense wires.
    #[must_use]
    pub fn with_max_drift_distance(mut self, distance: f64) -> Self {
        self.max_drift_distance = Some(distance);
        self
    }

    /// Sets the arrival policy.
    #[must_use]
    pub fn with_arrival_policy(mut self, policy: ArrivalPolicy) -> Self {
        self.arrival_policy = policy;
        self
    }

    /// Checks the values are physical.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for non-positive velocities, a negative
    /// or NaN resolution or a non-finite calibration.
    pub fn validate(&self) -> Result<()> {
        if !(self.drift_velocity > 0.0 && self.drift_velocity.is_finite()) {
            return Err(Error::ConfigError(format!(
                "drift velocity must be positive, got {}",
                self.drift_velocity
            )));
        }
        if !(self.wire_velocity > 0.0 && self.wire_velocity.is_finite()) {
            return Err(Error::ConfigError(format!(
                "wire velocity must be positive, got {}",
                self.wire_velocity
            )));
        }
        if !(self.sigma_tdc >= 0.0 && self.sigma_tdc.is_finite()) {
            return Err(Error::ConfigError(format!(
                "sigma_tdc must be non-negative, got {}",
                self.sigma_tdc
            )));
        }
        if !self.adc_calibration.is_finite() {
            return Err(Error::ConfigError("adc calibration must be finite".to_string()));
        }
        if !(self.max_drift_window >= 0.0) {
            return Err(Error::ConfigError(format!(
                "max drift window must be non-negative, got {}",
                self.max_drift_window
            )));
        }
        if let Some(d) = self.max_drift_distance {
            if !(d > 0.0) {
                return Err(Error::ConfigError(format!(
                    "max drift distance must be positive, got {d}"
                )));
            }
        }
        Ok(())
    }
}

/// Arrival of one qualifying deposit.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    timing: SignalTiming,
    energy: f64,
}

/// Produces one signal per wire from its assigned deposits.
///
/// Owns the random stream of the timing noise; give each event its own
/// synthesizer for reproducible results under parallel processing.
#[derive(Debug, Clone)]
pub struct SignalSynthesizer {
    config: DigitizationConfig,
    noise: Option<Normal<f64>>,
    rng: StdRng,
}

impl SignalSynthesizer {
    /// Creates a synthesizer seeded with `seed`.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if `config` is invalid.
    pub fn new(config: DigitizationConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let noise = if config.sigma_tdc > 0.0 {
            Some(
                Normal::new(0.0, config.sigma_tdc)
                    .map_err(|e| Error::ConfigError(e.to_string()))?,
            )
        } else {
            None
        };
        Ok(Self {
            config,
            noise,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &DigitizationConfig {
        &self.config
    }

    /// Noiseless arrival breakdown of one deposit, `None` when it cannot
    /// reach the wire.
    pub fn timing(&self, wire: &Wire, segment: &TruthHit) -> Option<SignalTiming> {
        let ca = wire.closest_points(&segment.start, &segment.stop);
        if !wire.within_reach(ca.distance, self.config.max_drift_distance) {
            return None;
        }
        Some(SignalTiming {
            hit_time: segment.time_at(ca.t),
            drift_time: ca.distance / self.config.drift_velocity,
            propagation_time: wire.distance_to_head(ca.s) / self.config.wire_velocity,
        })
    }

    /// Builds the signal of `wire` from its deposits.
    ///
    /// Returns `None` when no deposit qualifies.
    pub fn synthesize(&mut self, wire: &Wire, segments: &[TruthHit]) -> Option<Signal> {
        let mut candidates = Vec::with_capacity(segments.len());
        let mut truth = TruthLink::new();
        for segment in segments {
            if let Some(timing) = self.timing(wire, segment) {
                candidates.push(Candidate {
                    timing,
                    energy: segment.energy,
                });
                truth.insert(segment.id);
            }
        }

        let timing = self.combine(&candidates)?;
        let energy: f64 = candidates.iter().map(|c| c.energy).sum();

        let noise = match &self.noise {
            Some(normal) => normal.sample(&mut self.rng),
            None => 0.0,
        };
        let tdc = timing.arrival() + noise;

        let signal = Signal {
            channel: wire.channel,
            wire: wire.id,
            tdc,
            adc: self.config.adc_calibration * energy,
            time_range: TimeRange {
                earliest: tdc - self.config.max_drift_window,
                nominal: tdc,
                latest: tdc + 5.0 * self.config.sigma_tdc,
            },
            timing,
            truth,
        };
        debug!(
            "Created signal: channel {}, TDC = {:.3}, ADC = {:.4e}",
            signal.channel, signal.tdc, signal.adc
        );
        Some(signal)
    }

    fn combine(&self, candidates: &[Candidate]) -> Option<SignalTiming> {
        let earliest = candidates
            .iter()
            .min_by(|a, b| a.timing.arrival().total_cmp(&b.timing.arrival()))
            .map(|c| c.timing)?;

        match self.config.arrival_policy {
            ArrivalPolicy::Earliest => Some(earliest),
            ArrivalPolicy::ChargeWeighted => {
                let total: f64 = candidates.iter().map(|c| c.energy).sum();
                if !(total > 0.0) {
                    return Some(earliest);
                }
                let weighted = |f: fn(&SignalTiming) -> f64| {
                    candidates
                        .iter()
                        .map(|c| c.energy * f(&c.timing))
                        .sum::<f64>()
                        / total
                };
                Some(SignalTiming {
                    hit_time: weighted(|t| t.hit_time),
                    drift_time: weighted(|t| t.drift_time),
                    propagation_time: weighted(|t| t.propagation_time),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DigitizationConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.drift_velocity - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.arrival_policy, ArrivalPolicy::Earliest);
    }

    #[test]
    fn test_invalid_config_rejected() {
        for config in [
            DigitizationConfig::new().with_drift_velocity(0.0),
            DigitizationConfig::new().with_wire_velocity(-1.0),
            DigitizationConfig::new().with_sigma_tdc(f64::NAN),
            DigitizationConfig::new().with_sigma_tdc(-0.5),
            DigitizationConfig::new().with_adc_calibration(f64::INFINITY),
            DigitizationConfig::new().with_max_drift_distance(0.0),
        ] {
            assert!(matches!(
                SignalSynthesizer::new(config, 1),
                Err(Error::ConfigError(_))
            ));
        }
    }

    #[test]
    fn test_noise_disabled_at_zero_sigma() {
        let synth =
            SignalSynthesizer::new(DigitizationConfig::new().with_sigma_tdc(0.0), 7).unwrap();
        assert!(synth.noise.is_none());
    }
}
