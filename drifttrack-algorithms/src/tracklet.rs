//! Local track segments from clusters.
//!
//! Clusters are grouped by the truth trajectory that dominates them and by
//! station. Every cluster measures one transverse coordinate
//! `n · (x, y) = m` of its plane; a station with two or more views yields a
//! point by weighted least squares, and neighbouring points give the local
//! direction.

use std::collections::{BTreeMap, HashMap};

use drifttrack_core::{
    Cluster, HitId, Point3, SignalArena, Tracklet, TruthHit, TruthLink, Vector3,
};
use drifttrack_geometry::WireGeometryIndex;
use log::debug;
use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

/// Below this determinant the views of a station are considered parallel.
const MIN_VIEW_DETERMINANT: f64 = 1e-6;

/// Tracklet finding parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackletConfig {
    /// Resolution of one transverse measurement (mm).
    pub sigma_transverse: f64,
    /// Minimum number of stations for a track candidate.
    pub min_stations: usize,
}

impl Default for TrackletConfig {
    fn default() -> Self {
        Self {
            sigma_transverse: 1.0,
            min_stations: 2,
        }
    }
}

impl TrackletConfig {
    /// Sets the transverse resolution.
    #[must_use]
    pub fn with_sigma_transverse(mut self, sigma: f64) -> Self {
        self.sigma_transverse = sigma;
        self
    }

    /// Sets the minimum number of stations.
    #[must_use]
    pub fn with_min_stations(mut self, stations: usize) -> Self {
        self.min_stations = stations;
        self
    }
}

/// Tracklets attributed to one truth trajectory, in increasing z.
#[derive(Debug, Clone)]
pub struct TrackCandidate {
    /// Dominant truth trajectory.
    pub trajectory: i32,
    /// One tracklet per usable station.
    pub tracklets: Vec<Tracklet>,
}

#[derive(Debug, Clone)]
struct Measurement {
    normal: Vector2<f64>,
    value: f64,
    z: f64,
    thickness: f64,
    time: f64,
    truth: TruthLink,
}

#[derive(Debug, Clone)]
struct StationPoint {
    point: Point3<f64>,
    sigma: Vector3<f64>,
    quality: f64,
    time: f64,
    truth: TruthLink,
}

/// Builds tracklets from clusters.
#[derive(Debug, Clone, Default)]
pub struct TrackletFinder {
    config: TrackletConfig,
}

impl TrackletFinder {
    /// Creates a finder.
    pub fn new(config: TrackletConfig) -> Self {
        Self { config }
    }

    /// Groups clusters into track candidates.
    ///
    /// `hits` provides the provenance of the truth hits linked to the
    /// clusters; clusters without known provenance are ignored.
    pub fn find(
        &self,
        clusters: &[Cluster],
        signals: &SignalArena,
        geometry: &WireGeometryIndex,
        hits: &[TruthHit],
    ) -> Vec<TrackCandidate> {
        let trajectory_of: HashMap<HitId, i32> = hits
            .iter()
            .map(|h| (h.id, h.provenance.trajectory_id))
            .collect();

        let mut groups: BTreeMap<(i32, u16), Vec<Measurement>> = BTreeMap::new();
        for cluster in clusters {
            let Some(trajectory) = dominant_trajectory(&cluster.truth, &trajectory_of) else {
                debug!("Cluster of {} signals has no known provenance", cluster.len());
                continue;
            };
            let Some((station, m)) = self.measure(cluster, signals, geometry) else {
                continue;
            };
            groups.entry((trajectory, station)).or_default().push(m);
        }

        let mut points: BTreeMap<i32, Vec<StationPoint>> = BTreeMap::new();
        for ((trajectory, station), measurements) in groups {
            match self.solve_station(&measurements) {
                Some(p) => points.entry(trajectory).or_default().push(p),
                None => debug!(
                    "Trajectory {trajectory}: station {station} has fewer than two views"
                ),
            }
        }

        points
            .into_iter()
            .filter(|(_, p)| p.len() >= self.config.min_stations.max(2))
            .map(|(trajectory, mut p)| {
                p.sort_by(|a, b| a.point.z.total_cmp(&b.point.z));
                TrackCandidate {
                    trajectory,
                    tracklets: tracklets_from_points(&p),
                }
            })
            .collect()
    }

    fn measure(
        &self,
        cluster: &Cluster,
        signals: &SignalArena,
        geometry: &WireGeometryIndex,
    ) -> Option<(u16, Measurement)> {
        let first = cluster.resolve(signals).next()?;
        let plane = geometry.plane_of(first.wire)?;

        let mut sum = 0.0;
        let mut weight = 0.0;
        let mut plain = 0.0;
        let mut count = 0.0;
        for signal in cluster.resolve(signals) {
            let wire = geometry.wire(signal.wire)?;
            sum += signal.adc * wire.transverse;
            weight += signal.adc;
            plain += wire.transverse;
            count += 1.0;
        }
        let value = if weight > 0.0 { sum / weight } else { plain / count };

        let normal = plane.normal();
        Some((
            plane.station,
            Measurement {
                normal: Vector2::new(normal.x, normal.y),
                value,
                z: plane.z,
                thickness: plane.thickness,
                time: cluster.earliest_tdc(signals).unwrap_or(f64::NAN),
                truth: cluster.truth.clone(),
            },
        ))
    }

    #[allow(clippy::cast_precision_loss)]
    fn solve_station(&self, measurements: &[Measurement]) -> Option<StationPoint> {
        let w = 1.0 / (self.config.sigma_transverse * self.config.sigma_transverse);
        let mut a = Matrix2::zeros();
        let mut b = Vector2::zeros();
        for m in measurements {
            a += m.normal * m.normal.transpose() * w;
            b += m.normal * (m.value * w);
        }
        if a.determinant().abs() < MIN_VIEW_DETERMINANT * w * w {
            return None;
        }
        let covariance = a.try_inverse()?;
        let xy = covariance * b;

        let n = measurements.len() as f64;
        let chi2: f64 = measurements
            .iter()
            .map(|m| (m.normal.dot(&xy) - m.value).powi(2) * w)
            .sum();
        let z = measurements.iter().map(|m| m.z).sum::<f64>() / n;
        let z_spread = measurements
            .iter()
            .map(|m| (m.z - z).powi(2) + m.thickness * m.thickness / 12.0)
            .sum::<f64>()
            / n;

        let mut truth = TruthLink::new();
        for m in measurements {
            truth.merge(&m.truth);
        }

        Some(StationPoint {
            point: Point3::new(xy.x, xy.y, z),
            sigma: Vector3::new(
                covariance[(0, 0)].sqrt(),
                covariance[(1, 1)].sqrt(),
                z_spread.sqrt(),
            ),
            quality: if measurements.len() > 2 { chi2 / (n - 2.0) } else { 0.0 },
            time: measurements.iter().map(|m| m.time).fold(f64::INFINITY, f64::min),
            truth,
        })
    }
}

fn dominant_trajectory(truth: &TruthLink, trajectory_of: &HashMap<HitId, i32>) -> Option<i32> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for id in truth.hits() {
        if let Some(&t) = trajectory_of.get(id) {
            *counts.entry(t).or_default() += 1;
        }
    }
    // Ties go to the smallest trajectory id.
    counts
        .into_iter()
        .fold(None, |best: Option<(i32, usize)>, (t, c)| match best {
            Some((_, bc)) if bc >= c => best,
            _ => Some((t, c)),
        })
        .map(|(t, _)| t)
}

fn tracklets_from_points(points: &[StationPoint]) -> Vec<Tracklet> {
    let last = points.len() - 1;
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let (from, to) = match i {
                0 => (0, 1),
                i if i == last => (last - 1, last),
                i => (i - 1, i + 1),
            };
            let delta = points[to].point - points[from].point;
            let norm = delta.norm();
            let spread = (points[to].sigma.component_mul(&points[to].sigma)
                + points[from].sigma.component_mul(&points[from].sigma))
            .map(f64::sqrt);
            Tracklet::new(p.point, p.sigma, delta, spread / norm)
                .with_quality(p.quality)
                .with_time(p.time)
                .with_truth(p.truth.clone())
        })
        .collect()
}
