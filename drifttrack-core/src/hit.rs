//! Truth energy deposits and their linkage to reconstructed records.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a truth hit within one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct HitId(pub u32);

/// Origin of a deposit in the upstream transport simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Provenance {
    /// Simulated trajectory that produced the deposit.
    pub trajectory_id: i32,
    /// Primary particle the trajectory descends from.
    pub primary_id: i32,
}

/// A simulated energy-deposit segment.
///
/// Positions are in detector-global coordinates (mm), times in ns and
/// energies in MeV.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TruthHit {
    /// Hit identifier. Sub-segments produced by splitting keep it.
    pub id: HitId,
    /// Segment start.
    pub start: Point3<f64>,
    /// Segment end.
    pub stop: Point3<f64>,
    /// Time at `start`.
    pub start_time: f64,
    /// Time at `stop`.
    pub stop_time: f64,
    /// Deposited energy.
    pub energy: f64,
    /// Energy deposited by secondaries below the tracking threshold.
    #[cfg_attr(feature = "serde", serde(default))]
    pub secondary_energy: f64,
    /// Path length of the particle inside the segment.
    #[cfg_attr(feature = "serde", serde(default))]
    pub track_length: f64,
    /// Where the deposit came from.
    #[cfg_attr(feature = "serde", serde(default))]
    pub provenance: Provenance,
}

impl TruthHit {
    /// Creates a hit with no secondary deposit, the geometric track length
    /// and default provenance.
    pub fn new(
        id: u32,
        start: Point3<f64>,
        stop: Point3<f64>,
        start_time: f64,
        stop_time: f64,
        energy: f64,
    ) -> Self {
        Self {
            id: HitId(id),
            start,
            stop,
            start_time,
            stop_time,
            energy,
            secondary_energy: 0.0,
            track_length: (stop - start).norm(),
            provenance: Provenance::default(),
        }
    }

    /// Sets the provenance.
    #[must_use]
    pub fn with_provenance(mut self, trajectory_id: i32, primary_id: i32) -> Self {
        self.provenance = Provenance {
            trajectory_id,
            primary_id,
        };
        self
    }

    /// Time of the hit (time at its start point).
    #[inline]
    pub fn time(&self) -> f64 {
        self.start_time
    }

    /// Vector from start to stop.
    #[inline]
    pub fn segment(&self) -> Vector3<f64> {
        self.stop - self.start
    }

    /// Geometric length of the segment.
    #[inline]
    pub fn length(&self) -> f64 {
        self.segment().norm()
    }

    /// Midpoint of the segment.
    #[inline]
    pub fn midpoint(&self) -> Point3<f64> {
        nalgebra::center(&self.start, &self.stop)
    }

    /// Point at parameter `t` in `[0, 1]` along the segment.
    #[inline]
    pub fn point_at(&self, t: f64) -> Point3<f64> {
        self.start + self.segment() * t
    }

    /// Time at parameter `t` in `[0, 1]` along the segment.
    #[inline]
    pub fn time_at(&self, t: f64) -> f64 {
        self.start_time + (self.stop_time - self.start_time) * t
    }

    /// Returns the piece of this hit between parameters `t0 < t1`, carrying
    /// `energy_fraction` of the deposits.
    pub fn sub_segment(&self, t0: f64, t1: f64, energy_fraction: f64) -> Self {
        Self {
            id: self.id,
            start: self.point_at(t0),
            stop: self.point_at(t1),
            start_time: self.time_at(t0),
            stop_time: self.time_at(t1),
            energy: self.energy * energy_fraction,
            secondary_energy: self.secondary_energy * energy_fraction,
            track_length: self.track_length * energy_fraction,
            provenance: self.provenance,
        }
    }
}

/// Truth hits a reconstructed record was built from.
///
/// Kept sorted and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TruthLink {
    hits: Vec<HitId>,
}

impl TruthLink {
    /// Creates an empty link.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hit id.
    pub fn insert(&mut self, id: HitId) {
        if let Err(pos) = self.hits.binary_search(&id) {
            self.hits.insert(pos, id);
        }
    }

    /// Adds every hit of `other`.
    pub fn merge(&mut self, other: &TruthLink) {
        for &id in &other.hits {
            self.insert(id);
        }
    }

    /// Returns true if `id` is linked.
    pub fn contains(&self, id: HitId) -> bool {
        self.hits.binary_search(&id).is_ok()
    }

    /// Linked hit ids in increasing order.
    pub fn hits(&self) -> &[HitId] {
        &self.hits
    }

    /// Number of linked hits.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Returns true if no hit is linked.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

impl FromIterator<HitId> for TruthLink {
    fn from_iter<I: IntoIterator<Item = HitId>>(iter: I) -> Self {
        let mut hits: Vec<HitId> = iter.into_iter().collect();
        hits.sort_unstable();
        hits.dedup();
        Self { hits }
    }
}
