//! Wires, straws and closest-approach geometry.

use std::fmt;

use drifttrack_core::{ChannelId, Subdetector, WireId};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Below this `|u|²|v|² − (u·v)²` relative to `|u|²|v|²` the lines are
/// treated as parallel.
const PARALLEL_EPSILON: f64 = 1e-12;

/// Stereo view of a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum View {
    /// Measures x.
    X,
    /// Stereo, positive angle.
    U,
    /// Stereo, negative angle.
    V,
    /// Measures y.
    Y,
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::X => "X",
            Self::U => "U",
            Self::V => "V",
            Self::Y => "Y",
        };
        f.write_str(s)
    }
}

/// Unique geometry identifier of a wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeoId {
    /// Subdetector.
    pub subdetector: Subdetector,
    /// Station (module) number.
    pub station: u16,
    /// Plane number within the station.
    pub plane: u8,
    /// View of the plane.
    pub view: View,
    /// Wire or tube number within the plane.
    pub tube: u32,
}

impl fmt::Display for GeoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/S{}/P{}{}/T{}",
            self.subdetector, self.station, self.plane, self.view, self.tube
        )
    }
}

/// What sits at a readout position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireKind {
    /// Drift-chamber sense wire.
    Sense,
    /// Straw tube with its anode wire on the axis.
    Straw {
        /// Inner radius (mm).
        radius: f64,
    },
}

impl WireKind {
    /// Tube radius, if any.
    pub fn radius(&self) -> Option<f64> {
        match self {
            Self::Sense => None,
            Self::Straw { radius } => Some(*radius),
        }
    }
}

/// Catenary describing the sag of a wire between its fixed points.
///
/// The wire follows `y = a·cosh(u/a) − a + y_min` where `u` is the distance
/// along the wire from the lowest point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Catenary {
    /// Lowest point of the wire.
    pub minimum: Point3<f64>,
    /// Catenary parameter (mm); tension over linear weight.
    pub a: f64,
}

/// Result of a closest-approach query between a segment and a wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestApproach {
    /// Parameter along the segment, in `[0, 1]`.
    pub t: f64,
    /// Parameter along the wire from head (0) to tail (1).
    pub s: f64,
    /// Closest point on the segment.
    pub on_segment: Point3<f64>,
    /// Closest point on the wire.
    pub on_wire: Point3<f64>,
    /// Distance between the two points.
    pub distance: f64,
}

/// A wire or straw of the geometry index.
#[derive(Debug, Clone, PartialEq)]
pub struct Wire {
    /// Dense index.
    pub id: WireId,
    /// Geometry identifier.
    pub geo: GeoId,
    /// Readout channel.
    pub channel: ChannelId,
    /// Readout end.
    pub head: Point3<f64>,
    /// Termination end.
    pub tail: Point3<f64>,
    /// Sense wire or straw.
    pub kind: WireKind,
    /// Sag, when known.
    pub catenary: Option<Catenary>,
    /// Index of the owning plane in the geometry index.
    pub plane: usize,
    /// Position in the plane, counted across the wires in transverse order.
    pub position: u32,
    /// Transverse (measured) coordinate in the plane.
    pub transverse: f64,
    pub(crate) plane_centre: Point3<f64>,
}

impl Wire {
    /// Vector from tail to head, i.e. the direction signals travel. Not
    /// normalized.
    #[inline]
    pub fn direction(&self) -> Vector3<f64> {
        self.head - self.tail
    }

    /// Length of the wire.
    #[inline]
    pub fn length(&self) -> f64 {
        self.direction().norm()
    }

    /// Signed angle of the wire in the x–y plane.
    #[inline]
    pub fn angle(&self) -> f64 {
        let d = self.direction();
        d.y.atan2(d.x)
    }

    /// Midpoint of the wire.
    #[inline]
    pub fn centre(&self) -> Point3<f64> {
        nalgebra::center(&self.head, &self.tail)
    }

    /// Point at parameter `s` from head (0) to tail (1).
    #[inline]
    pub fn point_at(&self, s: f64) -> Point3<f64> {
        self.head + (self.tail - self.head) * s
    }

    /// Maximum deflection at the centre of the wire, 0 without a catenary.
    pub fn sagitta(&self) -> f64 {
        match self.catenary {
            Some(c) if c.a > 0.0 => c.a * ((self.length() / (2.0 * c.a)).cosh() - 1.0),
            _ => 0.0,
        }
    }

    /// Compensates a measured point for the wire sag.
    ///
    /// The returned point is vertically higher than the input by the
    /// catenary offset at the point's position along the wire.
    pub fn sag_corrected(&self, measured: Point3<f64>) -> Point3<f64> {
        let Some(c) = self.catenary.filter(|c| c.a > 0.0) else {
            return measured;
        };
        let along = self
            .direction()
            .try_normalize(0.0)
            .map_or(0.0, |u| (measured - c.minimum).dot(&u));
        let offset = c.a * (along / c.a).cosh() - c.a;
        Point3::new(measured.x, measured.y + offset, measured.z)
    }

    /// Parameter `s ∈ [0, 1]` of the wire point closest to `point`.
    pub fn closest_approach_point(&self, point: &Point3<f64>) -> f64 {
        let v = self.tail - self.head;
        let c = v.norm_squared();
        if c == 0.0 {
            return 0.0;
        }
        ((point - self.head).dot(&v) / c).clamp(0.0, 1.0)
    }

    /// Parameters `(t, s)` of the closest pair between the segment
    /// `start → stop` and the wire.
    ///
    /// Both parameters are clamped to their finite extents. Parallel lines
    /// use the segment midpoint; a zero-length segment is a point.
    pub fn closest_approach_segment(&self, start: &Point3<f64>, stop: &Point3<f64>) -> (f64, f64) {
        let u = stop - start;
        let v = self.tail - self.head;
        let w = start - self.head;

        let a = u.norm_squared();
        let b = u.dot(&v);
        let c = v.norm_squared();
        let d = u.dot(&w);
        let e = v.dot(&w);

        if a == 0.0 {
            return (0.0, self.closest_approach_point(start));
        }
        if c == 0.0 {
            return (((-d) / a).clamp(0.0, 1.0), 0.0);
        }

        let denominator = a * c - b * b;
        if denominator <= PARALLEL_EPSILON * a * c {
            let mid = start + u * 0.5;
            return (0.5, self.closest_approach_point(&mid));
        }

        let t = ((b * e - c * d) / denominator).clamp(0.0, 1.0);
        // Re-project after clamping so the pair stays mutually closest.
        let s = ((e + t * b) / c).clamp(0.0, 1.0);
        let t = ((s * b - d) / a).clamp(0.0, 1.0);
        (t, s)
    }

    /// Full closest-approach solution between a segment and the wire.
    pub fn closest_points(&self, start: &Point3<f64>, stop: &Point3<f64>) -> ClosestApproach {
        let (t, s) = self.closest_approach_segment(start, stop);
        let on_segment = start + (stop - start) * t;
        let on_wire = self.point_at(s);
        ClosestApproach {
            t,
            s,
            on_segment,
            on_wire,
            distance: (on_segment - on_wire).norm(),
        }
    }

    /// Distance from the wire point at `s` to the readout end.
    #[inline]
    pub fn distance_to_head(&self, s: f64) -> f64 {
        s * self.length()
    }

    /// Rigid transform from the wire-plane frame to global coordinates.
    ///
    /// Local X runs along the wire, local Y is the measured coordinate and
    /// local Z is the beam axis. The origin is the plane centre at the
    /// height of the wire head.
    pub fn plane_transform(&self) -> Isometry3<f64> {
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.angle());
        let origin = Translation3::new(self.plane_centre.x, self.plane_centre.y, self.head.z);
        Isometry3::from_parts(origin, rotation)
    }

    /// Returns true if a deposit at `distance` from the wire can drift to it.
    pub fn within_reach(&self, distance: f64, max_drift_distance: Option<f64>) -> bool {
        if !distance.is_finite() {
            return false;
        }
        match (self.kind, max_drift_distance) {
            (WireKind::Straw { radius }, _) => distance <= radius,
            (WireKind::Sense, Some(max)) => distance <= max,
            (WireKind::Sense, None) => true,
        }
    }
}
