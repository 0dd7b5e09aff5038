//! Immutable spatial index over the wires of one subdetector.

use std::collections::HashMap;

use drifttrack_core::{ChannelAdjacency, ChannelId, Error, Result, Subdetector, WireId};
use log::{debug, info};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};

use crate::description::{GeometryDescription, PlaneDescription, SubdetectorDescription};
use crate::wire::{GeoId, View, Wire, WireKind};

/// Points this far (mm) outside a plane's sensitive area still belong to it.
const CONTAINMENT_TOLERANCE: f64 = 1e-6;

/// A plane of parallel wires.
#[derive(Debug, Clone)]
pub struct Plane {
    /// Index of the plane in [`WireGeometryIndex::planes`].
    pub index: usize,
    /// Station number.
    pub station: u16,
    /// Plane number within the station.
    pub number: u8,
    /// View.
    pub view: View,
    /// Corners of the sensitive area.
    pub corners: [Point3<f64>; 4],
    /// Centre z.
    pub z: f64,
    /// Extent along z.
    pub thickness: f64,
    /// Wire angle in the x–y plane.
    pub angle: f64,
    /// Wires in increasing transverse coordinate.
    pub wires: Vec<WireId>,
    frame: Isometry3<f64>,
    local_min: (f64, f64),
    local_max: (f64, f64),
}

impl Plane {
    /// Centre of the sensitive area.
    pub fn centre(&self) -> Point3<f64> {
        let sum = self
            .corners
            .iter()
            .fold(Vector3::zeros(), |acc, c| acc + c.coords);
        Point3::from(sum / 4.0)
    }

    /// Unit normal of the wires within the x–y plane; the measured
    /// coordinate is `normal · (x, y)`.
    pub fn normal(&self) -> Vector3<f64> {
        Vector3::new(-self.angle.sin(), self.angle.cos(), 0.0)
    }

    /// Measured (transverse) coordinate of a point.
    #[inline]
    pub fn transverse(&self, point: &Point3<f64>) -> f64 {
        self.normal().dot(&point.coords)
    }

    /// Returns true if the point lies inside the plane's sensitive volume.
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        if (point.z - self.z).abs() > 0.5 * self.thickness + CONTAINMENT_TOLERANCE {
            return false;
        }
        let local = self.frame.inverse_transform_point(point);
        local.x >= self.local_min.0 - CONTAINMENT_TOLERANCE
            && local.x <= self.local_max.0 + CONTAINMENT_TOLERANCE
            && local.y >= self.local_min.1 - CONTAINMENT_TOLERANCE
            && local.y <= self.local_max.1 + CONTAINMENT_TOLERANCE
    }
}

/// A station of planes read out on one DAQ link.
#[derive(Debug, Clone)]
pub struct Station {
    /// Station number and DAQ link.
    pub id: u16,
    /// Indices of its planes.
    pub planes: Vec<usize>,
}

/// Wire geometry of one tracker subdetector.
///
/// Built once from a [`GeometryDescription`]; read-only afterwards and safe
/// to share between threads.
#[derive(Debug, Clone)]
pub struct WireGeometryIndex {
    path: String,
    subdetector: Subdetector,
    wires: Vec<Wire>,
    planes: Vec<Plane>,
    stations: Vec<Station>,
    by_channel: HashMap<ChannelId, WireId>,
}

impl WireGeometryIndex {
    /// Builds the index of the subdetector at `path`.
    ///
    /// # Errors
    /// Returns [`Error::GeometryPathUnresolved`] if `path` names no
    /// subdetector of `description`, and [`Error::InvalidGeometry`] for
    /// zero-length wires, duplicated channels, empty planes, non-positive
    /// thicknesses or straws without a radius.
    pub fn new(description: &GeometryDescription, path: &str) -> Result<Self> {
        let sub = description
            .find(path)
            .ok_or_else(|| Error::GeometryPathUnresolved(path.to_string()))?;
        let index = Self::build(sub)?;
        info!(
            "Geometry index for {} ({}): {} stations, {} planes, {} wires",
            index.path,
            index.subdetector,
            index.stations.len(),
            index.planes.len(),
            index.wires.len()
        );
        Ok(index)
    }

    fn build(sub: &SubdetectorDescription) -> Result<Self> {
        let mut index = Self {
            path: sub.path.trim_end_matches('/').to_string(),
            subdetector: sub.kind,
            wires: Vec::new(),
            planes: Vec::new(),
            stations: Vec::with_capacity(sub.stations.len()),
            by_channel: HashMap::new(),
        };

        for station in &sub.stations {
            let mut planes = Vec::with_capacity(station.planes.len());
            for (number, plane) in station.planes.iter().enumerate() {
                let number = u8::try_from(number).map_err(|_| {
                    Error::InvalidGeometry(format!("station {} has too many planes", station.id))
                })?;
                planes.push(index.add_plane(station.id, number, plane)?);
            }
            index.stations.push(Station {
                id: station.id,
                planes,
            });
        }

        if index.wires.is_empty() {
            return Err(Error::InvalidGeometry(format!(
                "subdetector '{}' has no wires",
                index.path
            )));
        }
        Ok(index)
    }

    fn add_plane(&mut self, station: u16, number: u8, desc: &PlaneDescription) -> Result<usize> {
        if desc.wires.is_empty() {
            return Err(Error::InvalidGeometry(format!(
                "plane {number} of station {station} has no wires"
            )));
        }
        if !(desc.thickness > 0.0) {
            return Err(Error::InvalidGeometry(format!(
                "plane {number} of station {station} has thickness {}",
                desc.thickness
            )));
        }

        let first = &desc.wires[0];
        let reference = first.head - first.tail;
        if reference.norm() == 0.0 {
            return Err(Error::InvalidGeometry(format!(
                "zero-length wire on channel {} of station {station}",
                first.channel
            )));
        }
        let angle = reference.y.atan2(reference.x);

        let corners = desc.corners;
        let centre = Point3::from(
            corners
                .iter()
                .fold(Vector3::zeros(), |acc, c| acc + c.coords)
                / 4.0,
        );
        let frame = Isometry3::from_parts(
            Translation3::new(centre.x, centre.y, centre.z),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle),
        );
        let mut local_min = (f64::INFINITY, f64::INFINITY);
        let mut local_max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for c in &corners {
            let l = frame.inverse_transform_point(c);
            local_min = (local_min.0.min(l.x), local_min.1.min(l.y));
            local_max = (local_max.0.max(l.x), local_max.1.max(l.y));
        }

        let plane_index = self.planes.len();
        let mut plane = Plane {
            index: plane_index,
            station,
            number,
            view: desc.view,
            corners,
            z: centre.z,
            thickness: desc.thickness,
            angle,
            wires: Vec::with_capacity(desc.wires.len()),
            frame,
            local_min,
            local_max,
        };

        let mut ordered: Vec<_> = desc
            .wires
            .iter()
            .map(|w| (plane.transverse(&nalgebra::center(&w.head, &w.tail)), w))
            .collect();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

        for (position, (transverse, w)) in ordered.into_iter().enumerate() {
            if (w.head - w.tail).norm() == 0.0 {
                return Err(Error::InvalidGeometry(format!(
                    "zero-length wire on channel {} of station {station}",
                    w.channel
                )));
            }
            let kind = match (self.subdetector, w.radius) {
                (Subdetector::Drift, _) => WireKind::Sense,
                (Subdetector::Stt, Some(radius)) if radius > 0.0 => WireKind::Straw { radius },
                (Subdetector::Stt, radius) => {
                    return Err(Error::InvalidGeometry(format!(
                        "straw on channel {} of station {station} has radius {radius:?}",
                        w.channel
                    )));
                }
            };
            let channel = ChannelId::new(self.subdetector, station, w.channel);
            let id = WireId(u32::try_from(self.wires.len()).map_err(|_| {
                Error::InvalidGeometry("too many wires".to_string())
            })?);
            if self.by_channel.insert(channel, id).is_some() {
                return Err(Error::InvalidGeometry(format!("duplicated channel {channel}")));
            }
            let position = u32::try_from(position)
                .map_err(|_| Error::InvalidGeometry("too many wires in a plane".to_string()))?;

            self.wires.push(Wire {
                id,
                geo: GeoId {
                    subdetector: self.subdetector,
                    station,
                    plane: number,
                    view: desc.view,
                    tube: position,
                },
                channel,
                head: w.head,
                tail: w.tail,
                kind,
                catenary: w.catenary,
                plane: plane_index,
                position,
                transverse,
                plane_centre: centre,
            });
            plane.wires.push(id);
        }

        debug!(
            "Plane {number} ({}) of station {station}: {} wires at z = {:.2}",
            plane.view,
            plane.wires.len(),
            plane.z
        );
        self.planes.push(plane);
        Ok(plane_index)
    }

    /// Geometry path the index was built from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Subdetector technology.
    pub fn subdetector(&self) -> Subdetector {
        self.subdetector
    }

    /// All wires, indexed by [`WireId`].
    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    /// All planes.
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// All stations, in description order.
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Returns the wire with the given id.
    pub fn wire(&self, id: WireId) -> Option<&Wire> {
        self.wires.get(id.index())
    }

    /// Returns the plane owning a wire.
    pub fn plane_of(&self, id: WireId) -> Option<&Plane> {
        self.wire(id).and_then(|w| self.planes.get(w.plane))
    }

    /// Resolves a readout channel to its wire.
    ///
    /// # Errors
    /// Returns [`Error::UnknownChannel`] if no wire is read out by `channel`.
    pub fn wire_by_channel(&self, channel: ChannelId) -> Result<&Wire> {
        self.by_channel
            .get(&channel)
            .and_then(|id| self.wire(*id))
            .ok_or(Error::UnknownChannel(channel))
    }

    /// Distinct views present in the subdetector, sorted.
    pub fn views(&self) -> Vec<View> {
        let mut views: Vec<View> = self.planes.iter().map(|p| p.view).collect();
        views.sort_unstable();
        views.dedup();
        views
    }

    /// Wires of `station` in `view`.
    pub fn wires_in_view(&self, station: u16, view: View) -> impl Iterator<Item = &Wire> + '_ {
        self.planes
            .iter()
            .filter(move |p| p.station == station && p.view == view)
            .flat_map(move |p| p.wires.iter().map(move |id| &self.wires[id.index()]))
    }

    /// Plane whose sensitive volume contains `point`.
    pub fn locate(&self, point: &Point3<f64>) -> Option<&Plane> {
        self.planes.iter().find(|p| p.contains(point))
    }

    /// Wire of `list` closest to `point`, and its position in the list.
    pub fn closest_wire_in_list(
        &self,
        list: &[WireId],
        point: &Point3<f64>,
    ) -> Option<(WireId, usize)> {
        list.iter()
            .enumerate()
            .filter_map(|(i, &id)| {
                let w = self.wire(id)?;
                let on_wire = w.point_at(w.closest_approach_point(point));
                Some((id, i, (on_wire - point).norm()))
            })
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(id, i, _)| (id, i))
    }

    /// Closest wire to a point inside a plane.
    pub fn nearest_wire(&self, point: &Point3<f64>) -> Option<&Wire> {
        let plane = self.locate(point)?;
        self.closest_wire_in_list(&plane.wires, point)
            .and_then(|(id, _)| self.wire(id))
    }

    /// Adjacent wires in the same plane.
    pub fn neighbours(&self, id: WireId) -> impl Iterator<Item = WireId> + '_ {
        let found = self.wire(id).map(|w| (&self.planes[w.plane].wires, w.position as usize));
        found.into_iter().flat_map(|(wires, pos)| {
            [pos.checked_sub(1), pos.checked_add(1)]
                .into_iter()
                .flatten()
                .filter_map(move |p| wires.get(p).copied())
        })
    }
}

impl ChannelAdjacency for WireGeometryIndex {
    fn wire_gap(&self, a: WireId, b: WireId) -> Option<u32> {
        let (wa, wb) = (self.wire(a)?, self.wire(b)?);
        (wa.plane == wb.plane).then(|| wa.position.abs_diff(wb.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::StationDescription;
    use approx::assert_relative_eq;

    fn description() -> GeometryDescription {
        GeometryDescription {
            subdetectors: vec![SubdetectorDescription {
                path: "sand_inner_volume/drift".into(),
                kind: Subdetector::Drift,
                stations: vec![StationDescription {
                    id: 2,
                    planes: vec![
                        PlaneDescription::regular(View::Y, 0.0, 0.0, 10.0, 5, 1000.0),
                        PlaneDescription::regular(
                            View::X,
                            20.0,
                            std::f64::consts::FRAC_PI_2,
                            10.0,
                            5,
                            1000.0,
                        )
                        .with_channel_offset(100),
                    ],
                }],
            }],
        }
    }

    #[test]
    fn test_build_and_lookup() {
        let index = WireGeometryIndex::new(&description(), "sand_inner_volume/drift").unwrap();
        assert_eq!(index.wires().len(), 10);
        assert_eq!(index.planes().len(), 2);
        assert_eq!(index.views(), vec![View::X, View::Y]);

        let ch = ChannelId::new(Subdetector::Drift, 2, 102);
        let w = index.wire_by_channel(ch).unwrap();
        assert_eq!(w.channel, ch);
        assert_eq!(w.geo.view, View::X);
        assert!(matches!(
            index.wire_by_channel(ChannelId::new(Subdetector::Drift, 3, 0)),
            Err(Error::UnknownChannel(_))
        ));
    }

    #[test]
    fn test_unresolved_path() {
        assert!(matches!(
            WireGeometryIndex::new(&description(), "sand_inner_volume/STTtracker"),
            Err(Error::GeometryPathUnresolved(_))
        ));
    }

    #[test]
    fn test_wires_sorted_transversely() {
        let index = WireGeometryIndex::new(&description(), "sand_inner_volume/drift").unwrap();
        let plane = &index.planes()[0];
        let ys: Vec<f64> = plane
            .wires
            .iter()
            .map(|id| index.wires()[id.index()].transverse)
            .collect();
        assert!(ys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_locate_and_nearest() {
        let index = WireGeometryIndex::new(&description(), "sand_inner_volume/drift").unwrap();
        let p = Point3::new(100.0, 8.0, 1.0);
        let plane = index.locate(&p).unwrap();
        assert_eq!(plane.view, View::Y);
        let w = index.nearest_wire(&p).unwrap();
        assert_relative_eq!(w.head.y, 10.0);

        assert!(index.locate(&Point3::new(0.0, 0.0, 10.0)).is_none());
        assert!(index.locate(&Point3::new(0.0, 40.0, 0.0)).is_none());
        assert_eq!(index.locate(&Point3::new(0.0, 0.0, 22.0)).map(|p| p.view), Some(View::X));
    }

    #[test]
    fn test_neighbours_and_gap() {
        let index = WireGeometryIndex::new(&description(), "sand_inner_volume/drift").unwrap();
        let first = index.planes()[0].wires[0];
        let middle = index.planes()[0].wires[2];
        let other = index.planes()[1].wires[0];

        assert_eq!(index.neighbours(first).count(), 1);
        assert_eq!(index.neighbours(middle).count(), 2);
        assert_eq!(index.wire_gap(first, middle), Some(2));
        assert_eq!(index.wire_gap(first, other), None);
    }

    #[test]
    fn test_invalid_geometry() {
        let mut desc = description();
        desc.subdetectors[0].stations[0].planes[1] =
            PlaneDescription::regular(View::X, 20.0, 0.0, 10.0, 2, 100.0);
        assert!(matches!(
            WireGeometryIndex::new(&desc, "sand_inner_volume/drift"),
            Err(Error::InvalidGeometry(_))
        ));

        let mut desc = description();
        desc.subdetectors[0].stations[0].planes[0].wires.clear();
        assert!(WireGeometryIndex::new(&desc, "sand_inner_volume/drift").is_err());

        let mut desc = description();
        desc.subdetectors[0].kind = Subdetector::Stt;
        assert!(WireGeometryIndex::new(&desc, "sand_inner_volume/drift").is_err());
    }

    #[test]
    fn test_index_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WireGeometryIndex>();
    }
}
