//! Serializable description of a tracker geometry.
//!
//! A description lists one or more subdetectors, each addressed by a path
//! such as `sand_inner_volume/STTtracker`. The index is built from one of
//! them with [`crate::WireGeometryIndex::new`].

use std::fs;
use std::path::Path;

use drifttrack_core::{Error, Result, Subdetector};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::wire::{Catenary, View};

/// Geometry of every tracker subdetector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeometryDescription {
    /// Subdetectors, addressed by path.
    pub subdetectors: Vec<SubdetectorDescription>,
}

impl GeometryDescription {
    /// Parses a description from JSON text.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the text is not a valid
    /// description.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidGeometry(e.to_string()))
    }

    /// Reads a description from a JSON file.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if the file cannot be read or
    /// parsed.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::InvalidGeometry(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Serializes the description as pretty JSON.
    ///
    /// # Errors
    /// Returns [`Error::InvalidGeometry`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidGeometry(e.to_string()))
    }

    /// Looks up a subdetector by path. Trailing slashes are ignored.
    pub fn find(&self, path: &str) -> Option<&SubdetectorDescription> {
        let path = path.trim_end_matches('/');
        self.subdetectors
            .iter()
            .find(|s| s.path.trim_end_matches('/') == path)
    }
}

/// One tracker subdetector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubdetectorDescription {
    /// Geometry path, e.g. `sand_inner_volume/drift`.
    pub path: String,
    /// Technology.
    pub kind: Subdetector,
    /// Stations, upstream first.
    pub stations: Vec<StationDescription>,
}

/// A station (module) of planes sharing one DAQ link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationDescription {
    /// Station number, also used as the DAQ link.
    pub id: u16,
    /// Planes of the station.
    pub planes: Vec<PlaneDescription>,
}

/// A plane of parallel wires or straws.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaneDescription {
    /// View of the plane.
    pub view: View,
    /// Corners of the sensitive area: top north, top south, bottom south,
    /// bottom north.
    pub corners: [Point3<f64>; 4],
    /// Extent along z (mm).
    pub thickness: f64,
    /// Wires, in any order.
    pub wires: Vec<WireDescription>,
}

/// A single wire or straw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireDescription {
    /// Channel number on the station link.
    pub channel: u32,
    /// Readout end.
    pub head: Point3<f64>,
    /// Termination end.
    pub tail: Point3<f64>,
    /// Sag of the wire, if measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catenary: Option<Catenary>,
    /// Straw radius (mm); required for straw trackers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
}

impl PlaneDescription {
    /// Generates a rectangular plane of `count` equally spaced wires of
    /// length `length`, centred on the z axis at `z`.
    ///
    /// Wires run at `angle` (radians) from the x axis; the readout end is on
    /// the positive side. Channels are numbered from `first_channel` in
    /// transverse order and the plane is one pitch thick.
    pub fn regular(view: View, z: f64, angle: f64, pitch: f64, count: u32, length: f64) -> Self {
        let along = Vector3::new(angle.cos(), angle.sin(), 0.0);
        let across = Vector3::new(-angle.sin(), angle.cos(), 0.0);
        let centre = Point3::new(0.0, 0.0, z);
        let half_length = 0.5 * length;
        let half_width = 0.5 * pitch * f64::from(count);

        let wires = (0..count)
            .map(|i| {
                let offset = (f64::from(i) - 0.5 * f64::from(count.saturating_sub(1))) * pitch;
                let mid = centre + across * offset;
                WireDescription {
                    channel: i,
                    head: mid + along * half_length,
                    tail: mid - along * half_length,
                    catenary: None,
                    radius: None,
                }
            })
            .collect();

        Self {
            view,
            corners: [
                centre - along * half_length + across * half_width,
                centre + along * half_length + across * half_width,
                centre + along * half_length - across * half_width,
                centre - along * half_length - across * half_width,
            ],
            thickness: pitch,
            wires,
        }
    }

    /// Sets the straw radius of every wire.
    #[must_use]
    pub fn with_radius(mut self, radius: f64) -> Self {
        for w in &mut self.wires {
            w.radius = Some(radius);
        }
        self
    }

    /// Offsets every channel number.
    #[must_use]
    pub fn with_channel_offset(mut self, offset: u32) -> Self {
        for w in &mut self.wires {
            w.channel += offset;
        }
        self
    }

    /// Sets the plane thickness.
    #[must_use]
    pub fn with_thickness(mut self, thickness: f64) -> Self {
        self.thickness = thickness;
        self
    }

    /// Applies the same catenary parameter to every wire, with the lowest
    /// point at the wire centre.
    #[must_use]
    pub fn with_catenary(mut self, a: f64) -> Self {
        for w in &mut self.wires {
            w.catenary = Some(Catenary {
                minimum: nalgebra::center(&w.head, &w.tail),
                a,
            });
        }
        self
    }
}
