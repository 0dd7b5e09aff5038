//! drifttrack-geometry: Wire and straw geometry for tracker digitization.
//!
//! The [`WireGeometryIndex`] is built once per run from a
//! [`GeometryDescription`] and answers the spatial and topological queries
//! of hit assignment, signal synthesis and clustering.
//!

pub mod description;
pub mod index;
pub mod wire;

pub use description::{
    GeometryDescription, PlaneDescription, StationDescription, SubdetectorDescription,
    WireDescription,
};
pub use index::{Plane, Station, WireGeometryIndex};
pub use wire::{Catenary, ClosestApproach, GeoId, View, Wire, WireKind};
