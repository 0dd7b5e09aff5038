//! drifttrack-core: Core types for wire and straw-tube tracking.
//!
//! This crate provides the data model shared by the digitization and
//! reconstruction crates: truth deposits, readout channels, signals and
//! their arena, clusters, tracklets and fitted tracks.
//!

pub mod channel;
pub mod clustering;
pub mod error;
pub mod event;
pub mod hit;
pub mod signal;
pub mod track;

pub use channel::{ChannelId, Subdetector, WireId};
pub use clustering::{
    ChannelAdjacency, Cluster, ClusteringConfig, ClusteringStatistics, SignalClustering,
};
pub use error::{Error, Result};
pub use event::Event;
pub use hit::{HitId, Provenance, TruthHit, TruthLink};
pub use signal::{Signal, SignalArena, SignalId, SignalTiming, TimeRange};
pub use track::{status, CircleParams, FitState, LineParams, StageFit, Track, Tracklet};

pub use nalgebra::{Point3, Vector3};
