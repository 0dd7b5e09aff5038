//! drifttrack-algorithms: Reconstruction algorithms for wire trackers.
//!
//! This crate provides:
//! - **Graph** clustering - union-find connected components
//! - **Neighbourhood** clustering - maximal neighbourhoods sharing signals
//! - **Tracklet finding** - station points and local directions
//! - **Kalman fitting** - linear and circular stages with quality reporting
//!
#![warn(missing_docs)]

mod graph;
mod kalman;
mod neighbourhood;
mod pipeline;
mod tracklet;

pub use graph::GraphClustering;
pub use kalman::{FitConfig, TrackFitter, TraversalOrder};
pub use neighbourhood::NeighbourhoodClustering;
pub use pipeline::{
    process_event, process_events, ClusteringAlgorithm, EventOutput, PipelineConfig,
};
pub use tracklet::{TrackCandidate, TrackletConfig, TrackletFinder};

// Re-export core clustering traits
pub use drifttrack_core::clustering::{ClusteringConfig, ClusteringStatistics, SignalClustering};
