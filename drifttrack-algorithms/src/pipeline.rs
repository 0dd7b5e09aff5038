//! Per-event processing chain: digitization, clustering, tracklets, fit.

use drifttrack_core::{
    Cluster, ClusteringConfig, ClusteringStatistics, Event, Result, SignalArena, SignalClustering,
    Track,
};
use drifttrack_digi::{digitize_hits, AssignmentStatistics, DigitizationConfig, SignalSynthesizer};
use drifttrack_geometry::WireGeometryIndex;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    FitConfig, GraphClustering, NeighbourhoodClustering, TrackFitter, TrackletConfig,
    TrackletFinder,
};

/// Available clustering strategies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringAlgorithm {
    /// Connected components; every signal in at most one cluster.
    #[default]
    Graph,
    /// Maximal neighbourhoods; clusters may share signals.
    Neighbourhood,
}

impl ClusteringAlgorithm {
    /// Returns the strategy implementing this algorithm.
    pub fn strategy(self) -> Box<dyn SignalClustering> {
        match self {
            Self::Graph => Box::new(GraphClustering::new()),
            Self::Neighbourhood => Box::new(NeighbourhoodClustering::new()),
        }
    }
}

impl std::str::FromStr for ClusteringAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "graph" => Ok(Self::Graph),
            "neighbourhood" | "neighborhood" => Ok(Self::Neighbourhood),
            other => Err(format!("unknown clustering algorithm '{other}'")),
        }
    }
}

/// Configuration of the whole chain.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Run seed; each event derives its own stream from it.
    pub seed: u64,
    /// Signal synthesis.
    pub digitization: DigitizationConfig,
    /// Clustering strategy.
    pub algorithm: ClusteringAlgorithm,
    /// Clustering windows and size filters.
    pub clustering: ClusteringConfig,
    /// Tracklet finding.
    pub tracklets: TrackletConfig,
    /// Track fitting.
    pub fit: FitConfig,
}

impl PipelineConfig {
    /// Checks every section.
    ///
    /// # Errors
    /// Returns the first configuration error found.
    pub fn validate(&self) -> Result<()> {
        self.digitization.validate()?;
        self.clustering.validate()?;
        self.fit.validate()?;
        if !(self.tracklets.sigma_transverse > 0.0) {
            return Err(drifttrack_core::Error::ConfigError(format!(
                "tracklet sigma_transverse must be positive, got {}",
                self.tracklets.sigma_transverse
            )));
        }
        Ok(())
    }

    /// Seed of the random stream of `event_id`.
    pub fn event_seed(&self, event_id: u64) -> u64 {
        self.seed ^ event_id.wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }
}

/// Everything produced for one event.
#[derive(Debug, Clone)]
pub struct EventOutput {
    /// Event number.
    pub event_id: u64,
    /// Digitized signals.
    pub signals: SignalArena,
    /// Clusters referencing `signals`.
    pub clusters: Vec<Cluster>,
    /// Fitted tracks.
    pub tracks: Vec<Track>,
    /// Hit assignment counters.
    pub assignment: AssignmentStatistics,
    /// Clustering counters.
    pub clustering: ClusteringStatistics,
}

/// Runs the full chain on one event.
///
/// # Errors
/// Returns an error if `config` is invalid.
pub fn process_event(
    event: &Event,
    geometry: &WireGeometryIndex,
    config: &PipelineConfig,
) -> Result<EventOutput> {
    let mut synthesizer =
        SignalSynthesizer::new(config.digitization.clone(), config.event_seed(event.id))?;
    let (signals, assignment) = digitize_hits(&event.hits, geometry, &mut synthesizer);

    let strategy = config.algorithm.strategy();
    let clusters = strategy.cluster(&signals, geometry, &config.clustering)?;
    let clustering = ClusteringStatistics::from_clusters(&signals, &clusters);
    debug!(
        "Event {}: {} clusters from {} signals ({})",
        event.id,
        clusters.len(),
        signals.len(),
        strategy.name()
    );

    let finder = TrackletFinder::new(config.tracklets.clone());
    let fitter = TrackFitter::new(config.fit.clone());
    let tracks = finder
        .find(&clusters, &signals, geometry, &event.hits)
        .iter()
        .zip(0u32..)
        .map(|(candidate, id)| fitter.fit(id, &candidate.tracklets))
        .collect::<Vec<_>>();

    Ok(EventOutput {
        event_id: event.id,
        signals,
        clusters,
        tracks,
        assignment,
        clustering,
    })
}

/// Runs the chain on many events in parallel.
///
/// Results are in input order and do not depend on thread scheduling.
///
/// # Errors
/// Returns the first error encountered.
pub fn process_events(
    events: &[Event],
    geometry: &WireGeometryIndex,
    config: &PipelineConfig,
) -> Result<Vec<EventOutput>> {
    config.validate()?;
    let outputs = events
        .par_iter()
        .map(|event| process_event(event, geometry, config))
        .collect::<Result<Vec<_>>>()?;

    let tracks: usize = outputs.iter().map(|o| o.tracks.len()).sum();
    let signals: usize = outputs.iter().map(|o| o.signals.len()).sum();
    info!(
        "Processed {} events: {signals} signals, {tracks} tracks",
        outputs.len()
    );
    Ok(outputs)
}
