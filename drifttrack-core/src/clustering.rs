//! Clustering traits and types.

use crate::{Error, Result, Signal, SignalArena, SignalId, TruthLink, WireId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A group of signals believed to come from one particle crossing.
///
/// Clusters hold handles into a [`SignalArena`]; the same handle may appear
/// in several clusters.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cluster {
    /// Member handles, in increasing order.
    pub signals: Vec<SignalId>,
    /// Truth hits of all members.
    pub truth: TruthLink,
}

impl Cluster {
    /// Creates an empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cluster from member handles, merging the members' truth.
    pub fn from_ids<I>(ids: I, arena: &SignalArena) -> Self
    where
        I: IntoIterator<Item = SignalId>,
    {
        let mut signals: Vec<SignalId> = ids.into_iter().collect();
        signals.sort_unstable();
        signals.dedup();
        let mut truth = TruthLink::new();
        for &id in &signals {
            if let Some(signal) = arena.get(id) {
                truth.merge(&signal.truth);
            }
        }
        Self { signals, truth }
    }

    /// Returns the number of member signals.
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// Returns true if the cluster is empty.
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Returns true if `id` is a member.
    pub fn contains(&self, id: SignalId) -> bool {
        self.signals.binary_search(&id).is_ok()
    }

    /// Returns an iterator over the member handles.
    pub fn iter(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.signals.iter().copied()
    }

    /// Resolves the members against their arena.
    pub fn resolve<'a>(&'a self, arena: &'a SignalArena) -> impl Iterator<Item = &'a Signal> + 'a {
        self.signals.iter().filter_map(move |&id| arena.get(id))
    }

    /// Earliest tdc among the members.
    pub fn earliest_tdc(&self, arena: &SignalArena) -> Option<f64> {
        self.resolve(arena).map(|s| s.tdc).reduce(f64::min)
    }

    /// Summed adc of the members.
    pub fn total_adc(&self, arena: &SignalArena) -> f64 {
        self.resolve(arena).map(|s| s.adc).sum()
    }
}

/// Configuration for clustering strategies.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClusteringConfig {
    /// Maximum tdc difference (ns) for two signals to be linked.
    pub time_window: f64,
    /// Maximum index distance between two wires of the same plane.
    pub max_wire_gap: u32,
    /// Minimum number of signals to form a valid cluster.
    pub min_cluster_size: usize,
    /// Maximum number of signals in a cluster (for filtering large artifacts).
    pub max_cluster_size: Option<usize>,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            time_window: 100.0,
            max_wire_gap: 1,
            min_cluster_size: 1,
            max_cluster_size: None,
        }
    }
}

impl ClusteringConfig {
    /// Creates a new clustering configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time window.
    #[must_use]
    pub fn with_time_window(mut self, window: f64) -> Self {
        self.time_window = window;
        self
    }

    /// Sets the maximum wire gap.
    #[must_use]
    pub fn with_max_wire_gap(mut self, gap: u32) -> Self {
        self.max_wire_gap = gap;
        self
    }

    /// Sets the minimum cluster size.
    #[must_use]
    pub fn with_min_cluster_size(mut self, size: usize) -> Self {
        self.min_cluster_size = size;
        self
    }

    /// Sets the maximum cluster size.
    #[must_use]
    pub fn with_max_cluster_size(mut self, size: usize) -> Self {
        self.max_cluster_size = Some(size);
        self
    }

    /// Checks the values are usable.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for a negative or NaN time window or
    /// inconsistent size limits.
    pub fn validate(&self) -> Result<()> {
        if !(self.time_window >= 0.0) {
            return Err(Error::ConfigError(format!(
                "clustering time window must be non-negative, got {}",
                self.time_window
            )));
        }
        if let Some(max) = self.max_cluster_size {
            if max < self.min_cluster_size {
                return Err(Error::ConfigError(format!(
                    "max cluster size {max} is below min cluster size {}",
                    self.min_cluster_size
                )));
            }
        }
        Ok(())
    }

    /// Returns true if a cluster of `size` signals passes the size filters.
    pub fn accepts_size(&self, size: usize) -> bool {
        size >= self.min_cluster_size && self.max_cluster_size.map_or(true, |max| size <= max)
    }

    /// Grouping predicate: same plane within the wire gap, and close in time.
    pub fn links(&self, a: &Signal, b: &Signal, adjacency: &dyn ChannelAdjacency) -> bool {
        if (a.tdc - b.tdc).abs() > self.time_window {
            return false;
        }
        adjacency
            .wire_gap(a.wire, b.wire)
            .is_some_and(|gap| gap <= self.max_wire_gap)
    }
}

/// Spatial neighbourhood of wires, as seen by clustering.
pub trait ChannelAdjacency: Send + Sync {
    /// Index distance between two wires of the same plane, `None` when they
    /// do not share a plane.
    fn wire_gap(&self, a: WireId, b: WireId) -> Option<u32>;
}

/// Statistics from clustering operations.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusteringStatistics {
    /// Number of signals processed.
    pub signals_processed: usize,
    /// Number of clusters found.
    pub clusters_found: usize,
    /// Number of signals that belong to more than one cluster.
    pub shared_signals: usize,
    /// Number of signals left outside every cluster.
    pub unclustered_signals: usize,
    /// Largest cluster size.
    pub largest_cluster: usize,
}

impl ClusteringStatistics {
    /// Computes statistics for a clustering result.
    pub fn from_clusters(signals: &SignalArena, clusters: &[Cluster]) -> Self {
        let mut membership = vec![0usize; signals.len()];
        for cluster in clusters {
            for id in cluster.iter() {
                if let Some(count) = membership.get_mut(id.index()) {
                    *count += 1;
                }
            }
        }
        Self {
            signals_processed: signals.len(),
            clusters_found: clusters.len(),
            shared_signals: membership.iter().filter(|&&c| c > 1).count(),
            unclustered_signals: membership.iter().filter(|&&c| c == 0).count(),
            largest_cluster: clusters.iter().map(Cluster::len).max().unwrap_or(0),
        }
    }
}

/// Trait for signal clustering strategies.
///
/// Strategies group signals that are close on the wire plane and in time.
/// They never mutate signals and their output does not depend on the order
/// of the arena.
pub trait SignalClustering: Send + Sync {
    /// Clusters the signals of one event.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if `config` is invalid.
    fn cluster(
        &self,
        signals: &SignalArena,
        adjacency: &dyn ChannelAdjacency,
        config: &ClusteringConfig,
    ) -> Result<Vec<Cluster>>;

    /// Returns the name of the strategy.
    fn name(&self) -> &'static str;
}
