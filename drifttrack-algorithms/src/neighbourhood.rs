//! Neighbourhood clustering with shared signals.

use drifttrack_core::{
    ChannelAdjacency, Cluster, ClusteringConfig, Result, SignalArena, SignalClustering, SignalId,
};

/// Clusters made of the closed neighbourhood of each signal.
///
/// A signal's neighbourhood is itself plus every signal it links to. Only
/// maximal neighbourhoods are kept, so a signal sitting between two groups
/// belongs to both of them.
#[derive(Debug, Clone, Default)]
pub struct NeighbourhoodClustering;

impl NeighbourhoodClustering {
    /// Creates a new neighbourhood clustering instance.
    pub fn new() -> Self {
        Self
    }
}

/// Returns true if sorted `a` is a subset of sorted `b`.
fn is_subset(a: &[SignalId], b: &[SignalId]) -> bool {
    let mut rest = b.iter();
    a.iter().all(|x| rest.any(|y| y == x))
}

impl SignalClustering for NeighbourhoodClustering {
    fn cluster(
        &self,
        signals: &SignalArena,
        adjacency: &dyn ChannelAdjacency,
        config: &ClusteringConfig,
    ) -> Result<Vec<Cluster>> {
        config.validate()?;

        let mut sets: Vec<Vec<SignalId>> = signals
            .iter()
            .map(|(id, signal)| {
                signals
                    .iter()
                    .filter(|&(other, s)| other == id || config.links(signal, s, adjacency))
                    .map(|(other, _)| other)
                    .collect()
            })
            .collect();
        sets.sort();
        sets.dedup();

        let maximal: Vec<&Vec<SignalId>> = sets
            .iter()
            .filter(|set| {
                !sets
                    .iter()
                    .any(|other| other.len() > set.len() && is_subset(set, other))
            })
            .collect();

        Ok(maximal
            .into_iter()
            .filter(|set| config.accepts_size(set.len()))
            .map(|set| Cluster::from_ids(set.iter().copied(), signals))
            .collect())
    }

    fn name(&self) -> &'static str {
        "Neighbourhood"
    }
}
