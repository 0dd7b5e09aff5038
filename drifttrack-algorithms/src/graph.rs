//! Graph-based clustering algorithm.
//!
//! Uses a union-find data structure to collect the connected components
//! of the signal neighbourhood graph.

use std::collections::BTreeMap;

use drifttrack_core::{
    ChannelAdjacency, Cluster, ClusteringConfig, Result, SignalArena, SignalClustering, SignalId,
};

/// Graph-based clustering using union-find.
///
/// Edges connect signals satisfying [`ClusteringConfig::links`]; each
/// connected component becomes one cluster, so the result is a partition.
#[derive(Debug, Clone, Default)]
pub struct GraphClustering;

impl GraphClustering {
    /// Creates a new graph-based clustering instance.
    pub fn new() -> Self {
        Self
    }
}

/// Union-Find data structure for connected component detection.
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub(crate) fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub(crate) fn union(&mut self, x: usize, y: usize) {
        let px = self.find(x);
        let py = self.find(y);

        if px == py {
            return;
        }

        match self.rank[px].cmp(&self.rank[py]) {
            std::cmp::Ordering::Less => self.parent[px] = py,
            std::cmp::Ordering::Greater => self.parent[py] = px,
            std::cmp::Ordering::Equal => {
                self.parent[py] = px;
                self.rank[px] += 1;
            }
        }
    }
}

impl SignalClustering for GraphClustering {
    fn cluster(
        &self,
        signals: &SignalArena,
        adjacency: &dyn ChannelAdjacency,
        config: &ClusteringConfig,
    ) -> Result<Vec<Cluster>> {
        config.validate()?;
        if signals.is_empty() {
            return Ok(Vec::new());
        }

        let all = signals.as_slice();
        let n = all.len();
        let mut uf = UnionFind::new(n);

        for i in 0..n {
            for j in (i + 1)..n {
                if config.links(&all[i], &all[j], adjacency) {
                    uf.union(i, j);
                }
            }
        }

        // Keyed by smallest member so clusters come out in a canonical order.
        let mut components: BTreeMap<usize, Vec<SignalId>> = BTreeMap::new();
        let mut first_of_root: Vec<Option<usize>> = vec![None; n];
        for (id, _) in signals.iter() {
            let root = uf.find(id.index());
            let key = *first_of_root[root].get_or_insert(id.index());
            components.entry(key).or_default().push(id);
        }

        let clusters = components
            .into_values()
            .filter(|members| config.accepts_size(members.len()))
            .map(|members| Cluster::from_ids(members, signals))
            .collect();

        Ok(clusters)
    }

    fn name(&self) -> &'static str {
        "Graph"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{line_signal, mixed_signals, wire_sets, Line};

    #[test]
    fn test_graph_single_cluster() {
        let mut arena = SignalArena::new();
        arena.push(line_signal(0, 0, 100.0));
        arena.push(line_signal(0, 1, 110.0));
        arena.push(line_signal(0, 2, 105.0));

        let config = ClusteringConfig::default().with_time_window(20.0);
        let clusters = GraphClustering::new().cluster(&arena, &Line, &config).unwrap();

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }

    #[test]
    fn test_graph_separate_clusters() {
        let mut arena = SignalArena::new();
        arena.push(line_signal(0, 0, 100.0));
        arena.push(line_signal(0, 1, 110.0));
        arena.push(line_signal(0, 10, 100.0));
        arena.push(line_signal(1, 1, 105.0));

        let config = ClusteringConfig::default().with_time_window(20.0);
        let clusters = GraphClustering::new().cluster(&arena, &Line, &config).unwrap();

        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].signals, vec![SignalId(0), SignalId(1)]);
    }

    #[test]
    fn test_graph_time_window_splits() {
        let mut arena = SignalArena::new();
        arena.push(line_signal(0, 0, 0.0));
        arena.push(line_signal(0, 1, 500.0));

        let clusters = GraphClustering::new()
            .cluster(&arena, &Line, &ClusteringConfig::default())
            .unwrap();
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_graph_empty_input() {
        let clusters = GraphClustering::new()
            .cluster(&SignalArena::new(), &Line, &ClusteringConfig::default())
            .unwrap();
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_graph_min_cluster_size() {
        let mut arena = SignalArena::new();
        arena.push(line_signal(0, 0, 0.0));
        arena.push(line_signal(0, 1, 0.0));
        arena.push(line_signal(0, 5, 0.0));

        let config = ClusteringConfig::default().with_min_cluster_size(2);
        let clusters = GraphClustering::new().cluster(&arena, &Line, &config).unwrap();
        assert_eq!(clusters.len(), 1);
    }

    #[test]
    fn test_union_find() {
        let mut uf = UnionFind::new(5);
        uf.union(0, 1);
        uf.union(2, 3);
        uf.union(1, 2);

        assert_eq!(uf.find(0), uf.find(3));
        assert_ne!(uf.find(0), uf.find(4));
    }

    #[test]
    fn test_graph_arena_order_does_not_matter() {
        let signals = mixed_signals();
        let n = signals.len();
        let orders: [Vec<usize>; 3] = [
            (0..n).collect(),
            (0..n).rev().collect(),
            (0..n).map(|i| (i * 7) % n).collect(),
        ];

        let config = ClusteringConfig::default();
        let mut results = Vec::new();
        for order in &orders {
            let mut arena = SignalArena::new();
            for &i in order {
                arena.push(signals[i].clone());
            }
            let clusters = GraphClustering::new().cluster(&arena, &Line, &config).unwrap();
            results.push(wire_sets(&arena, &clusters));
        }

        assert!(!results[0].is_empty());
        assert_eq!(results[0], results[1]);
        assert_eq!(results[0], results[2]);
    }
}
