//! Per-event input container.

use crate::hit::TruthHit;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Truth deposits of one simulated event.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Event {
    /// Event number, also the seed offset of its random stream.
    pub id: u64,
    /// Energy-deposit segments in the tracker.
    #[cfg_attr(feature = "serde", serde(default))]
    pub hits: Vec<TruthHit>,
}

impl Event {
    /// Creates an event.
    pub fn new(id: u64, hits: Vec<TruthHit>) -> Self {
        Self { id, hits }
    }

    /// Total deposited energy.
    pub fn total_energy(&self) -> f64 {
        self.hits.iter().map(|h| h.energy).sum()
    }
}
