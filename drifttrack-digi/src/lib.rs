//! drifttrack-digi: Fast digitization of wire and straw trackers.
//!
//! Truth deposits are first assigned to the wires they cross
//! ([`group_hits`]), then every wire with deposits is turned into one
//! signal by a [`SignalSynthesizer`].
//!

pub mod assign;
pub mod synth;

pub use assign::{group_hits, split_hit, AssignmentStatistics, HitAssignment};
pub use synth::{ArrivalPolicy, DigitizationConfig, SignalSynthesizer};

use drifttrack_core::{SignalArena, TruthHit};
use drifttrack_geometry::WireGeometryIndex;
use log::{debug, warn};

/// Synthesizes the signals of an assignment, in wire order.
pub fn digitize(
    assignment: &HitAssignment,
    geometry: &WireGeometryIndex,
    synthesizer: &mut SignalSynthesizer,
) -> SignalArena {
    let mut arena = SignalArena::with_capacity(assignment.by_wire.len());
    for (&id, segments) in &assignment.by_wire {
        let Some(wire) = geometry.wire(id) else {
            warn!("No wire found for {id}");
            continue;
        };
        if let Some(signal) = synthesizer.synthesize(wire, segments) {
            arena.push(signal);
        }
    }
    debug!(
        "Digitized {} signals from {} wires",
        arena.len(),
        assignment.by_wire.len()
    );
    arena
}

/// Assigns and digitizes the hits of one event.
pub fn digitize_hits(
    hits: &[TruthHit],
    geometry: &WireGeometryIndex,
    synthesizer: &mut SignalSynthesizer,
) -> (SignalArena, AssignmentStatistics) {
    let assignment = group_hits(hits, geometry);
    let arena = digitize(&assignment, geometry, synthesizer);
    (arena, assignment.stats)
}
