//! Assignment of truth deposits to wires.

use std::collections::BTreeMap;

use drifttrack_core::{TruthHit, WireId};
use drifttrack_geometry::{Plane, WireGeometryIndex};
use log::debug;
use serde::{Deserialize, Serialize};

/// Counters of one assignment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentStatistics {
    /// Hits examined.
    pub hits_seen: usize,
    /// Hits assigned to a single wire.
    pub assigned: usize,
    /// Hits split across several wires.
    pub split: usize,
    /// Hits with an end outside every plane.
    pub skipped_outside: usize,
    /// Hits whose ends lie in different planes.
    pub skipped_multi_plane: usize,
}

/// Deposits grouped by wire.
#[derive(Debug, Clone, Default)]
pub struct HitAssignment {
    /// Deposits per wire; wires without deposits are absent.
    pub by_wire: BTreeMap<WireId, Vec<TruthHit>>,
    /// Counters.
    pub stats: AssignmentStatistics,
}

impl HitAssignment {
    /// Number of wires with at least one deposit.
    pub fn wire_count(&self) -> usize {
        self.by_wire.len()
    }

    /// Total energy over all assigned deposits.
    pub fn total_energy(&self) -> f64 {
        self.by_wire.values().flatten().map(|h| h.energy).sum()
    }
}

/// Assigns every hit to the wire(s) it crosses.
///
/// Both ends of a hit must lie in the same plane. A hit whose ends are
/// closest to the same wire is assigned unchanged; otherwise it is split at
/// the cell boundaries with [`split_hit`].
pub fn group_hits(hits: &[TruthHit], geometry: &WireGeometryIndex) -> HitAssignment {
    let mut out = HitAssignment::default();

    for hit in hits {
        out.stats.hits_seen += 1;

        let (Some(start_plane), Some(stop_plane)) =
            (geometry.locate(&hit.start), geometry.locate(&hit.stop))
        else {
            debug!("Hit {:?}: one end is outside every plane, skipping", hit.id);
            out.stats.skipped_outside += 1;
            continue;
        };
        if start_plane.index != stop_plane.index {
            debug!(
                "Hit {:?} spans planes {} and {}, skipping",
                hit.id, start_plane.index, stop_plane.index
            );
            out.stats.skipped_multi_plane += 1;
            continue;
        }
        let plane = start_plane;

        let (Some((first, _)), Some((last, _))) = (
            geometry.closest_wire_in_list(&plane.wires, &hit.start),
            geometry.closest_wire_in_list(&plane.wires, &hit.stop),
        ) else {
            out.stats.skipped_outside += 1;
            continue;
        };

        if first == last {
            debug!("Hit {:?}: start and stop closest to {first}", hit.id);
            out.by_wire.entry(first).or_default().push(hit.clone());
            out.stats.assigned += 1;
        } else {
            let pieces = split_hit(hit, plane, geometry, first, last);
            debug!("Hit {:?} split between {} wires", hit.id, pieces.len());
            for (wire, piece) in pieces {
                out.by_wire.entry(wire).or_default().push(piece);
            }
            out.stats.split += 1;
        }
    }

    debug!(
        "Hits have been grouped on {} wires ({} split, {} skipped)",
        out.by_wire.len(),
        out.stats.split,
        out.stats.skipped_outside + out.stats.skipped_multi_plane
    );
    out
}

/// Splits a hit crossing several cells of `plane`.
///
/// `first` and `last` are the wires closest to the hit start and stop. The
/// cell boundary between two consecutive wires is the transverse midpoint
/// between them. Each piece is attributed to exactly one wire, its deposits
/// scaled by its fraction of the path; the last piece takes the remainder so
/// the pieces sum to the deposits of `hit`.
pub fn split_hit(
    hit: &TruthHit,
    plane: &Plane,
    geometry: &WireGeometryIndex,
    first: WireId,
    last: WireId,
) -> Vec<(WireId, TruthHit)> {
    let position = |id: WireId| geometry.wire(id).map(|w| w.position as usize);
    let (Some(p0), Some(p1)) = (position(first), position(last)) else {
        return vec![(first, hit.clone())];
    };

    let m0 = plane.transverse(&hit.start);
    let m1 = plane.transverse(&hit.stop);
    if p0 == p1 || m1 == m0 {
        return vec![(first, hit.clone())];
    }

    let cells: Vec<usize> = if p0 < p1 {
        (p0..=p1).collect()
    } else {
        (p1..=p0).rev().collect()
    };

    // Parameters along the hit at which each boundary is crossed.
    let mut cuts = Vec::with_capacity(cells.len() + 1);
    cuts.push(0.0);
    for pair in cells.windows(2) {
        let boundary = 0.5
            * (transverse_at(plane, geometry, pair[0]) + transverse_at(plane, geometry, pair[1]));
        let t = ((boundary - m0) / (m1 - m0)).clamp(0.0, 1.0);
        let previous = cuts.last().copied().unwrap_or(0.0);
        cuts.push(t.max(previous));
    }
    cuts.push(1.0);

    let mut pieces = Vec::with_capacity(cells.len());
    let mut energy = 0.0;
    let mut secondary = 0.0;
    let mut length = 0.0;
    let last_cell = cells.len() - 1;

    for (i, &cell) in cells.iter().enumerate() {
        let (t0, t1) = (cuts[i], cuts[i + 1]);
        let wire = plane.wires[cell];
        if i == last_cell {
            let mut piece = hit.sub_segment(t0, t1, t1 - t0);
            piece.energy = hit.energy - energy;
            piece.secondary_energy = hit.secondary_energy - secondary;
            piece.track_length = hit.track_length - length;
            pieces.push((wire, piece));
        } else if t1 > t0 {
            let piece = hit.sub_segment(t0, t1, t1 - t0);
            energy += piece.energy;
            secondary += piece.secondary_energy;
            length += piece.track_length;
            debug!(
                "  piece on {wire}: t = [{t0:.4}, {t1:.4}], energy {:.4e}",
                piece.energy
            );
            pieces.push((wire, piece));
        }
    }
    pieces
}

fn transverse_at(plane: &Plane, geometry: &WireGeometryIndex, position: usize) -> f64 {
    geometry
        .wire(plane.wires[position])
        .map_or(f64::NAN, |w| w.transverse)
}
