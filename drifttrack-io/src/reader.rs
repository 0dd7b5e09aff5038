//! JSON readers for events, configuration and geometry.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::Result;
use drifttrack_algorithms::PipelineConfig;
use drifttrack_core::{Error as CoreError, Event, TruthHit};
use drifttrack_geometry::{GeometryDescription, WireGeometryIndex};
use log::{debug, info};
use serde::Deserialize;

/// On-disk layout of an event stream.
#[derive(Deserialize)]
struct EventFile {
    events: Vec<Event>,
}

/// Reads an event stream file.
///
/// The file holds `{"events": [{"id": .., "hits": [..]}, ..]}`, with hit
/// positions as `[x, y, z]` arrays.
///
/// # Errors
/// Returns an error if the file cannot be read, is not valid JSON, or
/// contains a malformed event.
pub fn read_events<P: AsRef<Path>>(path: P) -> Result<Vec<Event>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let stream: EventFile = serde_json::from_reader(BufReader::new(file))?;
    check_events(&stream.events)?;
    info!("Read {} events from {}", stream.events.len(), path.display());
    Ok(stream.events)
}

/// Parses an event stream from a string.
///
/// # Errors
/// Returns an error if the text is not a valid event stream.
pub fn parse_events(text: &str) -> Result<Vec<Event>> {
    let stream: EventFile = serde_json::from_str(text)?;
    check_events(&stream.events)?;
    Ok(stream.events)
}

fn check_events(events: &[Event]) -> Result<()> {
    let mut ids = HashSet::with_capacity(events.len());
    for event in events {
        if !ids.insert(event.id) {
            return Err(CoreError::InvalidInput(format!("event {} appears twice", event.id)).into());
        }
        let mut hit_ids = HashSet::with_capacity(event.hits.len());
        for hit in &event.hits {
            if !hit_ids.insert(hit.id) {
                return Err(CoreError::InvalidInput(format!(
                    "event {}: hit {} appears twice",
                    event.id, hit.id.0
                ))
                .into());
            }
            check_hit(event.id, hit)?;
        }
    }
    Ok(())
}

fn check_hit(event: u64, hit: &TruthHit) -> Result<()> {
    let finite = hit.start.iter().chain(hit.stop.iter()).all(|v| v.is_finite())
        && [
            hit.start_time,
            hit.stop_time,
            hit.energy,
            hit.secondary_energy,
            hit.track_length,
        ]
        .iter()
        .all(|v| v.is_finite());
    if !finite {
        return Err(CoreError::InvalidInput(format!(
            "event {event}: hit {} has non-finite values",
            hit.id.0
        ))
        .into());
    }
    if hit.energy < 0.0 || hit.secondary_energy < 0.0 {
        return Err(CoreError::InvalidInput(format!(
            "event {event}: hit {} has negative energy",
            hit.id.0
        ))
        .into());
    }
    Ok(())
}

/// Reads and validates a pipeline configuration file.
///
/// Missing fields take their default values.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed, or if the
/// configuration is invalid.
pub fn read_pipeline_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let config: PipelineConfig = serde_json::from_reader(BufReader::new(file))?;
    config.validate()?;
    debug!("Loaded pipeline configuration from {}", path.display());
    Ok(config)
}

/// Loads a geometry description and indexes the subdetector at `subdetector`.
///
/// # Errors
/// Returns an error if the description cannot be read or the path does not
/// resolve to a valid subdetector.
pub fn load_geometry<P: AsRef<Path>>(path: P, subdetector: &str) -> Result<WireGeometryIndex> {
    let description = GeometryDescription::from_json_file(path)?;
    let index = WireGeometryIndex::new(&description, subdetector)?;
    info!(
        "Indexed {} wires in {} planes under {}",
        index.wires().len(),
        index.planes().len(),
        subdetector
    );
    Ok(index)
}
