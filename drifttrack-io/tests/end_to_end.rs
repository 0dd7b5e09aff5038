//! Files in, CSV out.

use approx::assert_relative_eq;
use drifttrack_algorithms::{process_events, PipelineConfig};
use drifttrack_core::Subdetector;
use drifttrack_geometry::{
    GeometryDescription, PlaneDescription, StationDescription, SubdetectorDescription, View,
};
use drifttrack_io::{load_geometry, read_events, read_pipeline_config, CsvWriter, Error};
use std::fmt::Write as _;
use tempfile::tempdir;

const PATH: &str = "sand_inner_volume/DriftVolume";

fn geometry_json() -> String {
    let stations = (0..3u16)
        .map(|id| {
            let z = 300.0 * f64::from(id);
            StationDescription {
                id,
                planes: vec![
                    PlaneDescription::regular(
                        View::X,
                        z,
                        std::f64::consts::FRAC_PI_2,
                        10.0,
                        64,
                        1000.0,
                    ),
                    PlaneDescription::regular(View::Y, z + 20.0, 0.0, 10.0, 64, 1000.0)
                        .with_channel_offset(64),
                ],
            }
        })
        .collect();
    GeometryDescription {
        subdetectors: vec![SubdetectorDescription {
            path: PATH.into(),
            kind: Subdetector::Drift,
            stations,
        }],
    }
    .to_json_string()
    .unwrap()
}

/// One straight track crossing the middle of a cell in every plane.
fn events_json() -> String {
    let mut hits = String::new();
    let mut id = 0;
    for station in 0..3 {
        for dz in [0.0, 20.0] {
            let z = 300.0 * f64::from(station) + dz;
            let (x, y) = (5.0 + 0.1 * z, -15.0 + 0.02 * z);
            if id > 0 {
                hits.push(',');
            }
            write!(
                hits,
                r#"{{"id": {id}, "start": [{x}, {y}, {z0}], "stop": [{x}, {y}, {z1}],
                    "start_time": {t}, "stop_time": {t}, "energy": 0.001,
                    "provenance": {{"trajectory_id": 1, "primary_id": 1}}}}"#,
                z0 = z - 4.0,
                z1 = z + 4.0,
                t = z / 300.0
            )
            .unwrap();
            id += 1;
        }
    }
    format!(r#"{{"events": [{{"id": 0, "hits": [{hits}]}}, {{"id": 1, "hits": []}}]}}"#)
}

#[test]
fn test_process_files() {
    let dir = tempdir().unwrap();
    let geometry_path = dir.path().join("geometry.json");
    let events_path = dir.path().join("events.json");
    let config_path = dir.path().join("config.json");
    std::fs::write(&geometry_path, geometry_json()).unwrap();
    std::fs::write(&events_path, events_json()).unwrap();
    std::fs::write(&config_path, r#"{"seed": 7, "digitization": {"sigma_tdc": 0.5}}"#).unwrap();

    let geometry = load_geometry(&geometry_path, PATH).unwrap();
    assert_eq!(geometry.stations().len(), 3);
    let events = read_events(&events_path).unwrap();
    let config = read_pipeline_config(&config_path).unwrap();

    let outputs = process_events(&events, &geometry, &config).unwrap();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].signals.len(), 6);
    assert!(outputs[1].signals.is_empty());

    let signals_path = dir.path().join("signals.csv");
    let tracks_path = dir.path().join("tracks.csv");
    CsvWriter::create(&signals_path)
        .unwrap()
        .write_signals_csv(&outputs)
        .unwrap();
    CsvWriter::create(&tracks_path)
        .unwrap()
        .write_tracks_csv(&outputs)
        .unwrap();

    let signals = std::fs::read_to_string(&signals_path).unwrap();
    assert_eq!(signals.lines().count(), 7);
    assert!(signals.lines().skip(1).all(|l| l.starts_with("0,")));
    // Every wire collects the whole deposit of its single hit.
    for row in signals.lines().skip(1) {
        let fields: Vec<&str> = row.split(',').collect();
        let adc: f64 = fields[7].parse().unwrap();
        assert_relative_eq!(adc, 0.001, max_relative = 1e-12);
        let tdc: f64 = fields[6].parse().unwrap();
        assert!(tdc.is_finite());
    }

    let tracks = std::fs::read_to_string(&tracks_path).unwrap();
    let rows: Vec<&str> = tracks.lines().skip(1).collect();
    assert_eq!(rows.len(), 1);
    let fields: Vec<&str> = rows[0].split(',').collect();
    let status: i32 = fields[12].parse().unwrap();
    assert_eq!(status, 3);
    assert_eq!(fields[19], "0;1;2;3;4;5");
}

#[test]
fn test_unresolved_geometry_path() {
    let dir = tempdir().unwrap();
    let geometry_path = dir.path().join("geometry.json");
    std::fs::write(&geometry_path, geometry_json()).unwrap();

    let err = load_geometry(&geometry_path, "sand_inner_volume/ECAL").unwrap_err();
    assert!(matches!(
        err,
        Error::CoreError(drifttrack_core::Error::GeometryPathUnresolved(_))
    ));
}

#[test]
fn test_default_config_is_same_as_empty_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    std::fs::write(&config_path, "{}").unwrap();
    let config = read_pipeline_config(&config_path).unwrap();
    let default = PipelineConfig::default();
    assert_eq!(config.seed, default.seed);
    assert_eq!(config.algorithm, default.algorithm);
    assert_eq!(config.clustering.max_wire_gap, default.clustering.max_wire_gap);
}
