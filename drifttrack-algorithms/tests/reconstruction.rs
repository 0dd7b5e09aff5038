//! Track fitting and the full per-event chain.

use approx::assert_relative_eq;
use drifttrack_algorithms::{
    process_event, process_events, ClusteringAlgorithm, FitConfig, PipelineConfig, TrackFitter,
    TraversalOrder,
};
use drifttrack_core::{status, Event, FitState, Point3, Subdetector, Tracklet, TruthHit, Vector3};
use drifttrack_geometry::{
    GeometryDescription, PlaneDescription, StationDescription, SubdetectorDescription, View,
    WireGeometryIndex,
};

const STT_PATH: &str = "sand_inner_volume/STTtracker";
const STATION_Z: [f64; 4] = [0.0, 200.0, 400.0, 600.0];

fn straight_tracklets(slope_x: f64, slope_y: f64) -> Vec<Tracklet> {
    STATION_Z
        .iter()
        .map(|&z| {
            Tracklet::new(
                Point3::new(1.0 + slope_x * z, -2.0 + slope_y * z, z),
                Vector3::repeat(0.1),
                Vector3::new(slope_x, slope_y, 1.0),
                Vector3::repeat(1e-3),
            )
        })
        .collect()
}

/// Tracklets on a circle of radius `r` in the z–y plane, starting at the
/// origin along +z and bending towards +y.
fn circle_tracklets(r: f64) -> Vec<Tracklet> {
    (0..5)
        .map(|i| {
            let z = 500.0 * f64::from(i);
            let y = r - (r * r - z * z).sqrt();
            let sin = z / r;
            Tracklet::new(
                Point3::new(0.0, y, z),
                Vector3::repeat(0.1),
                Vector3::new(0.0, sin, (1.0 - sin * sin).sqrt()),
                Vector3::repeat(1e-4),
            )
        })
        .collect()
}

#[test]
fn test_straight_tracklets() {
    let fitter = TrackFitter::new(FitConfig::default());
    let track = fitter.fit(0, &straight_tracklets(0.1, 0.05));

    assert!(track.linear_fit.status >= 0);
    assert!(track.linear_fit.chi2 < 1e-6);
    assert_eq!(track.linear_fit.ndf, 6);
    assert_relative_eq!(track.linear.a, 0.1, epsilon = 1e-9);
    assert_relative_eq!(track.linear.b, 1.0, epsilon = 1e-6);
    assert_relative_eq!(track.x0, 1.0, epsilon = 1e-6);

    // A straight line has no finite radius.
    assert_eq!(track.circular_fit.status, status::DEGENERATE);
    assert!(track.circular_fit.chi2.is_nan());
    assert!(track.circle.r.is_nan());
    assert_eq!(track.state, FitState::Failed);
}

#[test]
fn test_circle_tracklets() {
    let r = 5000.0;
    let fitter = TrackFitter::new(FitConfig::default());
    let track = fitter.fit(3, &circle_tracklets(r));

    assert!(track.circular_fit.is_valid(), "{:?}", track.circular_fit);
    assert_eq!(track.circular_fit.ndf, 7);
    assert_relative_eq!(track.circle.r, r, max_relative = 1e-2);
    assert_eq!(track.circle.helicity, 1);
    assert_relative_eq!(track.circle.yc, r, max_relative = 1e-2);
    assert!(track.circle.zc.abs() < 0.01 * r);
    assert!(track.y0.abs() < 1.0);

    // No bending in x: the linear stage converges too.
    assert!(track.linear_fit.is_valid());
    assert!(track.is_converged());
    assert_eq!(track.id, 3);
}

#[test]
fn test_curvature_threshold_is_absolute() {
    // κ = 1e-6 /mm is well above the default threshold: reported as curved.
    let tracklets = circle_tracklets(1e6);
    let track = TrackFitter::new(FitConfig::default()).fit(0, &tracklets);
    assert!(track.circular_fit.is_valid(), "{:?}", track.circular_fit);
    assert_relative_eq!(track.circle.r, 1e6, max_relative = 0.1);
    assert_eq!(track.circle.helicity, 1);

    let strict = TrackFitter::new(FitConfig::default().with_min_curvature(1e-5));
    let track = strict.fit(0, &tracklets);
    assert_eq!(track.circular_fit.status, status::DEGENERATE);
    assert!(track.circle.r.is_nan());
}

#[test]
fn test_bending_sign() {
    let mut tracklets = circle_tracklets(4000.0);
    for t in &mut tracklets {
        t.offset.y = -t.offset.y;
        t.direction.y = -t.direction.y;
    }
    let track = TrackFitter::new(FitConfig::default()).fit(0, &tracklets);
    assert!(track.circular_fit.is_valid());
    assert_eq!(track.circle.helicity, -1);
    assert_relative_eq!(track.circle.yc, -4000.0, max_relative = 1e-2);
}

#[test]
fn test_not_enough_tracklets() {
    let fitter = TrackFitter::new(FitConfig::default());
    let track = fitter.fit(0, &straight_tracklets(0.0, 0.0)[..1]);

    assert_eq!(track.linear_fit.status, status::NOT_ENOUGH_MEASUREMENTS);
    assert_eq!(track.circular_fit.status, status::NOT_ENOUGH_MEASUREMENTS);
    assert!(track.linear_fit.chi2.is_nan());
    assert!(track.circular_fit.chi2.is_nan());
    assert_eq!(track.state, FitState::Failed);
}

#[test]
fn test_looping_track() {
    // Three tracklets on a tight circle, then one beyond its apex.
    let r = 200.0;
    let mut tracklets: Vec<Tracklet> = [0.0, 100.0, 190.0]
        .iter()
        .map(|&z: &f64| {
            let sin = z / r;
            Tracklet::new(
                Point3::new(0.0, r - (r * r - z * z).sqrt(), z),
                Vector3::repeat(0.1),
                Vector3::new(0.0, sin, (1.0 - sin * sin).sqrt()),
                Vector3::repeat(1e-5),
            )
        })
        .collect();
    tracklets.push(Tracklet::new(
        Point3::new(0.0, 150.0, 250.0),
        Vector3::repeat(0.1),
        Vector3::new(0.0, 1.0, 0.1),
        Vector3::repeat(1e-5),
    ));

    let track = TrackFitter::new(FitConfig::default()).fit(0, &tracklets);
    assert!(track.circular_fit.status < 0);
    assert!(track.circular_fit.chi2.is_nan());
    // The linear stage is unaffected.
    assert!(track.linear_fit.status >= 0);
}

#[test]
fn test_traversal_order_does_not_change_line() {
    let tracklets = straight_tracklets(-0.2, 0.0);
    let mut reversed = tracklets.clone();
    reversed.reverse();

    let up = TrackFitter::new(FitConfig::default()).fit(0, &tracklets);
    let down = TrackFitter::new(FitConfig::default().with_order(TraversalOrder::DecreasingZ))
        .fit(0, &tracklets);
    let given = TrackFitter::new(FitConfig::default().with_order(TraversalOrder::AsGiven))
        .fit(0, &reversed);

    assert_relative_eq!(up.linear.a, down.linear.a, epsilon = 1e-9);
    assert_relative_eq!(up.linear.b, down.linear.b, epsilon = 1e-6);
    assert_relative_eq!(up.linear.a, given.linear.a, epsilon = 1e-9);
    assert_relative_eq!(down.z0, 600.0);
}

fn stt_geometry() -> WireGeometryIndex {
    let stations = STATION_Z
        .iter()
        .zip(0u16..)
        .map(|(&z, id)| StationDescription {
            id,
            planes: vec![
                PlaneDescription::regular(View::X, z, std::f64::consts::FRAC_PI_2, 5.0, 200, 2000.0)
                    .with_radius(2.5),
                PlaneDescription::regular(View::Y, z + 10.0, 0.0, 5.0, 200, 2000.0)
                    .with_radius(2.5)
                    .with_channel_offset(1000),
            ],
        })
        .collect();
    let desc = GeometryDescription {
        subdetectors: vec![SubdetectorDescription {
            path: STT_PATH.into(),
            kind: Subdetector::Stt,
            stations,
        }],
    };
    WireGeometryIndex::new(&desc, STT_PATH).unwrap()
}

/// Deposits of a straight track through every plane of [`stt_geometry`].
///
/// Tracks used below cross each plane well inside one straw.
fn track_hits(
    first_id: u32,
    trajectory: i32,
    origin: Point3<f64>,
    slope: (f64, f64),
) -> Vec<TruthHit> {
    let at = |z: f64| Point3::new(origin.x + slope.0 * z, origin.y + slope.1 * z, z);
    STATION_Z
        .iter()
        .flat_map(|&z| [z, z + 10.0])
        .zip(first_id..)
        .map(|(zp, id)| {
            let (z0, z1) = (zp - 2.4, zp + 2.4);
            TruthHit::new(id, at(z0), at(z1), z0 / 300.0, z1 / 300.0, 0.002)
                .with_provenance(trajectory, trajectory)
        })
        .collect()
}

#[test]
fn test_event_chain() {
    let geometry = stt_geometry();
    let hits = track_hits(0, 1, Point3::new(12.0, -7.0, 0.0), (0.1, 0.05));
    let event = Event::new(4, hits);
    let output = process_event(&event, &geometry, &PipelineConfig::default()).unwrap();

    assert_eq!(output.event_id, 4);
    assert_eq!(output.signals.len(), 8);
    assert_eq!(output.assignment.hits_seen, 8);
    assert_eq!(output.assignment.skipped_outside + output.assignment.skipped_multi_plane, 0);
    assert_eq!(output.clusters.len(), 8);
    assert_eq!(output.clustering.unclustered_signals, 0);

    assert_eq!(output.tracks.len(), 1);
    let track = &output.tracks[0];
    assert!(track.linear_fit.status >= 0, "{:?}", track.linear_fit);
    assert!((track.linear.a - 0.1).abs() < 0.02);
    assert_relative_eq!(track.x0, 12.5, epsilon = 1e-6);
    assert!(track.truth.len() >= 8);
}

#[test]
fn test_parallel_matches_serial() {
    let geometry = stt_geometry();
    let events: Vec<Event> = (0..6u32)
        .map(|i| {
            let origin = Point3::new(-297.5 + 20.0 * f64::from(i), 1.0, 0.0);
            let mut hits = track_hits(0, 1, origin, (0.05, 0.0));
            hits.extend(track_hits(
                100,
                2,
                Point3::new(302.5, 102.5, 0.0),
                (-0.1, 0.1),
            ));
            Event::new(u64::from(i), hits)
        })
        .collect();
    let config = PipelineConfig {
        algorithm: ClusteringAlgorithm::Neighbourhood,
        ..PipelineConfig::default()
    };

    let parallel = process_events(&events, &geometry, &config).unwrap();
    assert_eq!(parallel.len(), events.len());
    for (event, out) in events.iter().zip(&parallel) {
        let serial = process_event(event, &geometry, &config).unwrap();
        assert_eq!(out.event_id, event.id);
        assert_eq!(out.tracks.len(), 2);
        assert_eq!(serial.signals.len(), out.signals.len());
        for ((_, a), (_, b)) in serial.signals.iter().zip(out.signals.iter()) {
            assert_eq!(a.tdc.to_bits(), b.tdc.to_bits());
        }
    }
}

#[test]
fn test_invalid_config_is_fatal() {
    let geometry = stt_geometry();
    let mut config = PipelineConfig::default();
    config.digitization.drift_velocity = -1.0;
    assert!(process_events(&[Event::new(0, Vec::new())], &geometry, &config).is_err());
}
