//! CSV writers for reconstruction output.

use crate::Result;
use drifttrack_algorithms::EventOutput;
use drifttrack_core::{SignalId, TruthLink};
use log::debug;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writer for per-event reconstruction output.
///
/// Each `write_*_csv` call writes a header followed by one row per record of
/// every event. Truth links are written as `;`-separated hit ids.
pub struct CsvWriter {
    writer: BufWriter<File>,
}

impl CsvWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes signals as CSV.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_signals_csv(&mut self, outputs: &[EventOutput]) -> Result<()> {
        writeln!(
            self.writer,
            "event,signal,subdetector,link,channel,wire,tdc,adc,earliest,latest,hit_time,drift_time,propagation_time,hits"
        )?;

        let mut rows = 0usize;
        for out in outputs {
            for (id, s) in out.signals.iter() {
                writeln!(
                    self.writer,
                    "{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
                    out.event_id,
                    id.0,
                    s.channel.subdetector,
                    s.channel.link,
                    s.channel.channel,
                    s.wire.0,
                    s.tdc,
                    s.adc,
                    s.time_range.earliest,
                    s.time_range.latest,
                    s.timing.hit_time,
                    s.timing.drift_time,
                    s.timing.propagation_time,
                    join_truth(&s.truth)
                )?;
                rows += 1;
            }
        }

        self.writer.flush()?;
        debug!("Wrote {rows} signal rows");
        Ok(())
    }

    /// Writes clusters as CSV, members as `;`-separated signal handles.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_clusters_csv(&mut self, outputs: &[EventOutput]) -> Result<()> {
        writeln!(
            self.writer,
            "event,cluster,size,earliest_tdc,total_adc,signals,hits"
        )?;

        for out in outputs {
            for (i, c) in out.clusters.iter().enumerate() {
                writeln!(
                    self.writer,
                    "{},{},{},{},{},{},{}",
                    out.event_id,
                    i,
                    c.len(),
                    c.earliest_tdc(&out.signals).unwrap_or(f64::NAN),
                    c.total_adc(&out.signals),
                    join_signals(&c.signals),
                    join_truth(&c.truth)
                )?;
            }
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes tracks as CSV.
    ///
    /// Failed stages appear with their negative status and a `NaN` chi².
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_tracks_csv(&mut self, outputs: &[EventOutput]) -> Result<()> {
        writeln!(
            self.writer,
            "event,track,a,b,zc,yc,r,helicity,x0,y0,z0,t0,linear_status,linear_chi2,linear_ndf,circular_status,circular_chi2,circular_ndf,converged,hits"
        )?;

        for out in outputs {
            for t in &out.tracks {
                writeln!(
                    self.writer,
                    "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
                    out.event_id,
                    t.id,
                    t.linear.a,
                    t.linear.b,
                    t.circle.zc,
                    t.circle.yc,
                    t.circle.r,
                    t.circle.helicity,
                    t.x0,
                    t.y0,
                    t.z0,
                    t.t0,
                    t.linear_fit.status,
                    t.linear_fit.chi2,
                    t.linear_fit.ndf,
                    t.circular_fit.status,
                    t.circular_fit.chi2,
                    t.circular_fit.ndf,
                    u8::from(t.is_converged()),
                    join_truth(&t.truth)
                )?;
            }
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn join_truth(truth: &TruthLink) -> String {
    truth
        .hits()
        .iter()
        .map(|h| h.0.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

fn join_signals(ids: &[SignalId]) -> String {
    ids.iter()
        .map(|id| id.0.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use drifttrack_core::{
        status, ChannelId, CircleParams, Cluster, ClusteringStatistics, FitState, HitId,
        LineParams, Signal, SignalArena, SignalTiming, StageFit, Subdetector, TimeRange, Track,
        WireId,
    };
    use tempfile::NamedTempFile;

    fn output() -> EventOutput {
        let mut signals = SignalArena::new();
        let truth: TruthLink = [HitId(2), HitId(5)].into_iter().collect();
        let a = signals.push(Signal {
            channel: ChannelId::new(Subdetector::Stt, 1, 17),
            wire: WireId(40),
            tdc: 12.5,
            adc: 0.25,
            time_range: TimeRange {
                earliest: -187.5,
                nominal: 12.5,
                latest: 17.5,
            },
            timing: SignalTiming {
                hit_time: 2.0,
                drift_time: 10.0,
                propagation_time: 0.5,
            },
            truth,
        });
        let clusters = vec![Cluster::from_ids([a], &signals)];
        let clustering = ClusteringStatistics::from_clusters(&signals, &clusters);
        let track = Track {
            id: 0,
            linear: LineParams { a: 0.1, b: -2.0 },
            circle: CircleParams::INVALID,
            x0: -2.0,
            y0: 1.0,
            z0: 0.0,
            t0: 12.5,
            linear_fit: StageFit::converged(3, 0.5, 4),
            circular_fit: StageFit::failed(status::DEGENERATE),
            state: FitState::Failed,
            truth: clusters[0].truth.clone(),
        };
        EventOutput {
            event_id: 9,
            signals,
            clusters,
            tracks: vec![track],
            assignment: Default::default(),
            clustering,
        }
    }

    #[test]
    fn test_write_signals_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = CsvWriter::create(file.path()).unwrap();
        writer.write_signals_csv(&[output()]).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("event,signal,subdetector"));
        assert_eq!(lines[1], "9,0,STT,1,17,40,12.5,0.25,-187.5,17.5,2,10,0.5,2;5");
    }

    #[test]
    fn test_write_clusters_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = CsvWriter::create(file.path()).unwrap();
        writer.write_clusters_csv(&[output()]).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("event,cluster,size"));
        assert!(content.contains("9,0,1,12.5,0.25,0,2;5"));
    }

    #[test]
    fn test_write_tracks_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = CsvWriter::create(file.path()).unwrap();
        writer.write_tracks_csv(&[output()]).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let row = content.lines().nth(1).unwrap();
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields.len(), 20);
        assert_eq!(fields[2], "0.1");
        assert_eq!(fields[12], "3");
        assert_eq!(fields[15], "-4");
        assert_eq!(fields[16], "NaN");
        assert_eq!(fields[18], "0");
        assert_eq!(fields[19], "2;5");
    }
}
