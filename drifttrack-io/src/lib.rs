//! drifttrack-io: Event input and result output for drifttrack.
//!
//! Events and configuration are read from JSON; signals, clusters and
//! tracks are written as CSV.
//!

mod error;
mod reader;
mod writer;

pub use error::{Error, Result};
pub use reader::{load_geometry, parse_events, read_events, read_pipeline_config};
pub use writer::CsvWriter;
