//! Vitrine forms crate - problem report collection and persistence.

pub mod sink;

pub use sink::{CsvReportSink, MemorySink, ReportSink};
