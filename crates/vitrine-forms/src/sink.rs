//! Problem report persistence.
//!
//! Completed reports are appended to a CSV file, one row per report.
//! The header row is written only when the file is new or empty, so the
//! file stays loadable by spreadsheet tools at any point in its life.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;
use vitrine_core::error::{Result, VitrineError};
use vitrine_core::types::ProblemReport;

const HEADER: [&str; 4] = ["name", "contact", "problem", "submitted_at"];

// ============================================================================
// Sink Trait
// ============================================================================

/// Destination for completed problem reports.
///
/// One report maps to exactly one append. Implementations must not
/// deduplicate, buffer, or retry on their own.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persist one report.
    async fn append(&self, report: &ProblemReport) -> Result<()>;
}

// ============================================================================
// CSV Sink
// ============================================================================

/// CSV-backed report sink.
pub struct CsvReportSink {
    path: PathBuf,
}

impl CsvReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_row(&self, report: &ProblemReport) -> Result<()> {
        // Decide on the header before opening in append mode.
        let needs_header = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    VitrineError::Persistence(format!(
                        "Failed to create report directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                VitrineError::Persistence(format!(
                    "Failed to open report file {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        let mut writer = csv::Writer::from_writer(file);
        if needs_header {
            writer.write_record(HEADER).map_err(|e| {
                VitrineError::Persistence(format!("Failed to write report header: {}", e))
            })?;
        }
        writer
            .write_record([
                report.name.as_str(),
                report.contact.as_str(),
                report.problem.as_str(),
                report.submitted_at.format_human().as_str(),
            ])
            .map_err(|e| {
                VitrineError::Persistence(format!("Failed to write report row: {}", e))
            })?;
        writer
            .flush()
            .map_err(|e| VitrineError::Persistence(format!("Failed to flush report file: {}", e)))
    }
}

#[async_trait]
impl ReportSink for CsvReportSink {
    async fn append(&self, report: &ProblemReport) -> Result<()> {
        self.write_row(report)?;
        info!(path = %self.path.display(), "Problem report persisted");
        Ok(())
    }
}

// ============================================================================
// Memory Sink
// ============================================================================

/// In-memory sink for tests and dry runs.
///
/// Records every appended report and can be switched into a failing
/// mode to exercise persistence error paths.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<ProblemReport>>,
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent appends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of everything appended so far.
    pub fn reports(&self) -> Vec<ProblemReport> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn append(&self, report: &ProblemReport) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(VitrineError::Persistence(
                "Memory sink set to fail".to_string(),
            ));
        }
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
