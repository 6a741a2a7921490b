use crate::import::{ImportResult, ImportStage};
use crate::watcher::DetectedFile;

/// Trait for reporting import progress.
///
/// The CLI implements it with indicatif spinners. Imports run concurrently, so
/// calls for different files interleave. All methods have default no-op
/// implementations.
pub trait ImportReporter: Send + Sync {
    fn on_import_start(&self, _file: &DetectedFile) {}
    fn on_stage(&self, _file: &DetectedFile, _stage: ImportStage) {}
    fn on_import_complete(&self, _file: &DetectedFile, _result: &ImportResult) {}
}

/// No-op reporter for silent operation.
pub struct SilentReporter;

impl ImportReporter for SilentReporter {}
