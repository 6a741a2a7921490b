use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryState {
    /// Emitted to the orchestrator, no acknowledgement yet.
    InFlight,
    /// Import failed. The path stays suppressed while the file exists.
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub state: RegistryState,
    pub since: DateTime<Utc>,
}

/// Paths already surfaced as discoveries.
#[derive(Debug)]
pub struct ProcessedRegistry {
    entries: HashMap<PathBuf, RegistryEntry>,
    soft_cap: usize,
}

impl ProcessedRegistry {
    pub fn new(soft_cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            soft_cap,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn insert(&mut self, path: PathBuf) {
        self.entries.insert(
            path,
            RegistryEntry {
                state: RegistryState::InFlight,
                since: Utc::now(),
            },
        );
        if self.entries.len() > self.soft_cap {
            warn!(
                "Processed registry holds {} paths (soft cap {})",
                self.entries.len(),
                self.soft_cap
            );
        }
    }

    /// Successful import: forget the path so a new file there can be picked up.
    pub fn mark_processed(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    /// Failed import: keep the path, recording why.
    pub fn mark_failed(&mut self, path: &Path, error: impl Into<String>) {
        let entry = RegistryEntry {
            state: RegistryState::Failed {
                error: error.into(),
            },
            since: Utc::now(),
        };
        self.entries.insert(path.to_path_buf(), entry);
    }

    /// Clear all failed entries so they are rediscovered on a later poll.
    pub fn retry_failed(&mut self) -> Vec<PathBuf> {
        let failed: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|(_, e)| matches!(e.state, RegistryState::Failed { .. }))
            .map(|(p, _)| p.clone())
            .collect();
        for path in &failed {
            self.entries.remove(path);
        }
        failed
    }

    /// Drop entries whose file no longer exists, then release spare capacity.
    pub fn sweep_missing(&mut self, exists: impl Fn(&Path) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| exists(path));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Swept {} vanished paths from registry", removed);
        }
        if self.entries.capacity() > 4 * self.entries.len().max(16) {
            self.entries.shrink_to_fit();
        }
        removed
    }

    pub fn get(&self, path: &Path) -> Option<&RegistryEntry> {
        self.entries.get(path)
    }

    pub fn failed_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e.state, RegistryState::Failed { .. }))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_path_stays_until_swept() {
        let mut registry = ProcessedRegistry::new(100);
        let path = PathBuf::from("/drop/old.mobi");
        registry.insert(path.clone());
        registry.mark_failed(&path, "MOBI文件未启用自动转换");
        assert!(registry.contains(&path));
        assert_eq!(registry.failed_count(), 1);

        // Still on disk: kept
        assert_eq!(registry.sweep_missing(|_| true), 0);
        assert!(registry.contains(&path));

        // Gone from disk: dropped
        assert_eq!(registry.sweep_missing(|_| false), 1);
        assert!(!registry.contains(&path));
    }

    #[test]
    fn test_processed_path_is_forgotten() {
        let mut registry = ProcessedRegistry::new(100);
        let path = PathBuf::from("/drop/book.epub");
        registry.insert(path.clone());
        assert!(registry.mark_processed(&path));
        assert!(registry.is_empty());
        assert!(!registry.mark_processed(&path));
    }

    #[test]
    fn test_retry_failed_only_clears_failures() {
        let mut registry = ProcessedRegistry::new(100);
        let failed = PathBuf::from("/drop/a.mobi");
        let in_flight = PathBuf::from("/drop/b.epub");
        registry.insert(failed.clone());
        registry.insert(in_flight.clone());
        registry.mark_failed(&failed, "boom");

        let cleared = registry.retry_failed();
        assert_eq!(cleared, vec![failed.clone()]);
        assert!(!registry.contains(&failed));
        assert!(registry.contains(&in_flight));
    }
}
