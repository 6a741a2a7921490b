use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityEntry {
    pub last_size: u64,
    pub last_change: Instant,
}

/// Outcome of observing one file during a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First sighting, or the size moved since the previous poll.
    Changed,
    /// Same size as before but not for long enough yet.
    Settling,
    /// Size unchanged for at least the stability window. The entry has been dropped.
    Stable,
}

/// Tracks file sizes across polls to decide when a write has completed.
#[derive(Debug)]
pub struct StabilityTracker {
    stable_duration: Duration,
    entries: HashMap<PathBuf, StabilityEntry>,
}

impl StabilityTracker {
    pub fn new(stable_duration: Duration) -> Self {
        Self {
            stable_duration,
            entries: HashMap::new(),
        }
    }

    pub fn observe(&mut self, path: &Path, size: u64, now: Instant) -> Observation {
        match self.entries.get_mut(path) {
            Some(entry) if entry.last_size == size => {
                if now.saturating_duration_since(entry.last_change) >= self.stable_duration {
                    self.entries.remove(path);
                    Observation::Stable
                } else {
                    Observation::Settling
                }
            }
            Some(entry) => {
                entry.last_size = size;
                entry.last_change = now;
                Observation::Changed
            }
            None => {
                self.entries.insert(
                    path.to_path_buf(),
                    StabilityEntry {
                        last_size: size,
                        last_change: now,
                    },
                );
                Observation::Changed
            }
        }
    }

    /// Drop entries for paths that were not seen during the latest scan.
    pub fn retain_seen(&mut self, seen: &HashSet<PathBuf>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| seen.contains(path));
        before - self.entries.len()
    }

    pub fn get(&self, path: &Path) -> Option<&StabilityEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
