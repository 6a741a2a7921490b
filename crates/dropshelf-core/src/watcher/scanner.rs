use chrono::Utc;
use glob::Pattern;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, warn};

use super::registry::ProcessedRegistry;
use super::stability::{Observation, StabilityTracker};
use super::DetectedFile;
use crate::config::WatchConfig;

/// Recursive poller over the watched root. Owns the stability and registry state.
#[derive(Debug)]
pub struct DirectoryScanner {
    root: PathBuf,
    extensions: Vec<String>,
    ignore_patterns: Vec<Pattern>,
    tracker: StabilityTracker,
    registry: ProcessedRegistry,
}

impl DirectoryScanner {
    pub fn new(config: &WatchConfig) -> Self {
        let ignore_patterns: Vec<Pattern> = config
            .ignore_patterns
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();

        Self {
            root: config.dir.clone(),
            extensions: config.normalized_extensions(),
            ignore_patterns,
            tracker: StabilityTracker::new(config.stable_duration()),
            registry: ProcessedRegistry::new(config.max_registry_entries),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// One poll. Returns the files that became stable since the previous poll,
    /// each of them exactly once.
    pub fn scan(&mut self, now: Instant) -> Vec<DetectedFile> {
        let candidates = self.walk();

        self.registry.sweep_missing(|p| p.exists());
        let seen: HashSet<PathBuf> = candidates.iter().map(|(p, _)| p.clone()).collect();
        self.tracker.retain_seen(&seen);

        let mut detected = Vec::new();
        for (path, size) in candidates {
            if self.registry.contains(&path) {
                continue;
            }
            match self.tracker.observe(&path, size, now) {
                Observation::Stable => {
                    self.registry.insert(path.clone());
                    detected.push(DetectedFile::new(path, size, Utc::now()));
                }
                Observation::Changed => {
                    debug!("{} changed size ({} bytes), waiting", path.display(), size);
                }
                Observation::Settling => {}
            }
        }
        detected
    }

    /// Every eligible file currently present, ignoring stability and the registry.
    pub fn list_candidates(&self) -> Vec<DetectedFile> {
        let now = Utc::now();
        self.walk()
            .into_iter()
            .map(|(path, size)| DetectedFile::new(path, size, now))
            .collect()
    }

    pub fn registry(&self) -> &ProcessedRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProcessedRegistry {
        &mut self.registry
    }

    pub fn tracker(&self) -> &StabilityTracker {
        &self.tracker
    }

    fn walk(&self) -> Vec<(PathBuf, u64)> {
        let mut found = Vec::new();
        if !self.root.is_dir() {
            warn!("Watched directory {} does not exist", self.root.display());
            return found;
        }
        self.visit_dirs(&self.root, &mut found);
        found.sort();
        found
    }

    fn visit_dirs(&self, dir: &Path, found: &mut Vec<(PathBuf, u64)>) {
        if self.is_ignored(dir) {
            return;
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                if err.kind() == io::ErrorKind::PermissionDenied {
                    error!("Access denied reading directory {}: {}", dir.display(), err);
                } else {
                    error!("Error reading directory {}: {}", dir.display(), err);
                }
                return;
            }
        };

        for entry_result in entries {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(err) => {
                    error!("Error reading entry in directory {}: {}", dir.display(), err);
                    continue;
                }
            };

            let path = entry.path();
            if is_hidden(&path) {
                continue;
            }

            // symlink_metadata so links are neither followed nor imported
            let metadata = match fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(err) => {
                    debug!("Error getting metadata for {}: {}", path.display(), err);
                    continue;
                }
            };

            if metadata.is_dir() {
                self.visit_dirs(&path, found);
            } else if metadata.is_file()
                && metadata.len() > 0
                && self.is_allowed(&path)
                && !self.is_ignored(&path)
            {
                found.push((path, metadata.len()));
            }
        }
    }

    fn is_allowed(&self, path: &Path) -> bool {
        match extension_of(path) {
            Some(ext) => self.extensions.iter().any(|allowed| *allowed == ext),
            None => false,
        }
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }
}

/// Lowercase, dot-qualified extension of a path.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn scanner_for(root: &Path) -> DirectoryScanner {
        let mut config = WatchConfig::new(root);
        config.stable_duration_ms = 3_000;
        config.ignore_patterns = vec!["*/skip/*".to_string()];
        DirectoryScanner::new(&config)
    }

    #[test]
    fn test_filters_by_extension_hidden_and_empty() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("a.epub"), b"epub").unwrap();
        fs::write(root.join("B.TXT"), b"text").unwrap();
        fs::write(root.join("notes.docx"), b"docx").unwrap();
        fs::write(root.join(".partial.epub"), b"hidden").unwrap();
        fs::write(root.join("empty.pdf"), b"").unwrap();
        fs::create_dir_all(root.join("nested/deeper")).unwrap();
        fs::write(root.join("nested/deeper/c.mobi"), b"mobi").unwrap();
        fs::create_dir_all(root.join("skip")).unwrap();
        fs::write(root.join("skip/d.epub"), b"skipped").unwrap();

        let scanner = scanner_for(root);
        let names: Vec<String> = scanner
            .list_candidates()
            .into_iter()
            .map(|f| f.file_name)
            .collect();
        assert_eq!(names.len(), 3, "got {:?}", names);
        assert!(names.contains(&"a.epub".to_string()));
        assert!(names.contains(&"B.TXT".to_string()));
        assert!(names.contains(&"c.mobi".to_string()));
    }

    #[test]
    fn test_stable_file_emitted_exactly_once() {
        let tmp = tempdir().unwrap();
        let book = tmp.path().join("book.epub");
        fs::write(&book, b"content").unwrap();

        let mut scanner = scanner_for(tmp.path());
        let t0 = Instant::now();
        assert!(scanner.scan(t0).is_empty());
        assert!(scanner.scan(t0 + Duration::from_secs(1)).is_empty());

        let detected = scanner.scan(t0 + Duration::from_secs(5));
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].path, book);
        assert_eq!(detected[0].extension, ".epub");
        assert_eq!(detected[0].file_size_bytes, 7);

        assert!(scanner.scan(t0 + Duration::from_secs(10)).is_empty());
        assert!(scanner.scan(t0 + Duration::from_secs(15)).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_does_not_hide_siblings() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempdir().unwrap();
        let root = tmp.path();
        let locked = root.join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("hidden.epub"), b"inside").unwrap();
        fs::create_dir_all(root.join("open")).unwrap();
        fs::write(root.join("open/visible.epub"), b"outside").unwrap();
        fs::write(root.join("top.pdf"), b"top").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let names: Vec<String> = scanner_for(root)
            .list_candidates()
            .into_iter()
            .map(|f| f.file_name)
            .collect();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(names.contains(&"visible.epub".to_string()), "got {:?}", names);
        assert!(names.contains(&"top.pdf".to_string()), "got {:?}", names);
    }

    #[test]
    fn test_failed_path_reappearing_is_detected_again() {
        let tmp = tempdir().unwrap();
        let book = tmp.path().join("retry.mobi");
        fs::write(&book, b"first copy").unwrap();

        let mut scanner = scanner_for(tmp.path());
        let t0 = Instant::now();
        scanner.scan(t0);
        assert_eq!(scanner.scan(t0 + Duration::from_secs(5)).len(), 1);
        scanner.registry_mut().mark_failed(&book, "conversion failed");

        // Still present: suppressed
        assert!(scanner.scan(t0 + Duration::from_secs(10)).is_empty());
        assert!(scanner.scan(t0 + Duration::from_secs(20)).is_empty());

        fs::remove_file(&book).unwrap();
        assert!(scanner.scan(t0 + Duration::from_secs(25)).is_empty());
        assert!(!scanner.registry().contains(&book));

        fs::write(&book, b"second copy").unwrap();
        let mut detections = Vec::new();
        for step in 6..12u64 {
            detections.extend(scanner.scan(t0 + Duration::from_secs(5 * step)));
        }
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].path, book);
        assert_eq!(detections[0].file_size_bytes, 11);
    }

    #[test]
    fn test_vanished_root_clears_pending_entries() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("ok.epub"), b"ok").unwrap();
        let mut scanner = scanner_for(tmp.path());
        let t0 = Instant::now();
        scanner.scan(t0);
        assert_eq!(scanner.tracker().len(), 1);
        drop(tmp);
        assert!(scanner.scan(t0 + Duration::from_secs(5)).is_empty());
        assert_eq!(scanner.tracker().len(), 0);
    }
}
