#[cfg(target_os = "windows")]
pub mod windows;

use std::path::{Path, PathBuf};
use tracing::debug;

/// Install locations searched for an external tool before falling back to `PATH`.
pub fn tool_candidates(tool: &str) -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        windows::tool_candidates(tool)
    }
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from(format!("/Applications/calibre.app/Contents/MacOS/{}", tool)),
            PathBuf::from(format!("/opt/homebrew/bin/{}", tool)),
            PathBuf::from(format!("/usr/local/bin/{}", tool)),
        ]
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        vec![
            PathBuf::from(format!("/usr/bin/{}", tool)),
            PathBuf::from(format!("/usr/local/bin/{}", tool)),
            PathBuf::from(format!("/opt/calibre/{}", tool)),
        ]
    }
}

/// Resolve a tool: explicit override, then the platform search list, then `PATH`.
pub fn resolve_tool(tool: &str, override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        debug!("Configured path {} for {} does not exist", path.display(), tool);
    }

    if let Some(found) = tool_candidates(tool).into_iter().find(|p| p.is_file()) {
        return Some(found);
    }

    which::which(tool).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_override_wins_when_present() {
        let tmp = tempdir().unwrap();
        let fake = tmp.path().join("ebook-convert");
        std::fs::write(&fake, b"#!/bin/sh\n").unwrap();
        assert_eq!(resolve_tool("ebook-convert", Some(&fake)), Some(fake));
    }

    #[test]
    fn test_unknown_tool_resolves_to_none() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("nope");
        assert_eq!(
            resolve_tool("dropshelf-no-such-tool-xyz", Some(&missing)),
            None
        );
    }
}
