use std::env;
use std::path::PathBuf;

pub fn tool_candidates(tool: &str) -> Vec<PathBuf> {
    let exe = format!("{}.exe", tool);
    let mut roots: Vec<PathBuf> = ["ProgramFiles", "ProgramFiles(x86)"]
        .iter()
        .filter_map(|var| env::var_os(var).map(PathBuf::from))
        .collect();
    if roots.is_empty() {
        roots.push(PathBuf::from(r"C:\Program Files"));
        roots.push(PathBuf::from(r"C:\Program Files (x86)"));
    }

    let mut candidates = Vec::new();
    for root in roots {
        candidates.push(root.join("Calibre2").join(&exe));
        candidates.push(root.join("Calibre").join(&exe));
        candidates.push(root.join("poppler").join("bin").join(&exe));
    }
    candidates
}
