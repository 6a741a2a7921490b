use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const PUBLIC_DIR: &str = "public";

/// `{destination_root}/public/{book_id}`
pub fn book_dir(destination_root: &Path, book_id: &str) -> PathBuf {
    destination_root.join(PUBLIC_DIR).join(book_id)
}

/// Copy `source` to `{book_dir}/book{extension}`, creating the directory.
pub async fn place_book(source: &Path, book_dir: &Path, extension: &str) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(book_dir).await?;
    let dest = book_dir.join(format!("book{}", extension));
    let bytes = tokio::fs::copy(source, &dest).await?;
    debug!("Placed {} bytes at {}", bytes, dest.display());
    Ok(dest)
}

/// `path` relative to the destination root with `/` separators.
pub fn relative_url(destination_root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(destination_root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Best-effort removal of a file. Missing files are not an error.
pub async fn remove_file_logged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

/// Best-effort removal of a directory tree.
pub async fn remove_dir_logged(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}
