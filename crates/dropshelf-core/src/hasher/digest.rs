use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Streaming BLAKE3 digest of a file, lowercase hex.
///
/// Reads in fixed-size chunks so memory use does not grow with the file.
pub fn hash_file(file: &Path) -> io::Result<String> {
    let mut f = File::open(file)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let bytes_read = match f.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// [`hash_file`] on the blocking pool.
pub async fn hash_file_async(file: PathBuf) -> io::Result<String> {
    tokio::task::spawn_blocking(move || hash_file(&file))
        .await
        .map_err(io::Error::other)?
}

pub fn hash_data(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}
