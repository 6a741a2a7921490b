mod digest;

pub use digest::{hash_data, hash_file, hash_file_async};

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_streamed_hash_matches_in_memory_hash() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("big.bin");
        // Larger than the read buffer so several chunks are fed
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::File::create(&path).unwrap().write_all(&data).unwrap();

        let streamed = hash_file(&path).unwrap();
        assert_eq!(streamed, hash_data(&data));
        assert_eq!(streamed.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        assert_ne!(hash_data(b"book one"), hash_data(b"book two"));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let tmp = tempdir().unwrap();
        let err = hash_file_async(tmp.path().join("gone.epub")).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
