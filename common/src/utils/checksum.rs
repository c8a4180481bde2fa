//! MD5 content checksums. The hex digest announced with a transfer request
//! is authoritative for end-to-end integrity.

use std::io;
use std::path::Path;

use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

/// Compute the MD5 hex digest of a file, streaming so large payloads never
/// sit in memory.
pub async fn file_checksum(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// MD5 hex digest of an in-memory buffer.
pub fn data_checksum(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Whether two hex digests match.
pub fn verify(expected: &str, actual: &str) -> bool {
    expected == actual
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn known_vectors() {
        assert_eq!(data_checksum(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(data_checksum(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            data_checksum(b"hello world"),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[tokio::test]
    async fn file_digest_matches_buffer_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&data)
            .unwrap();

        let from_file = file_checksum(&path).await.unwrap();
        assert_eq!(from_file, data_checksum(&data));
        assert!(verify(&from_file, &data_checksum(&data)));
    }

    #[tokio::test]
    async fn empty_file_has_the_empty_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::File::create(&path).unwrap();
        assert_eq!(
            file_checksum(&path).await.unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }
}
