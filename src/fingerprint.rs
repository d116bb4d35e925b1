use crate::errors::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// A content fingerprint of a file as it was loaded.
///
/// `FileSet::save` compares the file on disk against the fingerprint taken
/// at load time and refuses to overwrite a file that was changed by someone
/// else in the meantime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// The size of the file in bytes.
    pub size: u64,
    /// SHA-256 of the contents, hex encoded.
    pub hash: String,
}

impl Fingerprint {
    /// Fingerprints bytes that were already read into memory.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            size: bytes.len() as u64,
            hash: format!("{:x}", hasher.finalize()),
        }
    }

    /// Computes the fingerprint of a file on disk.
    pub fn of_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut hasher = Sha256::new();

        // Read in chunks for large files
        let mut buffer = [0; 8192];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Self {
            size,
            hash: format!("{:x}", hasher.finalize()),
        })
    }

    /// Returns `true` if the file at `path` still has this fingerprint.
    pub fn matches_file(&self, path: &Path) -> Result<bool> {
        // Quick check: size
        if path.metadata()?.len() != self.size {
            return Ok(false);
        }
        Ok(Self::of_file(path)?.hash == self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_and_bytes_agree() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Hello, World!").unwrap();
        file.flush().unwrap();

        let from_file = Fingerprint::of_file(file.path()).unwrap();
        assert_eq!(from_file, Fingerprint::of_bytes(b"Hello, World!"));
        assert!(from_file.matches_file(file.path()).unwrap());
    }

    #[test]
    fn test_content_change_is_detected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Hello, World!").unwrap();
        file.flush().unwrap();
        let fp = Fingerprint::of_file(file.path()).unwrap();

        // Same size, different bytes
        std::fs::write(file.path(), b"Hello, Earth!").unwrap();
        assert!(!fp.matches_file(file.path()).unwrap());

        std::fs::write(file.path(), b"Hello").unwrap();
        assert!(!fp.matches_file(file.path()).unwrap());
    }
}
