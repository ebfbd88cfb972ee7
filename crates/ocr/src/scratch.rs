use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// SHA-256 of an in-memory byte slice.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Lowercase hex encoding of a 32-byte digest (64 chars).
pub fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// A downloaded input that lives only as long as one pipeline invocation.
/// The file is removed when the value is dropped, whatever the outcome.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Write `data` into `dir` as `<digest prefix>-<sequence>.<ext>`.
    ///
    /// The sequence number keeps two concurrent invocations with identical
    /// bytes from sharing (and deleting) one file.
    pub fn persist(dir: &Path, data: &[u8], ext: &str) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let hex = to_hex(&sha256_bytes(data));
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("{}-{seq}.{ext}", &hex[..16]));
        std::fs::write(&path, data)?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "scratch file written");
        Ok(Self { path })
    }

    /// Take ownership of a file something else already wrote.
    pub fn adopt(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "scratch file removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not remove scratch file")
            }
        }
    }
}
