#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

/// Byte storage backing image records. References are opaque to the store; the file system
/// implementation uses the key itself.
pub trait BlobStore: Send + std::fmt::Debug {
    fn put(&self, key: &str, bytes: &[u8]) -> std::io::Result<String>;
    fn delete(&self, reference: &str) -> std::io::Result<()>;
}

#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, reference: &str) -> PathBuf {
        self.root.join(reference)
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> std::io::Result<String> {
        validate_key(key)?;
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        Ok(key.to_string())
    }

    fn delete(&self, reference: &str) -> std::io::Result<()> {
        validate_key(reference)?;
        std::fs::remove_file(self.path_for(reference))
    }
}

fn validate_key(key: &str) -> std::io::Result<()> {
    let invalid = key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key == "."
        || key == "..";
    if invalid {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "blob key must be a plain file name",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(label: &str) -> PathBuf {
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "soi-blobs-{label}-{}-{nonce}",
            std::process::id()
        ))
    }

    #[test]
    fn put_creates_missing_directories_and_delete_removes() {
        let store = FsBlobStore::new(temp_root("roundtrip").join("nested"));
        let reference = store.put("img_1_10.png", b"png").expect("put");
        assert_eq!(reference, "img_1_10.png");
        assert_eq!(std::fs::read(store.path_for(&reference)).expect("read"), b"png");

        store.delete(&reference).expect("delete");
        assert!(!store.path_for(&reference).exists());
        let err = store.delete(&reference).expect_err("second delete");
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn keys_cannot_escape_the_root() {
        let store = FsBlobStore::new(temp_root("escape"));
        for key in ["", "..", "../x.png", "a/b.png"] {
            let err = store.put(key, b"x").expect_err("key must be rejected");
            assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        }
    }
}
