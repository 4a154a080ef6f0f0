//! Physical file storage: a flat upload directory addressed by random
//! storage keys. A display name never reveals its blob.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::Rng;

#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open (or create) the upload directory at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).context("create upload directory")?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generate a storage key: 16 random bytes as hex, keeping the original
    /// extension when it is a short alphanumeric suffix.
    pub fn generate_key(display_name: &str) -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill(&mut bytes);
        let mut key = hex::encode(bytes);
        if let Some(ext) = sanitized_extension(display_name) {
            key.push('.');
            key.push_str(&ext);
        }
        key
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.path(key).is_file()
    }

    pub async fn create(&self, key: &str) -> io::Result<tokio::fs::File> {
        tokio::fs::File::create(self.path(key)).await
    }

    /// Remove a blob. A missing blob is not an error.
    pub fn remove(&self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path(key)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

fn sanitized_extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    if !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn keys_keep_a_clean_extension() {
        let key = BlobStore::generate_key("Quarterly Report.PDF");
        assert!(key.ends_with(".pdf"));
        assert_eq!(key.len(), 32 + 4);
    }

    #[test]
    fn keys_drop_suspect_extensions() {
        assert_eq!(BlobStore::generate_key("no-extension").len(), 32);
        assert_eq!(BlobStore::generate_key("weird.e x t").len(), 32);
        assert_eq!(
            BlobStore::generate_key("dots.everywhere.reallylongext").len(),
            32
        );
    }

    #[test]
    fn keys_are_not_derived_from_names() {
        let a = BlobStore::generate_key("same.txt");
        let b = BlobStore::generate_key("same.txt");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn create_exists_remove() {
        let dir = tempdir().unwrap();
        let blobs = BlobStore::open(dir.path().join("uploads")).unwrap();

        let key = BlobStore::generate_key("note.txt");
        assert!(!blobs.exists(&key));

        use tokio::io::AsyncWriteExt;
        let mut f = blobs.create(&key).await.unwrap();
        f.write_all(b"hello").await.unwrap();
        f.flush().await.unwrap();
        assert!(blobs.exists(&key));

        blobs.remove(&key).unwrap();
        assert!(!blobs.exists(&key));
        // Removing twice is fine.
        blobs.remove(&key).unwrap();
    }
}
