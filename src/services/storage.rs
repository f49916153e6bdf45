use std::io;
use std::path::{Path, PathBuf};

/// Uploaded documents on disk, one directory per category key.
#[derive(Debug, Clone)]
pub struct DocumentStorage {
    root: PathBuf,
}

/// Keeps a key or filename to a single path component.
fn component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

impl DocumentStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DocumentStorage { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, categoria: &str, archivo: &str) -> PathBuf {
        self.root.join(component(categoria)).join(component(archivo))
    }

    /// Writes the bytes beside their final location under a unique hidden name.
    /// Nothing at `path_for(categoria, archivo)` changes until [`commit`](Self::commit).
    pub fn stage(&self, categoria: &str, archivo: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let dir = self.root.join(component(categoria));
        std::fs::create_dir_all(&dir)?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = dir.join(format!(".{}.{}.part", id, component(archivo)));
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Moves a staged document to its final path, replacing whatever was there.
    pub fn commit(&self, staged: &Path, categoria: &str, archivo: &str) -> io::Result<PathBuf> {
        let path = self.path_for(categoria, archivo);
        std::fs::rename(staged, &path)?;
        Ok(path)
    }

    pub fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    /// A document that is already gone counts as removed.
    pub fn remove(&self, path: &Path) -> io::Result<()> {
        match std::fs::remove_file(path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}
