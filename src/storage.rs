// ABOUTME: Output directory layout with atomic whole-file writes
// ABOUTME: Resolves per-table artifact paths and the schema side file

use crate::Result;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

pub const SCHEMA_FILE: &str = "_schema.json";

#[derive(Debug, Clone)]
pub struct OutputDir {
    pub root: PathBuf,
}

impl OutputDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        OutputDir { root: root.into() }
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn schema_path(&self) -> PathBuf {
        self.root.join(SCHEMA_FILE)
    }

    /// `<root>/<table>.<extension>`. Path separators in the table name
    /// become `_` so every artifact stays directly under the root.
    pub fn table_path(&self, table: &str, extension: &str) -> PathBuf {
        let stem = table.replace(['/', '\\'], "_");
        self.root.join(format!("{}.{}", stem, extension))
    }
}

/// Writes `content` to a temp file beside `path`, then renames it over `path`.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let random: u32 = rand::thread_rng().gen();
    let tmp_path = parent.join(format!(".{:x}.part", random));

    fs::write(&tmp_path, content)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(())
}

/// Deletes `path`, treating an already missing file as success.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
