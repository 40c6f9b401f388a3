//! Staging of loose files, zipped folders and an optional README into a
//! temporary directory that [`crate::synchronise::push_folder`] can walk.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::{CoreError, Result};

/// A temporary directory removed on drop.
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        debug!(path = %dir.path().display(), "Created staging directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Copies a single file into the staging root, keeping only its file name.
    pub fn add_file(&self, source: &Path) -> Result<PathBuf> {
        let name = source.file_name().ok_or_else(|| {
            CoreError::Validation(format!("{} has no file name", source.display()))
        })?;
        let dest = self.path().join(name);
        if dest.exists() {
            warn!(
                source = %source.display(),
                staged = %dest.display(),
                "Loose file replaces a file already staged under the same name"
            );
        }
        fs::copy(source, &dest)?;
        Ok(dest)
    }

    /// Copies a directory tree into the staging root, preserving its layout.
    pub fn add_dir(&self, source: &Path) -> Result<usize> {
        let mut copied = 0;
        for entry in walkdir::WalkDir::new(source).min_depth(1) {
            let entry = entry.map_err(|e| CoreError::Io(io::Error::other(e.to_string())))?;
            let rel = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| CoreError::Custom(e.to_string()))?;
            let dest = self.path().join(rel);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest)?;
            } else if entry.path().is_file() {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &dest)?;
                copied += 1;
            }
        }
        Ok(copied)
    }

    /// Extracts a zip archive into the staging root.
    pub fn add_zip(&self, archive: &Path) -> Result<usize> {
        stage_zip(archive, self.path())
    }

    pub fn write_readme(&self, text: &str) -> Result<PathBuf> {
        write_readme(self.path(), text)
    }

    /// Number of regular files currently staged.
    pub fn file_count(&self) -> usize {
        walkdir::WalkDir::new(self.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count()
    }
}

/// Extracts every entry of `archive` below `dest`. Entries whose names would
/// land outside `dest` are rejected.
pub fn stage_zip(archive: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;
    let mut extracted = 0;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(rel) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            warn!(name = %entry.name(), "Rejected zip entry outside the target directory");
            return Err(CoreError::Validation(format!(
                "Zip entry {} escapes the extraction directory",
                entry.name()
            )));
        };
        let out_path = dest.join(rel);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
        extracted += 1;
    }

    info!(archive = %archive.display(), files = extracted, "Extracted zip archive");
    Ok(extracted)
}

pub fn write_readme(dir: &Path, text: &str) -> Result<PathBuf> {
    let path = dir.join("README.md");
    fs::write(&path, text)?;
    Ok(path)
}
