//! Archive facade
//!
//! Packs a set of files and directories into one byte blob before package
//! encryption, and unpacks it after decryption. The package cipher treats the
//! blob as opaque, so any [`Archive`] implementation can be plugged in.

use crate::error::{Error, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Converts between files on disk and a single byte blob
pub trait Archive {
    /// Pack `paths` (files or directories) into one blob
    fn pack(&self, paths: &[PathBuf]) -> Result<Vec<u8>>;

    /// Unpack a blob into `destination`, returning the files written
    fn unpack(&self, bytes: &[u8], destination: &Path) -> Result<Vec<PathBuf>>;
}

const ARCHIVE_VERSION: u32 = 1;

/// One file inside an archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Relative path with `/` separators
    pub path: String,
    /// File contents
    pub data: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    entries: Vec<ArchiveEntry>,
}

/// bincode-encoded list of entries
///
/// Directories are stored with their own name as the first path component;
/// plain files are stored under their file name.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundleArchive;

impl BundleArchive {
    pub fn new() -> Self {
        BundleArchive
    }

    /// Collect entries for `paths` without serializing them
    pub fn entries(&self, paths: &[PathBuf]) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::new();
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::Archive(format!("{:?} has no file name", path)))?;

            let metadata = fs::metadata(path)?;
            if metadata.is_dir() {
                collect_dir(path, &name, &mut entries)?;
            } else if metadata.is_file() {
                entries.push(ArchiveEntry {
                    path: name,
                    data: fs::read(path)?,
                });
            } else {
                return Err(Error::Archive(format!("{:?} is not a file or directory", path)));
            }
        }

        let mut seen = BTreeSet::new();
        for entry in &entries {
            if !seen.insert(entry.path.as_str()) {
                return Err(Error::Archive(format!("duplicate entry {}", entry.path)));
            }
        }
        Ok(entries)
    }
}

fn collect_dir(dir: &Path, prefix: &str, entries: &mut Vec<ArchiveEntry>) -> Result<()> {
    let mut children: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    children.sort_by_key(|c| c.file_name());

    for child in children {
        let name = format!("{}/{}", prefix, child.file_name().to_string_lossy());
        let path = child.path();
        let metadata = fs::metadata(&path)?;

        if metadata.is_dir() {
            collect_dir(&path, &name, entries)?;
        } else if metadata.is_file() {
            entries.push(ArchiveEntry {
                path: name,
                data: fs::read(&path)?,
            });
        }
    }
    Ok(())
}

/// Map an entry path onto `destination`, rejecting anything that escapes it
fn entry_destination(destination: &Path, entry: &str) -> Result<PathBuf> {
    let relative = Path::new(entry);
    let escapes = entry.is_empty()
        || entry.contains('\\')
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(Error::Archive(format!("unsafe entry path {:?}", entry)));
    }
    Ok(destination.join(relative))
}

impl Archive for BundleArchive {
    fn pack(&self, paths: &[PathBuf]) -> Result<Vec<u8>> {
        let entries = self.entries(paths)?;
        debug!(entries = entries.len(), "Packing archive");

        let manifest = Manifest {
            version: ARCHIVE_VERSION,
            entries,
        };
        Ok(bincode::DefaultOptions::new().serialize(&manifest)?)
    }

    fn unpack(&self, bytes: &[u8], destination: &Path) -> Result<Vec<PathBuf>> {
        let manifest: Manifest = bincode::DefaultOptions::new()
            .with_limit(bytes.len() as u64)
            .deserialize(bytes)
            .map_err(|e| Error::Archive(format!("not a valid archive: {}", e)))?;

        if manifest.version != ARCHIVE_VERSION {
            return Err(Error::Archive(format!(
                "unsupported archive version {}",
                manifest.version
            )));
        }

        // Validate every entry before touching the filesystem
        let mut targets = Vec::with_capacity(manifest.entries.len());
        let mut seen = BTreeSet::new();
        for entry in &manifest.entries {
            let target = entry_destination(destination, &entry.path)?;
            if !seen.insert(entry.path.as_str()) {
                return Err(Error::Archive(format!("duplicate entry {}", entry.path)));
            }
            if target.exists() {
                return Err(Error::Archive(format!(
                    "refusing to overwrite existing {:?}",
                    target
                )));
            }
            targets.push(target);
        }

        let mut written = Vec::with_capacity(targets.len());
        for (entry, target) in manifest.entries.iter().zip(targets) {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &entry.data)?;
            written.push(target);
        }

        debug!(files = written.len(), ?destination, "Unpacked archive");
        Ok(written)
    }
}
