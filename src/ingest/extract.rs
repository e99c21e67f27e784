//! Flat extraction of downloaded bundles.
//!
//! GDC bundles nest every file under a per-file-id directory. Extraction
//! collapses that structure into one directory. Two entries sharing a file
//! name in different subfolders would overwrite one another, so a collision
//! is renamed to `<stem>__<parent>.<ext>` (then `<stem>__<parent>_<n>.<ext>`)
//! and logged. The prefix and extension survive, so a renamed file still
//! matches the merge pattern.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;

use crate::ingest::error::{IngestError, IngestResult};

/// Outcome of a flat extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// File names written into the target directory, in archive order.
    pub files: Vec<String>,
    /// `(original, renamed)` pairs for entries whose name collided.
    pub renamed: Vec<(String, String)>,
}

/// Tracks names already placed in the flat directory during one extraction.
#[derive(Default)]
struct FlatNamer {
    taken: HashSet<String>,
}

impl FlatNamer {
    /// Claim a unique flat name for `name`, found under `parent`.
    fn claim(&mut self, parent: Option<&str>, name: &str) -> String {
        if self.taken.insert(name.to_string()) {
            return name.to_string();
        }
        let parent = parent.filter(|p| !p.is_empty()).unwrap_or("dup");
        let mut candidate = tagged_name(name, parent);
        let mut n = 2;
        while !self.taken.insert(candidate.clone()) {
            candidate = tagged_name(name, &format!("{parent}_{n}"));
            n += 1;
        }
        candidate
    }
}

/// `clinical.tsv` + `b2` → `clinical__b2.tsv`. Names without an extension
/// get the tag appended.
fn tagged_name(name: &str, tag: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}__{tag}.{ext}"),
        _ => format!("{name}__{tag}"),
    }
}

fn is_tar(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".tar")
}

fn is_gzip(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".gz") || name.ends_with(".tgz")
}

/// Expand `archive` into `dest` with no subdirectories.
///
/// A download that is not a tar archive (the endpoint returns a bare file when
/// only one id is requested) is copied into `dest` unchanged.
pub fn extract_flat(archive: &Path, dest: &Path) -> IngestResult<ExtractReport> {
    std::fs::create_dir_all(dest).map_err(|e| IngestError::io(dest, e))?;

    if !is_tar(archive) {
        let name = archive
            .file_name()
            .ok_or_else(|| IngestError::Extract {
                archive: archive.display().to_string(),
                message: "download has no file name".into(),
            })?
            .to_string_lossy()
            .into_owned();
        let target = dest.join(&name);
        std::fs::copy(archive, &target).map_err(|e| IngestError::io(&target, e))?;
        return Ok(ExtractReport {
            files: vec![name],
            renamed: Vec::new(),
        });
    }

    let file = File::open(archive).map_err(|e| IngestError::io(archive, e))?;
    let reader: Box<dyn Read> = if is_gzip(archive) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    unpack_entries(tar::Archive::new(reader), archive, dest)
}

/// Replace `dest` with the contents of `archive`.
///
/// The archive is expanded into a staging directory next to `dest`, which is
/// swapped in only once extraction succeeded. Files left in `dest` by an
/// earlier download never survive into the new one, and a failed extraction
/// leaves `dest` untouched.
pub fn extract_fresh(archive: &Path, dest: &Path) -> IngestResult<ExtractReport> {
    let staging = staging_dir(dest);
    if staging.exists() {
        std::fs::remove_dir_all(&staging).map_err(|e| IngestError::io(&staging, e))?;
    }
    let report = match extract_flat(archive, &staging) {
        Ok(report) => report,
        Err(e) => {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }
    };

    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|e| IngestError::io(dest, e))?;
    }
    std::fs::rename(&staging, dest).map_err(|e| IngestError::io(dest, e))?;
    tracing::debug!(dest = %dest.display(), "replaced clinical directory");
    Ok(report)
}

/// `<parent>/.<name>.staging` next to `dest`.
fn staging_dir(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "extract".into());
    dest.with_file_name(format!(".{name}.staging"))
}

fn unpack_entries<R: Read>(
    mut tar: tar::Archive<R>,
    archive: &Path,
    dest: &Path,
) -> IngestResult<ExtractReport> {
    let extract_err = |message: String| IngestError::Extract {
        archive: archive.display().to_string(),
        message,
    };

    let mut namer = FlatNamer::default();
    let mut report = ExtractReport::default();

    let entries = tar.entries().map_err(|e| extract_err(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| extract_err(e.to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let entry_path = entry
            .path()
            .map_err(|e| extract_err(e.to_string()))?
            .into_owned();
        check_relative(&entry_path)?;

        let Some(name) = entry_path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let parent = entry_path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|p| p.to_str());
        let flat = namer.claim(parent, name);
        if flat != name {
            tracing::warn!(
                entry = %entry_path.display(),
                renamed = %flat,
                "flattened file name collides, renaming"
            );
            report.renamed.push((name.to_string(), flat.clone()));
        }

        let target = dest.join(&flat);
        entry
            .unpack(&target)
            .map_err(|e| extract_err(format!("unpack {}: {e}", entry_path.display())))?;
        report.files.push(flat);
    }

    tracing::info!(
        archive = %archive.display(),
        files = report.files.len(),
        renamed = report.renamed.len(),
        "bundle extracted"
    );
    Ok(report)
}

fn check_relative(path: &Path) -> IngestResult<()> {
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(IngestError::UnsafeEntry {
            entry: path.display().to_string(),
        });
    }
    Ok(())
}

/// Move every file nested below `dir` up into `dir` itself, then prune the
/// emptied subdirectories. Used when the clinical directory was populated by
/// hand instead of by [`extract_flat`]. Collisions are renamed the same way.
pub fn flatten_dir(dir: &Path) -> IngestResult<ExtractReport> {
    let mut namer = FlatNamer::default();
    let mut report = ExtractReport::default();

    let mut top_level = Vec::new();
    let mut nested = Vec::new();
    let mut subdirs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| IngestError::io(dir, e))? {
        let path = entry.map_err(|e| IngestError::io(dir, e))?.path();
        if path.is_dir() {
            collect_files(&path, &mut nested)?;
            subdirs.push(path);
        } else {
            top_level.push(path);
        }
    }
    top_level.sort();
    nested.sort();

    // Files already at the top level keep their names.
    for path in &top_level {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            namer.claim(None, name);
        }
    }

    for path in nested {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let parent = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|p| p.to_str());
        let flat = namer.claim(parent, name);
        if flat != name {
            tracing::warn!(file = %path.display(), renamed = %flat, "name collision while flattening");
            report.renamed.push((name.to_string(), flat.clone()));
        }
        let target = dir.join(&flat);
        std::fs::rename(&path, &target).map_err(|e| IngestError::io(&target, e))?;
        report.files.push(flat);
    }

    for sub in subdirs {
        std::fs::remove_dir_all(&sub).map_err(|e| IngestError::io(&sub, e))?;
    }
    Ok(report)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> IngestResult<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| IngestError::io(dir, e))? {
        let path = entry.map_err(|e| IngestError::io(dir, e))?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
