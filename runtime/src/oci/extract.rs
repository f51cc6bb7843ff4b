//! Tar stream extraction into a destination root.
//!
//! Layer content is attacker-influenceable, so every entry is resolved
//! against the root before anything touches the disk: absolute names, `..`
//! components and parents that are symlinks leading out of the root fail
//! the whole extraction. Symlinks themselves are created best-effort.

use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use ccert_core::error::{CertError, Result};
use tar::{Archive, Entry, EntryType};
use tokio_util::sync::CancellationToken;

/// Counts of what an extraction produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
    pub hardlinks: usize,
    pub skipped: usize,
}

/// Extract a tar stream under `root`.
///
/// The reader is drained to EOF after the end-of-archive marker so a
/// producer on the other end of a pipe never blocks on a full buffer.
pub fn extract_archive<R: Read>(
    reader: R,
    root: &Path,
    cancel: &CancellationToken,
) -> Result<ExtractSummary> {
    fs::create_dir_all(root)?;
    let root = fs::canonicalize(root)?;
    let mut summary = ExtractSummary::default();
    let mut archive = Archive::new(reader);

    {
        let entries = archive
            .entries()
            .map_err(|e| CertError::ExtractionError(format!("Failed to read archive: {}", e)))?;
        for entry in entries {
            if cancel.is_cancelled() {
                return Err(CertError::Cancelled("filesystem extraction".to_string()));
            }
            let mut entry = entry.map_err(|e| {
                CertError::ExtractionError(format!("Failed to read archive entry: {}", e))
            })?;
            extract_entry(&mut entry, &root, &mut summary)?;
        }
    }

    let mut rest = archive.into_inner();
    io::copy(&mut rest, &mut io::sink())
        .map_err(|e| CertError::ExtractionError(format!("Failed to drain archive stream: {}", e)))?;

    tracing::debug!(
        root = %root.display(),
        files = summary.files,
        directories = summary.directories,
        symlinks = summary.symlinks,
        skipped = summary.skipped,
        "Extracted filesystem"
    );
    Ok(summary)
}

fn extract_entry<R: Read>(
    entry: &mut Entry<'_, R>,
    root: &Path,
    summary: &mut ExtractSummary,
) -> Result<()> {
    let raw = entry
        .path()
        .map_err(|e| CertError::ExtractionError(format!("Invalid entry name: {}", e)))?
        .into_owned();
    let relative = confine(&raw)?;
    if relative.as_os_str().is_empty() {
        return Ok(());
    }
    create_parents(root, &relative)?;
    let target = root.join(&relative);
    let mode = entry.header().mode().unwrap_or(0o644);

    match entry.header().entry_type() {
        EntryType::Directory => {
            match fs::symlink_metadata(&target) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => {
                    fs::remove_file(&target)?;
                    fs::create_dir(&target)?;
                }
                Err(_) => fs::create_dir(&target)?,
            }
            fs::set_permissions(&target, fs::Permissions::from_mode(mode | 0o700))?;
            summary.directories += 1;
        }
        EntryType::Regular | EntryType::Continuous => {
            remove_existing(&target)?;
            let mut file = fs::File::create(&target)?;
            io::copy(entry, &mut file).map_err(|e| {
                CertError::ExtractionError(format!("Failed to write {}: {}", raw.display(), e))
            })?;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode | 0o600))?;
            summary.files += 1;
        }
        EntryType::Symlink => {
            let link = link_target(entry)?;
            let created = remove_existing(&target)
                .and_then(|_| std::os::unix::fs::symlink(&link, &target).map_err(Into::into));
            match created {
                Ok(()) => summary.symlinks += 1,
                Err(e) => {
                    tracing::warn!(path = %raw.display(), target = %link.display(), error = %e, "Skipping symlink");
                    summary.skipped += 1;
                }
            }
        }
        EntryType::Link => {
            let link = link_target(entry)?;
            match hard_link(root, &link, &target) {
                Ok(()) => summary.hardlinks += 1,
                Err(e) => {
                    tracing::warn!(path = %raw.display(), target = %link.display(), error = %e, "Skipping hard link");
                    summary.skipped += 1;
                }
            }
        }
        other => {
            tracing::debug!(path = %raw.display(), entry_type = ?other, "Skipping unsupported entry type");
            summary.skipped += 1;
        }
    }
    Ok(())
}

/// Reduce an entry name to a path relative to the root, refusing anything
/// that could resolve outside of it.
fn confine(path: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(CertError::PathTraversal(path.display().to_string()));
            }
        }
    }
    Ok(out)
}

/// Symlinks followed by [`resolve_in_root`] before giving up.
const MAX_SYMLINK_HOPS: usize = 40;

/// Resolve `relative` inside an extracted filesystem the way the image
/// would: `root` acts as `/` for absolute link targets and `..` never
/// climbs above it. Components that do not exist are kept as-is, so the
/// result may not exist.
pub fn resolve_in_root(root: &Path, relative: &Path) -> Result<PathBuf> {
    let mut resolved = PathBuf::new();
    let mut pending: Vec<PathBuf> = relative.components().rev().map(|c| PathBuf::from(c.as_os_str())).collect();
    let mut hops = 0usize;

    while let Some(part) = pending.pop() {
        match Path::new(&part).components().next() {
            Some(Component::Normal(name)) => {
                let candidate = root.join(&resolved).join(name);
                match fs::symlink_metadata(&candidate) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        hops += 1;
                        if hops > MAX_SYMLINK_HOPS {
                            return Err(CertError::ExtractionError(format!(
                                "Too many levels of symbolic links resolving {}",
                                relative.display()
                            )));
                        }
                        let target = fs::read_link(&candidate)?;
                        if target.is_absolute() {
                            resolved.clear();
                        }
                        pending.extend(target.components().rev().map(|c| PathBuf::from(c.as_os_str())));
                    }
                    _ => resolved.push(name),
                }
            }
            Some(Component::ParentDir) => {
                resolved.pop();
            }
            _ => {}
        }
    }
    Ok(root.join(resolved))
}

/// Create the parent directories of `relative` one component at a time,
/// refusing to pass through a symlink that resolves outside the root.
fn create_parents(root: &Path, relative: &Path) -> Result<()> {
    let Some(parent) = relative.parent() else {
        return Ok(());
    };
    let mut current = root.to_path_buf();
    for component in parent.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let resolved = fs::canonicalize(&current).map_err(|_| {
                    CertError::PathTraversal(relative.display().to_string())
                })?;
                if !resolved.starts_with(root) || !resolved.is_dir() {
                    return Err(CertError::PathTraversal(relative.display().to_string()));
                }
            }
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(CertError::ExtractionError(format!(
                    "Parent of {} is not a directory",
                    relative.display()
                )));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir(&current)?,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Remove a non-directory at `target` so it can be replaced.
fn remove_existing(target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => Err(CertError::ExtractionError(format!(
            "{} already exists as a directory",
            target.display()
        ))),
        Ok(_) => Ok(fs::remove_file(target)?),
        Err(_) => Ok(()),
    }
}

fn link_target<R: Read>(entry: &Entry<'_, R>) -> Result<PathBuf> {
    entry
        .link_name()
        .map_err(|e| CertError::ExtractionError(format!("Invalid link name: {}", e)))?
        .map(|l| l.into_owned())
        .ok_or_else(|| CertError::ExtractionError("Link entry without a target".to_string()))
}

fn hard_link(root: &Path, link: &Path, target: &Path) -> Result<()> {
    let source = root.join(confine(link)?);
    let resolved = fs::canonicalize(&source)?;
    if !resolved.starts_with(root) {
        return Err(CertError::PathTraversal(link.display().to_string()));
    }
    remove_existing(target)?;
    fs::hard_link(&resolved, target)?;
    Ok(())
}
