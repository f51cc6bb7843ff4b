//! Flatten image layers into a single filesystem tar stream.
//!
//! Layers are walked top-down so the first occurrence of a path wins.
//! Whiteouts (`.wh.<name>`) delete `<name>` from lower layers and opaque
//! markers (`.wh..wh..opq`) hide everything lower layers put in their
//! directory. Markers only affect layers below the one that carries them.
//! A path written as a file or link hides everything lower layers put
//! beneath it.

use std::collections::HashSet;
use std::io::Write;

use ccert_core::error::{CertError, Result};
use tar::{Archive, Builder, EntryType};
use tokio_util::sync::CancellationToken;

use super::image::LayerBlob;
use super::layers::open_uncompressed;

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_MARKER: &str = ".wh..wh..opq";

#[derive(Default)]
struct Tombstones {
    seen: HashSet<String>,
    /// Written paths that are not directories.
    non_dirs: HashSet<String>,
    whiteouts: HashSet<String>,
    opaque: HashSet<String>,
}

impl Tombstones {
    /// Whether a lower-layer path is hidden by an upper layer.
    fn hides(&self, path: &str) -> bool {
        if self.seen.contains(path) || self.whiteouts.contains(path) {
            return true;
        }
        ancestors(path).any(|dir| {
            self.whiteouts.contains(dir) || self.opaque.contains(dir) || self.non_dirs.contains(dir)
        })
    }
}

/// Proper ancestor directories of a normalized path, nearest first.
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut current = path;
    std::iter::from_fn(move || {
        let (parent, _) = current.rsplit_once('/')?;
        current = parent;
        Some(parent)
    })
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_start_matches("./").trim_start_matches('/');
    trimmed.trim_end_matches('/').to_string()
}

fn split_name(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((dir, base)) => (dir, base),
        None => ("", path),
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Write the flattened filesystem of `layers` (base first) to `out` as tar.
pub fn export_layers<W: Write>(
    layers: &[LayerBlob],
    out: W,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut builder = Builder::new(out);
    builder.follow_symlinks(false);
    let mut state = Tombstones::default();

    for layer in layers.iter().rev() {
        tracing::trace!(digest = %layer.digest, "Flattening layer");
        let mut archive = Archive::new(open_uncompressed(layer)?);
        let mut layer_whiteouts = Vec::new();
        let mut layer_opaque = Vec::new();

        let entries = archive.entries().map_err(|e| export_error(layer, e))?;
        for entry in entries {
            if cancel.is_cancelled() {
                return Err(CertError::Cancelled("filesystem export".to_string()));
            }
            let mut entry = entry.map_err(|e| export_error(layer, e))?;
            let entry_type = entry.header().entry_type();
            if matches!(
                entry_type,
                EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName | EntryType::GNULongLink
            ) {
                continue;
            }

            let raw_path = entry.path().map_err(|e| export_error(layer, e))?;
            let path = normalize(&raw_path.to_string_lossy());
            if path.is_empty() || path == "." {
                continue;
            }

            let (dir, base) = split_name(&path);
            if base == OPAQUE_MARKER {
                layer_opaque.push(dir.to_string());
                continue;
            }
            if let Some(target) = base.strip_prefix(WHITEOUT_PREFIX) {
                layer_whiteouts.push(join(dir, target));
                continue;
            }
            if state.hides(&path) {
                continue;
            }

            let mut header = entry.header().clone();
            match entry_type {
                EntryType::Symlink | EntryType::Link => {
                    let target = entry
                        .link_name()
                        .map_err(|e| export_error(layer, e))?
                        .map(|t| t.into_owned())
                        .unwrap_or_default();
                    builder
                        .append_link(&mut header, &path, &target)
                        .map_err(|e| export_error(layer, e))?;
                }
                _ => {
                    builder
                        .append_data(&mut header, &path, &mut entry)
                        .map_err(|e| export_error(layer, e))?;
                }
            }
            if entry_type != EntryType::Directory {
                state.non_dirs.insert(path.clone());
            }
            state.seen.insert(path);
        }

        state.whiteouts.extend(layer_whiteouts);
        state.opaque.extend(layer_opaque);
    }

    builder
        .into_inner()
        .and_then(|mut out| out.flush())
        .map_err(|e| CertError::ExtractionError(format!("Failed to finish filesystem export: {}", e)))
}

fn export_error(layer: &LayerBlob, err: std::io::Error) -> CertError {
    CertError::ExtractionError(format!(
        "Failed to export layer {}: {}",
        layer.digest, err
    ))
}
