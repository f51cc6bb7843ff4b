//! Layer blob decompression.
//!
//! Layers arrive gzip-compressed or as plain tar. The media type decides,
//! with the gzip magic bytes as a fallback for registries that mislabel blobs.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};

use ccert_core::error::{CertError, Result};
use flate2::read::GzDecoder;

use super::image::LayerBlob;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open a layer blob as an uncompressed tar stream.
pub fn open_uncompressed(layer: &LayerBlob) -> Result<Box<dyn Read + Send>> {
    if layer.media_type.ends_with("+zstd") {
        return Err(CertError::OciImageError(format!(
            "Unsupported layer compression for {}: {}",
            layer.digest, layer.media_type
        )));
    }

    let file = File::open(&layer.path).map_err(|e| {
        CertError::OciImageError(format!(
            "Failed to open layer {} at {}: {}",
            layer.digest,
            layer.path.display(),
            e
        ))
    })?;
    let mut reader = BufReader::new(file);

    let gzip = layer.media_type.ends_with("gzip") || {
        let head = reader.fill_buf()?;
        head.starts_with(&GZIP_MAGIC)
    };

    if gzip {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Count the uncompressed bytes of a layer by reading and discarding its stream.
pub fn uncompressed_size(layer: &LayerBlob) -> Result<u64> {
    let mut reader = open_uncompressed(layer)?;
    std::io::copy(&mut reader, &mut std::io::sink()).map_err(|e| {
        CertError::OciImageError(format!(
            "Could not read uncompressed layer {}: {}",
            layer.digest, e
        ))
    })
}
