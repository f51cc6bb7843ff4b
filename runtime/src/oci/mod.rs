//! OCI image acquisition and filesystem expansion.
//!
//! ```text
//! ┌──────────────┐   OCI layout    ┌──────────┐  tar   ┌───────────┐
//! │ RegistryPuller│ ─────────────▶ │ OciImage │ ─────▶ │ extractor │ ─▶ rootfs/
//! └──────────────┘  blobs/sha256   └──────────┘ export └───────────┘
//! ```

pub mod credentials;
pub mod export;
pub mod extract;
mod image;
pub mod layers;
pub mod reference;
pub mod registry;

pub use credentials::{RegistryAuth, RegistryCredentials};
pub use export::export_layers;
pub use extract::{extract_archive, resolve_in_root, ExtractSummary};
pub use image::{LayerBlob, OciImage};
pub use layers::{open_uncompressed, uncompressed_size};
pub use reference::ImageReference;
pub use registry::{ImageFetcher, Platform, RegistryPuller, RETRY_DELAY};
