#![deny(unused)]
//! Bundle asset loading for Playgate.
//!
//! Resources of packaged modules are resolved through a [`BundleSource`],
//! checked against the ceilings of the bundle's tier, then decoded by
//! category.

pub mod decode;
pub mod loader;
pub mod path;
pub mod source;

pub use decode::{AudioContainer, FontFormat, ModelFormat, Resource};
pub use loader::{AssetLoader, PreloadOutcome};
pub use path::normalize_bundle_path;
pub use source::{BundleSource, DirectoryBundle, InMemoryBundle};
