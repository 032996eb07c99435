//! packdeploy - pack extraction and deferred-file installation engine
//!
//! Reads the binary pack streams bundled inside an installer archive and
//! materializes their files into a target directory: conditional
//! inclusion, overwrite policies, deferred moves for in-use files,
//! back-references into previously extracted packs, repacked-jar
//! reconstruction and loose source-directory files. Extraction is
//! cooperative: a shared gate lets the surrounding UI interrupt a run
//! between chunks.

pub mod error;
pub mod metadata;
pub mod pack;
pub mod paths;
pub mod resources;
pub mod uninstall;
pub mod unpacker;
pub mod variables;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Result, UnpackError};
pub use unpacker::{CancellationGate, PlatformCapabilities, UnpackConfig, Unpacker};
