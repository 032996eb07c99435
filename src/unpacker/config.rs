//! Unpack configuration
//!
//! Explicit context passed to the orchestrator constructor: install target,
//! loose-file source directory and platform capabilities. No ambient global
//! state is consulted.

use std::path::PathBuf;

/// What the current platform needs from this engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformCapabilities {
    /// Whether in-use targets must be replaced through the deferred-move
    /// queue. Only Windows needs this; everywhere else blockable handling
    /// degrades to the direct write path.
    pub deferred_file_queue: bool,
}

impl PlatformCapabilities {
    /// Capabilities of the platform this binary was built for.
    pub fn detect() -> Self {
        PlatformCapabilities {
            deferred_file_queue: cfg!(windows),
        }
    }
}

/// Configuration for one installation run.
#[derive(Debug, Clone)]
pub struct UnpackConfig {
    /// Installation target directory; created if missing.
    pub install_dir: PathBuf,

    /// Directory loose-file payloads are resolved against.
    pub source_dir: PathBuf,

    pub capabilities: PlatformCapabilities,
}

impl UnpackConfig {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        let install_dir = install_dir.into();
        let source_dir = install_dir
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        UnpackConfig {
            install_dir,
            source_dir,
            capabilities: PlatformCapabilities::detect(),
        }
    }

    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = dir.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.install_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyInstallDir);
        }
        if self.source_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptySourceDir);
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("install directory is not set")]
    EmptyInstallDir,

    #[error("source directory is not set")]
    EmptySourceDir,
}
