//! Installation metadata
//!
//! One JSON file per install target directory recording the installed
//! packs, the final resolved variable set and any uninstall-stage
//! executables. On upgrade installs the prior pack list is merged
//! (appended) before rewriting, so the uninstaller sees every pack ever
//! installed at this location.

use crate::error::{Result, UnpackError};
use crate::pack::{ExecutableFile, SelectedPack};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Metadata file name under the install root.
pub const METADATA_NAME: &str = ".installinfo.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationRecord {
    pub installed_at: DateTime<Utc>,
    pub packs: Vec<SelectedPack>,
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub uninstall_executables: Vec<ExecutableFile>,
}

/// Load the metadata of a prior installation at this target, if any. An
/// unreadable file is treated as absent (with a warning): a broken record
/// must not block a fresh install over the same directory.
pub fn load(install_dir: &Path) -> Option<InstallationRecord> {
    let path = install_dir.join(METADATA_NAME);
    let bytes = std::fs::read(&path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("ignoring unreadable metadata {}: {e}", path.display());
            None
        }
    }
}

/// Persist the installation metadata, merging any prior record's pack list.
pub fn store(
    install_dir: &Path,
    packs: &[SelectedPack],
    variables: BTreeMap<String, String>,
    uninstall_executables: Vec<ExecutableFile>,
) -> Result<PathBuf> {
    let mut merged_packs = Vec::new();
    if let Some(prior) = load(install_dir) {
        merged_packs.extend(prior.packs);
    }
    merged_packs.extend_from_slice(packs);

    let record = InstallationRecord {
        installed_at: Utc::now(),
        packs: merged_packs,
        variables,
        uninstall_executables,
    };
    let path = install_dir.join(METADATA_NAME);
    let json = serde_json::to_vec_pretty(&record)
        .map_err(|e| UnpackError::Config(format!("serializing metadata: {e}")))?;
    std::fs::write(&path, json).map_err(|e| UnpackError::fs(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::SelectedPack;

    #[test]
    fn test_store_and_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let vars = BTreeMap::from([("INSTALL_PATH".to_string(), "/opt/app".to_string())]);
        store(
            tmp.path(),
            &[SelectedPack::named("core")],
            vars.clone(),
            Vec::new(),
        )
        .unwrap();

        let record = load(tmp.path()).unwrap();
        assert_eq!(record.packs.len(), 1);
        assert_eq!(record.packs[0].name, "core");
        assert_eq!(record.variables, vars);
    }

    #[test]
    fn test_upgrade_appends_prior_pack_list() {
        let tmp = tempfile::tempdir().unwrap();
        store(
            tmp.path(),
            &[SelectedPack::named("core")],
            BTreeMap::new(),
            Vec::new(),
        )
        .unwrap();
        store(
            tmp.path(),
            &[SelectedPack::named("docs")],
            BTreeMap::new(),
            Vec::new(),
        )
        .unwrap();

        let record = load(tmp.path()).unwrap();
        let names: Vec<_> = record.packs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["core", "docs"]);
    }

    #[test]
    fn test_broken_metadata_treated_as_absent() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(METADATA_NAME), b"{ not json").unwrap();
        assert!(load(tmp.path()).is_none());

        // And a fresh install can still write over it.
        store(
            tmp.path(),
            &[SelectedPack::named("core")],
            BTreeMap::new(),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(load(tmp.path()).unwrap().packs.len(), 1);
    }
}
