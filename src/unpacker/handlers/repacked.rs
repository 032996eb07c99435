//! Repacked-jar unpacker
//!
//! A repacked jar's inline data is only a 4-byte key naming a shared
//! `packs/pack200-<key>` resource. The resource holds a compressed jar
//! image; reconstruction pipes it through the gzip decoder into the target
//! (or its queued temp sibling), then the usual mtime/queue handling
//! applies.

use crate::error::{Result, UnpackError};
use crate::pack::PackFile;
use crate::resources::ResourceProvider;
use crate::unpacker::copy::copy_to_end;
use crate::unpacker::gate::CancellationGate;
use crate::unpacker::handlers::{finish, stage};
use crate::unpacker::queue::FileQueue;

use flate2::read::GzDecoder;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Name of the shared payload resource for a jar key.
pub fn jar_resource_name(key: i32) -> String {
    format!("packs/pack200-{key}")
}

/// Reconstruct a repacked jar at the target. Returns whether the write was
/// queued.
pub fn unpack_repacked_jar(
    gate: &CancellationGate,
    file: &PackFile,
    key: i32,
    resources: &ResourceProvider,
    target: &Path,
    queue: Option<&mut FileQueue>,
) -> Result<bool> {
    let resource = jar_resource_name(key);
    debug!("reconstructing {} from {resource}", file.target_path);
    let compressed = resources.open_resource(&resource)?;
    let mut decoder = GzDecoder::new(compressed);

    let staged = stage(file, target, queue.is_some())?;
    let mut out = File::create(&staged.write_path)
        .map_err(|e| UnpackError::fs(&staged.write_path, e))?;
    copy_to_end(&mut decoder, &mut out, gate, target)?;
    drop(out);
    finish(file, staged, target, queue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{plain_file, write_installer_jar};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_reconstructs_jar_from_shared_resource() {
        let jar_image = b"PK\x03\x04 pretend jar bytes";
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(jar_image).unwrap();
        let compressed = enc.finish().unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let installer = tmp.path().join("setup.jar");
        write_installer_jar(
            &installer,
            &[("packs/pack200-42", compressed.as_slice())],
        );
        let resources = ResourceProvider::new(&installer);

        let target = tmp.path().join("lib/core.jar");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        let mut file = plain_file("lib/core.jar", 0);
        file.is_repacked_jar = true;

        let gate = CancellationGate::new();
        gate.begin();
        let queued =
            unpack_repacked_jar(&gate, &file, 42, &resources, &target, None).unwrap();
        assert!(!queued);
        assert_eq!(std::fs::read(&target).unwrap(), jar_image);
    }

    #[test]
    fn test_missing_shared_resource_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = tmp.path().join("setup.jar");
        write_installer_jar(&installer, &[("packs/pack-core", b"x".as_slice())]);
        let resources = ResourceProvider::new(&installer);

        let target = tmp.path().join("core.jar");
        let mut file = plain_file("core.jar", 0);
        file.is_repacked_jar = true;

        let gate = CancellationGate::new();
        gate.begin();
        let err =
            unpack_repacked_jar(&gate, &file, 7, &resources, &target, None).unwrap_err();
        assert!(matches!(err, UnpackError::ResourceNotFound(_)), "got {err:?}");
    }
}
