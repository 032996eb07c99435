//! Default unpacker: straight chunked copy of inline payload bytes.

use crate::error::{Result, UnpackError};
use crate::pack::PackFile;
use crate::unpacker::copy::copy_exact;
use crate::unpacker::gate::CancellationGate;
use crate::unpacker::handlers::{finish, stage};
use crate::unpacker::queue::FileQueue;

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Copy exactly `file.length` bytes from `payload` to the target (or its
/// queued temp sibling). Returns whether the write was queued.
pub fn unpack_direct<R: Read + ?Sized>(
    gate: &CancellationGate,
    file: &PackFile,
    payload: &mut R,
    target: &Path,
    queue: Option<&mut FileQueue>,
) -> Result<bool> {
    let staged = stage(file, target, queue.is_some())?;
    let mut out = File::create(&staged.write_path)
        .map_err(|e| UnpackError::fs(&staged.write_path, e))?;
    copy_exact(payload, &mut out, file.length, gate, target)?;
    drop(out);
    finish(file, staged, target, queue)
}
