//! Chunked, interruptible byte copying
//!
//! All payload writes go through these loops so every copy observes the
//! cancellation gate at the same granularity and reports truncation the
//! same way.

use crate::error::{Result, UnpackError};
use crate::unpacker::gate::CancellationGate;

use filetime::FileTime;
use std::io::{Read, Write};
use std::path::Path;

/// Copy chunk size; the gate is checked before each chunk.
pub const CHUNK_SIZE: usize = 5120;

/// Copy exactly `length` bytes from `src` to `dst`. An EOF before `length`
/// bytes is a truncated-pack error (a copy-time stream desync, as opposed
/// to a framing error caught at decode time).
pub fn copy_exact<R: Read + ?Sized, W: Write>(
    src: &mut R,
    dst: &mut W,
    length: u64,
    gate: &CancellationGate,
    target: &Path,
) -> Result<()> {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut remaining = length;
    while remaining > 0 {
        if gate.check() {
            return Err(UnpackError::Cancelled);
        }
        let want = CHUNK_SIZE.min(remaining as usize);
        let n = src
            .read(&mut buf[..want])
            .map_err(|e| UnpackError::fs(target, e))?;
        if n == 0 {
            return Err(UnpackError::TruncatedPack(format!(
                "{}: {remaining} of {length} bytes missing",
                target.display()
            )));
        }
        dst.write_all(&buf[..n])
            .map_err(|e| UnpackError::fs(target, e))?;
        remaining -= n as u64;
    }
    Ok(())
}

/// Copy until `src` is exhausted (used when the decoded size is unknown,
/// e.g. repacked-jar reconstruction). Returns the byte count written.
pub fn copy_to_end<R: Read + ?Sized, W: Write>(
    src: &mut R,
    dst: &mut W,
    gate: &CancellationGate,
    target: &Path,
) -> Result<u64> {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        if gate.check() {
            return Err(UnpackError::Cancelled);
        }
        let n = src
            .read(&mut buf)
            .map_err(|e| UnpackError::fs(target, e))?;
        if n == 0 {
            return Ok(written);
        }
        dst.write_all(&buf[..n])
            .map_err(|e| UnpackError::fs(target, e))?;
        written += n as u64;
    }
}

/// Set a target's mtime from a descriptor timestamp (epoch milliseconds).
pub fn set_mtime(target: &Path, last_modified: i64) -> Result<()> {
    let secs = last_modified.div_euclid(1000);
    let nanos = (last_modified.rem_euclid(1000) * 1_000_000) as u32;
    filetime::set_file_mtime(target, FileTime::from_unix_time(secs, nanos))
        .map_err(|e| UnpackError::fs(target, e))
}
