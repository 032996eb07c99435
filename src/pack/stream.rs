//! Pack stream reader
//!
//! Decodes one pack's byte stream: an `i32` file count, then per file a
//! descriptor record immediately followed by exactly `length` payload bytes
//! (a 4-byte shared-resource key for repacked jars, nothing inline for
//! back-references and loose packs), then the trailing parsable, executable
//! and update-check lists.
//!
//! All integers are big-endian. Strings are `u16` length + UTF-8 bytes;
//! optional values are a `u8` presence flag + value. Any short read,
//! unsatisfiable length or bad enum code is a fatal corrupt-pack error.

use crate::error::{Result, UnpackError};
use crate::pack::{
    Blockable, ExecutableFile, ExecutionStage, FailurePolicy, OverridePolicy, PackFile,
    PackTrailers, ParsableFile, UpdateCheck,
};

use binrw::{BinRead, BinReaderExt};
use std::io::{Read, Seek, SeekFrom, Take};

/// Serialized size of the stream's framing header (the leading file count).
/// Back-reference offsets are measured from just past this header.
pub const PACK_HEADER_LEN: u64 = 4;

/// Upper bound on per-record list lengths; anything larger is framing junk.
const MAX_LIST_LEN: u32 = 4096;

/// `u16` length-prefixed UTF-8 string.
#[derive(Debug, BinRead)]
#[br(big)]
struct WireString {
    len: u16,
    #[br(count = len)]
    bytes: Vec<u8>,
}

impl WireString {
    fn into_string(self) -> Result<String> {
        String::from_utf8(self.bytes)
            .map_err(|e| UnpackError::CorruptPack(format!("invalid UTF-8 in string field: {e}")))
    }
}

/// `u8` presence flag + string.
#[derive(Debug, BinRead)]
#[br(big)]
struct WireOptString {
    present: u8,
    #[br(if(present != 0))]
    value: Option<WireString>,
}

impl WireOptString {
    fn into_option(self) -> Result<Option<String>> {
        self.value.map(WireString::into_string).transpose()
    }
}

/// On-wire shape of one file descriptor.
#[derive(Debug, BinRead)]
#[br(big)]
struct FileRecord {
    target_path: WireString,
    length: u64,
    last_modified: i64,
    is_directory: u8,
    override_policy: u8,
    override_rename_to: WireOptString,
    blockable: u8,
    is_repacked_jar: u8,
    previous_pack_id: WireOptString,
    offset_in_previous_pack: u64,
    condition: WireOptString,
    #[br(assert(os_count <= MAX_LIST_LEN, "os constraint list too long"))]
    os_count: u32,
    #[br(count = os_count)]
    os_constraints: Vec<WireString>,
}

impl FileRecord {
    fn into_pack_file(self) -> Result<PackFile> {
        let override_policy = OverridePolicy::from_code(self.override_policy).ok_or_else(|| {
            UnpackError::CorruptPack(format!("bad override policy code {}", self.override_policy))
        })?;
        let blockable = Blockable::from_code(self.blockable).ok_or_else(|| {
            UnpackError::CorruptPack(format!("bad blockable code {}", self.blockable))
        })?;
        Ok(PackFile {
            target_path: self.target_path.into_string()?,
            length: self.length,
            last_modified: self.last_modified,
            is_directory: self.is_directory != 0,
            override_policy,
            override_rename_to: self.override_rename_to.into_option()?,
            blockable,
            is_repacked_jar: self.is_repacked_jar != 0,
            previous_pack_id: self.previous_pack_id.into_option()?,
            offset_in_previous_pack: self.offset_in_previous_pack,
            condition: self.condition.into_option()?,
            os_constraints: self
                .os_constraints
                .into_iter()
                .map(WireString::into_string)
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

#[derive(Debug, BinRead)]
#[br(big)]
struct ParsableRecord {
    target_path: WireString,
    condition: WireOptString,
}

#[derive(Debug, BinRead)]
#[br(big)]
struct ExecutableRecord {
    target_path: WireString,
    stage: u8,
    on_failure: u8,
    keep_file: u8,
    condition: WireOptString,
    #[br(assert(arg_count <= MAX_LIST_LEN, "argument list too long"))]
    arg_count: u32,
    #[br(count = arg_count)]
    args: Vec<WireString>,
}

#[derive(Debug, BinRead)]
#[br(big)]
struct UpdateCheckRecord {
    #[br(assert(include_count <= MAX_LIST_LEN, "include list too long"))]
    include_count: u32,
    #[br(count = include_count)]
    includes: Vec<WireString>,
    #[br(assert(exclude_count <= MAX_LIST_LEN, "exclude list too long"))]
    exclude_count: u32,
    #[br(count = exclude_count)]
    excludes: Vec<WireString>,
}

/// Streaming decoder for one pack. Has no side effects beyond advancing the
/// underlying stream position.
pub struct PackStreamReader<R: Read + Seek> {
    inner: R,
    file_count: u32,
    files_read: u32,
    total_len: u64,
}

impl<R: Read + Seek> PackStreamReader<R> {
    /// Consume the framing header (the file count) and position the reader
    /// at the first descriptor.
    pub fn open(mut inner: R) -> Result<Self> {
        let start = inner
            .stream_position()
            .map_err(|e| UnpackError::CorruptPack(format!("stream not positionable: {e}")))?;
        let total_len = inner
            .seek(SeekFrom::End(0))
            .map_err(|e| UnpackError::CorruptPack(format!("stream not seekable: {e}")))?;
        inner
            .seek(SeekFrom::Start(start))
            .map_err(|e| UnpackError::CorruptPack(format!("stream not seekable: {e}")))?;

        let file_count: i32 = inner.read_be()?;
        if file_count < 0 {
            return Err(UnpackError::CorruptPack(format!(
                "negative file count {file_count}"
            )));
        }
        Ok(PackStreamReader {
            inner,
            file_count: file_count as u32,
            files_read: 0,
            total_len,
        })
    }

    pub fn file_count(&self) -> u32 {
        self.file_count
    }

    /// Decode the next file descriptor. The caller must then consume or
    /// skip its payload before calling this again.
    pub fn next_file(&mut self) -> Result<PackFile> {
        if self.files_read >= self.file_count {
            return Err(UnpackError::CorruptPack(format!(
                "descriptor read past declared file count {}",
                self.file_count
            )));
        }
        self.files_read += 1;
        let record = FileRecord::read(&mut self.inner)?;
        let file = record.into_pack_file()?;
        if !file.is_back_reference() && !file.is_repacked_jar {
            self.ensure_remaining(file.length, &file.target_path)?;
        }
        Ok(file)
    }

    /// Read the 4-byte shared-resource key of a repacked-jar entry.
    pub fn read_jar_key(&mut self) -> Result<i32> {
        Ok(self.inner.read_be::<i32>()?)
    }

    /// Bounded reader over the next `length` inline payload bytes.
    pub fn payload(&mut self, length: u64) -> Take<&mut R> {
        (&mut self.inner).take(length)
    }

    /// Advance the stream past a descriptor's payload without writing
    /// anything. Must consume exactly the bytes extraction would: `length`
    /// for a plain entry, the 4-byte key for a repacked jar, nothing for a
    /// back-reference or a loosely-bundled pack.
    pub fn skip_payload(&mut self, file: &PackFile, loose_pack: bool) -> Result<()> {
        let span = if loose_pack || file.is_back_reference() {
            0
        } else if file.is_repacked_jar {
            std::mem::size_of::<i32>() as u64
        } else {
            file.length
        };
        if span > 0 {
            self.skip_raw(span)
                .map_err(|_| payload_overrun(file, span))?;
        }
        Ok(())
    }

    /// Skip `n` raw bytes, bounds-checked against the stream end. Used for
    /// back-reference offsets, which are measured from just past the
    /// framing header — exactly where `open` leaves the stream.
    pub fn skip_raw(&mut self, n: u64) -> Result<()> {
        self.ensure_remaining(n, "skip")?;
        self.inner
            .seek(SeekFrom::Current(n as i64))
            .map_err(|e| UnpackError::CorruptPack(format!("seek failed: {e}")))?;
        Ok(())
    }

    /// Decode the trailing parsable/executable/update-check lists. Call
    /// after every descriptor's payload has been consumed.
    pub fn read_trailers(&mut self) -> Result<PackTrailers> {
        if self.files_read != self.file_count {
            return Err(UnpackError::CorruptPack(format!(
                "trailers read after {}/{} descriptors",
                self.files_read, self.file_count
            )));
        }

        let mut trailers = PackTrailers::default();
        for _ in 0..self.read_list_len("parsable")? {
            let record = ParsableRecord::read(&mut self.inner)?;
            trailers.parsables.push(ParsableFile {
                target_path: record.target_path.into_string()?,
                condition: record.condition.into_option()?,
            });
        }
        for _ in 0..self.read_list_len("executable")? {
            let record = ExecutableRecord::read(&mut self.inner)?;
            let stage = ExecutionStage::from_code(record.stage).ok_or_else(|| {
                UnpackError::CorruptPack(format!("bad execution stage code {}", record.stage))
            })?;
            let on_failure = FailurePolicy::from_code(record.on_failure).ok_or_else(|| {
                UnpackError::CorruptPack(format!("bad failure policy code {}", record.on_failure))
            })?;
            trailers.executables.push(ExecutableFile {
                target_path: record.target_path.into_string()?,
                stage,
                on_failure,
                args: record
                    .args
                    .into_iter()
                    .map(WireString::into_string)
                    .collect::<Result<Vec<_>>>()?,
                keep_file: record.keep_file != 0,
                condition: record.condition.into_option()?,
            });
        }
        for _ in 0..self.read_list_len("update-check")? {
            let record = UpdateCheckRecord::read(&mut self.inner)?;
            trailers.update_checks.push(UpdateCheck {
                includes: record
                    .includes
                    .into_iter()
                    .map(WireString::into_string)
                    .collect::<Result<Vec<_>>>()?,
                excludes: record
                    .excludes
                    .into_iter()
                    .map(WireString::into_string)
                    .collect::<Result<Vec<_>>>()?,
            });
        }
        Ok(trailers)
    }

    fn read_list_len(&mut self, what: &str) -> Result<u32> {
        let count: i32 = self.inner.read_be()?;
        if count < 0 {
            return Err(UnpackError::CorruptPack(format!(
                "negative {what} count {count}"
            )));
        }
        Ok(count as u32)
    }

    fn ensure_remaining(&mut self, needed: u64, what: &str) -> Result<()> {
        let pos = self
            .inner
            .stream_position()
            .map_err(|e| UnpackError::CorruptPack(format!("stream not positionable: {e}")))?;
        let overruns = pos
            .checked_add(needed)
            .map_or(true, |end| end > self.total_len);
        if overruns {
            return Err(UnpackError::CorruptPack(format!(
                "{what}: {needed} bytes declared but only {} remain",
                self.total_len.saturating_sub(pos)
            )));
        }
        Ok(())
    }
}

fn payload_overrun(file: &PackFile, span: u64) -> UnpackError {
    UnpackError::CorruptPack(format!(
        "payload of {} ({span} bytes) overruns the stream",
        file.target_path
    ))
}
