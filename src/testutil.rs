//! Test fixtures: a hand-rolled pack stream encoder and installer-archive
//! builders. The encoder deliberately does not share code with the binrw
//! reader so the wire format is checked from both sides.

use crate::pack::{ExecutableFile, PackFile, PackTrailers, SelectedPack};

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A plain, always-included file descriptor with sensible defaults.
pub fn plain_file(target_path: &str, length: u64) -> PackFile {
    PackFile {
        target_path: target_path.to_string(),
        length,
        last_modified: 1_700_000_000_000,
        is_directory: false,
        override_policy: crate::pack::OverridePolicy::Always,
        override_rename_to: None,
        blockable: crate::pack::Blockable::None,
        is_repacked_jar: false,
        previous_pack_id: None,
        offset_in_previous_pack: 0,
        condition: None,
        os_constraints: Vec::new(),
    }
}

/// Assembles the byte stream of one pack.
#[derive(Default)]
pub struct PackStreamBuilder {
    file_count: i32,
    body: Vec<u8>,
    trailers: Vec<u8>,
}

impl PackStreamBuilder {
    pub fn new() -> Self {
        let mut b = PackStreamBuilder::default();
        // Empty trailing lists unless overridden.
        b.trailers = encode_trailers(&PackTrailers::default());
        b
    }

    /// Descriptor followed by its inline payload.
    pub fn file(mut self, file: &PackFile, payload: &[u8]) -> Self {
        assert_eq!(file.length, payload.len() as u64, "payload/length mismatch");
        self.file_count += 1;
        encode_file_record(&mut self.body, file);
        self.body.extend_from_slice(payload);
        self
    }

    /// Descriptor followed by a 4-byte shared-resource key.
    pub fn repacked_jar(mut self, file: &PackFile, key: i32) -> Self {
        self.file_count += 1;
        encode_file_record(&mut self.body, file);
        self.body.extend_from_slice(&key.to_be_bytes());
        self
    }

    /// Back-reference descriptor: nothing inline.
    pub fn back_reference(mut self, file: &PackFile) -> Self {
        assert!(file.previous_pack_id.is_some());
        self.file_count += 1;
        encode_file_record(&mut self.body, file);
        self
    }

    /// Descriptor without inline payload, as written into loose packs.
    pub fn loose_file(mut self, file: &PackFile) -> Self {
        self.file_count += 1;
        encode_file_record(&mut self.body, file);
        self
    }

    pub fn trailers(mut self, trailers: &PackTrailers) -> Self {
        self.trailers = encode_trailers(trailers);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = self.file_count.to_be_bytes().to_vec();
        out.extend_from_slice(&self.body);
        out.extend_from_slice(&self.trailers);
        out
    }
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn put_opt_string(out: &mut Vec<u8>, s: &Option<String>) {
    match s {
        Some(s) => {
            out.push(1);
            put_string(out, s);
        }
        None => out.push(0),
    }
}

fn encode_file_record(out: &mut Vec<u8>, file: &PackFile) {
    put_string(out, &file.target_path);
    out.extend_from_slice(&file.length.to_be_bytes());
    out.extend_from_slice(&file.last_modified.to_be_bytes());
    out.push(file.is_directory as u8);
    out.push(file.override_policy.code());
    put_opt_string(out, &file.override_rename_to);
    out.push(file.blockable.code());
    out.push(file.is_repacked_jar as u8);
    put_opt_string(out, &file.previous_pack_id);
    out.extend_from_slice(&file.offset_in_previous_pack.to_be_bytes());
    put_opt_string(out, &file.condition);
    out.extend_from_slice(&(file.os_constraints.len() as u32).to_be_bytes());
    for os in &file.os_constraints {
        put_string(out, os);
    }
}

fn encode_trailers(trailers: &PackTrailers) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(trailers.parsables.len() as i32).to_be_bytes());
    for p in &trailers.parsables {
        put_string(&mut out, &p.target_path);
        put_opt_string(&mut out, &p.condition);
    }
    out.extend_from_slice(&(trailers.executables.len() as i32).to_be_bytes());
    for e in &trailers.executables {
        encode_executable(&mut out, e);
    }
    out.extend_from_slice(&(trailers.update_checks.len() as i32).to_be_bytes());
    for u in &trailers.update_checks {
        out.extend_from_slice(&(u.includes.len() as u32).to_be_bytes());
        for g in &u.includes {
            put_string(&mut out, g);
        }
        out.extend_from_slice(&(u.excludes.len() as u32).to_be_bytes());
        for g in &u.excludes {
            put_string(&mut out, g);
        }
    }
    out
}

fn encode_executable(out: &mut Vec<u8>, e: &ExecutableFile) {
    put_string(out, &e.target_path);
    out.push(e.stage.code());
    out.push(e.on_failure.code());
    out.push(e.keep_file as u8);
    put_opt_string(out, &e.condition);
    out.extend_from_slice(&(e.args.len() as u32).to_be_bytes());
    for a in &e.args {
        put_string(out, a);
    }
}

/// Write an installer archive (a jar) containing the given entries.
pub fn write_installer_jar(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut jar = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, bytes) in entries {
        jar.start_file(*name, options).unwrap();
        jar.write_all(bytes).unwrap();
    }
    jar.finish().unwrap();
}

/// A throwaway on-disk installer: archive + install dir + source dir.
pub struct InstallerFixture {
    pub tmp: tempfile::TempDir,
    pub archive: PathBuf,
    pub install_dir: PathBuf,
    pub source_dir: PathBuf,
}

impl InstallerFixture {
    /// Build an installer archive from `(pack name, stream bytes)` pairs
    /// plus extra raw entries (shared jar payloads etc.).
    pub fn new(packs: &[(&str, Vec<u8>)], extra_entries: &[(&str, &[u8])]) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("installer.jar");
        let install_dir = tmp.path().join("install");
        let source_dir = tmp.path().join("source");
        std::fs::create_dir_all(&install_dir).unwrap();
        std::fs::create_dir_all(&source_dir).unwrap();

        let mut entries: Vec<(String, &[u8])> = Vec::new();
        for (name, bytes) in packs {
            entries.push((format!("packs/pack-{name}"), bytes.as_slice()));
        }
        for (name, bytes) in extra_entries {
            entries.push((name.to_string(), bytes));
        }
        let borrowed: Vec<(&str, &[u8])> =
            entries.iter().map(|(n, b)| (n.as_str(), *b)).collect();
        write_installer_jar(&archive, &borrowed);

        InstallerFixture {
            tmp,
            archive,
            install_dir,
            source_dir,
        }
    }

    pub fn selected(&self, names: &[&str]) -> Vec<SelectedPack> {
        names.iter().map(|n| SelectedPack::named(*n)).collect()
    }
}
