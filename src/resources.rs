//! Pack resource provider
//!
//! Resolves a pack name (or raw resource name) to its bytes. Pack resources
//! live as `packs/pack-<name>` entries inside the installer archive (a jar);
//! when a web base URL is configured, the per-pack jar
//! `<installerBase>.pack-<name>.jar` is fetched to a local cache first and
//! the nested entry is read from there. An optional whole-payload decoder
//! from an explicit registry wraps pack streams.

use crate::error::{Result, UnpackError};
use crate::unpacker::gate::CancellationGate;

use flate2::read::{DeflateDecoder, GzDecoder};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Whole-stream decoders supported for pack payloads. An explicit registry
/// keyed by name; unknown names are a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decoder {
    #[default]
    Raw,
    Gzip,
    Deflate,
}

impl Decoder {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "" | "raw" | "none" => Ok(Decoder::Raw),
            "gzip" => Ok(Decoder::Gzip),
            "deflate" => Ok(Decoder::Deflate),
            other => Err(UnpackError::Config(format!("unknown pack decoder: {other}"))),
        }
    }

    fn decode(self, raw: Vec<u8>) -> std::io::Result<Vec<u8>> {
        match self {
            Decoder::Raw => Ok(raw),
            Decoder::Gzip => {
                let mut out = Vec::new();
                GzDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
                Ok(out)
            }
            Decoder::Deflate => {
                let mut out = Vec::new();
                DeflateDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}

/// Byte-stream source for named packs and resources.
pub struct ResourceProvider {
    archive_path: PathBuf,
    installer_base: String,
    web_base: Option<String>,
    cache_dir: PathBuf,
    media_dir: Option<PathBuf>,
    decoder: Decoder,
}

impl ResourceProvider {
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        let archive_path = archive_path.into();
        let installer_base = archive_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "installer".to_string());
        let cache_dir = std::env::temp_dir().join("packdeploy-cache");
        ResourceProvider {
            archive_path,
            installer_base,
            web_base: None,
            cache_dir,
            media_dir: None,
            decoder: Decoder::Raw,
        }
    }

    /// Base URL hosting `<installerBase>.pack-<name>.jar` archives.
    pub fn with_web_base(mut self, base: impl Into<String>) -> Self {
        self.web_base = Some(base.into());
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Multi-volume media directory, tried when a resource is not in the
    /// installer archive.
    pub fn with_media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.media_dir = Some(dir.into());
        self
    }

    pub fn with_decoder(mut self, name: &str) -> Result<Self> {
        self.decoder = Decoder::from_name(name)?;
        Ok(self)
    }

    /// Open the byte stream of a named pack, fetching and caching the
    /// web-hosted archive first when one is configured.
    pub fn open_pack(
        &self,
        name: &str,
        gate: Option<&CancellationGate>,
    ) -> Result<Cursor<Vec<u8>>> {
        let entry = format!("packs/pack-{name}");
        let raw = match &self.web_base {
            Some(_) => {
                let jar = self.fetch_web_pack(name, gate)?;
                read_jar_entry(&jar, &entry)?
            }
            None => read_jar_entry(&self.archive_path, &entry)?,
        };
        let decoded = self
            .decoder
            .decode(raw)
            .map_err(|e| UnpackError::CorruptPack(format!("decoding pack {name}: {e}")))?;
        Ok(Cursor::new(decoded))
    }

    /// Plain named-resource access; no web fallback, no decoder. Used for
    /// multi-volume metadata and shared repacked-jar payloads.
    pub fn open_resource(&self, name: &str) -> Result<Cursor<Vec<u8>>> {
        match read_jar_entry(&self.archive_path, name) {
            Ok(bytes) => Ok(Cursor::new(bytes)),
            Err(UnpackError::ResourceNotFound(_)) => {
                if let Some(media) = &self.media_dir {
                    let candidate = media.join(name);
                    if candidate.is_file() {
                        let bytes = std::fs::read(&candidate)
                            .map_err(|e| UnpackError::fs(&candidate, e))?;
                        return Ok(Cursor::new(bytes));
                    }
                }
                Err(UnpackError::ResourceNotFound(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Download `<installerBase>.pack-<name>.jar` into the cache directory,
    /// checking the cancellation gate between chunks. A cancelled fetch is
    /// reported as interrupted, never as an I/O failure.
    fn fetch_web_pack(&self, name: &str, gate: Option<&CancellationGate>) -> Result<PathBuf> {
        let base = self.web_base.as_deref().unwrap_or_default();
        let file_name = format!("{}.pack-{name}.jar", self.installer_base);
        let cached = self.cache_dir.join(&file_name);
        if cached.is_file() {
            debug!("pack {name} already cached at {}", cached.display());
            return Ok(cached);
        }
        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| UnpackError::fs(&self.cache_dir, e))?;

        let url = format!("{}/{}", base.trim_end_matches('/'), file_name);
        info!("fetching {url}");
        let mut response = reqwest::blocking::get(&url)
            .map_err(|e| UnpackError::fs(&cached, std::io::Error::other(e)))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(UnpackError::ResourceNotFound(url));
        }
        if !response.status().is_success() {
            return Err(UnpackError::fs(
                &cached,
                std::io::Error::other(format!("HTTP {} for {url}", response.status())),
            ));
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&self.cache_dir)
            .map_err(|e| UnpackError::fs(&self.cache_dir, e))?;
        let mut buf = [0u8; 8192];
        loop {
            if gate.map(CancellationGate::check).unwrap_or(false) {
                return Err(UnpackError::ResourceInterrupted(format!("pack {name}")));
            }
            let n = response
                .read(&mut buf)
                .map_err(|e| UnpackError::fs(&cached, std::io::Error::other(e)))?;
            if n == 0 {
                break;
            }
            tmp.write_all(&buf[..n])
                .map_err(|e| UnpackError::fs(&cached, e))?;
        }
        tmp.persist(&cached)
            .map_err(|e| UnpackError::fs(&cached, e.error))?;
        Ok(cached)
    }
}

/// Read one entry of a jar into memory.
fn read_jar_entry(jar: &Path, entry: &str) -> Result<Vec<u8>> {
    let file = File::open(jar).map_err(|e| UnpackError::fs(jar, e))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| UnpackError::CorruptPack(format!("{}: {e}", jar.display())))?;
    let mut zipped = match archive.by_name(entry) {
        Ok(zipped) => zipped,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(UnpackError::ResourceNotFound(entry.to_string()));
        }
        Err(e) => return Err(UnpackError::CorruptPack(format!("{entry}: {e}"))),
    };
    let mut bytes = Vec::with_capacity(zipped.size() as usize);
    zipped
        .read_to_end(&mut bytes)
        .map_err(|e| UnpackError::CorruptPack(format!("reading {entry}: {e}")))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_installer_jar;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    #[test]
    fn test_open_pack_from_local_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("setup.jar");
        write_installer_jar(&jar, &[("packs/pack-core", b"core bytes".as_slice())]);

        let provider = ResourceProvider::new(&jar);
        let mut stream = provider.open_pack("core", None).unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"core bytes");
    }

    #[test]
    fn test_missing_pack_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("setup.jar");
        write_installer_jar(&jar, &[("packs/pack-core", b"x".as_slice())]);

        let provider = ResourceProvider::new(&jar);
        let err = provider.open_pack("docs", None).unwrap_err();
        assert!(matches!(err, UnpackError::ResourceNotFound(_)), "got {err:?}");
    }

    #[test]
    fn test_gzip_decoder_registry() {
        let mut compressed = GzEncoder::new(Vec::new(), Compression::default());
        compressed.write_all(b"inflated pack stream").unwrap();
        let compressed = compressed.finish().unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("setup.jar");
        write_installer_jar(&jar, &[("packs/pack-core", compressed.as_slice())]);

        let provider = ResourceProvider::new(&jar).with_decoder("gzip").unwrap();
        let mut stream = provider.open_pack("core", None).unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"inflated pack stream");

        assert!(matches!(
            ResourceProvider::new(&jar).with_decoder("bzip2"),
            Err(UnpackError::Config(_))
        ));
    }

    #[test]
    fn test_media_dir_fallback_for_resources() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("setup.jar");
        write_installer_jar(&jar, &[("packs/pack-core", b"x".as_slice())]);
        let media = tmp.path().join("media");
        std::fs::create_dir_all(media.join("volumes")).unwrap();
        std::fs::write(media.join("volumes/info"), b"volume 2 of 3").unwrap();

        let provider = ResourceProvider::new(&jar).with_media_dir(&media);
        let mut stream = provider.open_resource("volumes/info").unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"volume 2 of 3");

        let err = provider.open_resource("volumes/other").unwrap_err();
        assert!(matches!(err, UnpackError::ResourceNotFound(_)));
    }
}
