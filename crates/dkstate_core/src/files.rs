use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Virtual file access used by the level and catalogue loaders.
///
/// A length that cannot be determined means the file is absent.
pub trait FileSource {
    fn file_length(&self, path: &Path) -> Option<u64>;

    fn load_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn exists(&self, path: &Path) -> bool {
        self.file_length(path).is_some()
    }

    /// Reads `len` bytes at `offset`.
    fn read_range(&self, path: &Path, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let bytes = self.load_file(path)?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        bytes
            .get(start..start.saturating_add(len))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} has no {len} bytes at {offset}", path.display()),
                )
            })
    }
}

/// Largest inflated size accepted from a gzip-wrapped file.
pub const INFLATE_LIMIT: u64 = 16 * 1024 * 1024;

const GZIP_MIN_LEN: u64 = 18;

/// Plain filesystem access. Files wrapped in gzip are inflated on read, and
/// their length is the one recorded in the gzip trailer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFiles;

impl FileSource for DiskFiles {
    fn file_length(&self, path: &Path) -> Option<u64> {
        let meta = fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }
        if !is_gzip_file(path) {
            return Some(meta.len());
        }
        if meta.len() < GZIP_MIN_LEN {
            return None;
        }
        // ISIZE: inflated length mod 2^32, little-endian, last four bytes.
        let mut file = fs::File::open(path).ok()?;
        file.seek(SeekFrom::End(-4)).ok()?;
        let mut trailer = [0u8; 4];
        file.read_exact(&mut trailer).ok()?;
        Some(u64::from(u32::from_le_bytes(trailer)))
    }

    fn load_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let raw = fs::read(path)?;
        if !raw.starts_with(&GZIP_MAGIC) {
            return Ok(raw);
        }
        let out = inflate(&raw, INFLATE_LIMIT + 1, path)?;
        if out.len() as u64 > INFLATE_LIMIT {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} inflates past {INFLATE_LIMIT} bytes",
                    path.display()
                ),
            ));
        }
        log::debug!(
            "inflated {} from {} to {} bytes",
            path.display(),
            raw.len(),
            out.len()
        );
        Ok(out)
    }

    fn read_range(&self, path: &Path, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        if is_gzip_file(path) {
            let end = offset.saturating_add(len as u64);
            if end > INFLATE_LIMIT {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no data past {INFLATE_LIMIT} bytes", path.display()),
                ));
            }
            let raw = fs::read(path)?;
            let bytes = inflate(&raw, end, path)?;
            let start = usize::try_from(offset).unwrap_or(usize::MAX);
            return bytes
                .get(start..)
                .filter(|rest| rest.len() == len)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        let mut file = fs::File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Inflates at most `max` bytes of a gzip stream.
fn inflate(raw: &[u8], max: u64, path: &Path) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(raw)
        .take(max)
        .read_to_end(&mut out)
        .map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("gzip decode of {} failed: {e}", path.display()),
            )
        })?;
    Ok(out)
}

fn is_gzip_file(path: &Path) -> bool {
    let mut magic = [0u8; 2];
    fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map(|()| magic == GZIP_MAGIC)
        .unwrap_or(false)
}

/// In-memory file set, handy for tools that assemble levels on the fly.
#[derive(Debug, Clone, Default)]
pub struct MemoryFiles {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }

    pub fn remove(&mut self, path: &Path) -> Option<Vec<u8>> {
        self.files.remove(path)
    }
}

impl FileSource for MemoryFiles {
    fn file_length(&self, path: &Path) -> Option<u64> {
        self.files.get(path).map(|bytes| bytes.len() as u64)
    }

    fn read_range(&self, path: &Path, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let bytes = self.files.get(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
        })?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        bytes
            .get(start..start.saturating_add(len))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
    }

    fn load_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "dkstate_files_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    #[test]
    fn gzip_files_are_inflated() {
        let path = temp_file("packed.tng");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[7u8; 300]).unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        assert_eq!(DiskFiles.file_length(&path), Some(300));
        assert_eq!(DiskFiles.load_file(&path).unwrap(), vec![7u8; 300]);
        let _ = fs::remove_file(&path);
    }

    fn gzip_of_zeros(len: usize) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        let block = vec![0u8; 64 * 1024];
        let mut left = len;
        while left > 0 {
            let n = left.min(block.len());
            encoder.write_all(&block[..n]).unwrap();
            left -= n;
        }
        encoder.finish().unwrap()
    }

    #[test]
    fn oversized_gzip_is_measured_without_inflating_and_refused() {
        let path = temp_file("bomb.dat");
        let len = INFLATE_LIMIT as usize + 1;
        fs::write(&path, gzip_of_zeros(len)).unwrap();

        assert_eq!(DiskFiles.file_length(&path), Some(len as u64));
        let err = DiskFiles.load_file(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(DiskFiles.read_range(&path, 8, 4).unwrap(), vec![0; 4]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn gzip_ranges_stop_at_the_inflated_end() {
        let path = temp_file("short.sav");
        fs::write(&path, gzip_of_zeros(10)).unwrap();
        assert_eq!(DiskFiles.read_range(&path, 6, 4).unwrap(), vec![0; 4]);
        assert!(DiskFiles.read_range(&path, 8, 4).is_err());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn plain_files_pass_through() {
        let path = temp_file("plain.inf");
        fs::write(&path, [3u8, 0, 0]).unwrap();
        assert_eq!(DiskFiles.file_length(&path), Some(3));
        assert_eq!(DiskFiles.load_file(&path).unwrap(), vec![3, 0, 0]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn ranged_reads_seek_into_the_file() {
        let path = temp_file("range.sav");
        fs::write(&path, b"0123456789").unwrap();
        assert_eq!(DiskFiles.read_range(&path, 4, 3).unwrap(), b"456");
        assert!(DiskFiles.read_range(&path, 8, 3).is_err());

        let mut mem = MemoryFiles::new();
        mem.insert("r", b"0123456789".to_vec());
        assert_eq!(mem.read_range(Path::new("r"), 4, 3).unwrap(), b"456");
        assert!(mem.read_range(Path::new("r"), 9, 2).is_err());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_files_have_no_length() {
        assert_eq!(DiskFiles.file_length(&temp_file("nope")), None);
        assert!(!MemoryFiles::new().exists(Path::new("nope")));
    }
}
