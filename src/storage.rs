//! File storage for flight data.
//!
//! Paths are relative to the storage root (the SD card mount point on the
//! vehicle). Every failure carries the [`FailureKind`](crate::outcome::FailureKind)
//! derived from the OS error, so running out of space is reported as
//! `ResourceExhausted` and not as a generic I/O error.

use crate::outcome::{Failure, FailureKind, Outcome};
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
    pub is_dir: bool,
    pub modified: Option<SystemTime>,
}

pub trait Storage: Send {
    /// Create `path` holding exactly `data`, truncating any existing file.
    fn create_file(&mut self, path: &str, data: &[u8]) -> Outcome<()>;

    fn append_file(&mut self, path: &str, data: &[u8]) -> Outcome<()>;

    /// Fill `buffer` from the start of `path`. A file shorter than the buffer
    /// is a `ShortTransfer`.
    fn read_file(&self, path: &str, buffer: &mut [u8]) -> Outcome<()>;

    /// Fails with `NotFound` if `old` is missing and `AlreadyInUse` if `new`
    /// exists.
    fn rename_file(&mut self, old: &str, new: &str) -> Outcome<()>;

    fn stat_file(&self, path: &str) -> Outcome<FileInfo>;

    fn exists(&self, path: &str) -> bool {
        self.stat_file(path).is_ok()
    }
}

/// [`Storage`] on a mounted filesystem.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Use `root` as the storage root, creating it if needed.
    pub fn mount(root: impl Into<PathBuf>) -> Outcome<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "storage mounted");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Outcome<PathBuf> {
        let relative = Path::new(path);
        let valid = !path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !valid {
            return Err(Failure::invalid_argument(alloc::format!(
                "{path:?} is not a path inside the storage root"
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl Storage for FsStorage {
    fn create_file(&mut self, path: &str, data: &[u8]) -> Outcome<()> {
        let mut file = fs::File::create(self.resolve(path)?).map_err(opening_for_write)?;
        file.write_all(data)?;
        file.flush()?;
        debug!(path, bytes = data.len(), "file created");
        Ok(())
    }

    fn append_file(&mut self, path: &str, data: &[u8]) -> Outcome<()> {
        let mut file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.resolve(path)?)
            .map_err(opening_for_write)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    fn read_file(&self, path: &str, buffer: &mut [u8]) -> Outcome<()> {
        let mut file = fs::File::open(self.resolve(path)?)?;
        let mut filled = 0;
        while filled < buffer.len() {
            match file.read(&mut buffer[filled..]) {
                Ok(0) => return Err(Failure::short_transfer(buffer.len(), filled)),
                Ok(count) => filled += count,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(error.into()),
            }
        }
        Ok(())
    }

    fn rename_file(&mut self, old: &str, new: &str) -> Outcome<()> {
        let from = self.resolve(old)?;
        let to = self.resolve(new)?;
        if !from.exists() {
            return Err(Failure::not_found(alloc::format!("{old} does not exist")));
        }
        if to.exists() {
            return Err(Failure::already_in_use(alloc::format!("{new} already exists")));
        }
        fs::rename(from, to)?;
        debug!(old, new, "file renamed");
        Ok(())
    }

    fn stat_file(&self, path: &str) -> Outcome<FileInfo> {
        let metadata = fs::metadata(self.resolve(path)?)?;
        Ok(FileInfo {
            size: metadata.len(),
            is_dir: metadata.is_dir(),
            modified: metadata.modified().ok(),
        })
    }
}

/// Opening for write only fails with `NotFound` when the parent directory is
/// missing, which is a bad path rather than a missing file.
fn opening_for_write(error: io::Error) -> Failure {
    let failure = Failure::from(error);
    if failure.kind == FailureKind::NotFound {
        return Failure {
            kind: FailureKind::InvalidArgument,
            message: alloc::format!("parent directory missing: {}", failure.message),
            raw_code: failure.raw_code,
        };
    }
    failure
}

// errno reported when a write would exceed the capacity.
const ENOSPC: i32 = 28;

/// Bounded in-memory [`Storage`], for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: BTreeMap<String, Vec<u8>>,
    capacity: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that runs out of space once `capacity` bytes are stored.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            files: BTreeMap::new(),
            capacity: Some(capacity),
        }
    }

    pub fn used(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn contents(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    fn reserve(&self, replaced: usize, added: usize) -> Outcome<()> {
        match self.capacity {
            Some(capacity) if self.used() - replaced + added > capacity => {
                Err(io::Error::from_raw_os_error(ENOSPC).into())
            }
            _ => Ok(()),
        }
    }
}

impl Storage for MemoryStorage {
    fn create_file(&mut self, path: &str, data: &[u8]) -> Outcome<()> {
        let replaced = self.files.get(path).map_or(0, Vec::len);
        self.reserve(replaced, data.len())?;
        self.files.insert(path.into(), data.to_vec());
        Ok(())
    }

    fn append_file(&mut self, path: &str, data: &[u8]) -> Outcome<()> {
        self.reserve(0, data.len())?;
        self.files.entry(path.into()).or_default().extend_from_slice(data);
        Ok(())
    }

    fn read_file(&self, path: &str, buffer: &mut [u8]) -> Outcome<()> {
        let contents = self
            .files
            .get(path)
            .ok_or_else(|| Failure::not_found(alloc::format!("{path} does not exist")))?;
        if contents.len() < buffer.len() {
            return Err(Failure::short_transfer(buffer.len(), contents.len()));
        }
        buffer.copy_from_slice(&contents[..buffer.len()]);
        Ok(())
    }

    fn rename_file(&mut self, old: &str, new: &str) -> Outcome<()> {
        if !self.files.contains_key(old) {
            return Err(Failure::not_found(alloc::format!("{old} does not exist")));
        }
        if self.files.contains_key(new) {
            return Err(Failure::already_in_use(alloc::format!("{new} already exists")));
        }
        if let Some(contents) = self.files.remove(old) {
            self.files.insert(new.into(), contents);
        }
        Ok(())
    }

    fn stat_file(&self, path: &str) -> Outcome<FileInfo> {
        self.files
            .get(path)
            .map(|contents| FileInfo {
                size: contents.len() as u64,
                is_dir: false,
                modified: None,
            })
            .ok_or_else(|| Failure::not_found(alloc::format!("{path} does not exist")))
    }
}
