//! Filesystem capabilities the materializer needs, behind one trait so
//! the conflict policy can run against memory in tests or as a dry run.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

/// The narrow set of operations materialization performs.
pub trait FsBackend {
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Resolve symlinks and `.`/`..` for an existing path.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Replace `path` with `data` so readers see either the old file or
    /// the complete new one.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()>;
}

/// The real disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl FsBackend for RealFs {
    fn exists(&self, path: &Path) -> bool {
        // symlink_metadata so a dangling link still counts as "there"
        fs::symlink_metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        dunce::canonicalize(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        write_atomic(path, data)
    }
}

/// Atomic write via a same-directory temp file and rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    // Preserve original permissions
    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;

    if let Some(perms) = perms {
        fs::set_permissions(tmp.path(), perms)?;
    }

    // Atomically replace the destination; the temp file is removed on error
    tmp.persist(path).map_err(|e| e.error)?;

    // fsync parent dir to ensure durability on Unix
    #[cfg(unix)]
    {
        if let Ok(parent_file) = fs::File::open(dir) {
            let _ = parent_file.sync_all();
        }
    }

    Ok(())
}

/// Lexically resolve `.` and `..` in an absolute path.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// In-memory filesystem. Paths are expected to be absolute; there are no
/// symlinks, so canonicalization is lexical.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: RefCell<BTreeMap<PathBuf, Vec<u8>>>,
    dirs: RefCell<BTreeSet<PathBuf>>,
    failing: RefCell<BTreeSet<PathBuf>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file (and its parent directories).
    pub fn with_file(self, path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> Self {
        let path = lexical_normalize(path.as_ref());
        if let Some(parent) = path.parent() {
            let _ = self.create_dir_all(parent);
        }
        self.files.borrow_mut().insert(path, data.as_ref().to_vec());
        self
    }

    pub fn with_dir(self, path: impl AsRef<Path>) -> Self {
        let _ = self.create_dir_all(path.as_ref());
        self
    }

    /// Make every write to `path` fail with an I/O error.
    pub fn fail_writes_to(self, path: impl AsRef<Path>) -> Self {
        self.failing.borrow_mut().insert(lexical_normalize(path.as_ref()));
        self
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files.borrow().get(&lexical_normalize(path.as_ref())).cloned()
    }

    pub fn read_string(&self, path: impl AsRef<Path>) -> Option<String> {
        self.read(path).and_then(|b| String::from_utf8(b).ok())
    }

    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.files.borrow().keys().cloned().collect()
    }
}

impl FsBackend for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        let p = lexical_normalize(path);
        self.files.borrow().contains_key(&p) || self.dirs.borrow().contains(&p)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.borrow().contains(&lexical_normalize(path))
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let p = lexical_normalize(path);
        if self.exists(&p) {
            Ok(p)
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, format!("{} not found", p.display())))
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let p = lexical_normalize(path);
        if let Some(file) = p.ancestors().find(|a| self.files.borrow().contains_key(*a)) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} is a file", file.display()),
            ));
        }
        let mut dirs = self.dirs.borrow_mut();
        for anc in p.ancestors() {
            if anc.as_os_str().is_empty() {
                break;
            }
            dirs.insert(anc.to_path_buf());
        }
        Ok(())
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let p = lexical_normalize(path);
        if self.failing.borrow().contains(&p) {
            return Err(io::Error::other(format!("simulated failure writing {}", p.display())));
        }
        if self.dirs.borrow().contains(&p) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} is a directory", p.display()),
            ));
        }
        match p.parent() {
            Some(parent) if self.is_dir(parent) => {}
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("parent of {} does not exist", p.display()),
                ));
            }
        }
        self.files.borrow_mut().insert(p, data.to_vec());
        Ok(())
    }
}

/// Answers questions from `inner` but only records writes. Used for
/// `--dry-run` so the report shows exactly what a real run would do.
#[derive(Debug)]
pub struct DryRunFs<'a, F: FsBackend> {
    inner: &'a F,
    planned_files: RefCell<BTreeSet<PathBuf>>,
    planned_dirs: RefCell<BTreeSet<PathBuf>>,
}

impl<'a, F: FsBackend> DryRunFs<'a, F> {
    pub fn new(inner: &'a F) -> Self {
        Self {
            inner,
            planned_files: RefCell::new(BTreeSet::new()),
            planned_dirs: RefCell::new(BTreeSet::new()),
        }
    }

    pub fn planned_writes(&self) -> Vec<PathBuf> {
        self.planned_files.borrow().iter().cloned().collect()
    }
}

impl<F: FsBackend> FsBackend for DryRunFs<'_, F> {
    fn exists(&self, path: &Path) -> bool {
        self.planned_files.borrow().contains(path)
            || self.planned_dirs.borrow().contains(path)
            || self.inner.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.planned_dirs.borrow().contains(path) || self.inner.is_dir(path)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        if self.inner.exists(path) {
            self.inner.canonicalize(path)
        } else if self.exists(path) {
            Ok(lexical_normalize(path))
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display())))
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut dirs = self.planned_dirs.borrow_mut();
        for anc in path.ancestors() {
            if anc.as_os_str().is_empty() || self.inner.is_dir(anc) {
                break;
            }
            dirs.insert(anc.to_path_buf());
        }
        Ok(())
    }

    fn write_atomic(&self, path: &Path, _data: &[u8]) -> io::Result<()> {
        if self.is_dir(path) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{} is a directory", path.display()),
            ));
        }
        self.planned_files.borrow_mut().insert(path.to_path_buf());
        Ok(())
    }
}
