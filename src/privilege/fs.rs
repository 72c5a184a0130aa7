//! Filesystem capability used by the privilege writer and fragment reader.
//!
//! All host mutations go through [`HostFs`] so the permission modes and exact
//! bytes can be asserted against [`MemoryFs`] without touching a real disk.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub trait HostFs: Send + Sync {
    /// Create `path` and any missing parent with `mode`.
    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Create or truncate `path` and write `contents`, leaving the file with `mode`.
    fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Names of the direct children of `path`. Children are not inspected.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Whether `path` is a directory, following symlinks.
    fn is_dir(&self, path: &Path) -> io::Result<bool>;
}

/// The real host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl HostFs for OsFs {
    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::DirBuilder::new().recursive(true).mode(mode).create(path)
    }

    fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        // A stale file keeps its old mode through truncation.
        file.set_permissions(fs::Permissions::from_mode(mode))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        fs::read_dir(path)?
            .map(|entry| Ok(entry?.file_name().to_string_lossy().into_owned()))
            .collect()
    }

    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        Ok(fs::metadata(path)?.is_dir())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Dir { mode: u32 },
    File { contents: Vec<u8>, mode: u32 },
}

/// In-memory filesystem tree. Paths are used verbatim, so callers should
/// stick to absolute, already normalized paths.
#[derive(Debug, Default)]
pub struct MemoryFs {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn nodes(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Node>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a file, creating its parent directories with mode `0o755`.
    pub fn insert_file(&self, path: impl AsRef<Path>, contents: &str) {
        let path = path.as_ref();
        let mut nodes = self.nodes();
        if let Some(parent) = path.parent() {
            insert_dirs(&mut nodes, parent, 0o755);
        }
        nodes.insert(
            path.to_path_buf(),
            Node::File {
                contents: contents.as_bytes().to_vec(),
                mode: 0o644,
            },
        );
    }

    pub fn insert_dir(&self, path: impl AsRef<Path>) {
        insert_dirs(&mut self.nodes(), path.as_ref(), 0o755);
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.nodes().contains_key(path.as_ref())
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        match self.nodes().get(path.as_ref()) {
            Some(Node::File { contents, .. }) => Some(String::from_utf8_lossy(contents).into_owned()),
            _ => None,
        }
    }

    /// Mode of a file or directory.
    pub fn mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        match self.nodes().get(path.as_ref()) {
            Some(Node::File { mode, .. }) | Some(Node::Dir { mode }) => Some(*mode),
            None => None,
        }
    }

    /// Every file path currently stored, in lexical order.
    pub fn files(&self) -> Vec<PathBuf> {
        self.nodes()
            .iter()
            .filter(|(_, node)| matches!(node, Node::File { .. }))
            .map(|(path, _)| path.clone())
            .collect()
    }
}

fn insert_dirs(nodes: &mut BTreeMap<PathBuf, Node>, path: &Path, mode: u32) {
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() {
            continue;
        }
        nodes
            .entry(ancestor.to_path_buf())
            .or_insert(Node::Dir { mode });
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file or directory", path.display()),
    )
}

fn require_parent_dir(nodes: &BTreeMap<PathBuf, Node>, path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Ok(()),
        Some(parent) => match nodes.get(parent) {
            Some(Node::Dir { .. }) => Ok(()),
            Some(Node::File { .. }) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: not a directory", parent.display()),
            )),
            None => Err(not_found(parent)),
        },
        None => Ok(()),
    }
}

impl HostFs for MemoryFs {
    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut nodes = self.nodes();
        for ancestor in path.ancestors() {
            if let Some(Node::File { .. }) = nodes.get(ancestor) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{}: file exists", ancestor.display()),
                ));
            }
        }
        insert_dirs(&mut nodes, path, mode);
        Ok(())
    }

    fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
        let mut nodes = self.nodes();
        require_parent_dir(&nodes, path)?;
        if let Some(Node::Dir { .. }) = nodes.get(path) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: is a directory", path.display()),
            ));
        }
        nodes.insert(
            path.to_path_buf(),
            Node::File {
                contents: contents.to_vec(),
                mode,
            },
        );
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut nodes = self.nodes();
        require_parent_dir(&nodes, to)?;
        match nodes.get(to) {
            Some(Node::Dir { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{}: is a directory", to.display()),
                ))
            }
            Some(Node::File { .. }) | None => {}
        }
        match nodes.remove(from) {
            Some(node @ Node::File { .. }) => {
                nodes.insert(to.to_path_buf(), node);
                Ok(())
            }
            Some(dir) => {
                nodes.insert(from.to_path_buf(), dir);
                Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{}: renaming directories is not supported", from.display()),
                ))
            }
            None => Err(not_found(from)),
        }
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes();
        match nodes.get(path) {
            Some(Node::File { .. }) => {
                nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir { .. }) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: is a directory", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        match self.nodes().get(path) {
            Some(Node::File { contents, .. }) => String::from_utf8(contents.clone())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Some(Node::Dir { .. }) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}: is a directory", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let nodes = self.nodes();
        match nodes.get(path) {
            Some(Node::Dir { .. }) => {}
            Some(Node::File { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{}: not a directory", path.display()),
                ))
            }
            None => return Err(not_found(path)),
        }
        Ok(nodes
            .keys()
            .filter(|child| child.parent() == Some(path))
            .filter_map(|child| Some(child.file_name()?.to_string_lossy().into_owned()))
            .collect())
    }

    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        match self.nodes().get(path) {
            Some(node) => Ok(matches!(node, Node::Dir { .. })),
            None => Err(not_found(path)),
        }
    }
}
