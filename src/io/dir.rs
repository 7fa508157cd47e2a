//! # Directory listing
//!
//! The directory backend follows the same open/iterate/close lifecycle as a
//! byte source, but yields one [`DirEntry`] per child of the opened
//! directory. It never recurses.
//!
//! ```rust,no_run
//! use avpipe::io::dir::{open_directory, DirOptions};
//! use avpipe::logging::Logger;
//!
//! # fn main() -> avpipe::Result<()> {
//! let mut dir = open_directory("/media/clips", DirOptions::default(), Logger::global())?;
//! while let Some(entry) = dir.next_entry()? {
//!     println!("{:?} {} {:?}", entry.kind, entry.name, entry.size);
//! }
//! dir.close();
//! # Ok(())
//! # }
//! ```

use crate::logging::{self, Logger};
use crate::{AvError, Result};
use chrono::{DateTime, Utc};
use std::fs::{FileType, Metadata};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Type of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirEntryKind {
    /// Type could not be determined
    Unknown,
    /// Block device
    BlockDevice,
    /// Character device
    CharacterDevice,
    /// Directory
    Directory,
    /// FIFO
    NamedPipe,
    /// Symbolic link (only when links are not followed)
    SymbolicLink,
    /// Unix domain socket
    Socket,
    /// Regular file
    File,
    /// Network server (remote backends only)
    Server,
    /// Network share (remote backends only)
    Share,
    /// Workgroup (remote backends only)
    Workgroup,
}

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File name without the directory part
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// Entry type
    pub kind: DirEntryKind,
    /// Size in bytes, when known
    pub size: Option<u64>,
    /// Owning user id
    pub user_id: Option<u32>,
    /// Owning group id
    pub group_id: Option<u32>,
    /// Unix permission bits. `None` means the platform does not report them.
    pub permissions: Option<u32>,
    /// Modification time, Unix epoch microseconds
    pub modified: Option<i64>,
    /// Access time, Unix epoch microseconds
    pub accessed: Option<i64>,
    /// Status change time, Unix epoch microseconds
    pub status_changed: Option<i64>,
}

impl DirEntry {
    /// Modification time as a UTC timestamp.
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified.and_then(DateTime::from_timestamp_micros)
    }

    /// Access time as a UTC timestamp.
    pub fn accessed_at(&self) -> Option<DateTime<Utc>> {
        self.accessed.and_then(DateTime::from_timestamp_micros)
    }

    /// Status change time as a UTC timestamp.
    pub fn status_changed_at(&self) -> Option<DateTime<Utc>> {
        self.status_changed.and_then(DateTime::from_timestamp_micros)
    }

    /// Returns true for hidden (dot) entries.
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

/// Listing options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirOptions {
    /// Report the targets of symbolic links instead of the links
    pub follow_links: bool,
    /// Yield entries sorted by file name
    pub sort_by_name: bool,
    /// Include names starting with a dot
    pub include_hidden: bool,
}

impl Default for DirOptions {
    fn default() -> Self {
        Self {
            follow_links: false,
            sort_by_name: true,
            include_hidden: true,
        }
    }
}

/// An open directory listing.
pub struct DirHandle {
    root: PathBuf,
    entries: walkdir::IntoIter,
    options: DirOptions,
    logger: Logger,
}

/// Opens `path` for listing. Fails if it does not exist or is not a directory.
pub fn open_directory(path: impl AsRef<Path>, options: DirOptions, logger: Logger) -> Result<DirHandle> {
    let root = path.as_ref().to_path_buf();
    let metadata = std::fs::metadata(&root).map_err(|e| AvError::resource_io(&root, e))?;
    if !metadata.is_dir() {
        return Err(AvError::resource_io(
            &root,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }
    let mut walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(options.follow_links);
    if options.sort_by_name {
        walker = walker.sort_by_file_name();
    }
    logging::av_debug!(logger, "Listing directory {}", root.display());
    Ok(DirHandle {
        entries: walker.into_iter(),
        root,
        options,
        logger,
    })
}

impl DirHandle {
    /// Directory being listed.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Next entry, or `None` when the listing is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<DirEntry>> {
        loop {
            let entry = match self.entries.next() {
                None => return Ok(None),
                Some(Ok(entry)) => entry,
                Some(Err(err)) => return Err(walk_error(&self.root, err)),
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.options.include_hidden && name.starts_with('.') {
                logging::av_trace!(self.logger, "Skipping hidden entry {}", name);
                continue;
            }
            let metadata = entry.metadata().ok();
            return Ok(Some(build_entry(
                name,
                entry.path().to_path_buf(),
                entry.file_type(),
                metadata.as_ref(),
            )));
        }
    }

    /// Ends the listing and releases the handle.
    pub fn close(self) {
        logging::av_trace!(self.logger, "Closed directory {}", self.root.display());
    }
}

impl Iterator for DirHandle {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

fn walk_error(root: &Path, err: walkdir::Error) -> AvError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop"));
    AvError::resource_io(path, source)
}

fn entry_kind(file_type: FileType) -> DirEntryKind {
    if file_type.is_symlink() {
        return DirEntryKind::SymbolicLink;
    }
    if file_type.is_dir() {
        return DirEntryKind::Directory;
    }
    if file_type.is_file() {
        return DirEntryKind::File;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if file_type.is_block_device() {
            return DirEntryKind::BlockDevice;
        }
        if file_type.is_char_device() {
            return DirEntryKind::CharacterDevice;
        }
        if file_type.is_fifo() {
            return DirEntryKind::NamedPipe;
        }
        if file_type.is_socket() {
            return DirEntryKind::Socket;
        }
    }
    DirEntryKind::Unknown
}

#[cfg(unix)]
fn build_entry(name: String, path: PathBuf, file_type: FileType, metadata: Option<&Metadata>) -> DirEntry {
    use std::os::unix::fs::MetadataExt;

    let micros = |secs: i64, nanos: i64| secs * 1_000_000 + nanos / 1_000;
    DirEntry {
        name,
        path,
        kind: entry_kind(file_type),
        size: metadata.map(|m| m.len()),
        user_id: metadata.map(|m| m.uid()),
        group_id: metadata.map(|m| m.gid()),
        permissions: metadata.map(|m| m.mode() & 0o7777),
        modified: metadata.map(|m| micros(m.mtime(), m.mtime_nsec())),
        accessed: metadata.map(|m| micros(m.atime(), m.atime_nsec())),
        status_changed: metadata.map(|m| micros(m.ctime(), m.ctime_nsec())),
    }
}

#[cfg(not(unix))]
fn build_entry(name: String, path: PathBuf, file_type: FileType, metadata: Option<&Metadata>) -> DirEntry {
    let micros = |time: std::io::Result<std::time::SystemTime>| {
        let since = time.ok()?.duration_since(std::time::UNIX_EPOCH).ok()?;
        i64::try_from(since.as_micros()).ok()
    };
    DirEntry {
        name,
        path,
        kind: entry_kind(file_type),
        size: metadata.map(|m| m.len()),
        user_id: None,
        group_id: None,
        permissions: None,
        modified: metadata.and_then(|m| micros(m.modified())),
        accessed: metadata.and_then(|m| micros(m.accessed())),
        status_changed: None,
    }
}
