// Queue file paths, open helpers, append-handle trait, and writer locking.
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use libc::{EACCES, EPERM, EROFS};

use crate::core::error::{Error, ErrorKind, StorageFault};

pub const INDEX_SUFFIX: &str = ".index";

/// The log/index file pair that makes up one queue.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueuePaths {
    pub log: PathBuf,
    pub index: PathBuf,
}

impl QueuePaths {
    pub fn new(name: impl AsRef<Path>) -> Result<Self, Error> {
        let log = name.as_ref().to_path_buf();
        if log.as_os_str().is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("queue name is empty"));
        }
        let mut index = OsString::from(log.as_os_str());
        index.push(INDEX_SUFFIX);
        Ok(Self {
            log,
            index: PathBuf::from(index),
        })
    }
}

/// Write side of the storage collaborator.
///
/// Appends go to the end of the handle. `truncate_to` is only used to roll
/// back the bytes of an append that failed part-way.
pub trait AppendHandle: Write + Seek {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;

    fn sync(&mut self) -> io::Result<()>;
}

impl AppendHandle for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

impl AppendHandle for Cursor<Vec<u8>> {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        let keep = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length overflow"))?;
        self.get_mut().truncate(keep);
        self.set_position(len);
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn open_append(path: &Path) -> Result<File, Error> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| open_error(path, err))
}

pub fn open_read(path: &Path) -> Result<File, Error> {
    File::open(path).map_err(|err| open_error(path, err))
}

pub fn file_len(file: &File, path: &Path) -> Result<u64, Error> {
    file.metadata()
        .map(|meta| meta.len())
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_fault(StorageFault::Io)
                .with_path(path)
                .with_source(err)
        })
}

/// Takes the advisory single-writer lock on `file` without blocking.
pub fn try_lock_writer(file: &File, path: &Path) -> Result<(), Error> {
    file.try_lock_exclusive().map_err(|err| {
        let kind = lock_error_kind(&err);
        let mut out = Error::new(kind).with_path(path);
        if kind == ErrorKind::Busy {
            out = out
                .with_message("queue is already open for writing")
                .with_hint("Only one writer may append to a queue at a time.");
        }
        out.with_source(err)
    })
}

pub fn unlock_writer(file: &File) {
    let _ = FileExt::unlock(file);
}

fn open_error(path: &Path, err: io::Error) -> Error {
    let kind = open_error_kind(&err);
    let mut out = Error::new(kind)
        .with_message("failed to open queue file")
        .with_path(path);
    if kind == ErrorKind::NotFound {
        out = out.with_hint("Write to the queue first; writers create missing files.");
    }
    out.with_source(err)
}

fn open_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM || errno == EROFS {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Open,
    }
}

fn lock_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::WouldBlock => ErrorKind::Busy,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Open,
    }
}

pub(crate) fn fault_of(err: &io::Error) -> StorageFault {
    match err.kind() {
        io::ErrorKind::WriteZero => StorageFault::ShortWrite,
        io::ErrorKind::UnexpectedEof => StorageFault::ShortRead,
        _ => StorageFault::Io,
    }
}

pub(crate) fn seek<S: Seek + ?Sized>(
    handle: &mut S,
    pos: SeekFrom,
    kind: ErrorKind,
) -> Result<u64, Error> {
    handle.seek(pos).map_err(|err| {
        Error::new(kind)
            .with_fault(StorageFault::Seek)
            .with_message(format!("seek to {pos:?} failed"))
            .with_source(err)
    })
}

pub(crate) fn write_exact<W: Write + ?Sized>(
    handle: &mut W,
    buf: &[u8],
    what: &str,
) -> Result<(), Error> {
    handle.write_all(buf).map_err(|err| {
        Error::new(ErrorKind::Write)
            .with_fault(fault_of(&err))
            .with_message(format!("failed to write {what}"))
            .with_source(err)
    })
}

/// Outcome of filling a buffer from a handle that may end early.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Fill {
    Full,
    Short(usize),
}

/// Reads until `buf` is full or the handle reports end of data.
pub(crate) fn fill<R: Read + ?Sized>(handle: &mut R, buf: &mut [u8]) -> Result<Fill, Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match handle.read(&mut buf[filled..]) {
            Ok(0) => return Ok(Fill::Short(filled)),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(Error::new(ErrorKind::Io)
                    .with_fault(StorageFault::Io)
                    .with_message("read failed")
                    .with_source(err));
            }
        }
    }
    Ok(Fill::Full)
}

/// Reads exactly `len` bytes, or reports how many were available.
pub(crate) fn read_payload<R: Read + ?Sized>(
    handle: &mut R,
    len: u64,
) -> Result<Result<Vec<u8>, u64>, Error> {
    let mut payload = Vec::new();
    let read = handle
        .take(len)
        .read_to_end(&mut payload)
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_fault(StorageFault::Io)
                .with_message("read failed")
                .with_source(err)
        })?;
    if (read as u64) < len {
        return Ok(Err(read as u64));
    }
    Ok(Ok(payload))
}
