// Single-writer append path: log frame first, index entry second, rollback on failure.
use std::fs::File;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{self, INDEX_ENTRY_LEN};
use crate::core::storage::{self, AppendHandle, QueuePaths};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Durability {
    /// Leave flushing to the OS.
    #[default]
    Fast,
    /// `sync_data` both files after every append.
    Flush,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WriterOptions {
    pub durability: Durability,
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }
}

/// Where a successful append landed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Appended {
    pub seq: u64,
    pub offset: u64,
    pub len: u64,
}

struct WriterState<L, I> {
    log: L,
    index: I,
    next_seq: u64,
}

/// Appends records to a queue.
///
/// All appends from one process go through a single `Writer`; the internal
/// lock gives them a total order. Sequence numbers are positional, so the
/// `n`-th successful append is record `n - 1`.
pub struct Writer<L = File, I = File> {
    state: Mutex<WriterState<L, I>>,
    options: WriterOptions,
}

impl Writer<File, File> {
    /// Opens (creating if needed) the queue `name` and its `name.index`.
    pub fn open(name: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open_with(name, WriterOptions::default())
    }

    pub fn open_with(name: impl AsRef<Path>, options: WriterOptions) -> Result<Self, Error> {
        let paths = QueuePaths::new(name)?;
        let log = storage::open_append(&paths.log)?;
        let index = storage::open_append(&paths.index)?;
        storage::try_lock_writer(&index, &paths.index)?;

        let index_len = storage::file_len(&index, &paths.index)?;
        if index_len % INDEX_ENTRY_LEN != 0 {
            storage::unlock_writer(&index);
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("index length {index_len} is not a multiple of 8"))
                .with_path(&paths.index)
                .with_hint("The index ends in a partial entry; the queue needs manual repair."));
        }
        let next_seq = index_len / INDEX_ENTRY_LEN;
        debug!(log = %paths.log.display(), next_seq, "opened queue writer");

        Ok(Self::from_parts(log, index, next_seq, options))
    }

    /// Releases both handles and the writer lock.
    pub fn close(self) {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        storage::unlock_writer(&state.index);
    }
}

impl<L: AppendHandle, I: AppendHandle> Writer<L, I> {
    /// Builds a writer over caller-supplied handles.
    ///
    /// The index handle must hold whole entries; its length decides the
    /// next sequence number.
    pub fn from_handles(log: L, mut index: I, options: WriterOptions) -> Result<Self, Error> {
        let index_len = storage::seek(&mut index, SeekFrom::End(0), ErrorKind::Io)?;
        if index_len % INDEX_ENTRY_LEN != 0 {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("index length {index_len} is not a multiple of 8")));
        }
        Ok(Self::from_parts(log, index, index_len / INDEX_ENTRY_LEN, options))
    }

    fn from_parts(log: L, index: I, next_seq: u64, options: WriterOptions) -> Self {
        Self {
            state: Mutex::new(WriterState {
                log,
                index,
                next_seq,
            }),
            options,
        }
    }

    /// Appends `payload` and returns the number of payload bytes written.
    pub fn write(&self, payload: &[u8]) -> Result<usize, Error> {
        self.append(payload).map(|_| payload.len())
    }

    /// Appends `payload` and reports its sequence number and log offset.
    ///
    /// On failure nothing is indexed: the log is truncated back to where the
    /// frame started and any partial index entry is removed. Under
    /// `Durability::Flush` a failed sync is rolled back the same way.
    pub fn append(&self, payload: &[u8]) -> Result<Appended, Error> {
        let prefix = frame::encode_length(payload.len())?;
        let mut guard = self.lock();
        let state = &mut *guard;
        let seq = state.next_seq;

        let offset = storage::seek(&mut state.log, SeekFrom::End(0), ErrorKind::Write)
            .map_err(|err| err.with_seq(seq))?;
        let entry = frame::encode_offset(offset).map_err(|err| err.with_seq(seq))?;

        if let Err(err) = write_frame(&mut state.log, &prefix, payload) {
            rollback(&mut state.log, offset, "log");
            return Err(err.with_seq(seq).with_offset(offset));
        }

        let index_pos = match storage::seek(&mut state.index, SeekFrom::End(0), ErrorKind::Write) {
            Ok(pos) => pos,
            Err(err) => {
                rollback(&mut state.log, offset, "log");
                return Err(err.with_seq(seq).with_offset(offset));
            }
        };
        if let Err(err) = storage::write_exact(&mut state.index, &entry, "index entry") {
            rollback(&mut state.index, index_pos, "index");
            rollback(&mut state.log, offset, "log");
            return Err(err.with_seq(seq).with_offset(offset));
        }

        if self.options.durability == Durability::Flush {
            if let Err(err) = sync(&mut state.log).and_then(|_| sync(&mut state.index)) {
                rollback(&mut state.index, index_pos, "index");
                rollback(&mut state.log, offset, "log");
                return Err(err.with_seq(seq).with_offset(offset));
            }
        }

        state.next_seq += 1;
        let len = payload.len() as u64;
        debug!(seq, offset, len, "appended record");
        Ok(Appended { seq, offset, len })
    }

    /// Number of records appended so far, including ones present at open.
    pub fn len(&self) -> u64 {
        self.lock().next_seq
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the writer and hands back the underlying handles.
    pub fn into_handles(self) -> (L, I) {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        (state.log, state.index)
    }

    fn lock(&self) -> MutexGuard<'_, WriterState<L, I>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn write_frame<L: AppendHandle>(log: &mut L, prefix: &[u8; 8], payload: &[u8]) -> Result<(), Error> {
    storage::write_exact(log, prefix, "length prefix")?;
    storage::write_exact(log, payload, "payload")?;
    Ok(())
}

fn sync<H: AppendHandle>(handle: &mut H) -> Result<(), Error> {
    handle.sync().map_err(|err| {
        Error::new(ErrorKind::Write)
            .with_fault(storage::fault_of(&err))
            .with_message("sync failed")
            .with_source(err)
    })
}

fn rollback<H: AppendHandle>(handle: &mut H, len: u64, which: &str) {
    if let Err(err) = handle.truncate_to(len) {
        warn!(file = which, len, error = %err, "failed to roll back partial append");
    }
}
