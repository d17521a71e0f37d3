// Random-access reads: resolve seq through the index, then read the framed record.
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace, warn};

use crate::core::error::{Error, ErrorKind, StorageFault};
use crate::core::frame::{self, INDEX_ENTRY_LEN, LENGTH_PREFIX_LEN};
use crate::core::storage::{self, Fill, QueuePaths};

struct ReaderState<L, I> {
    log: L,
    index: I,
    cursor: u64,
}

/// Reads records from a queue by sequence number.
///
/// Each reader owns its handles and cursor. Calls on one reader are
/// serialized internally; separate readers need no coordination with each
/// other or with the writer.
pub struct Reader<L = File, I = File> {
    state: Mutex<ReaderState<L, I>>,
}

impl Reader<File, File> {
    pub fn open(name: impl AsRef<Path>) -> Result<Self, Error> {
        let paths = QueuePaths::new(name)?;
        let log = storage::open_read(&paths.log)?;
        let index = storage::open_read(&paths.index)?;
        debug!(log = %paths.log.display(), "opened queue reader");
        Ok(Self::from_handles(log, index))
    }

    pub fn close(self) {
        drop(self);
    }
}

impl<L: Read + Seek, I: Read + Seek> Reader<L, I> {
    pub fn from_handles(log: L, index: I) -> Self {
        Self {
            state: Mutex::new(ReaderState {
                log,
                index,
                cursor: 0,
            }),
        }
    }

    /// The next sequence number `read` will return.
    pub fn offset(&self) -> u64 {
        self.lock().cursor
    }

    /// Reads the record at the cursor and advances it.
    ///
    /// Returns `EndOfStream` once the reader has caught up with the writer.
    pub fn read(&self) -> Result<Vec<u8>, Error> {
        let mut state = self.lock();
        let payload = read_record(&mut *state)?;
        state.cursor += 1;
        Ok(payload)
    }

    /// Reads record `seq`; on success the cursor moves to `seq + 1`.
    ///
    /// A failed read leaves the cursor where it was.
    pub fn read_at(&self, seq: u64) -> Result<Vec<u8>, Error> {
        let mut state = self.lock();
        let original = state.cursor;
        state.cursor = seq;
        match read_record(&mut *state) {
            Ok(payload) => {
                state.cursor = seq + 1;
                Ok(payload)
            }
            Err(err) => {
                state.cursor = original;
                Err(err)
            }
        }
    }

    /// Number of complete index entries currently visible.
    pub fn len(&self) -> Result<u64, Error> {
        let mut state = self.lock();
        let index_len = storage::seek(&mut state.index, SeekFrom::End(0), ErrorKind::Io)?;
        Ok(index_len / INDEX_ENTRY_LEN)
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    pub fn into_handles(self) -> (L, I) {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        (state.log, state.index)
    }

    fn lock(&self) -> MutexGuard<'_, ReaderState<L, I>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_record<L: Read + Seek, I: Read + Seek>(
    state: &mut ReaderState<L, I>,
) -> Result<Vec<u8>, Error> {
    let seq = state.cursor;
    let offset = log_offset(&mut state.index, seq)?;

    storage::seek(&mut state.log, SeekFrom::Start(offset), ErrorKind::Io)
        .map_err(|err| err.with_seq(seq).with_offset(offset))?;

    let mut prefix = [0u8; LENGTH_PREFIX_LEN as usize];
    match storage::fill(&mut state.log, &mut prefix) {
        Ok(Fill::Full) => {}
        Ok(Fill::Short(got)) => {
            return Err(corrupt(seq, offset, format!("length prefix truncated after {got} bytes")));
        }
        Err(err) => return Err(err.with_seq(seq).with_offset(offset)),
    }
    let len = frame::decode_length(prefix).map_err(|err| {
        warn!(seq, offset, "negative record length");
        err.with_seq(seq).with_offset(offset)
    })?;

    match storage::read_payload(&mut state.log, len) {
        Ok(Ok(payload)) => Ok(payload),
        Ok(Err(got)) => Err(corrupt(
            seq,
            offset,
            format!("payload truncated: expected {len} bytes, found {got}"),
        )),
        Err(err) => Err(err.with_seq(seq).with_offset(offset)),
    }
}

/// Resolves `seq` to the log offset stored in its index entry.
fn log_offset<I: Read + Seek>(index: &mut I, seq: u64) -> Result<u64, Error> {
    let Some(pos) = frame::index_position(seq) else {
        return Err(end_of_stream(seq));
    };
    storage::seek(index, SeekFrom::Start(pos), ErrorKind::Io).map_err(|err| err.with_seq(seq))?;

    let mut entry = [0u8; INDEX_ENTRY_LEN as usize];
    match storage::fill(index, &mut entry).map_err(|err| err.with_seq(seq))? {
        Fill::Full => {}
        Fill::Short(_) => return Err(end_of_stream(seq)),
    }
    frame::decode_offset(entry).map_err(|err| {
        warn!(seq, "negative index entry");
        err.with_seq(seq)
    })
}

fn end_of_stream(seq: u64) -> Error {
    trace!(seq, "end of stream");
    Error::new(ErrorKind::EndOfStream)
        .with_message("no record at this sequence number")
        .with_seq(seq)
}

fn corrupt(seq: u64, offset: u64, message: String) -> Error {
    warn!(seq, offset, %message, "corrupt frame");
    Error::new(ErrorKind::Corrupt)
        .with_fault(StorageFault::ShortRead)
        .with_message(message)
        .with_seq(seq)
        .with_offset(offset)
        .with_hint("The index points past the end of the log (dangling index entry).")
}
