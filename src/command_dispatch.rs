//! Purpose: Hold top-level CLI command dispatch for `fq`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every queue access goes through `api::Writer` or `api::Reader`.
//! Invariants: Reaching the end of a queue during `read` is success, not an error.

use std::fs;
use std::io::Read;
use std::path::Path;

use bstr::ByteSlice;
use clap::CommandFactory;
use fq::api::{Durability, QueuePaths, Reader, Writer, WriterOptions, INDEX_SUFFIX};
use serde::Serialize;

use super::*;
use crate::queue_paths::{resolve_queue_path, QueueNameResolveError};

#[derive(Debug, Serialize)]
struct QueueStat {
    queue: String,
    log: String,
    index: String,
    records: u64,
    log_bytes: u64,
    index_bytes: u64,
}

pub(super) fn dispatch_command(command: Command, queue_dir: PathBuf) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "fq", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Write {
            queue,
            data,
            file,
            lines,
            durability,
        } => {
            let path = resolve_queue(&queue, &queue_dir)?;
            let records = collect_records(data, file.as_deref(), lines)?;
            let durability = match durability {
                DurabilityCli::Fast => Durability::Fast,
                DurabilityCli::Flush => Durability::Flush,
            };
            let writer = Writer::open_with(&path, WriterOptions::new().with_durability(durability))?;
            for record in &records {
                let appended = writer.append(record)?;
                emit_line(json!({
                    "seq": appended.seq,
                    "offset": appended.offset,
                    "bytes": appended.len,
                }));
            }
            writer.close();
            Ok(RunOutcome::ok())
        }
        Command::Read { queue, from, count } => {
            let path = resolve_queue(&queue, &queue_dir)?;
            let reader = Reader::open(&path)?;
            let limit = count.unwrap_or(u64::MAX);
            let mut seq = from.unwrap_or(0);
            let mut emitted = 0u64;
            while emitted < limit {
                let result = if emitted == 0 {
                    reader.read_at(seq)
                } else {
                    reader.read()
                };
                match result {
                    Ok(payload) => {
                        emit_line(record_json(seq, &payload));
                        emitted += 1;
                        seq += 1;
                    }
                    Err(err) if err.is_end_of_stream() => break,
                    Err(err) => return Err(err),
                }
            }
            reader.close();
            Ok(RunOutcome::ok())
        }
        Command::Get { queue, seq } => {
            let path = resolve_queue(&queue, &queue_dir)?;
            let reader = Reader::open(&path)?;
            let payload = reader.read_at(seq)?;
            emit_json(record_json(seq, &payload));
            Ok(RunOutcome::ok())
        }
        Command::Stat { queue } => {
            let path = resolve_queue(&queue, &queue_dir)?;
            let paths = QueuePaths::new(&path)?;
            let reader = Reader::open(&path)?;
            let stat = QueueStat {
                queue,
                log: paths.log.display().to_string(),
                index: paths.index.display().to_string(),
                records: reader.len()?,
                log_bytes: file_size(&paths.log)?,
                index_bytes: file_size(&paths.index)?,
            };
            let value = serde_json::to_value(&stat).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode stat")
                    .with_source(err)
            })?;
            emit_json(value);
            Ok(RunOutcome::ok())
        }
    }
}

fn resolve_queue(queue: &str, queue_dir: &Path) -> Result<PathBuf, Error> {
    resolve_queue_path(queue, queue_dir).map_err(|err| match err {
        QueueNameResolveError::Empty => Error::new(ErrorKind::Usage).with_message("queue name is empty"),
        QueueNameResolveError::IndexFile => Error::new(ErrorKind::Usage)
            .with_message("queue ref names an index file")
            .with_hint(format!("Pass the log name without the {INDEX_SUFFIX} suffix.")),
    })
}

/// DATA args become one record each; otherwise file or stdin, split by line with `--lines`.
fn collect_records(data: Vec<String>, file: Option<&Path>, lines: bool) -> Result<Vec<Vec<u8>>, Error> {
    if !data.is_empty() {
        return Ok(data.into_iter().map(String::into_bytes).collect());
    }

    let input = match file.filter(|path| *path != Path::new("-")) {
        Some(path) => fs::read(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read input file")
                .with_path(path)
                .with_source(err)
        })?,
        None => {
            let mut stdin = io::stdin();
            if file.is_none() && stdin.is_terminal() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("no records to write")
                    .with_hint("Pass DATA arguments, --file, or pipe input on stdin."));
            }
            let mut buf = Vec::new();
            stdin.read_to_end(&mut buf).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read stdin")
                    .with_source(err)
            })?;
            buf
        }
    };

    if lines {
        return Ok(input.lines().map(<[u8]>::to_vec).collect());
    }
    Ok(vec![input])
}

fn record_json(seq: u64, payload: &[u8]) -> Value {
    json!({
        "seq": seq,
        "bytes": payload.len(),
        "data": payload.to_str_lossy(),
    })
}

fn file_size(path: &Path) -> Result<u64, Error> {
    fs::metadata(path).map(|meta| meta.len()).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to stat queue file")
            .with_path(path)
            .with_source(err)
    })
}

#[cfg(test)]
mod tests {
    use super::{collect_records, record_json};
    use std::io::Write;

    #[test]
    fn data_args_are_one_record_each() {
        let records = collect_records(vec!["a".into(), "bc".into()], None, true).expect("records");
        assert_eq!(records, vec![b"a".to_vec(), b"bc".to_vec()]);
    }

    #[test]
    fn file_input_splits_on_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("input.txt");
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(b"one\r\ntwo\nthree\n").expect("write");

        let records = collect_records(Vec::new(), Some(path.as_path()), true).expect("records");
        assert_eq!(records, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);

        let whole = collect_records(Vec::new(), Some(path.as_path()), false).expect("records");
        assert_eq!(whole, vec![b"one\r\ntwo\nthree\n".to_vec()]);
    }

    #[test]
    fn record_json_decodes_lossily() {
        let value = record_json(4, b"ok\xff");
        assert_eq!(value["seq"], 4);
        assert_eq!(value["bytes"], 3);
        assert_eq!(value["data"], "ok\u{fffd}");
    }
}
