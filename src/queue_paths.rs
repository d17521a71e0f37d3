//! Purpose: Resolve CLI queue refs to log paths.
//! Exports: `resolve_queue_path`, `QueueNameResolveError`.
//! Role: Keep named-queue lookup in one place for every command.
//! Invariants: Refs containing a path separator are used as paths verbatim.
//! Invariants: A ref naming the index file itself is rejected.

use std::path::{Path, PathBuf};

use fq::api::INDEX_SUFFIX;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum QueueNameResolveError {
    Empty,
    IndexFile,
}

pub(crate) fn resolve_queue_path(
    name: &str,
    queue_dir: &Path,
) -> Result<PathBuf, QueueNameResolveError> {
    if name.is_empty() {
        return Err(QueueNameResolveError::Empty);
    }
    if name.ends_with(INDEX_SUFFIX) {
        return Err(QueueNameResolveError::IndexFile);
    }
    if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        return Ok(PathBuf::from(name));
    }
    Ok(queue_dir.join(name))
}
