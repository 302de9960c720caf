//! A source from which a capture is read: a previously saved snapshot
//! or the two line blocks as received from the target shell.
use crate::capture::CaptureText;
use crate::diag;
use crate::snapshot::SnapshotError;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read {}: {1}", .0.display())]
    ReadFail(PathBuf, #[source] std::io::Error),
    #[error("Failed to load {}: {1}", .0.display())]
    SnapshotLoad(PathBuf, #[source] SnapshotError),
}

impl diag::DiagnosableError for SourceError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            Self::SnapshotLoad(_, e) => e.diagnose(),
            Self::ReadFail(_, _) => vec![],
        }
    }
}

pub trait Source {
    fn capture(&mut self) -> Result<CaptureText, SourceError>;
    fn describe(&self) -> String;
}

mod snapshot;
pub use snapshot::SnapshotSource;

mod blocks;
pub use blocks::BlockSource;

fn read(path: &std::path::Path) -> Result<String, SourceError> {
    std::fs::read_to_string(path).map_err(|e| SourceError::ReadFail(path.to_path_buf(), e))
}
