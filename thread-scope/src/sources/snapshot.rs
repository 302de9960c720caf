use crate::capture::CaptureText;
use crate::config::ConfigProperties;
use crate::snapshot::Snapshot;
use crate::sources::{Source, SourceError};

use std::path::PathBuf;

/// A capture saved by [`crate::sinks::SnapshotSink`].
pub struct SnapshotSource {
    path: PathBuf,
    config: ConfigProperties,
}

impl SnapshotSource {
    pub fn new(path: PathBuf, config: &ConfigProperties) -> Self {
        Self {
            path,
            config: config.clone(),
        }
    }
}

impl Source for SnapshotSource {
    fn capture(&mut self) -> Result<CaptureText, SourceError> {
        let text = super::read(&self.path)?;
        let snapshot = Snapshot::decode(&text, &self.config)
            .map_err(|e| SourceError::SnapshotLoad(self.path.clone(), e))?;
        Ok(snapshot.into())
    }

    fn describe(&self) -> String {
        format!("snapshot ({})", self.path.display())
    }
}
