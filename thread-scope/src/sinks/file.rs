//! A simple file sink which saves a capture as a snapshot. Used for
//! replay functionality.
use crate::capture::Capture;
use crate::sinks::{Sink, SinkError};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::prelude::*;

const SNAPSHOT_FILE_EXT: &str = ".snapshot";

pub struct SnapshotSink {
    file: fs::File,
    path: PathBuf,
    prompt: String,
}

impl SnapshotSink {
    pub fn generate_snapshot_file(
        snapshot_dir: &Path,
        prompt: &str,
        remove_prev_snapshots: bool,
    ) -> Result<Self, SinkError> {
        if remove_prev_snapshots && snapshot_dir.is_dir() {
            for snapshot in find_snapshot_files(snapshot_dir)? {
                fs::remove_file(&snapshot).map_err(|e| {
                    SinkError::SetupIOError(
                        Some(format!(
                            "Failed to remove previous snapshot {}",
                            snapshot.display()
                        )),
                        e,
                    )
                })?;
            }
        }

        // e.g. "capture-2021-06-16T17:13:16.042.snapshot"
        let date = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
        let stem = format!("capture-{}", date);

        fs::create_dir_all(snapshot_dir).map_err(|e| {
            SinkError::SetupIOError(
                Some(format!(
                    "Failed to create snapshot directory {}",
                    snapshot_dir.display()
                )),
                e,
            )
        })?;
        let (file, path) = create_unique(snapshot_dir, &stem).map_err(|e| {
            SinkError::SetupIOError(
                Some(format!(
                    "Failed to create snapshot {}",
                    snapshot_dir.join(&stem).display()
                )),
                e,
            )
        })?;

        Ok(Self {
            file,
            path,
            prompt: prompt.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for SnapshotSink {
    fn drain(&mut self, capture: &Capture) -> Result<(), SinkError> {
        let text = capture.snapshot().encode(&self.prompt);
        self.file
            .write_all(text.as_bytes())
            .map_err(SinkError::DrainIOError)
    }

    fn describe(&self) -> String {
        format!("snapshot sink: {}", self.path.display())
    }
}

/// Creates `<stem>.snapshot` in `dir`, or `<stem>_<n>.snapshot` with the
/// first free `n` if that name is taken.
fn create_unique(dir: &Path, stem: &str) -> std::io::Result<(fs::File, PathBuf)> {
    let mut n = 0;
    loop {
        let path = match n {
            0 => dir.join(format!("{}{}", stem, SNAPSHOT_FILE_EXT)),
            n => dir.join(format!("{}_{}{}", stem, n, SNAPSHOT_FILE_EXT)),
        };
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}

/// ls `*.snapshot` in given path, oldest name first.
pub fn find_snapshot_files(path: &Path) -> Result<Vec<PathBuf>, SinkError> {
    let read_err = |e| {
        SinkError::SetupIOError(
            Some(format!("Failed to read snapshot directory {}", path.display())),
            e,
        )
    };

    let mut snapshots = vec![];
    for entry in fs::read_dir(path).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if entry.file_type().map_err(read_err)?.is_file()
            && entry
                .file_name()
                .to_string_lossy()
                .ends_with(SNAPSHOT_FILE_EXT)
        {
            snapshots.push(entry.path());
        }
    }
    snapshots.sort();

    Ok(snapshots)
}
