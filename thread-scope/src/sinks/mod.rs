//! A sink to which reconstructed [`Capture`]s are forwarded, for
//! rendering or for later replay.
use crate::capture::Capture;
use crate::diag;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to setup sink during I/O:{} {1}", { if let Some(s) = .0 {
        format!(" {}:", s)
    } else {
        "".to_string()
    }})]
    SetupIOError(Option<String>, #[source] std::io::Error),
    #[error("Failed to serialize timeline: {0}")]
    DrainSerError(#[from] serde_json::Error),
    #[error("Failed to drain capture on I/O: {0}")]
    DrainIOError(#[source] std::io::Error),
}

impl diag::DiagnosableError for SinkError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            Self::DrainIOError(_) => {
                vec!["The receiving end may have exited; check its output above.".to_string()]
            }
            _ => vec![],
        }
    }
}

pub mod file;
pub use file::SnapshotSink;

mod frontend;
pub use frontend::FrontendSink;

pub trait Sink {
    fn drain(&mut self, capture: &Capture) -> Result<(), SinkError>;
    fn describe(&self) -> String;
}
