//! Reconstruction of per-thread execution timelines from the thread
//! roster and context switch log printed by an embedded target shell.
pub mod capture;
pub mod config;
pub mod diag;
pub mod ingest;
pub mod log;
pub mod registry;
pub mod sinks;
pub mod snapshot;
pub mod sources;
pub mod subtick;
pub mod synthesis;

pub use thread_scope_api as api;

/// Target timer tick.
pub type Tick = api::Tick;

pub use capture::{Capture, CaptureSession, CaptureText, ReconstructionError};
