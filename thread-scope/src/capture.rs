//! Reconstruction of a complete capture, from the raw line blocks to
//! the timeline handed to frontends.
use crate::config::ConfigProperties;
use crate::diag;
use crate::ingest::{IngestError, RecordIngester};
use crate::registry::{CaptureError, ThreadRegistry};
use crate::snapshot::Snapshot;
use crate::subtick;
use crate::synthesis::{self, IntervalSynthesizer};

use thiserror::Error;
use thread_scope_api::{ThreadTimeline, Timeline, Viewport, Window};

#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("Capture is inconsistent: {0}")]
    Corrupt(#[from] CaptureError),
}

impl diag::DiagnosableError for ReconstructionError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            Self::Ingest(e) => e.diagnose(),
            Self::Corrupt(e) => e.diagnose(),
        }
    }
}

/// The two line blocks printed by the target, and the viewport they
/// were last displayed with, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureText {
    pub roster: Vec<String>,
    pub switches: Vec<String>,
    pub viewport: Option<Viewport>,
}

impl From<Snapshot> for CaptureText {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            roster: snapshot.roster,
            switches: snapshot.switches,
            viewport: Some(snapshot.viewport),
        }
    }
}

/// A fully reconstructed capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    text: CaptureText,
    timeline: Timeline,
    notes: Vec<String>,
    deletions: usize,
}

impl Capture {
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Tolerated irregularities found during reconstruction.
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Number of thread deletions within the trace window.
    pub fn deletions(&self) -> usize {
        self.deletions
    }

    pub fn interval_count(&self) -> usize {
        self.timeline
            .threads
            .iter()
            .map(|t| t.data.drawables().count())
            .sum()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            viewport: self.timeline.viewport,
            roster: self.text.roster.clone(),
            switches: self.text.switches.clone(),
        }
    }
}

/// Runs ingestion, dispatch and synthesis on a fresh registry and
/// ledger.
pub fn reconstruct(
    text: CaptureText,
    config: &ConfigProperties,
) -> Result<Capture, ReconstructionError> {
    let ingester = RecordIngester::new(config);
    let roster = ingester.roster(&text.roster)?;
    let log = ingester.switches(&text.switches)?;
    let stepped = subtick::group(&log.records);

    // Threads deleted before the roster was requested are restored
    // first so that ordinals match those at the start of the trace.
    let (mut registry, mut ledger) = ThreadRegistry::from_roster(roster)?;
    ledger.replay_into(&mut registry)?;
    let report = registry.dispatch(&mut ledger, &stepped)?;
    let threads = registry.finish(ledger)?;

    let window = log
        .records
        .first()
        .zip(log.records.last())
        .map(|(first, last)| Window {
            start: first.timestamp,
            end: last.timestamp,
        });
    let synth = IntervalSynthesizer::new(window, config.tick_mark_divisor);

    let mut notes: Vec<String> = report
        .orphan_redirects
        .iter()
        .map(|ts| {
            format!(
                "switch at {} is from a deleted thread but no deletion precedes it",
                ts
            )
        })
        .collect();

    let mut threads: Vec<ThreadTimeline> = threads
        .into_iter()
        .enumerate()
        .map(|(i, thread)| {
            let data = synth.synthesize(&thread);
            ThreadTimeline {
                id: i + 1,
                has_visible_data: synthesis::has_visible_data(&data),
                name: thread.name,
                priority: thread.priority,
                logged: thread.logged,
                data,
            }
        })
        .collect();
    sort_by_priority(&mut threads);

    notes.extend(threads.iter().filter(|t| !t.has_visible_data).map(|t| {
        format!(
            "thread {} ({}) has no visible data in the trace window",
            t.id, t.name
        )
    }));

    let viewport = text
        .viewport
        .unwrap_or_else(|| default_viewport(window, threads.len()));

    Ok(Capture {
        timeline: Timeline {
            trigger: log.trigger,
            window,
            max_step_count: subtick::max_step_count(&stepped),
            viewport,
            threads,
        },
        text: CaptureText {
            viewport: Some(viewport),
            ..text
        },
        notes,
        deletions: report.deletions,
    })
}

/// Stable ascending sort by priority; equal priorities keep creation
/// order.
pub fn sort_by_priority(threads: &mut [ThreadTimeline]) {
    threads.sort_by_key(|t| t.priority);
}

fn default_viewport(window: Option<Window>, threads: usize) -> Viewport {
    let (x_min, x_max) = window
        .map(|w| (w.start as f64, w.end as f64))
        .unwrap_or((0.0, 1.0));
    Viewport {
        x_min,
        x_max,
        y_min: 0.0,
        y_max: threads as f64 + 1.0,
    }
}

/// Holds the most recent successfully reconstructed capture.
#[derive(Debug, Default)]
pub struct CaptureSession {
    current: Option<Capture>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstructs a capture and makes it current. On failure, the
    /// previous capture is left untouched.
    pub fn load(
        &mut self,
        text: CaptureText,
        config: &ConfigProperties,
    ) -> Result<&Capture, ReconstructionError> {
        let capture = reconstruct(text, config)?;
        Ok(self.current.insert(capture))
    }

    pub fn current(&self) -> Option<&Capture> {
        self.current.as_ref()
    }
}
