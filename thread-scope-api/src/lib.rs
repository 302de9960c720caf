//! API used between Thread Scope front- and backends.
//!
//! A backend reconstructs a [`Timeline`] from a captured thread roster
//! and context switch trace and forwards it, JSON-serialized, to any
//! number of frontends that render it.
use serde::{Deserialize, Serialize};

/// Device boot-relative time unit of the traced target.
pub type Tick = u64;

/// A drawable span on the time axis, in tick units.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub begin: f64,
    /// Always strictly positive.
    pub width: f64,
}

impl Interval {
    pub fn end(&self) -> f64 {
        self.begin + self.width
    }
}

/// First and last observed switch record timestamps of a capture.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: Tick,
    pub end: Tick,
}

/// Visible region of the plot: x-min, x-max, y-min, y-max.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// Everything a frontend needs to draw one capture.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Timeline {
    /// Operator-requested alignment point, if the target was triggered.
    pub trigger: Option<Tick>,

    /// Observed trace window. `None` if no switch records were captured.
    pub window: Option<Window>,

    /// Largest number of switches observed within a single tick. Used to
    /// decide the density of minor gridlines.
    pub max_step_count: u32,

    pub viewport: Viewport,

    /// Threads in presentation order.
    pub threads: Vec<ThreadTimeline>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ThreadTimeline {
    /// 1-based creation-order ordinal of the thread.
    pub id: usize,
    pub name: String,
    pub priority: i64,
    /// Whether both entry and exit of every scheduling interval were
    /// logged.
    pub logged: bool,
    pub has_visible_data: bool,
    pub data: ThreadData,
}

/// Synthesized drawables of a thread. The variant depends on whether the
/// thread was fully or partially logged on target.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ThreadData {
    Logged {
        /// Scheduling intervals during which the thread ran.
        intervals: Vec<Interval>,

        /// Span from the thread's deletion to the end of the trace
        /// window.
        exit_marker: Option<Interval>,

        /// Span from the start of the trace window until the thread was
        /// first observed.
        no_data_prefix: Option<Interval>,
    },
    Partial {
        /// Short marks at which the thread was switched in.
        in_ticks: Vec<Interval>,

        /// Short marks at which the thread was switched out.
        out_ticks: Vec<Interval>,

        exit_marker: Option<Interval>,
        no_data_prefix: Option<Interval>,
    },
}

impl ThreadData {
    pub fn exit_marker(&self) -> Option<&Interval> {
        match self {
            Self::Logged { exit_marker, .. } | Self::Partial { exit_marker, .. } => {
                exit_marker.as_ref()
            }
        }
    }

    pub fn no_data_prefix(&self) -> Option<&Interval> {
        match self {
            Self::Logged { no_data_prefix, .. } | Self::Partial { no_data_prefix, .. } => {
                no_data_prefix.as_ref()
            }
        }
    }

    /// Iterates over all drawables of the thread: intervals or tick
    /// marks, followed by the markers.
    pub fn drawables(&self) -> impl Iterator<Item = &Interval> {
        let marks: Box<dyn Iterator<Item = &Interval>> = match self {
            Self::Logged { intervals, .. } => Box::new(intervals.iter()),
            Self::Partial {
                in_ticks,
                out_ticks,
                ..
            } => Box::new(in_ticks.iter().chain(out_ticks.iter())),
        };
        marks
            .chain(self.exit_marker())
            .chain(self.no_data_prefix())
    }
}
