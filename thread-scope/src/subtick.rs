//! Spreading of context switches that share a timestamp across that
//! tick.
//!
//! The target timer is coarse enough that several switches may be
//! logged with an identical timestamp. Each such switch is assigned a
//! step within the group so that it can be drawn at a fraction of the
//! tick instead of on top of the others.
use crate::ingest::SwitchRecord;

/// Position of a switch among the switches that share its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// 0-based position within the group. Always less than `count`.
    pub index: u32,
    /// Size of the group.
    pub count: u32,
}

impl Step {
    /// Offset into the tick at which this step begins.
    pub fn shift(&self) -> f64 {
        self.index as f64 / self.count as f64
    }

    /// Width of a single step of this group.
    pub fn fraction(&self) -> f64 {
        1.0 / self.count as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SteppedRecord {
    pub record: SwitchRecord,
    pub step: Step,
}

/// Partitions records, sorted by timestamp, into runs of equal
/// timestamp and steps each record within its run.
pub fn group(records: &[SwitchRecord]) -> Vec<SteppedRecord> {
    records
        .chunk_by(|a, b| a.timestamp == b.timestamp)
        .flat_map(|run| {
            let count = run.len() as u32;
            run.iter().enumerate().map(move |(i, record)| SteppedRecord {
                record: *record,
                step: Step {
                    index: i as u32,
                    count,
                },
            })
        })
        .collect()
}

/// Largest group observed, or 0 if there are no records.
pub fn max_step_count(records: &[SteppedRecord]) -> u32 {
    records.iter().map(|r| r.step.count).max().unwrap_or(0)
}
