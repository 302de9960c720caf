//! Bookkeeping of the threads of a capture while switch records are
//! dispatched to them.
//!
//! Records refer to threads by their position in the target's thread
//! list at the time the record was written. That position shifts each
//! time a thread is deleted. Descriptors are therefore stored in an
//! arena under a permanent [`ThreadKey`] while [`ThreadRegistry`] maps
//! the current positions to keys and [`DeletionLedger`] remembers the
//! position each deleted thread had. Replaying the ledger in reverse
//! deletion order restores the creation order of all threads.
use crate::diag;
use crate::ingest::{Ordinal, Roster, RosterEntry};
use crate::subtick::{Step, SteppedRecord};
use crate::Tick;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Record at {timestamp} refers to thread {ordinal} but only {active} thread(s) are active")]
    OrdinalOutOfRange {
        ordinal: Ordinal,
        active: usize,
        timestamp: Tick,
    },
    #[error("Deleted thread cannot be restored at position {ordinal}: only {active} thread(s) are active")]
    RestoreOutOfRange { ordinal: Ordinal, active: usize },
    #[error("Deletion ledger is empty")]
    EmptyLedger,
    #[error("Roster lists thread {found} at position {expected}")]
    RosterOrdinal { expected: Ordinal, found: Ordinal },
}

impl diag::DiagnosableError for CaptureError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            Self::OrdinalOutOfRange { .. } | Self::RestoreOutOfRange { .. } => vec![
                "The roster and the switch records were likely requested at different times, or threads were created or deleted in between.".to_string(),
                "Request both blocks again without letting the target run in between.".to_string(),
            ],
            Self::RosterOrdinal { .. } => {
                vec!["Live threads are expected to be numbered 1, 2, ... in listing order.".to_string()]
            }
            _ => vec![],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The thread was switched in.
    In,
    /// The thread was switched out.
    Out,
    /// The thread was deleted.
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub timestamp: Tick,
    pub kind: EventKind,
    pub step: Step,
}

impl RawEvent {
    pub fn is_closing(&self) -> bool {
        matches!(self.kind, EventKind::Out | EventKind::Exit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadDescriptor {
    pub name: String,
    pub priority: i64,
    pub logged: bool,
    /// Events in dispatch order.
    pub events: Vec<RawEvent>,
}

impl From<RosterEntry> for ThreadDescriptor {
    fn from(entry: RosterEntry) -> Self {
        Self {
            name: entry.name,
            priority: entry.priority,
            logged: entry.logged,
            events: vec![],
        }
    }
}

/// Permanent identity of a descriptor within a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadKey(usize);

/// Threads that are currently alive, in target list order.
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    arena: Vec<ThreadDescriptor>,
    active: Vec<ThreadKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LedgerEntry {
    key: ThreadKey,
    /// Position the thread had when it was deleted.
    ordinal: Ordinal,
}

/// Threads removed from the registry, most recently deleted on top.
#[derive(Debug, Default)]
pub struct DeletionLedger {
    stack: Vec<LedgerEntry>,
}

/// Outcome of a dispatch that did not abort the capture.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub deletions: usize,
    /// Timestamps of redirect records that did not follow a deletion.
    pub orphan_redirects: Vec<Tick>,
}

impl ThreadRegistry {
    /// Builds the registry from the live threads of a roster and seeds a
    /// ledger with its deleted threads.
    pub fn from_roster(roster: Roster) -> Result<(Self, DeletionLedger), CaptureError> {
        let mut registry = Self::default();
        let mut ledger = DeletionLedger::default();

        for (i, entry) in roster.active.into_iter().enumerate() {
            if entry.ordinal != i + 1 {
                return Err(CaptureError::RosterOrdinal {
                    expected: i + 1,
                    found: entry.ordinal,
                });
            }
            let key = registry.alloc(entry.into());
            registry.active.push(key);
        }

        for entry in roster.deleted {
            let ordinal = entry.ordinal;
            let key = registry.alloc(entry.into());
            ledger.push(key, ordinal);
        }

        Ok((registry, ledger))
    }

    fn alloc(&mut self, descriptor: ThreadDescriptor) -> ThreadKey {
        self.arena.push(descriptor);
        ThreadKey(self.arena.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    fn key_at(&self, ordinal: Ordinal, timestamp: Tick) -> Result<ThreadKey, CaptureError> {
        ordinal
            .checked_sub(1)
            .and_then(|i| self.active.get(i))
            .copied()
            .ok_or(CaptureError::OrdinalOutOfRange {
                ordinal,
                active: self.len(),
                timestamp,
            })
    }

    pub fn get(&self, ordinal: Ordinal) -> Option<&ThreadDescriptor> {
        ordinal
            .checked_sub(1)
            .and_then(|i| self.active.get(i))
            .map(|key| &self.arena[key.0])
    }

    fn push_event(
        &mut self,
        ordinal: Ordinal,
        kind: EventKind,
        timestamp: Tick,
        step: Step,
    ) -> Result<(), CaptureError> {
        let key = self.key_at(ordinal, timestamp)?;
        self.arena[key.0].events.push(RawEvent {
            timestamp,
            kind,
            step,
        });
        Ok(())
    }

    fn remove(&mut self, ordinal: Ordinal, timestamp: Tick) -> Result<ThreadKey, CaptureError> {
        let key = self.key_at(ordinal, timestamp)?;
        self.active.remove(ordinal - 1);
        Ok(key)
    }

    fn restore(&mut self, entry: LedgerEntry) -> Result<(), CaptureError> {
        if entry.ordinal == 0 || entry.ordinal > self.len() + 1 {
            return Err(CaptureError::RestoreOutOfRange {
                ordinal: entry.ordinal,
                active: self.len(),
            });
        }
        self.active.insert(entry.ordinal - 1, entry.key);
        Ok(())
    }

    /// Appends the events of each record to the threads it concerns.
    ///
    /// A deletion record moves its thread onto the ledger after tagging
    /// it with an exit event. A redirect record, whose out side was the
    /// thread deleted just before, only produces an in event.
    pub fn dispatch(
        &mut self,
        ledger: &mut DeletionLedger,
        records: &[SteppedRecord],
    ) -> Result<DispatchReport, CaptureError> {
        let mut report = DispatchReport::default();
        let mut after_deletion = false;

        for SteppedRecord { record, step } in records {
            let ts = record.timestamp;

            if record.is_deletion() {
                self.push_event(record.out_thread, EventKind::Exit, ts, *step)?;
                let key = self.remove(record.out_thread, ts)?;
                ledger.push(key, record.out_thread);
                report.deletions += 1;
                after_deletion = true;
                continue;
            }

            if record.is_redirect() {
                if !after_deletion {
                    report.orphan_redirects.push(ts);
                }
            } else {
                self.push_event(record.out_thread, EventKind::Out, ts, *step)?;
            }
            self.push_event(record.in_thread, EventKind::In, ts, *step)?;
            after_deletion = false;
        }

        Ok(report)
    }

    /// Replays the ledger and yields all descriptors in creation order.
    pub fn finish(
        mut self,
        mut ledger: DeletionLedger,
    ) -> Result<Vec<ThreadDescriptor>, CaptureError> {
        ledger.replay_into(&mut self)?;

        let mut slots: Vec<Option<ThreadDescriptor>> = self.arena.into_iter().map(Some).collect();
        Ok(self
            .active
            .iter()
            .filter_map(|key| slots[key.0].take())
            .collect())
    }
}

impl DeletionLedger {
    pub fn push(&mut self, key: ThreadKey, ordinal: Ordinal) {
        self.stack.push(LedgerEntry { key, ordinal });
    }

    fn pop(&mut self) -> Result<LedgerEntry, CaptureError> {
        self.stack.pop().ok_or(CaptureError::EmptyLedger)
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Reinserts every deleted thread at the position it was deleted
    /// from, most recent deletion first. Returns the number of restored
    /// threads.
    pub fn replay_into(&mut self, registry: &mut ThreadRegistry) -> Result<usize, CaptureError> {
        let mut restored = 0;
        while !self.is_empty() {
            let entry = self.pop()?;
            registry.restore(entry)?;
            restored += 1;
        }
        Ok(restored)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ingest::SwitchRecord;
    use crate::subtick;

    fn entry(ordinal: Ordinal, name: &str) -> RosterEntry {
        RosterEntry {
            ordinal,
            priority: 10,
            logged: true,
            name: name.to_string(),
        }
    }

    fn records(raw: &[(Ordinal, Ordinal, Tick)]) -> Vec<SteppedRecord> {
        let records: Vec<_> = raw
            .iter()
            .map(|&(out_thread, in_thread, timestamp)| SwitchRecord {
                out_thread,
                in_thread,
                timestamp,
            })
            .collect();
        subtick::group(&records)
    }

    fn names(threads: &[ThreadDescriptor]) -> Vec<&str> {
        threads.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn deletion_then_redirect() {
        let roster = Roster {
            active: vec![entry(1, "a"), entry(2, "b"), entry(3, "c")],
            deleted: vec![],
        };
        let (mut registry, mut ledger) = ThreadRegistry::from_roster(roster).unwrap();

        let report = registry
            .dispatch(&mut ledger, &records(&[(2, 2, 10), (0, 1, 12)]))
            .unwrap();
        assert_eq!(report.deletions, 1);
        assert!(report.orphan_redirects.is_empty());
        assert_eq!(registry.len(), 2);
        assert_eq!(ledger.len(), 1);
        assert_eq!(registry.get(2).unwrap().name, "c");

        let threads = registry.finish(ledger).unwrap();
        assert_eq!(names(&threads), vec!["a", "b", "c"]);

        let kinds: Vec<_> = threads[1].events.iter().map(|e| (e.timestamp, e.kind)).collect();
        assert_eq!(kinds, vec![(10, EventKind::Exit)]);
        let kinds: Vec<_> = threads[0].events.iter().map(|e| (e.timestamp, e.kind)).collect();
        assert_eq!(kinds, vec![(12, EventKind::In)]);
    }

    #[test]
    fn replay_restores_creation_order() {
        // Threads a..e were created in order; b was deleted, then d
        // (which had moved to position 3).
        let roster = Roster {
            active: vec![entry(1, "a"), entry(2, "c"), entry(3, "e")],
            deleted: vec![entry(2, "b"), entry(3, "d")],
        };
        let (mut registry, mut ledger) = ThreadRegistry::from_roster(roster).unwrap();
        assert_eq!(ledger.replay_into(&mut registry).unwrap(), 2);

        let seen: Vec<_> = (1..=5).map(|o| registry.get(o).unwrap().name.clone()).collect();
        assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);

        // Deleting them again in the logged order and finishing yields
        // the same order as a capture without deletions.
        registry
            .dispatch(&mut ledger, &records(&[(2, 2, 3), (0, 3, 3), (3, 3, 8), (0, 1, 9)]))
            .unwrap();
        assert_eq!(registry.len(), 3);
        let threads = registry.finish(ledger).unwrap();
        assert_eq!(names(&threads), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn out_of_range_is_corrupt() {
        let roster = Roster {
            active: vec![entry(1, "a"), entry(2, "b")],
            deleted: vec![],
        };
        let (mut registry, mut ledger) = ThreadRegistry::from_roster(roster).unwrap();
        assert_eq!(
            registry.dispatch(&mut ledger, &records(&[(1, 3, 4)])),
            Err(CaptureError::OrdinalOutOfRange {
                ordinal: 3,
                active: 2,
                timestamp: 4
            })
        );

        let (mut registry, mut ledger) = ThreadRegistry::from_roster(Roster {
            active: vec![entry(1, "a")],
            deleted: vec![],
        })
        .unwrap();
        assert!(matches!(
            registry.dispatch(&mut ledger, &records(&[(0, 0, 1)])),
            Err(CaptureError::OrdinalOutOfRange { ordinal: 0, .. })
        ));
    }

    #[test]
    fn empty_ledger_pop() {
        let mut ledger = DeletionLedger::default();
        assert_eq!(ledger.pop(), Err(CaptureError::EmptyLedger));
    }

    #[test]
    fn deleted_thread_beyond_registry() {
        let roster = Roster {
            active: vec![entry(1, "a")],
            deleted: vec![entry(5, "z")],
        };
        let (mut registry, mut ledger) = ThreadRegistry::from_roster(roster).unwrap();
        assert_eq!(
            ledger.replay_into(&mut registry),
            Err(CaptureError::RestoreOutOfRange {
                ordinal: 5,
                active: 1
            })
        );
    }

    #[test]
    fn roster_must_be_numbered_in_order() {
        let roster = Roster {
            active: vec![entry(1, "a"), entry(3, "b")],
            deleted: vec![],
        };
        assert_eq!(
            ThreadRegistry::from_roster(roster).unwrap_err(),
            CaptureError::RosterOrdinal {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn orphan_redirect_is_reported() {
        let roster = Roster {
            active: vec![entry(1, "a"), entry(2, "b")],
            deleted: vec![],
        };
        let (mut registry, mut ledger) = ThreadRegistry::from_roster(roster).unwrap();
        let report = registry
            .dispatch(&mut ledger, &records(&[(0, 2, 4), (2, 1, 6)]))
            .unwrap();
        assert_eq!(report.orphan_redirects, vec![4]);
        assert_eq!(registry.get(2).unwrap().events.len(), 2);
    }
}
