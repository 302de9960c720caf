//! Parsing of the raw line blocks printed by the target shell into a
//! thread roster and a log of context switch records.
use crate::config::ConfigProperties;
use crate::diag;
use crate::Tick;

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// 1-based position of a thread in the target's list of threads at the
/// time a record was written.
pub type Ordinal = usize;

/// Line that separates live threads from deleted threads in the roster.
pub const DELETED_SEPARATOR: &str = "Deleted threads:";

static ROSTER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Thread number\s*(\d+)\s*:\s*Prio\s*=\s*(-?\d+)\s*,\s*Log\s*=\s*(Yes|No)\s*,\s*Name\s*=\s?(.*)$")
        .expect("roster line regex")
});
static TRIGGER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Triggered at\s*(\d+)$").expect("trigger line regex"));
static SWITCH_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^From\s*(\d+)\s+to\s*(\d+)\s+at\s*(\d+)$").expect("switch line regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    Roster,
    Switches,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Roster => write!(f, "thread roster"),
            Self::Switches => write!(f, "context switch"),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed {block} block: {}", describe_line(.line, .lines))]
    ProtocolFormat {
        block: Block,
        /// Index of the offending line in `lines`. Equals `lines.len()`
        /// if an expected line is missing.
        line: usize,
        /// The raw block, as received.
        lines: Vec<String>,
    },
}

fn describe_line(line: &usize, lines: &[String]) -> String {
    match lines.get(*line) {
        Some(text) => format!("line {} does not have the expected shape: {:?}", line + 1, text),
        None => "expected header line is missing".to_string(),
    }
}

impl IngestError {
    fn format(block: Block, line: usize, lines: &[String]) -> Self {
        Self::ProtocolFormat {
            block,
            line,
            lines: lines.to_vec(),
        }
    }

    /// The raw lines of the block that failed to parse, and the index of
    /// the offending line.
    pub fn raw_lines(&self) -> (&[String], Option<usize>) {
        let Self::ProtocolFormat { line, lines, .. } = self;
        (lines, Some(*line).filter(|l| *l < lines.len()))
    }
}

impl diag::DiagnosableError for IngestError {
    fn diagnose(&self) -> Vec<String> {
        let Self::ProtocolFormat { block, .. } = self;
        match block {
            Block::Roster => vec![
                "Roster lines are expected on the form `Thread number NN : Prio = PPP, Log = Yes|No, Name = <name>`, optionally followed by a `Deleted threads:` line and more such lines.".to_string(),
            ],
            Block::Switches => vec![
                "Switch lines are expected on the form `From NN to NN at TTTTTTT`, optionally preceded by a single `Triggered at TTTTTTT` line.".to_string(),
            ],
        }
    }
}

/// A thread as listed by the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// Position of the thread in the target's thread list. For deleted
    /// threads, the position it had when it was deleted.
    pub ordinal: Ordinal,
    pub priority: i64,
    pub logged: bool,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    /// Live threads, in creation order.
    pub active: Vec<RosterEntry>,
    /// Threads deleted during the trace window, oldest deletion first.
    pub deleted: Vec<RosterEntry>,
}

/// A single context switch as logged by the target. Equal thread
/// ordinals denote the deletion of that thread; an `out_thread` of 0
/// denotes the thread deleted in the preceding record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchRecord {
    pub out_thread: Ordinal,
    pub in_thread: Ordinal,
    pub timestamp: Tick,
}

impl SwitchRecord {
    pub fn is_deletion(&self) -> bool {
        self.out_thread == self.in_thread
    }

    pub fn is_redirect(&self) -> bool {
        self.out_thread == 0 && !self.is_deletion()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchLog {
    pub trigger: Option<Tick>,
    /// Records in ascending timestamp order. Records sharing a
    /// timestamp retain the order they were received in.
    pub records: Vec<SwitchRecord>,
}

/// Parses the roster and switch blocks. Headers are identified by the
/// configured header substrings.
pub struct RecordIngester<'a> {
    config: &'a ConfigProperties,
}

impl<'a> RecordIngester<'a> {
    pub fn new(config: &'a ConfigProperties) -> Self {
        Self { config }
    }

    pub fn roster(&self, lines: &[String]) -> Result<Roster, IngestError> {
        let fail = |line| IngestError::format(Block::Roster, line, lines);
        let data = self
            .data_lines(lines, &self.config.roster_header)
            .map_err(fail)?;

        let mut roster = Roster::default();
        let mut deleted = false;
        for (i, line) in data {
            if line == DELETED_SEPARATOR {
                if deleted {
                    return Err(fail(i));
                }
                deleted = true;
                continue;
            }

            let entry = Self::roster_entry(line).ok_or_else(|| fail(i))?;
            if deleted {
                roster.deleted.push(entry);
            } else {
                roster.active.push(entry);
            }
        }

        Ok(roster)
    }

    pub fn switches(&self, lines: &[String]) -> Result<SwitchLog, IngestError> {
        let fail = |line| IngestError::format(Block::Switches, line, lines);
        let mut data = self
            .data_lines(lines, &self.config.switch_header)
            .map_err(fail)?
            .peekable();

        let mut log = SwitchLog::default();
        if let Some(&(i, line)) = data.peek() {
            if let Some(caps) = TRIGGER_LINE.captures(line) {
                log.trigger = Some(caps[1].parse().map_err(|_| fail(i))?);
                data.next();
            }
        }

        for (i, line) in data {
            let record = SWITCH_LINE
                .captures(line)
                .and_then(|caps| {
                    Some(SwitchRecord {
                        out_thread: caps[1].parse().ok()?,
                        in_thread: caps[2].parse().ok()?,
                        timestamp: caps[3].parse().ok()?,
                    })
                })
                .ok_or_else(|| fail(i))?;
            log.records.push(record);
        }

        // NOTE(stable): some producers interleave timestamps; equal
        // timestamps must keep their received order.
        log.records.sort_by_key(|r| r.timestamp);

        Ok(log)
    }

    /// Validates the header line of a block and returns the remaining
    /// non-blank lines, trimmed, along with their index in the block.
    fn data_lines<'l>(
        &self,
        lines: &'l [String],
        header: &str,
    ) -> Result<impl Iterator<Item = (usize, &'l str)>, usize> {
        let mut lines = lines
            .iter()
            .map(|l| l.trim())
            .enumerate()
            .filter(|(_, l)| !l.is_empty());

        match lines.next() {
            Some((_, first)) if first.contains(header) => Ok(lines),
            Some((i, _)) => Err(i),
            None => Err(0),
        }
    }

    fn roster_entry(line: &str) -> Option<RosterEntry> {
        let caps = ROSTER_LINE.captures(line)?;
        Some(RosterEntry {
            ordinal: caps[1].parse().ok()?,
            priority: caps[2].parse().ok()?,
            logged: &caps[3] == "Yes",
            name: caps[4].trim().to_string(),
        })
    }
}
