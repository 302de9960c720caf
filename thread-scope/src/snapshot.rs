//! Text format in which a capture is saved for later replay: the
//! viewport of the plot followed by the roster and switch blocks as
//! they were received from the target shell.
use crate::config::ConfigProperties;
use crate::diag;

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;
use thread_scope_api::Viewport;

pub const SAVED_POSITION_HEADER: &str = "Saved position";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    SavedPosition,
    Roster,
    Switches,
    Prompt,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SavedPosition => write!(f, "saved position"),
            Self::Roster => write!(f, "thread roster"),
            Self::Switches => write!(f, "context switch"),
            Self::Prompt => write!(f, "terminating prompt"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("Unrecognized snapshot file: {0} section is missing")]
    MissingSection(Section),
    #[error("Unrecognized snapshot file: {0} section is out of place")]
    MisplacedSection(Section),
    #[error("Unrecognized snapshot file: {0} of 4 viewport bounds found")]
    MissingViewport(usize),
    #[error("Unrecognized snapshot file: viewport bound {:?} is not a number", .0)]
    InvalidViewport(String),
}

impl diag::DiagnosableError for SnapshotError {
    fn diagnose(&self) -> Vec<String> {
        vec![format!(
            "A snapshot starts with a `{}` line and four numbers, followed by the thread roster block, the context switch block, and the shell prompt.",
            SAVED_POSITION_HEADER
        )]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub viewport: Viewport,
    /// Roster block including its header line.
    pub roster: Vec<String>,
    /// Switch block including its header line.
    pub switches: Vec<String>,
}

impl Snapshot {
    pub fn encode(&self, prompt: &str) -> String {
        let Viewport {
            x_min,
            x_max,
            y_min,
            y_max,
        } = self.viewport;

        let mut out = format!(
            "{}\n{}\n{}\n{}\n{}\n",
            SAVED_POSITION_HEADER, x_min, x_max, y_min, y_max
        );
        for line in self.roster.iter().chain(self.switches.iter()) {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(prompt);
        out.push('\n');
        out
    }

    /// Locates each section by its header. Blank lines are ignored.
    pub fn decode(text: &str, config: &ConfigProperties) -> Result<Self, SnapshotError> {
        let lines: Vec<&str> = text
            .lines()
            .map(|l| l.trim_end())
            .filter(|l| !l.trim().is_empty())
            .collect();

        let prompt = config.prompt.trim();
        let find = |section, pos: Option<usize>| {
            pos.map(|p| (section, p))
                .ok_or(SnapshotError::MissingSection(section))
        };
        let sections: IndexMap<Section, usize> = [
            find(
                Section::SavedPosition,
                lines.iter().position(|l| l.contains(SAVED_POSITION_HEADER)),
            ),
            find(
                Section::Roster,
                lines.iter().position(|l| l.contains(&config.roster_header)),
            ),
            find(
                Section::Switches,
                lines.iter().position(|l| l.contains(&config.switch_header)),
            ),
            find(
                Section::Prompt,
                lines.iter().rposition(|l| l.trim_start().starts_with(prompt)),
            ),
        ]
        .into_iter()
        .collect::<Result<_, _>>()?;

        // Sections must follow each other in the order listed above.
        let mut prev = None;
        for (section, &pos) in sections.iter() {
            if prev.map_or(false, |p| pos <= p) {
                return Err(SnapshotError::MisplacedSection(*section));
            }
            prev = Some(pos);
        }

        let saved = sections[&Section::SavedPosition];
        let roster = sections[&Section::Roster];
        let switches = sections[&Section::Switches];
        let end = sections[&Section::Prompt];

        let bounds = &lines[saved + 1..roster];
        if bounds.len() != 4 {
            return Err(SnapshotError::MissingViewport(bounds.len()));
        }
        let bounds = bounds
            .iter()
            .map(|b| {
                b.trim()
                    .parse::<f64>()
                    .map_err(|_| SnapshotError::InvalidViewport(b.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let owned = |range: &[&str]| range.iter().map(|l| l.to_string()).collect();
        Ok(Self {
            viewport: Viewport {
                x_min: bounds[0],
                x_max: bounds[1],
                y_min: bounds[2],
                y_max: bounds[3],
            },
            roster: owned(&lines[roster..switches]),
            switches: owned(&lines[switches..end]),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot {
            viewport: Viewport {
                x_min: 0.1,
                x_max: 1234.5678901234567,
                y_min: -3.0,
                y_max: 1e-7,
            },
            roster: vec![
                "threads_list".into(),
                "Thread number  1 : Prio = 128, Log = Yes, Name = main".into(),
                "Deleted threads:".into(),
            ],
            switches: vec![
                "threads_timestamps".into(),
                "Triggered at     900".into(),
                "From  1 to  1 at     950".into(),
            ],
        }
    }

    #[test]
    fn encoded_snapshot_decodes_identically() {
        let config = ConfigProperties::default();
        let snapshot = snapshot();
        let text = snapshot.encode(&config.prompt);
        assert!(text.starts_with("Saved position\n0.1\n"));
        assert_eq!(Snapshot::decode(&text, &config).unwrap(), snapshot);
    }

    #[test]
    fn blank_lines_and_carriage_returns_are_tolerated() {
        let config = ConfigProperties::default();
        let text = "\r\nSaved position\r\n\r\n1\r\n2\r\n3\r\n4\r\n\r\nthreads_list\r\n\r\nThread number  1 : Prio =   1, Log = Yes, Name = a\r\n\r\nthreads_timestamps\r\nFrom  1 to  1 at 4\r\n\r\nch> \r\n";
        let snapshot = Snapshot::decode(text, &config).unwrap();
        assert_eq!(snapshot.viewport.y_max, 4.0);
        assert_eq!(snapshot.roster.len(), 2);
        assert_eq!(snapshot.switches, vec!["threads_timestamps", "From  1 to  1 at 4"]);
    }

    #[test]
    fn missing_pieces_are_unrecognized() {
        let config = ConfigProperties::default();
        let text = snapshot().encode(&config.prompt);

        let without_prompt = text.replace("ch>", "");
        assert_eq!(
            Snapshot::decode(&without_prompt, &config),
            Err(SnapshotError::MissingSection(Section::Prompt))
        );

        let without_switches = text.replace("threads_timestamps", "");
        assert_eq!(
            Snapshot::decode(&without_switches, &config),
            Err(SnapshotError::MissingSection(Section::Switches))
        );

        let short_viewport = text.replacen("0.1\n", "", 1);
        assert_eq!(
            Snapshot::decode(&short_viewport, &config),
            Err(SnapshotError::MissingViewport(3))
        );

        let garbled = text.replacen("0.1\n", "zero\n", 1);
        assert_eq!(
            Snapshot::decode(&garbled, &config),
            Err(SnapshotError::InvalidViewport("zero".into()))
        );

        assert_eq!(
            Snapshot::decode("", &config),
            Err(SnapshotError::MissingSection(Section::SavedPosition))
        );
    }

    #[test]
    fn sections_out_of_order() {
        let config = ConfigProperties::default();
        let text = "Saved position\n1\n2\n3\n4\nthreads_timestamps\nthreads_list\nch>\n";
        assert_eq!(
            Snapshot::decode(text, &config),
            Err(SnapshotError::MisplacedSection(Section::Switches))
        );
    }
}
