use crate::capture::CaptureText;
use crate::sources::{Source, SourceError};

use std::path::PathBuf;

/// The roster and switch blocks in separate files, as received from the
/// target shell. The trailing prompt, if present, is dropped.
pub struct BlockSource {
    roster: PathBuf,
    switches: PathBuf,
    prompt: String,
}

impl BlockSource {
    pub fn new(roster: PathBuf, switches: PathBuf, prompt: &str) -> Self {
        Self {
            roster,
            switches,
            prompt: prompt.trim().to_string(),
        }
    }

    fn block(&self, text: &str) -> Vec<String> {
        let mut lines: Vec<String> = text.lines().map(String::from).collect();
        while lines
            .last()
            .map_or(false, |l| l.trim().is_empty() || l.trim() == self.prompt)
        {
            lines.pop();
        }
        lines
    }
}

impl Source for BlockSource {
    fn capture(&mut self) -> Result<CaptureText, SourceError> {
        Ok(CaptureText {
            roster: self.block(&super::read(&self.roster)?),
            switches: self.block(&super::read(&self.switches)?),
            viewport: None,
        })
    }

    fn describe(&self) -> String {
        format!(
            "blocks ({}, {})",
            self.roster.display(),
            self.switches.display()
        )
    }
}
