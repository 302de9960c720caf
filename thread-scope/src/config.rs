//! Configuration of the host-side tooling. Properties are read from a
//! `thread-scope.toml` and may be overridden on the command line.
use crate::diag;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use structopt::StructOpt;
use thiserror::Error;

/// Name of the configuration file looked up in the working directory
/// when none is explicitly given.
pub const CONFIG_FILE_NAME: &str = "thread-scope.toml";

#[derive(StructOpt, Debug, Default)]
pub struct ConfigOptions {
    /// Fraction of a subtick that a switch mark of a partially logged
    /// thread occupies, expressed as its divisor.
    #[structopt(long = "tick-mark-divisor")]
    pub tick_mark_divisor: Option<u32>,

    /// Substring that identifies the header line of the thread roster
    /// block.
    #[structopt(long = "roster-header")]
    pub roster_header: Option<String>,

    /// Substring that identifies the header line of the context switch
    /// block.
    #[structopt(long = "switch-header")]
    pub switch_header: Option<String>,

    /// Shell prompt printed by the target after each command.
    #[structopt(long = "prompt")]
    pub prompt: Option<String>,

    /// Directory where snapshots are saved and looked up.
    #[structopt(long = "snapshot-dir", parse(from_os_str))]
    pub snapshot_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct ConfigPropertiesIntermediate {
    pub tick_mark_divisor: Option<u32>,
    pub roster_header: Option<String>,
    pub switch_header: Option<String>,
    pub prompt: Option<String>,
    pub snapshot_dir: Option<PathBuf>,
}

impl ConfigPropertiesIntermediate {
    pub fn complete_with(&mut self, other: Self) {
        macro_rules! complete {
            ($($f:ident),+) => {{
                $(
                    if self.$f.is_none() {
                        self.$f = other.$f;
                    }
                )+
            }}
        }
        complete!(
            tick_mark_divisor,
            roster_header,
            switch_header,
            prompt,
            snapshot_dir
        );
    }

    fn defaults() -> Self {
        Self {
            tick_mark_divisor: Some(3),
            roster_header: Some("threads_list".into()),
            switch_header: Some("threads_timestamps".into()),
            prompt: Some("ch>".into()),
            snapshot_dir: Some("thread-scope-snapshots".into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigProperties {
    pub tick_mark_divisor: u32,
    pub roster_header: String,
    pub switch_header: String,
    pub prompt: String,
    pub snapshot_dir: PathBuf,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {}: {1}", .0.display())]
    ReadFail(PathBuf, #[source] std::io::Error),
    #[error("Configuration file could not be deserialized: {0}")]
    DeserializationFailed(#[from] toml::de::Error),
    #[error("Configuration tick_mark_divisor must be at least 1")]
    ZeroDivisor,
    #[error("Configuration {0} must not be empty")]
    EmptyToken(&'static str),
}

impl diag::DiagnosableError for ConfigError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            Self::ZeroDivisor => vec![format!(
                "Set `tick_mark_divisor = <n>` with n >= 1 in {} or specify --tick-mark-divisor",
                CONFIG_FILE_NAME
            )],
            Self::EmptyToken(key) => vec![format!(
                "Set `{} = \"...\"` to a non-empty string in {} or remove it to use the default",
                key, CONFIG_FILE_NAME
            )],
            Self::DeserializationFailed(_) => vec![
                "Recognized keys are tick_mark_divisor, roster_header, switch_header, prompt and snapshot_dir".into(),
            ],
            _ => vec![],
        }
    }
}

impl TryFrom<ConfigPropertiesIntermediate> for ConfigProperties {
    type Error = ConfigError;

    fn try_from(mut int: ConfigPropertiesIntermediate) -> Result<Self, Self::Error> {
        int.complete_with(ConfigPropertiesIntermediate::defaults());

        let token = |value: Option<String>, key: &'static str| match value {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(ConfigError::EmptyToken(key)),
        };

        Ok(ConfigProperties {
            tick_mark_divisor: match int.tick_mark_divisor {
                Some(0) | None => return Err(ConfigError::ZeroDivisor),
                Some(d) => d,
            },
            roster_header: token(int.roster_header, "roster_header")?,
            switch_header: token(int.switch_header, "switch_header")?,
            prompt: token(int.prompt, "prompt")?,
            snapshot_dir: int.snapshot_dir.unwrap_or_default(),
        })
    }
}

impl Default for ConfigProperties {
    fn default() -> Self {
        // NOTE(unwrap): defaults are always valid
        Self::try_from(ConfigPropertiesIntermediate::default()).unwrap()
    }
}

impl ConfigProperties {
    /// Reads the configuration file at `path`, or `thread-scope.toml` in
    /// the working directory if it exists, and applies eventual command
    /// line overrides.
    pub fn new(path: Option<&Path>, opts: Option<&ConfigOptions>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(CONFIG_FILE_NAME)).filter(|p| p.is_file()),
        };

        let mut int = match path {
            Some(path) => {
                let src =
                    fs::read_to_string(&path).map_err(|e| ConfigError::ReadFail(path.clone(), e))?;
                Self::parse(&src)?
            }
            None => ConfigPropertiesIntermediate::default(),
        };

        if let Some(opts) = opts {
            macro_rules! maybe_override {
                ($($f:ident),+) => {{
                    $(
                        if let Some($f) = &opts.$f {
                            int.$f = Some($f.to_owned());
                        }
                    )+
                }}
            }
            maybe_override!(
                tick_mark_divisor,
                roster_header,
                switch_header,
                prompt,
                snapshot_dir
            );
        }

        Self::try_from(int)
    }

    fn parse(src: &str) -> Result<ConfigPropertiesIntermediate, ConfigError> {
        Ok(toml::from_str(src)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = ConfigProperties::default();
        assert_eq!(config.tick_mark_divisor, 3);
        assert_eq!(config.roster_header, "threads_list");
        assert_eq!(config.switch_header, "threads_timestamps");
        assert_eq!(config.prompt, "ch>");
    }

    #[test]
    fn file_is_completed_with_defaults() {
        let int = ConfigProperties::parse("tick_mark_divisor = 2\nprompt = \"nsh>\"\n").unwrap();
        let config = ConfigProperties::try_from(int).unwrap();
        assert_eq!(config.tick_mark_divisor, 2);
        assert_eq!(config.prompt, "nsh>");
        assert_eq!(config.roster_header, "threads_list");
    }

    #[test]
    fn options_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "tick_mark_divisor = 2\n").unwrap();

        let opts = ConfigOptions {
            tick_mark_divisor: Some(4),
            ..ConfigOptions::default()
        };
        let config = ConfigProperties::new(Some(&path), Some(&opts)).unwrap();
        assert_eq!(config.tick_mark_divisor, 4);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let int = ConfigProperties::parse("tick_mark_divisor = 0\n").unwrap();
        assert!(matches!(
            ConfigProperties::try_from(int),
            Err(ConfigError::ZeroDivisor)
        ));

        let int = ConfigProperties::parse("prompt = \"  \"\n").unwrap();
        assert!(matches!(
            ConfigProperties::try_from(int),
            Err(ConfigError::EmptyToken("prompt"))
        ));

        assert!(matches!(
            ConfigProperties::parse("tick_mark_divisr = 2\n"),
            Err(ConfigError::DeserializationFailed(_))
        ));
    }
}
