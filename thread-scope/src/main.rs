use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, Context};
use clap::AppSettings;
use structopt::StructOpt;
use thiserror::Error;

use thread_scope::capture::{self, Capture, CaptureSession};
use thread_scope::config::{self, ConfigOptions, ConfigProperties};
use thread_scope::diag;
use thread_scope::ingest::IngestError;
use thread_scope::log;
use thread_scope::sinks::{self, Sink};
use thread_scope::sources::{self, Source};
use thread_scope::ReconstructionError;

#[derive(Debug, StructOpt)]
#[structopt(global_settings = &[AppSettings::ColoredHelp, AppSettings::VersionlessSubcommands])]
struct Opts {
    /// PATH, relative, or absolute path to the frontend(s) to forward
    /// the reconstructed timeline to. Tested in that order.
    #[structopt(long = "frontend", short = "F")]
    frontends: Vec<String>,

    /// Write the timeline as JSON to the given file, or to stdout if
    /// `-` is given.
    #[structopt(long = "json", parse(from_os_str))]
    json: Option<PathBuf>,

    /// Configuration file to use instead of ./thread-scope.toml.
    #[structopt(long = "config", parse(from_os_str))]
    config: Option<PathBuf>,

    #[structopt(flatten)]
    config_options: ConfigOptions,

    #[structopt(subcommand)]
    cmd: Command,
}

/// Replay a previously saved capture.
#[derive(StructOpt, Debug)]
struct ReplayOptions {
    /// List the snapshots in the snapshot directory with their index.
    #[structopt(name = "list", long = "list", short = "l")]
    list: bool,

    /// Path to the snapshot to replay.
    #[structopt(name = "snapshot", long = "snapshot", parse(from_os_str))]
    snapshot: Option<PathBuf>,

    /// Index of the snapshot to replay, as printed by --list.
    #[structopt(required_unless_one(&["list", "snapshot"]))]
    index: Option<usize>,
}

/// Reconstruct a capture from the thread roster and context switch
/// blocks as received from the target shell, and save it.
#[derive(StructOpt, Debug)]
struct ImportOptions {
    /// File holding the output of the roster command.
    #[structopt(long = "roster", parse(from_os_str))]
    roster: PathBuf,

    /// File holding the output of the context switch command.
    #[structopt(long = "switches", parse(from_os_str))]
    switches: PathBuf,

    /// Do not save a snapshot of the capture.
    #[structopt(long = "no-save")]
    no_save: bool,

    /// Remove all previous snapshots from the snapshot directory.
    #[structopt(long = "clear-snapshots", conflicts_with = "no-save")]
    clear_snapshots: bool,
}

#[derive(StructOpt, Debug)]
enum Command {
    Replay(ReplayOptions),
    Import(ImportOptions),
}

#[derive(Debug, Error)]
pub enum ThreadScopeError {
    #[error(transparent)]
    ConfigError(#[from] config::ConfigError),
    #[error(transparent)]
    ReconstructionError(#[from] ReconstructionError),
    #[error(transparent)]
    SourceError(#[from] sources::SourceError),
    #[error(transparent)]
    SinkError(#[from] sinks::SinkError),

    // everything else
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl diag::DiagnosableError for ThreadScopeError {
    fn diagnose(&self) -> Vec<String> {
        match self {
            Self::ConfigError(_) => vec![format!(
                "command line options take precedence over {}",
                config::CONFIG_FILE_NAME
            )],
            _ => vec![],
        }
    }
}

impl ThreadScopeError {
    pub fn render(&self) {
        log::err(format!("{:#}", self));

        // show what was received so the operator can find the culprit
        if let Self::ReconstructionError(ReconstructionError::Ingest(
            e @ IngestError::ProtocolFormat { .. },
        )) = self
        {
            let (lines, offending) = e.raw_lines();
            log::raw_lines("Received", lines, offending);
        }

        // print eventual hints
        use thread_scope::diag::DiagnosableError;
        type DE = dyn DiagnosableError;
        for hint in self.diagnose().iter().chain(
            match self {
                Self::ConfigError(e) => Some(e as &DE),
                Self::ReconstructionError(e) => Some(e as &DE),
                Self::SourceError(e) => Some(e as &DE),
                Self::SinkError(e) => Some(e as &DE),
                _ => None,
            }
            .map(|e| e.diagnose())
            .unwrap_or_default()
            .iter(),
        ) {
            log::hint(hint.to_owned());
        }
    }
}

fn main() {
    if let Err(e) = main_try() {
        e.render();
        process::exit(1);
    }
}

fn main_try() -> Result<(), ThreadScopeError> {
    let opts = Opts::from_args();
    let config = ConfigProperties::new(opts.config.as_deref(), Some(&opts.config_options))?;

    // Configure the source. Sinks are only set up once the capture has
    // been reconstructed.
    let (mut source, save) = match opts.cmd {
        Command::Import(ref opts) => import(opts, &config),
        Command::Replay(ref opts) => {
            match replay(opts, &config).with_context(|| {
                format!("Failed to {}", {
                    if opts.list {
                        "index snapshots"
                    } else {
                        "replay snapshot"
                    }
                })
            })? {
                Some(tup) => tup,
                None => return Ok(()), // NOTE --list was passed
            }
        }
    };

    log::status("Loading", format!("capture from {}...", source.describe()));
    let mut session = CaptureSession::new();
    let (capture, mut sinks) = load(&mut session, source.as_mut(), save, &config)?;
    for note in capture.notes() {
        log::warn(note.to_owned());
    }

    if let Some(path) = &opts.json {
        sinks.push(if path.as_os_str() == "-" {
            Box::new(sinks::FrontendSink::with_writer(
                Box::new(std::io::stdout()),
                "JSON on stdout".to_string(),
            ))
        } else {
            let file = fs::File::create(path).map_err(|e| {
                sinks::SinkError::SetupIOError(
                    Some(format!("Failed to create {}", path.display())),
                    e,
                )
            })?;
            Box::new(sinks::FrontendSink::with_writer(
                Box::new(file),
                format!("JSON file {}", path.display()),
            ))
        });
    }

    // Spawn frontend children and get path to sockets. Create and push sinks.
    let mut children = vec![];
    for frontend in &opts.frontends {
        // Try to spawn the frontend from PATH. If that fails, try a relative path instead.
        let executables = [
            format!("thread-scope-frontend-{}", frontend), // PATH
            format!("./{}", frontend),                     // relative
            format!("/{}", frontend),                      // absolute
        ];
        let mut child = executables
            .iter()
            .find_map(|e| {
                process::Command::new(e)
                    .stdout(process::Stdio::piped())
                    .stderr(process::Stdio::piped())
                    .spawn()
                    .ok()
            })
            .with_context(|| {
                format!(
                    "Failed to spawn a frontend child process from tested paths (PATH, relative, absolute): {:#?}",
                    executables
                )
            })?;
        {
            let socket_path = BufReader::new(
                child
                    .stdout
                    .take()
                    .context("Failed to pipe frontend stdout")?,
            )
            .lines()
            .next()
            .context("Frontend exited before reporting its socket")?
            .context("Failed to read socket path from frontend child process")?;
            let socket = std::os::unix::net::UnixStream::connect(&socket_path)
                .context("Failed to connect to frontend socket")?;
            sinks.push(Box::new(sinks::FrontendSink::new(socket)));
        }

        children.push((frontend, child));
    }

    let operational = drain(capture, sinks)?;

    // Wait for frontends to process the timeline and flush any
    // remaining stderr lines.
    for (frontend, child) in children.iter_mut() {
        if let Some(stderr) = child.stderr.take() {
            for line in BufReader::new(stderr).lines() {
                log::frontend(format!(
                    "{}: {}",
                    frontend,
                    line.context("Failed to read frontend stderr")?
                ));
            }
        }
        match child.wait() {
            Ok(status) if !status.success() => {
                log::err(format!("frontend {} exited non-zero: {}", frontend, status))
            }
            Err(err) => log::err(format!("failed to wait on frontend {}: {}", frontend, err)),
            _ => (),
        }
    }

    log::status(
        match opts.cmd {
            Command::Import(_) => "Imported",
            Command::Replay(_) => "Replayed",
        },
        format!("{}.", format_status_message(capture, operational)),
    );

    Ok(())
}

fn format_status_message(capture: &Capture, sinks: (usize, usize)) -> String {
    let timeline = capture.timeline();
    format!(
        "{} thread(s), {} interval(s), {} deletion(s) replayed{}; {}/{} sinks operational",
        timeline.threads.len(),
        capture.interval_count(),
        capture.deletions(),
        match (timeline.window, timeline.trigger) {
            (Some(w), Some(t)) => format!(" over ticks {}..{}, triggered at {}", w.start, w.end, t),
            (Some(w), None) => format!(" over ticks {}..{}", w.start, w.end),
            _ => "".to_string(),
        },
        sinks.0,
        sinks.1,
    )
}

/// Forwards the capture to all sinks. Returns how many sinks remained
/// functional and how many there were.
fn drain(
    capture: &Capture,
    sinks: Vec<Box<dyn Sink>>,
) -> Result<(usize, usize), ThreadScopeError> {
    let total = sinks.len();
    let mut operational = 0;

    for mut sink in sinks {
        match sink.drain(capture) {
            Ok(()) => operational += 1,
            Err(e) => log::err(format!(
                "failed to drain capture to {}: {}",
                sink.describe(),
                e
            )),
        }
    }

    if total > 0 && operational == 0 {
        return Err(anyhow!("All sinks are broken.").into());
    }

    Ok((operational, total))
}

/// How a reconstructed capture is to be saved.
#[derive(Debug, Clone, Copy)]
struct SaveOptions {
    /// Remove previous snapshots before saving.
    clear_snapshots: bool,
}

type CaptureTuple = (Box<dyn Source>, Option<SaveOptions>);

/// Reconstructs the capture of `source` into `session` and sets up the
/// snapshot sink, if any. Nothing in the snapshot directory is touched
/// unless reconstruction succeeds.
fn load<'s>(
    session: &'s mut CaptureSession,
    source: &mut dyn Source,
    save: Option<SaveOptions>,
    config: &ConfigProperties,
) -> Result<(&'s Capture, Vec<Box<dyn Sink>>), ThreadScopeError> {
    let capture = session.load(source.capture()?, config)?;

    let mut sinks: Vec<Box<dyn Sink>> = vec![];
    if let Some(save) = save {
        sinks.push(Box::new(
            sinks::SnapshotSink::generate_snapshot_file(
                &config.snapshot_dir,
                &config.prompt,
                save.clear_snapshots,
            )
            .context("Failed to generate snapshot file")?,
        ));
    }

    Ok((capture, sinks))
}

fn import(opts: &ImportOptions, config: &ConfigProperties) -> CaptureTuple {
    let source = sources::BlockSource::new(
        opts.roster.clone(),
        opts.switches.clone(),
        &config.prompt,
    );
    let save = (!opts.no_save).then_some(SaveOptions {
        clear_snapshots: opts.clear_snapshots,
    });

    (Box::new(source), save)
}

fn replay(
    opts: &ReplayOptions,
    config: &ConfigProperties,
) -> Result<Option<CaptureTuple>, ThreadScopeError> {
    match opts {
        ReplayOptions { list: true, .. } => {
            let snapshots = sinks::file::find_snapshot_files(&config.snapshot_dir)?;
            for (i, snapshot) in snapshots.iter().enumerate() {
                println!("{}\t{}\t{}", i, snapshot.display(), summarize(snapshot, config));
            }

            Ok(None)
        }
        ReplayOptions {
            snapshot: Some(file),
            ..
        } => Ok(Some((
            Box::new(sources::SnapshotSource::new(file.clone(), config)),
            None,
        ))),
        ReplayOptions {
            index: Some(idx), ..
        } => {
            let snapshot = sinks::file::find_snapshot_files(&config.snapshot_dir)?
                .into_iter()
                .nth(*idx)
                .with_context(|| format!("No snapshot with index {}", *idx))?;

            Ok(Some((
                Box::new(sources::SnapshotSource::new(snapshot, config)),
                None,
            )))
        }
        _ => unreachable!(),
    }
}

/// One-line description of a listed snapshot.
fn summarize(snapshot: &std::path::Path, config: &ConfigProperties) -> String {
    let reconstructed = sources::SnapshotSource::new(snapshot.to_path_buf(), config)
        .capture()
        .map_err(ThreadScopeError::from)
        .and_then(|text| Ok(capture::reconstruct(text, config)?));

    match reconstructed {
        Ok(capture) => {
            let timeline = capture.timeline();
            format!(
                "{} thread(s), trigger: {}",
                timeline.threads.len(),
                timeline
                    .trigger
                    .map_or_else(|| "none".to_string(), |t| t.to_string())
            )
        }
        Err(e) => format!("unrecognized ({})", e),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use sinks::file::find_snapshot_files;

    const ROSTER: &str = "threads_list
Thread number  1 : Prio =  10, Log = Yes, Name = main
Thread number  2 : Prio =  50, Log =  No, Name = idle
ch> ";

    fn setup(switches: &str) -> (tempfile::TempDir, ConfigProperties, sources::BlockSource) {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigProperties {
            snapshot_dir: dir.path().join("snapshots"),
            ..ConfigProperties::default()
        };
        fs::create_dir(&config.snapshot_dir).unwrap();

        let roster = dir.path().join("roster.txt");
        let switch_file = dir.path().join("switches.txt");
        fs::write(&roster, ROSTER).unwrap();
        fs::write(&switch_file, switches).unwrap();

        let source = sources::BlockSource::new(roster, switch_file, &config.prompt);
        (dir, config, source)
    }

    #[test]
    fn failed_import_leaves_snapshots_untouched() {
        let (_dir, config, mut source) =
            setup("threads_timestamps\nFrom  1 to  2 at 0\nFrom 1 at 4\nch> ");
        let previous = config.snapshot_dir.join("capture-previous.snapshot");
        fs::write(&previous, "previous capture").unwrap();

        let mut session = CaptureSession::new();
        let err = load(
            &mut session,
            &mut source,
            Some(SaveOptions {
                clear_snapshots: true,
            }),
            &config,
        )
        .err()
        .unwrap();
        assert!(matches!(err, ThreadScopeError::ReconstructionError(_)));

        assert!(session.current().is_none());
        assert_eq!(find_snapshot_files(&config.snapshot_dir).unwrap(), vec![previous.clone()]);
        assert_eq!(fs::read_to_string(&previous).unwrap(), "previous capture");
    }

    #[test]
    fn successful_import_replaces_snapshots() {
        let (_dir, config, mut source) =
            setup("threads_timestamps\nFrom  1 to  2 at 0\nFrom  2 to  1 at 5\nch> ");
        fs::write(config.snapshot_dir.join("capture-previous.snapshot"), "").unwrap();

        let mut session = CaptureSession::new();
        let (capture, sinks) = load(
            &mut session,
            &mut source,
            Some(SaveOptions {
                clear_snapshots: true,
            }),
            &config,
        )
        .unwrap();
        assert_eq!(capture.timeline().threads.len(), 2);
        assert_eq!(drain(capture, sinks).unwrap(), (1, 1));

        let snapshots = find_snapshot_files(&config.snapshot_dir).unwrap();
        assert_eq!(snapshots.len(), 1);
        let replayed = sources::SnapshotSource::new(snapshots[0].clone(), &config)
            .capture()
            .unwrap();
        assert_eq!(&capture::reconstruct(replayed, &config).unwrap(), capture);
    }
}
