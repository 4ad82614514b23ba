//! Source stage - candidate path production
//!
//! A `PathSource` names one origin of candidate paths. `into_paths` turns it
//! into a lazy `PathLines` iterator; `SourceStage` drives that iterator into
//! the pipeline's path channel on its own thread.
//!
//! Failures here are never fatal: a command that cannot be spawned or exits
//! non-zero is logged and the sequence ends. Paths already produced are still
//! checked downstream.

use crossbeam_channel::Sender;
use std::io::{self, BufRead, BufReader};
use std::process::{Child, Command, Stdio};

/// Default `--diff-filter` for the staged changes source: added, copied,
/// modified, deleted.
pub const DEFAULT_DIFF_FILTER: &str = "ACMD";

/// Command listing the files staged for the next commit.
pub const GIT_COMMIT_FILES_COMMAND: &str = "git diff --cached --name-only --diff-filter=ACMD";

/// Where candidate paths come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSource {
    /// Paths given directly by the caller, in order
    Fixed {
        paths: Vec<String>,
        continue_on_empty: bool,
    },
    /// Stdout of a shell command, one path per line
    Command {
        command: String,
        continue_on_empty: bool,
    },
    /// Process stdin until end-of-stream or the first blank line
    Stdin,
    /// `git diff --name-only` over the index (`cached`) or the work tree
    GitDiff { cached: bool, diff_filter: String },
}

impl PathSource {
    pub fn fixed<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PathSource::Fixed {
            paths: paths.into_iter().map(Into::into).collect(),
            continue_on_empty: true,
        }
    }

    pub fn command(command: impl Into<String>) -> Self {
        PathSource::Command {
            command: command.into(),
            continue_on_empty: true,
        }
    }

    pub fn stdin() -> Self {
        PathSource::Stdin
    }

    /// Staged (`cached`) or unstaged changes. An empty filter means `ACMD`.
    pub fn git_diff(cached: bool, diff_filter: impl Into<String>) -> Self {
        let diff_filter = diff_filter.into();
        PathSource::GitDiff {
            cached,
            diff_filter: if diff_filter.trim().is_empty() {
                DEFAULT_DIFF_FILTER.to_string()
            } else {
                diff_filter.trim().to_string()
            },
        }
    }

    /// Pick the origin the way the `check` command does: explicit paths
    /// first, then an input command, then staged changes, then stdin.
    pub fn select(
        paths: Vec<String>,
        command: Option<&str>,
        staged: Option<(bool, &str)>,
    ) -> Self {
        if !paths.is_empty() {
            tracing::info!("[source] check fixed files");
            return PathSource::fixed(paths);
        }
        if let Some(command) = command.map(str::trim).filter(|c| !c.is_empty()) {
            tracing::info!("[source] check files from command");
            return PathSource::command(command);
        }
        if let Some((cached, diff_filter)) = staged {
            tracing::info!("[source] check files from git diff");
            return PathSource::git_diff(cached, diff_filter);
        }
        tracing::info!("[source] check files from stdin");
        PathSource::Stdin
    }

    /// Blank line policy for `Fixed` and `Command`. Other variants always
    /// stop at a blank line.
    pub fn with_continue_on_empty(mut self, value: bool) -> Self {
        match &mut self {
            PathSource::Fixed {
                continue_on_empty, ..
            }
            | PathSource::Command {
                continue_on_empty, ..
            } => *continue_on_empty = value,
            PathSource::Stdin | PathSource::GitDiff { .. } => {}
        }
        self
    }

    /// Shell command line run by `Command` and `GitDiff`.
    pub fn command_line(&self) -> Option<String> {
        match self {
            PathSource::Command { command, .. } => Some(command.clone()),
            PathSource::GitDiff {
                cached,
                diff_filter,
            } => Some(git_diff_command(*cached, diff_filter)),
            PathSource::Fixed { .. } | PathSource::Stdin => None,
        }
    }

    /// Start producing paths.
    pub fn into_paths(self) -> PathLines {
        match self {
            PathSource::Fixed {
                paths,
                continue_on_empty,
            } => PathLines::fixed(paths, continue_on_empty),
            PathSource::Command {
                command,
                continue_on_empty,
            } => PathLines::spawn(&command, continue_on_empty),
            PathSource::GitDiff {
                cached,
                diff_filter,
            } => PathLines::spawn(&git_diff_command(cached, &diff_filter), false),
            PathSource::Stdin => PathLines::from_reader(BufReader::new(io::stdin()), false),
        }
    }
}

fn git_diff_command(cached: bool, diff_filter: &str) -> String {
    let cached_flag = if cached { " --cached" } else { "" };
    format!("git diff{cached_flag} --name-only --diff-filter={diff_filter}")
}

fn shell(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

enum Lines {
    Fixed(std::vec::IntoIter<String>),
    Reader(Box<dyn BufRead + Send>),
}

/// A running command whose stdout feeds `PathLines`.
struct RunningCommand {
    child: Child,
    command: String,
}

/// Lazy sequence of trimmed, non-empty paths.
pub struct PathLines {
    lines: Lines,
    continue_on_empty: bool,
    command: Option<RunningCommand>,
    finished: bool,
    produced: usize,
}

impl PathLines {
    fn fixed(paths: Vec<String>, continue_on_empty: bool) -> Self {
        Self {
            lines: Lines::Fixed(paths.into_iter()),
            continue_on_empty,
            command: None,
            finished: false,
            produced: 0,
        }
    }

    /// Read paths from any buffered reader.
    pub fn from_reader(reader: impl BufRead + Send + 'static, continue_on_empty: bool) -> Self {
        Self {
            lines: Lines::Reader(Box::new(reader)),
            continue_on_empty,
            command: None,
            finished: false,
            produced: 0,
        }
    }

    /// Run `command` through the shell and read its stdout.
    fn spawn(command: &str, continue_on_empty: bool) -> Self {
        tracing::info!("[source] exec: {command}");
        let spawned = shell(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("[source] error starting command {command:?}: {e}");
                return Self::fixed(Vec::new(), continue_on_empty);
            }
        };

        let Some(stdout) = child.stdout.take() else {
            tracing::error!("[source] command {command:?} has no stdout");
            let mut lines = Self::fixed(Vec::new(), continue_on_empty);
            lines.command = Some(RunningCommand {
                child,
                command: command.to_string(),
            });
            return lines;
        };

        let mut lines = Self::from_reader(BufReader::new(stdout), continue_on_empty);
        lines.command = Some(RunningCommand {
            child,
            command: command.to_string(),
        });
        lines
    }

    /// Number of paths yielded so far.
    pub fn produced(&self) -> usize {
        self.produced
    }

    fn next_raw(&mut self) -> Option<String> {
        match &mut self.lines {
            Lines::Fixed(paths) => paths.next(),
            Lines::Reader(reader) => {
                let mut buf = Vec::new();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => None,
                    Ok(_) => Some(match String::from_utf8(buf) {
                        Ok(line) => line,
                        Err(e) => {
                            tracing::warn!("[source] non UTF-8 path, decoding lossily");
                            String::from_utf8_lossy(e.as_bytes()).into_owned()
                        }
                    }),
                    Err(e) => {
                        tracing::error!("[source] error reading lines: {e}");
                        None
                    }
                }
            }
        }
    }

    /// End the sequence and reap the command, if any.
    ///
    /// After a blank-line stop the child may still be writing and die on the
    /// closed pipe, so a failed status is only logged at debug.
    fn finish(&mut self, stopped_early: bool) {
        if self.finished {
            return;
        }
        self.finished = true;
        tracing::debug!("[source] read {} paths", self.produced);

        if let Some(mut running) = self.command.take() {
            // Close our end of the pipe so a still-writing child sees EPIPE.
            self.lines = Lines::Fixed(Vec::new().into_iter());
            match running.child.wait() {
                Ok(status) if status.success() => {}
                Ok(status) if stopped_early => tracing::debug!(
                    "[source] command {:?} stopped after a blank line ({status})",
                    running.command
                ),
                Ok(status) => tracing::error!(
                    "[source] error getting files: command {:?} exited with code {}",
                    running.command,
                    status
                        .code()
                        .map_or_else(|| "none".to_string(), |c| c.to_string())
                ),
                Err(e) => tracing::error!(
                    "[source] I/O problem waiting for command {:?}: {e}",
                    running.command
                ),
            }
        }
    }
}

impl Iterator for PathLines {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }
        loop {
            let Some(raw) = self.next_raw() else {
                self.finish(false);
                return None;
            };
            tracing::trace!("[source] read {raw:?}");
            let path = raw.trim();
            if path.is_empty() {
                if self.continue_on_empty {
                    continue;
                }
                self.finish(true);
                return None;
            }
            self.produced += 1;
            return Some(path.to_string());
        }
    }
}

impl Drop for PathLines {
    fn drop(&mut self) {
        if let Some(mut running) = self.command.take() {
            // Dropped before the end: the downstream stopped listening.
            let _ = running.child.kill();
            let _ = running.child.wait();
        }
    }
}

/// Source stage feeding the path channel.
pub struct SourceStage {
    source: PathSource,
}

impl SourceStage {
    pub fn new(source: PathSource) -> Self {
        Self { source }
    }

    /// Send every path, then drop the sender to close the channel.
    ///
    /// Returns the number of paths sent.
    pub fn run(self, sender: Sender<String>) -> usize {
        let mut sent = 0;
        for path in self.source.into_paths() {
            if sender.send(path).is_err() {
                // Channel closed, stop reading
                break;
            }
            sent += 1;
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::io::Cursor;

    fn collect(source: PathSource) -> Vec<String> {
        source.into_paths().collect()
    }

    #[test]
    fn test_fixed_keeps_order_and_trims() {
        let paths = collect(PathSource::fixed(["  a.txt ", "", "b/c.rs", "\t"]));
        assert_eq!(paths, vec!["a.txt", "b/c.rs"]);
    }

    #[test]
    fn test_fixed_stops_on_empty_when_configured() {
        let source = PathSource::fixed(["a", " ", "b"]).with_continue_on_empty(false);
        assert_eq!(collect(source), vec!["a"]);
    }

    #[test]
    fn test_reader_stops_on_blank_line() {
        let reader = Cursor::new("one\n  two  \n\nthree\n");
        let paths: Vec<_> = PathLines::from_reader(reader, false).collect();
        assert_eq!(paths, vec!["one", "two"]);
    }

    #[test]
    fn test_reader_skips_blank_lines_when_continuing() {
        let reader = Cursor::new("one\r\n\r\n   \nthree");
        let paths: Vec<_> = PathLines::from_reader(reader, true).collect();
        assert_eq!(paths, vec!["one", "three"]);
    }

    #[test]
    fn test_iterator_is_fused_after_end() {
        let mut lines = PathLines::from_reader(Cursor::new("a\n"), true);
        assert_eq!(lines.next().as_deref(), Some("a"));
        assert_eq!(lines.next(), None);
        assert_eq!(lines.next(), None);
        assert_eq!(lines.produced(), 1);
    }

    #[test]
    fn test_git_diff_command_template() {
        let staged = PathSource::git_diff(true, "");
        assert_eq!(
            staged.command_line().as_deref(),
            Some(GIT_COMMIT_FILES_COMMAND)
        );

        let worktree = PathSource::git_diff(false, "AM");
        assert_eq!(
            worktree.command_line().as_deref(),
            Some("git diff --name-only --diff-filter=AM")
        );
    }

    #[test]
    fn test_select_precedence() {
        let fixed = PathSource::select(vec!["x".into()], Some("ls"), Some((true, "")));
        assert!(matches!(fixed, PathSource::Fixed { .. }));

        let command = PathSource::select(Vec::new(), Some("ls"), Some((true, "")));
        assert_eq!(command, PathSource::command("ls"));

        let blank_command = PathSource::select(Vec::new(), Some("  "), Some((true, "")));
        assert!(matches!(blank_command, PathSource::GitDiff { .. }));

        let stdin = PathSource::select(Vec::new(), None, None);
        assert_eq!(stdin, PathSource::Stdin);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_lines() {
        let paths = collect(PathSource::command("printf 'a.txt\\n\\n b.txt \\n'"));
        assert_eq!(paths, vec!["a.txt", "b.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_command_still_delivers_read_paths() {
        let paths = collect(PathSource::command("echo first; echo second; exit 3"));
        assert_eq!(paths, vec!["first", "second"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unknown_command_ends_sequence() {
        let paths = collect(PathSource::command("definitely-not-a-real-binary-ilignore"));
        assert!(paths.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_blank_line_stop_ends_endless_command() {
        let source =
            PathSource::command("printf 'a\\n\\nb\\n'; yes x").with_continue_on_empty(false);
        let mut lines = source.into_paths();
        assert_eq!(lines.next().as_deref(), Some("a"));
        assert_eq!(lines.next(), None);
        // Reaped on the blank line, nothing left to kill
        assert!(lines.command.is_none());
        assert_eq!(lines.next(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_dropping_early_reaps_command() {
        let mut lines = PathSource::command("yes path.txt").into_paths();
        assert_eq!(lines.next().as_deref(), Some("path.txt"));
        drop(lines);
    }

    #[test]
    fn test_source_stage_sends_all_paths() {
        let (tx, rx) = bounded(10);
        let sent = SourceStage::new(PathSource::fixed(["a", "b", "c"])).run(tx);

        let received: Vec<String> = rx.iter().collect();
        assert_eq!(sent, 3);
        assert_eq!(received, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_source_stage_stops_when_receiver_dropped() {
        let (tx, rx) = bounded(1);
        drop(rx);
        let sent = SourceStage::new(PathSource::fixed(["a", "b"])).run(tx);
        assert_eq!(sent, 0);
    }
}
