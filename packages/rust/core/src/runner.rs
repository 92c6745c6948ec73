//! External command execution.
//!
//! Command lines are plain [`CommandSpec`] values built by pure functions
//! elsewhere in the crate; a [`CommandRunner`] is the only thing that turns
//! them into processes.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

/// Exit code reported when the program could not be started at all.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Exit code reported when the process was terminated by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -1;

// ---------------------------------------------------------------------------
// CommandSpec
// ---------------------------------------------------------------------------

/// One external command: program, arguments, and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    /// Start from a configured tool vector (program followed by leading args).
    pub fn tool(tool: &[String], cwd: impl Into<PathBuf>) -> Self {
        let (program, leading) = match tool.split_first() {
            Some((program, rest)) => (program.clone(), rest.to_vec()),
            None => (String::new(), Vec::new()),
        };
        Self {
            program,
            args: leading,
            cwd: cwd.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Shell-like rendering for logs and reports.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|word| quote(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.command_line())
    }
}

fn quote(word: &str) -> String {
    if !word.is_empty() && !word.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"') {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

// ---------------------------------------------------------------------------
// CommandResult
// ---------------------------------------------------------------------------

/// Exit status and captured output of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// ---------------------------------------------------------------------------
// Runners
// ---------------------------------------------------------------------------

/// Executes commands. Never fails on a nonzero exit; callers inspect
/// [`CommandResult::exit_code`].
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> CommandResult;
}

/// Spawns real processes and blocks until they exit.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> CommandResult {
        info!(cwd = %spec.cwd.display(), "$ {spec}");

        let output = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .output();

        let result = match output {
            Ok(output) => CommandResult {
                exit_code: output.status.code().unwrap_or(SIGNAL_EXIT_CODE),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(e) => CommandResult {
                exit_code: SPAWN_FAILURE_EXIT_CODE,
                stdout: String::new(),
                stderr: format!("failed to spawn '{}': {e}", spec.program),
            },
        };

        log_streams(spec, &result);
        result
    }
}

/// Both streams reach the build log at the default level.
fn log_streams(spec: &CommandSpec, result: &CommandResult) {
    if !result.stdout.is_empty() {
        info!(program = %spec.program, "stdout:\n{}", result.stdout.trim_end());
    }
    if !result.stderr.is_empty() {
        if result.success() {
            info!(program = %spec.program, "stderr:\n{}", result.stderr.trim_end());
        } else {
            warn!(program = %spec.program, "stderr:\n{}", result.stderr.trim_end());
        }
    }
    debug!(program = %spec.program, exit_code = result.exit_code, "command finished");
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_vector_splits_program_and_leading_args() {
        let tool = vec!["python".to_string(), "preprocessor.py".to_string()];
        let spec = CommandSpec::tool(&tool, "/book")
            .arg("--output=tex/ninja.markdown")
            .path_arg(Path::new("ninja/ninja.markdown"));

        assert_eq!(spec.program, "python");
        assert_eq!(
            spec.args,
            vec!["preprocessor.py", "--output=tex/ninja.markdown", "ninja/ninja.markdown"]
        );
        assert_eq!(spec.cwd, PathBuf::from("/book"));
    }

    #[test]
    fn command_line_quotes_awkward_words() {
        let spec = CommandSpec::new("pandoc", ".").args(["-o", "my book.epub", ""]);
        assert_eq!(spec.command_line(), "pandoc -o 'my book.epub' ''");
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_captures_both_streams_and_exit_code() {
        let spec = CommandSpec::new("sh", std::env::temp_dir())
            .arg("-c")
            .arg("printf 'out\\nmore'; printf 'err' >&2; exit 3");
        let result = ProcessRunner.run(&spec);

        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "out\nmore");
        assert_eq!(result.stderr, "err");
        assert!(!result.success());
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_uses_working_directory() {
        let dir = std::env::temp_dir().join(format!("bb-runner-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("marker.txt"), "here").unwrap();

        let spec = CommandSpec::new("cat", &dir).arg("marker.txt");
        let result = ProcessRunner.run(&spec);
        assert!(result.success());
        assert_eq!(result.stdout, "here");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn killed_process_reports_signal_exit_code() {
        let spec = CommandSpec::new("sh", std::env::temp_dir())
            .arg("-c")
            .arg("kill -9 $$");
        let result = ProcessRunner.run(&spec);
        assert_eq!(result.exit_code, SIGNAL_EXIT_CODE);
        assert!(!result.success());
    }

    #[cfg(unix)]
    #[test]
    fn tool_output_is_logged_at_info() {
        let spec = CommandSpec::new("sh", std::env::temp_dir())
            .arg("-c")
            .arg("printf 'typeset-out'; printf 'typeset-warn' >&2");
        let (result, log) = testing::capture_log(tracing::Level::INFO, || ProcessRunner.run(&spec));
        assert!(result.success());
        assert!(log.contains("typeset-out"), "{log}");
        assert!(log.contains("typeset-warn"), "{log}");
    }

    #[test]
    fn missing_program_reports_spawn_failure() {
        let spec = CommandSpec::new("bookbinder-no-such-tool-xyz", std::env::temp_dir());
        let result = ProcessRunner.run(&spec);
        assert_eq!(result.exit_code, SPAWN_FAILURE_EXIT_CODE);
        assert!(result.stderr.contains("bookbinder-no-such-tool-xyz"));
    }
}
