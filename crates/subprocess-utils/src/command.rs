//! Command type for building shell or argv invocations

use async_process::{Command as AsyncCommand, Stdio};
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Shell used for shell-form commands when no executable is given
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// What the command runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// A single string, interpreted by a shell
    Shell(String),
    /// A program followed by its arguments
    Argv(Vec<OsString>),
}

/// Where a standard stream of the child goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Redirect {
    /// Share the caller's stream
    #[default]
    Inherit,
    /// Discard everything
    Null,
    /// Collect into the [`CommandResult`](crate::CommandResult)
    Capture,
}

impl Redirect {
    fn stdio(self) -> Stdio {
        match self {
            Redirect::Inherit => Stdio::inherit(),
            Redirect::Null => Stdio::null(),
            Redirect::Capture => Stdio::piped(),
        }
    }
}

/// A command to be executed
///
/// Unlike `async_process::Command` this type is `Clone` and can be run any
/// number of times. Shell-form commands default to `shell = true`, argv
/// commands to `shell = false`; both default to `check = true`.
#[derive(Debug, Clone)]
pub struct Command {
    line: CommandLine,
    shell: bool,
    executable: Option<PathBuf>,
    check: bool,
    stdout: Redirect,
    stderr: Redirect,
    env: HashMap<OsString, OsString>,
    current_dir: Option<PathBuf>,
}

impl Command {
    /// Create a shell-form command
    pub fn shell<S: Into<String>>(text: S) -> Self {
        Self::from_line(CommandLine::Shell(text.into()), true)
    }

    /// Create an argv command (program followed by arguments)
    pub fn argv<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let argv = argv.into_iter().map(|a| a.as_ref().to_owned()).collect();
        Self::from_line(CommandLine::Argv(argv), false)
    }

    fn from_line(line: CommandLine, shell: bool) -> Self {
        Self {
            line,
            shell,
            executable: None,
            check: true,
            stdout: Redirect::Inherit,
            stderr: Redirect::Inherit,
            env: HashMap::new(),
            current_dir: None,
        }
    }

    /// Choose between shell interpretation and direct execution
    pub fn use_shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    /// Override the shell executable (ignored when `shell` is false)
    pub fn executable<P: AsRef<Path>>(mut self, executable: P) -> Self {
        self.executable = Some(executable.as_ref().to_owned());
        self
    }

    /// Fail with a [`CommandError`](crate::CommandError) on nonzero exit
    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Redirect standard output
    pub fn stdout(mut self, redirect: Redirect) -> Self {
        self.stdout = redirect;
        self
    }

    /// Redirect standard error
    pub fn stderr(mut self, redirect: Redirect) -> Self {
        self.stderr = redirect;
        self
    }

    /// Capture both standard output and standard error
    pub fn capture(self) -> Self {
        self.stdout(Redirect::Capture).stderr(Redirect::Capture)
    }

    /// Set an environment variable
    pub fn env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.env
            .insert(key.as_ref().to_owned(), val.as_ref().to_owned());
        self
    }

    /// Set the working directory for the command
    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.as_ref().to_owned());
        self
    }

    /// What the command runs
    pub fn line(&self) -> &CommandLine {
        &self.line
    }

    /// Whether the command is interpreted by a shell
    pub fn is_shell(&self) -> bool {
        self.shell
    }

    /// Whether a nonzero exit is turned into an error
    pub fn is_checked(&self) -> bool {
        self.check
    }

    /// Standard output redirection
    pub fn get_stdout(&self) -> Redirect {
        self.stdout
    }

    /// Standard error redirection
    pub fn get_stderr(&self) -> Redirect {
        self.stderr
    }

    /// The shell executable actually used, `None` for direct execution
    pub fn get_executable(&self) -> Option<&Path> {
        if !self.shell {
            return None;
        }
        Some(
            self.executable
                .as_deref()
                .unwrap_or_else(|| Path::new(DEFAULT_SHELL)),
        )
    }

    /// Command text for logs and errors
    pub fn display(&self) -> String {
        match &self.line {
            CommandLine::Shell(text) => text.clone(),
            CommandLine::Argv(argv) => argv
                .iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Program and arguments handed to the operating system
    pub fn program_and_args(&self) -> Result<(OsString, Vec<OsString>)> {
        match (&self.line, self.get_executable()) {
            (CommandLine::Shell(text), Some(shell)) => Ok((
                shell.as_os_str().to_owned(),
                vec![OsString::from("-c"), OsString::from(text)],
            )),
            (CommandLine::Shell(text), None) => Ok((OsString::from(text), Vec::new())),
            (CommandLine::Argv(_), Some(_)) => Err(Error::invalid_command(
                "argv commands cannot be run with shell = true",
            )),
            (CommandLine::Argv(argv), None) => match argv.split_first() {
                Some((program, args)) => Ok((program.clone(), args.to_vec())),
                None => Err(Error::invalid_command("argv is empty")),
            },
        }
    }

    /// Prepare this command for execution by converting to an `async_process::Command`
    pub fn prepare(&self) -> Result<AsyncCommand> {
        let (program, args) = self.program_and_args()?;
        let mut cmd = AsyncCommand::new(program);
        cmd.args(args);

        for (key, val) in &self.env {
            cmd.env(key, val);
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        cmd.stdout(self.stdout.stdio());
        cmd.stderr(self.stderr.stdio());
        Ok(cmd)
    }
}
