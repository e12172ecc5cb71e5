use std::{
    ffi::OsStr,
    fmt,
    io::{self, BufRead, BufReader, Read},
    num::NonZeroI32,
    path::Path,
    process, thread,
};

use log::debug;

pub struct Command(process::Command);

/// Renders the program and its arguments only. Environment variables are left out on purpose, they
/// may carry tokens.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_arg(f, &self.0.get_program().to_string_lossy())?;
        for arg in self.0.get_args() {
            f.write_str(" ")?;
            write_arg(f, &arg.to_string_lossy())?;
        }
        Ok(())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

fn write_arg(f: &mut fmt::Formatter<'_>, arg: &str) -> fmt::Result {
    if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        write!(f, "{arg:?}")
    } else {
        f.write_str(arg)
    }
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self(process::Command::new(program))
    }

    pub fn args<'a, I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = &'a OsStr>,
    {
        self.0.args(args);
        self
    }

    pub fn env<K: AsRef<OsStr>, V: AsRef<OsStr>>(mut self, key: K, value: V) -> Self {
        self.0.env(key, value);
        self
    }

    /// Runs the command in `dir`, unless `dir` is empty.
    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        let dir = dir.as_ref();
        if !dir.as_os_str().is_empty() {
            self.0.current_dir(dir);
        }
        self
    }

    pub fn program(&self) -> String {
        self.0.get_program().to_string_lossy().into_owned()
    }

    pub fn try_status(mut self) -> Result<ExitStatus, Error> {
        debug!("running `{self}`...");

        match self.0.status() {
            Ok(status) => Ok(ExitStatus {
                command: self,
                status,
            }),
            Err(error) => Err(Error {
                command: self,
                kind: error.into(),
            }),
        }
    }

    pub fn status(self) -> Result<(), Error> {
        self.try_status().and_then(ExitStatus::require_success)
    }

    pub fn try_output(mut self) -> Result<Output, Error> {
        debug!("capturing `{self}`...");

        match self.0.output() {
            Ok(output) => Ok(Output {
                command: self,
                output,
            }),
            Err(error) => Err(Error {
                command: self,
                kind: error.into(),
            }),
        }
    }

    pub fn output(self) -> Result<Output, Error> {
        self.try_output().and_then(Output::require_success)
    }

    /// Runs the command with stdout inherited while stderr is forwarded line by line. When the
    /// command fails, the error carries the last non-blank line written to stderr.
    pub fn status_with_stderr_tail(mut self) -> Result<(), Error> {
        debug!("running `{self}`...");

        let mut child = match self.0.stderr(process::Stdio::piped()).spawn() {
            Ok(child) => child,
            Err(error) => {
                return Err(Error {
                    command: self,
                    kind: error.into(),
                })
            }
        };

        let forwarder = child
            .stderr
            .take()
            .map(|stderr| thread::spawn(move || forward_stderr(stderr)));

        let status = match child.wait() {
            Ok(status) => status,
            Err(error) => {
                return Err(Error {
                    command: self,
                    kind: error.into(),
                })
            }
        };

        let stderr_tail = forwarder
            .and_then(|handle| handle.join().ok())
            .flatten();

        if status.success() {
            return Ok(());
        }

        let code = status.code().and_then(NonZeroI32::new);
        Err(Error {
            command: self,
            kind: match stderr_tail {
                Some(line) => ErrorKind::Failed(code, line),
                None => ErrorKind::NonZeroExitStatus(code),
            },
        })
    }
}

/// Copies `stderr` to our own stderr and returns the last non-blank line.
fn forward_stderr(stderr: impl Read) -> Option<String> {
    let mut reader = BufReader::new(stderr);
    let mut buffer = Vec::new();
    let mut last = None;

    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer);
                let line = line.trim_end_matches(['\r', '\n']);
                eprintln!("{line}");
                if !line.trim().is_empty() {
                    last = Some(line.trim().to_owned());
                }
            }
        }
    }

    last
}

#[derive(Debug)]
pub struct ExitStatus {
    command: Command,
    status: process::ExitStatus,
}

impl ExitStatus {
    pub fn require_success(self) -> Result<(), Error> {
        let ExitStatus { command, status } = self;
        if status.success() {
            Ok(())
        } else {
            Err(Error {
                command,
                kind: ErrorKind::NonZeroExitStatus(status.code().and_then(NonZeroI32::new)),
            })
        }
    }
}

#[derive(Debug)]
pub struct Output {
    pub command: Command,
    pub output: process::Output,
}

impl Output {
    pub fn require_success(self) -> Result<Output, Error> {
        let Output { command, output } = self;
        if output.status.success() {
            Ok(Output { command, output })
        } else {
            Err(Error {
                command,
                kind: ErrorKind::NonZeroExitStatus(output.status.code().and_then(NonZeroI32::new)),
            })
        }
    }

    pub fn stdout_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.output.stdout)
    }
}

impl std::ops::Deref for Output {
    type Target = process::Output;

    fn deref(&self) -> &Self::Target {
        &self.output
    }
}

#[derive(Debug)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    Io(io::ErrorKind),
    NonZeroExitStatus(Option<NonZeroI32>),
    /// Non-zero exit status along with the last non-blank line written to stderr.
    Failed(Option<NonZeroI32>, String),
}

impl From<io::Error> for ErrorKind {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            other => ErrorKind::Io(other),
        }
    }
}

#[derive(Debug)]
pub struct Error {
    pub command: Command,
    pub kind: ErrorKind,
}

impl Error {
    /// The last non-blank stderr line of a failed command, if it was captured.
    pub fn stderr_tail(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::Failed(_, line) => Some(line),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to run `{command}`: ", command = self.command)?;
        match &self.kind {
            ErrorKind::NotFound => {
                let program = self.command.program();
                write!(f, "the `{program}` command is required but not available on your system, please install it")
            }
            ErrorKind::PermissionDenied => {
                let program = self.command.program();
                write!(f, "the `{program}` command is available but does not have the right permissions, please make sure the binary is executable")
            }
            ErrorKind::Io(kind) => write!(f, "{kind}"),
            ErrorKind::NonZeroExitStatus(code) | ErrorKind::Failed(code, _) => {
                if let Some(code) = code {
                    write!(f, "exited with non-zero exit code `{code}`")?;
                } else {
                    write!(f, "did not run successfully")?;
                }
                if let Some(line) = self.stderr_tail() {
                    write!(f, ": {line}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Creates a new [`Command`] and supplies the provided arguments, if any, while calling
/// [`std::convert::AsRef::as_ref`] on each.
macro_rules! command {
    ($program:expr $(, $arg:expr)* $(,)?) => {
        $crate::process::args!($crate::process::Command::new($program) $(, $arg)*)
    };
}

/// Calls [`Command::args`] on the provided [`Command`] while calling [`std::convert::AsRef::as_ref`]
/// on each argument.
macro_rules! args {
    ($program:expr $(, $arg:expr)* $(,)?) => {
        $program.args([
            $(<_ as AsRef<::std::ffi::OsStr>>::as_ref(&$arg),)*
        ])
    }
}

pub(crate) use args;
pub(crate) use command;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_arguments_when_needed() {
        let command = command!("docker", "buildx", "bake", "--set", "*.labels.a=b c", "")
            .env("BUILDX_BAKE_GIT_AUTH_TOKEN", "secret");
        assert_eq!(
            command.to_string(),
            r#"docker buildx bake --set "*.labels.a=b c" """#
        );
        assert!(!format!("{command:?}").contains("secret"));
    }

    #[test]
    fn forward_stderr_keeps_last_non_blank_line() {
        let stderr = b"#1 building\nERROR: failed to solve: no such file\n\n  \n".as_slice();
        assert_eq!(
            forward_stderr(stderr).as_deref(),
            Some("ERROR: failed to solve: no such file")
        );
        assert_eq!(forward_stderr(b"\n\n".as_slice()), None);
    }

    #[test]
    fn failed_error_mentions_stderr_tail() {
        let error = Error {
            command: command!("docker", "buildx", "bake"),
            kind: ErrorKind::Failed(NonZeroI32::new(1), "ERROR: boom".to_owned()),
        };
        assert_eq!(error.stderr_tail(), Some("ERROR: boom"));
        assert_eq!(
            error.to_string(),
            "failed to run `docker buildx bake`: exited with non-zero exit code `1`: ERROR: boom"
        );
    }
}
