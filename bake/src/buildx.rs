mod inspect;

use std::{ffi::OsStr, fmt, sync::LazyLock};

pub use inspect::*;
use log::debug;
use regex::Regex;

use crate::{
    args::ArgumentVector,
    input::Inputs,
    process::{self, command},
    Result,
};

pub const SETUP_BUILDX_URL: &str = "https://github.com/docker/setup-buildx-action";

/// Buildx reads this variable to authenticate when fetching remote git contexts.
pub const GIT_AUTH_TOKEN_ENV: &str = "BUILDX_BAKE_GIT_AUTH_TOKEN";

pub const NO_DEFAULT_ATTESTATIONS_ENV: &str = "BUILDX_NO_DEFAULT_ATTESTATIONS";

#[derive(Debug)]
pub struct BuildxNotAvailable;

impl std::error::Error for BuildxNotAvailable {}

impl fmt::Display for BuildxNotAvailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buildx is required, see {SETUP_BUILDX_URL} to set up buildx"
        )
    }
}

#[derive(Debug)]
pub struct CannotParseVersion(String);

impl std::error::Error for CannotParseVersion {}

impl fmt::Display for CannotParseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot parse buildx version from {:?}", self.0)
    }
}

/// Invokes buildx either as a docker CLI plugin or as a standalone binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buildx {
    standalone: bool,
}

impl Buildx {
    pub const fn plugin() -> Self {
        Self { standalone: false }
    }

    pub const fn standalone() -> Self {
        Self { standalone: true }
    }

    /// Prefers the docker CLI plugin and falls back to a standalone `buildx` binary.
    pub fn detect() -> Result<Self, BuildxNotAvailable> {
        for buildx in [Self::plugin(), Self::standalone()] {
            match process::args!(buildx.command(), "version").output() {
                Ok(_) => {
                    debug!("using `{}`", buildx.command());
                    return Ok(buildx);
                }
                Err(error) => debug!("{error}"),
            }
        }
        Err(BuildxNotAvailable)
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone
    }

    pub fn command(&self) -> process::Command {
        if self.standalone {
            process::Command::new("buildx")
        } else {
            command!("docker", "buildx")
        }
    }

    pub fn version(&self) -> Result<String> {
        let output = process::args!(self.command(), "version").output()?;
        Ok(parse_version(output.stdout_str()?)?)
    }

    /// Inspects `builder`, or the selected builder when `builder` is empty.
    pub fn inspect(&self, builder: &str) -> Result<BuilderInfo> {
        let mut command = process::args!(self.command(), "inspect");
        if !builder.is_empty() {
            command = process::args!(command, builder);
        }
        let output = command.output()?;
        Ok(BuilderInfo::parse(output.stdout_str()?))
    }

    /// Returns the `bake` command for `args`, run inside the working directory of `inputs`.
    pub fn bake_command(&self, inputs: &Inputs, args: &ArgumentVector) -> process::Command {
        let command = self
            .command()
            .args(args.as_slice().iter().map(OsStr::new))
            .current_dir(&inputs.workdir);
        match git_auth_token(inputs, std::env::var_os(GIT_AUTH_TOKEN_ENV).is_some()) {
            Some(token) => command.env(GIT_AUTH_TOKEN_ENV, token),
            None => command,
        }
    }

    /// Runs `bake --print` and returns the printed definition.
    pub fn print_definition(&self, inputs: &Inputs, args: &ArgumentVector) -> Result<String> {
        let output = self.bake_command(inputs, args).output()?;
        Ok(output.stdout_str()?.trim().to_owned())
    }
}

fn git_auth_token(inputs: &Inputs, already_set: bool) -> Option<&str> {
    if already_set || inputs.github_token.is_empty() {
        None
    } else {
        Some(inputs.github_token.expose())
    }
}

static VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\sv?([0-9a-f]{7}|[0-9.]+)").unwrap()
});

/// Extracts the version from the output of `buildx version`, e.g. `0.4.1` from
/// `github.com/docker/buildx v0.4.1 bda4882a65349ca359216b135896bddc1d92461c`.
pub fn parse_version(stdout: &str) -> Result<String, CannotParseVersion> {
    VERSION_REGEX
        .captures(stdout)
        .and_then(|captures| captures.get(1))
        .map(|version| version.as_str().to_owned())
        .ok_or_else(|| CannotParseVersion(stdout.trim().to_owned()))
}

/// Reads `BUILDX_NO_DEFAULT_ATTESTATIONS` the way buildx does.
pub fn no_default_attestations() -> bool {
    std::env::var(NO_DEFAULT_ATTESTATIONS_ENV).is_ok_and(|value| is_true(&value))
}

fn is_true(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "TRUE" | "true" | "True")
}
