//! Workflow commands, see
//! https://docs.github.com/en/actions/using-workflows/workflow-commands-for-github-actions.

use std::{
    fmt::Display,
    fs::OpenOptions,
    io::{self, Write},
    path::Path,
};

const STATE_ENV_PREFIX: &str = "STATE_";
const DELIMITER_PREFIX: &str = "ghadelimiter_";
const OUTPUT_FILE_ENV: &str = "GITHUB_OUTPUT";
const STATE_FILE_ENV: &str = "GITHUB_STATE";

pub const STATE_TMP_DIR: &str = "tmpDir";
pub const STATE_BUILD_REFS: &str = "buildRefs";
pub const STATE_DEFINITION: &str = "definition";

/// Returns true if the runner has step debug logging enabled.
pub fn is_debug() -> bool {
    std::env::var("RUNNER_DEBUG").is_ok_and(|value| value == "1")
}

/// Prints `name` as a collapsible group around everything `f` writes to the log.
pub fn group<T>(name: impl Display, f: impl FnOnce() -> T) -> T {
    println!("::group::{name}");
    let out = f();
    println!("::endgroup::");
    out
}

/// Annotates the run with an error message.
pub fn error(message: &str) {
    println!("::error::{}", escape_data(message));
}

/// Escapes characters that would otherwise end a workflow command early.
fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

pub fn set_output(name: &str, value: &str) -> io::Result<()> {
    match std::env::var_os(OUTPUT_FILE_ENV).filter(|path| !path.is_empty()) {
        Some(path) => append_file_command(Path::new(&path), name, value),
        None => {
            println!("::set-output name={name}::{}", escape_data(value));
            Ok(())
        }
    }
}

/// Saves a value for the `post` phase, where it is available through [`state`].
pub fn save_state(name: &str, value: &str) -> io::Result<()> {
    match std::env::var_os(STATE_FILE_ENV).filter(|path| !path.is_empty()) {
        Some(path) => append_file_command(Path::new(&path), name, value),
        None => {
            println!("::save-state name={name}::{}", escape_data(value));
            Ok(())
        }
    }
}

/// Returns a value saved by [`save_state`] in an earlier phase of the run.
pub fn state(name: &str) -> Option<String> {
    std::env::var(format!("{STATE_ENV_PREFIX}{name}"))
        .ok()
        .filter(|value| !value.is_empty())
}

fn append_file_command(path: &Path, name: &str, value: &str) -> io::Result<()> {
    use rand::distributions::{Alphanumeric, DistString};

    let delimiter = format!(
        "{DELIMITER_PREFIX}{}",
        Alphanumeric.sample_string(&mut rand::thread_rng(), 24)
    );
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(format_file_command(name, value, &delimiter)?.as_bytes())
}

fn format_file_command(name: &str, value: &str, delimiter: &str) -> io::Result<String> {
    if name.contains(delimiter) || value.contains(delimiter) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unexpected delimiter {delimiter:?} in the value of {name:?}"),
        ));
    }
    Ok(format!("{name}<<{delimiter}\n{value}\n{delimiter}\n"))
}
