use std::{fmt, path::Path};

use constcat::concat;
use log::{debug, info, warn};

use crate::{
    args::{bake_args, print_args, BakeContext},
    buildx::{self, Buildx, BuilderInfo},
    definition::BakeDefinition,
    github::{self, GitHubContext, STATE_BUILD_REFS, STATE_DEFINITION, STATE_TMP_DIR},
    input::Inputs,
    metadata::{BakeMetadata, MetadataResolver},
    process::{self, command},
    Result,
};

const METADATA_OUTPUT: &str = "metadata";
const UNKNOWN_ERROR: &str = "unknown error";
const INSPECT_FAILED: &str = concat!(
    "Failed to inspect the builder, ",
    "provenance attestations are only requested when set explicitly"
);

/// The build failed. Carries the last line buildx wrote to stderr, which usually names the cause.
#[derive(Debug)]
pub struct BuildFailed(String);

impl std::error::Error for BuildFailed {}

impl fmt::Display for BuildFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buildx bake failed with: {}", self.0)
    }
}

impl From<process::Error> for BuildFailed {
    fn from(error: process::Error) -> Self {
        match error.stderr_tail() {
            Some(line) => BuildFailed(line.to_owned()),
            None => BuildFailed(match &error.kind {
                process::ErrorKind::NonZeroExitStatus(_) => UNKNOWN_ERROR.to_owned(),
                _ => error.to_string(),
            }),
        }
    }
}

pub fn run(tmp_dir: &Path) -> Result<()> {
    let github = GitHubContext::from_env();
    let inputs = Inputs::from_env(&github)?;
    debug!("inputs: {inputs:?}");

    let buildx = Buildx::detect()?;

    github::group("Docker info", || print_docker_info(&buildx));

    let version = github::group("Buildx version", || buildx.version())?;
    info!("Using buildx {version}");

    let definition = github::group("Bake definition", || {
        resolve_definition(&buildx, &inputs, &version)
    })?;

    let builder = inspect_builder(&buildx, &inputs);

    let metadata = MetadataResolver::new(tmp_dir);
    let run_url = github.workflow_run_url();
    let args = bake_args(
        &inputs,
        &BakeContext {
            buildx_version: &version,
            builder: builder.as_ref(),
            definition: Some(&definition),
            repository_private: github.is_repository_private(),
            run_url: &run_url,
            no_default_attestations: buildx::no_default_attestations(),
            metadata: &metadata,
        },
    );
    // The directory may have been created even if building the arguments failed afterwards.
    if let Some(dir) = metadata.tmp_dir() {
        github::save_state(STATE_TMP_DIR, &dir.to_string_lossy())?;
    }
    let args = args?;

    info!("Building...");
    buildx
        .bake_command(&inputs, &args)
        .status_with_stderr_tail()
        .map_err(BuildFailed::from)?;

    publish_metadata(&metadata)
}

fn print_docker_info(buildx: &Buildx) {
    if buildx.is_standalone() {
        info!("Docker info skipped in standalone mode");
        return;
    }
    for command in [command!("docker", "version"), command!("docker", "info")] {
        if let Err(error) = command.status() {
            warn!("{error}");
        }
    }
}

fn resolve_definition(buildx: &Buildx, inputs: &Inputs, version: &str) -> Result<BakeDefinition> {
    let args = print_args(inputs, version)?;
    let raw = buildx.print_definition(inputs, &args)?;
    println!("{raw}");
    let definition = BakeDefinition::parse(&raw)?;
    github::save_state(STATE_DEFINITION, &raw)?;
    Ok(definition)
}

fn inspect_builder(buildx: &Buildx, inputs: &Inputs) -> Option<BuilderInfo> {
    match buildx.inspect(&inputs.builder) {
        Ok(builder) => {
            debug!("builder: {builder:?}");
            Some(builder)
        }
        Err(error) => {
            warn!("{INSPECT_FAILED}: {error}");
            None
        }
    }
}

fn publish_metadata(metadata: &MetadataResolver) -> Result<()> {
    let Some(raw) = metadata.read()? else {
        debug!("buildx did not write any metadata");
        return Ok(());
    };

    github::group("Metadata", || println!("{raw}"));
    github::set_output(METADATA_OUTPUT, &raw)?;

    let parsed = match BakeMetadata::parse(&raw) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!("Failed to parse the metadata: {error}");
            return Ok(());
        }
    };

    let build_refs = parsed.build_refs();
    if !build_refs.is_empty() {
        github::save_state(STATE_BUILD_REFS, &build_refs.join(","))?;
    }

    for warning in &parsed.warnings {
        warn!(
            "Build warning on {vertex}",
            vertex = warning.vertex.as_deref().unwrap_or("unknown vertex")
        );
    }

    Ok(())
}
