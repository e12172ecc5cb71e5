use std::{io, path::PathBuf};

use crate::{
    buildx::BuilderInfo,
    definition::BakeDefinition,
    input::{resolve_provenance, Inputs},
    metadata::MetadataResolver,
    Result,
};

/// Arguments passed to buildx, in order. Items are only ever appended.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArgumentVector(Vec<String>);

impl ArgumentVector {
    pub fn push(&mut self, arg: impl Into<String>) {
        self.0.push(arg.into());
    }

    pub fn push_flag(&mut self, flag: &str, value: impl Into<String>) {
        self.push(flag);
        self.push(value);
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    #[cfg(test)]
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// Hands out the path buildx writes its metadata document to.
pub trait MetadataPath {
    fn metadata_path(&self) -> io::Result<PathBuf>;
}

impl MetadataPath for MetadataResolver {
    fn metadata_path(&self) -> io::Result<PathBuf> {
        self.reserve_path()
    }
}

/// Everything besides the inputs that decides which arguments are emitted.
pub struct BakeContext<'a> {
    /// As reported by `buildx version`, either a semantic version or a short commit hash.
    pub buildx_version: &'a str,

    /// `None` if the builder could not be inspected.
    pub builder: Option<&'a BuilderInfo>,

    /// `None` if the definition could not be printed.
    pub definition: Option<&'a BakeDefinition>,

    /// `None` if the visibility of the repository is unknown.
    pub repository_private: Option<bool>,

    pub run_url: &'a str,
    pub no_default_attestations: bool,
    pub metadata: &'a dyn MetadataPath,
}

const ALLOW_RANGE: &str = ">=0.17.0";
const METADATA_FILE_RANGE: &str = ">=0.6.0";
const ATTESTATIONS_RANGE: &str = ">=0.10.0";
const DEFAULT_PROVENANCE_BUILDKIT_RANGE: &str = ">=0.11.0";

const PRIVATE_PROVENANCE: &str = "mode=min,inline-only=true";
const PUBLIC_PROVENANCE: &str = "mode=max";

struct Step<F> {
    /// Version range buildx has to satisfy for the step to run.
    gate: Option<&'static str>,
    emit: F,
}

type BakeEmit = fn(&Inputs, &BakeContext<'_>, &mut ArgumentVector) -> Result<()>;

type PrintEmit = fn(&Inputs, &mut ArgumentVector);

const BAKE_STEPS: &[Step<BakeEmit>] = &[
    Step {
        gate: None,
        emit: |_, _, args| {
            args.push("bake");
            Ok(())
        },
    },
    Step {
        gate: None,
        emit: |inputs, _, args| {
            push_source(inputs, args);
            Ok(())
        },
    },
    Step {
        gate: Some(ALLOW_RANGE),
        emit: |inputs, _, args| {
            push_allow(inputs, args);
            Ok(())
        },
    },
    Step {
        gate: None,
        emit: |inputs, _, args| {
            push_files(inputs, args);
            Ok(())
        },
    },
    Step {
        gate: None,
        emit: |inputs, _, args| {
            push_set(inputs, args);
            Ok(())
        },
    },
    Step {
        gate: Some(METADATA_FILE_RANGE),
        emit: |_, context, args| {
            let path = context.metadata.metadata_path()?;
            args.push("--metadata-file");
            args.push(path.to_string_lossy());
            Ok(())
        },
    },
    Step {
        gate: Some(ATTESTATIONS_RANGE),
        emit: push_attestations,
    },
    Step {
        gate: None,
        emit: |inputs, _, args| {
            push_common(inputs, args);
            Ok(())
        },
    },
    Step {
        gate: None,
        emit: |inputs, _, args| {
            push_targets(inputs, args);
            Ok(())
        },
    },
];

const PRINT_STEPS: &[Step<PrintEmit>] = &[
    Step {
        gate: None,
        emit: |_, args| args.push("bake"),
    },
    Step {
        gate: None,
        emit: push_source,
    },
    Step {
        gate: Some(ALLOW_RANGE),
        emit: push_allow,
    },
    Step {
        gate: None,
        emit: push_files,
    },
    Step {
        gate: None,
        emit: push_set,
    },
    Step {
        gate: None,
        emit: |inputs, args| {
            if inputs.load {
                args.push("--load");
            }
            if inputs.no_cache {
                args.push("--no-cache");
            }
        },
    },
    Step {
        gate: Some(ATTESTATIONS_RANGE),
        emit: |inputs, args| {
            if !inputs.provenance.is_empty() {
                args.push_flag("--provenance", &inputs.provenance);
            }
        },
    },
    Step {
        gate: None,
        emit: |inputs, args| {
            if inputs.push {
                args.push("--push");
            }
        },
    },
    Step {
        gate: Some(ATTESTATIONS_RANGE),
        emit: |inputs, args| {
            if !inputs.sbom.is_empty() {
                args.push_flag("--sbom", &inputs.sbom);
            }
        },
    },
    Step {
        gate: None,
        emit: |_, args| args.push("--print"),
    },
    Step {
        gate: None,
        emit: push_targets,
    },
];

/// Returns true if the step guarded by `gate` applies to `version`. Versions that can not be
/// parsed only pass ungated steps.
fn is_open(gate: Option<&str>, version: &str) -> Result<bool> {
    match gate {
        Some(range) => Ok(version_range::satisfies(version, range)?),
        None => Ok(true),
    }
}

/// Builds the arguments of the `bake` invocation that performs the build.
pub fn bake_args(inputs: &Inputs, context: &BakeContext<'_>) -> Result<ArgumentVector> {
    let mut args = ArgumentVector::default();
    for step in BAKE_STEPS {
        if is_open(step.gate, context.buildx_version)? {
            (step.emit)(inputs, context, &mut args)?;
        }
    }
    Ok(args)
}

/// Builds the arguments of the `bake --print` invocation that resolves the definition.
pub fn print_args(inputs: &Inputs, buildx_version: &str) -> Result<ArgumentVector> {
    let mut args = ArgumentVector::default();
    for step in PRINT_STEPS {
        if is_open(step.gate, buildx_version)? {
            (step.emit)(inputs, &mut args);
        }
    }
    Ok(args)
}

fn push_source(inputs: &Inputs, args: &mut ArgumentVector) {
    if !inputs.source.is_empty() {
        args.push(&inputs.source);
    }
}

fn push_allow(inputs: &Inputs, args: &mut ArgumentVector) {
    if !inputs.allow.is_empty() {
        args.push_flag("--allow", inputs.allow.join(","));
    }
}

fn push_files(inputs: &Inputs, args: &mut ArgumentVector) {
    for file in &inputs.files {
        args.push_flag("--file", file);
    }
}

fn push_set(inputs: &Inputs, args: &mut ArgumentVector) {
    for set in &inputs.set {
        args.push_flag("--set", set);
    }
}

fn push_common(inputs: &Inputs, args: &mut ArgumentVector) {
    if inputs.no_cache {
        args.push("--no-cache");
    }
    if !inputs.builder.is_empty() {
        args.push_flag("--builder", &inputs.builder);
    }
    if inputs.pull {
        args.push("--pull");
    }
    if inputs.load {
        args.push("--load");
    }
    if inputs.push {
        args.push("--push");
    }
}

fn push_targets(inputs: &Inputs, args: &mut ArgumentVector) {
    for target in &inputs.targets {
        args.push(target);
    }
}

fn push_attestations(
    inputs: &Inputs,
    context: &BakeContext<'_>,
    args: &mut ArgumentVector,
) -> Result<()> {
    if !inputs.provenance.is_empty() {
        args.push_flag("--provenance", &inputs.provenance);
    } else if let Some(provenance) = default_provenance(inputs, context)? {
        args.push_flag("--provenance", provenance);
    }
    if !inputs.sbom.is_empty() {
        args.push_flag("--sbom", &inputs.sbom);
    }
    Ok(())
}

/// Provenance requested when the input is empty. Nothing is synthesized unless the builder is known
/// to support it and the result is not loaded into the local image store.
fn default_provenance(inputs: &Inputs, context: &BakeContext<'_>) -> Result<Option<String>> {
    if context.no_default_attestations {
        return Ok(None);
    }
    let Some(builder) = context.builder else {
        return Ok(None);
    };
    if !builder.buildkit_satisfies(DEFAULT_PROVENANCE_BUILDKIT_RANGE)? {
        return Ok(None);
    }
    let Some(definition) = context.definition else {
        return Ok(None);
    };
    if definition.has_docker_exporter(inputs.load) {
        return Ok(None);
    }
    let attrs = match context.repository_private {
        Some(true) => PRIVATE_PROVENANCE,
        Some(false) | None => PUBLIC_PROVENANCE,
    };
    Ok(Some(resolve_provenance(attrs, context.run_url)))
}
