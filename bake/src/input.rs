mod list;

use std::{collections::HashMap, fmt};

pub use list::*;

use crate::{github::GitHubContext, Result};

/// Where action inputs are read from.
pub trait InputSource {
    /// Returns the raw value of the input named `name`, if set.
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads inputs from the `INPUT_<NAME>` environment variables set by the runner.
pub struct EnvInputs;

/// See https://github.com/actions/toolkit/blob/main/packages/core/src/core.ts for the naming
/// convention.
pub fn input_env_name(name: &str) -> String {
    format!("INPUT_{}", name.replace(' ', "_").to_uppercase())
}

impl InputSource for EnvInputs {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(input_env_name(name)).ok()
    }
}

impl<K, V> InputSource for HashMap<K, V>
where
    K: std::borrow::Borrow<str> + std::hash::Hash + Eq,
    V: AsRef<str>,
{
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).map(|value| value.as_ref().to_owned())
    }
}

#[derive(Debug)]
pub struct InvalidBooleanInput {
    pub name: String,
    pub value: String,
}

impl std::error::Error for InvalidBooleanInput {}

impl fmt::Display for InvalidBooleanInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input `{name}` does not meet the boolean specification: {value:?}, expected `true` or `false`",
            name = self.name,
            value = self.value
        )
    }
}

/// A value that is never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_empty() { "\"\"" } else { "\"***\"" })
    }
}

/// The inputs of the action, decoded once per run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Inputs {
    pub builder: String,
    pub files: Vec<String>,
    pub targets: Vec<String>,
    pub workdir: String,
    pub source: String,
    pub no_cache: bool,
    pub pull: bool,
    pub load: bool,
    pub push: bool,
    pub provenance: String,
    pub sbom: String,
    pub set: Vec<String>,
    pub allow: Vec<String>,
    pub github_token: Secret,
}

pub const DEFAULT_CONTEXT_PLACEHOLDER: &str = "{{defaultContext}}";

struct Reader<'a, S: ?Sized> {
    source: &'a S,
}

impl<S: InputSource + ?Sized> Reader<'_, S> {
    fn string(&self, name: &str) -> String {
        self.source
            .get(name)
            .map(|value| value.trim().to_owned())
            .unwrap_or_default()
    }

    fn list(&self, name: &str, mode: ListMode) -> Vec<String> {
        parse_list(&self.string(name), mode)
    }

    fn bool(&self, name: &str) -> Result<bool, InvalidBooleanInput> {
        let value = self.string(name);
        if value.is_empty() {
            return Ok(false);
        }
        parse_bool(&value).ok_or(InvalidBooleanInput {
            name: name.to_owned(),
            value,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl Inputs {
    pub fn from_source<S: InputSource + ?Sized>(source: &S, github: &GitHubContext) -> Result<Self> {
        let reader = Reader { source };
        Ok(Self {
            builder: reader.string("builder"),
            files: reader.list("files", ListMode::Csv),
            targets: reader.list("targets", ListMode::Csv),
            workdir: reader.string("workdir"),
            source: resolve_source(&reader.string("source"), github),
            no_cache: reader.bool("no-cache")?,
            pull: reader.bool("pull")?,
            load: reader.bool("load")?,
            push: reader.bool("push")?,
            provenance: resolve_provenance(
                &reader.string("provenance"),
                &github.workflow_run_url(),
            ),
            sbom: reader.string("sbom"),
            set: reader.list("set", ListMode::Lines),
            allow: reader.list("allow", ListMode::Csv),
            github_token: Secret(reader.string("github-token")),
        })
    }

    pub fn from_env(github: &GitHubContext) -> Result<Self> {
        Self::from_source(&EnvInputs, github)
    }
}

/// Substitutes the `{{defaultContext}}` placeholder with the git context of the workflow. The
/// local context `.` is represented by an empty string since it is the default of buildx.
fn resolve_source(raw: &str, github: &GitHubContext) -> String {
    let source = if raw.contains(DEFAULT_CONTEXT_PLACEHOLDER) {
        raw.replace(DEFAULT_CONTEXT_PLACEHOLDER, &github.git_context())
    } else {
        raw.to_owned()
    };
    if source == "." {
        String::new()
    } else {
        source
    }
}

/// Turns the `provenance` input into the value passed to `--provenance`:
///
/// - `true` becomes `builder-id=<run url>`,
/// - `false` stays `false`,
/// - an attribute list gets a `builder-id=<run url>` attribute unless it already has one.
pub fn resolve_provenance(raw: &str, run_url: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    match parse_bool(raw) {
        Some(true) => format!("builder-id={run_url}"),
        Some(false) => "false".to_owned(),
        None => resolve_provenance_attrs(raw, run_url),
    }
}

fn resolve_provenance_attrs(attrs: &str, run_url: &str) -> String {
    let has_builder_id = parse_list(attrs, ListMode::Csv).iter().any(|field| {
        field
            .split_once('=')
            .is_some_and(|(key, _)| key.trim() == "builder-id")
    });
    if has_builder_id {
        attrs.to_owned()
    } else {
        format!("{attrs},builder-id={run_url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN_URL: &str =
        "https://github.com/docker/build-push-action/actions/runs/123456789/attempts/1";

    fn github() -> GitHubContext {
        GitHubContext {
            server_url: "https://github.com".to_owned(),
            repository: "docker/build-push-action".to_owned(),
            run_id: "123456789".to_owned(),
            run_attempt: "1".to_owned(),
            git_ref: "refs/heads/master".to_owned(),
            sha: "0123456789abcdef".to_owned(),
            event_path: None,
        }
    }

    fn inputs(pairs: &[(&str, &str)]) -> Result<Inputs> {
        let source: HashMap<&str, &str> = pairs.iter().copied().collect();
        Inputs::from_source(&source, &github())
    }

    #[test]
    fn input_env_name_works() {
        assert_eq!(input_env_name("no-cache"), "INPUT_NO-CACHE");
        assert_eq!(input_env_name("github token"), "INPUT_GITHUB_TOKEN");
    }

    #[test]
    fn absent_inputs_use_defaults() {
        assert_eq!(inputs(&[]).unwrap(), Inputs::default());
    }

    #[test]
    fn inputs_are_decoded() {
        let inputs = inputs(&[
            ("builder", " builder2 "),
            ("files", "./docker-bake.hcl\n./override.hcl"),
            ("targets", "webapp,validate"),
            ("workdir", "./app"),
            ("no-cache", "TRUE"),
            ("pull", "false"),
            ("load", "True"),
            ("push", ""),
            ("sbom", "true"),
            ("set", "*.platform=linux/amd64,linux/arm64\n*.labels.foo=bar=#baz"),
            ("allow", "network.host,security.insecure"),
            ("github-token", "ghs_secret"),
        ])
        .unwrap();

        assert_eq!(inputs.builder, "builder2");
        assert_eq!(inputs.files, vec!["./docker-bake.hcl", "./override.hcl"]);
        assert_eq!(inputs.targets, vec!["webapp", "validate"]);
        assert_eq!(inputs.workdir, "./app");
        assert!(inputs.no_cache);
        assert!(!inputs.pull);
        assert!(inputs.load);
        assert!(!inputs.push);
        assert_eq!(inputs.sbom, "true");
        assert_eq!(
            inputs.set,
            vec!["*.platform=linux/amd64,linux/arm64", "*.labels.foo=bar=#baz"]
        );
        assert_eq!(inputs.allow, vec!["network.host", "security.insecure"]);
        assert_eq!(inputs.github_token.expose(), "ghs_secret");
        assert!(!format!("{inputs:?}").contains("ghs_secret"));
    }

    #[test]
    fn invalid_booleans_are_rejected() {
        let error = inputs(&[("push", "yes")]).unwrap_err();
        assert_eq!(
            error.to_string(),
            "input `push` does not meet the boolean specification: \"yes\", expected `true` or `false`"
        );
    }

    #[test]
    fn source_is_resolved() {
        assert_eq!(inputs(&[("source", ".")]).unwrap().source, "");
        assert_eq!(
            inputs(&[("source", "{{defaultContext}}")]).unwrap().source,
            "https://github.com/docker/build-push-action.git#refs/heads/master"
        );
        assert_eq!(
            inputs(&[("source", "{{defaultContext}}:subdir")])
                .unwrap()
                .source,
            "https://github.com/docker/build-push-action.git#refs/heads/master:subdir"
        );
        assert_eq!(
            inputs(&[("source", "https://github.com/docker/buildx.git#v0.10.0")])
                .unwrap()
                .source,
            "https://github.com/docker/buildx.git#v0.10.0"
        );
    }

    #[test]
    fn provenance_is_resolved() {
        assert_eq!(resolve_provenance("", RUN_URL), "");
        assert_eq!(
            resolve_provenance("true", RUN_URL),
            format!("builder-id={RUN_URL}")
        );
        assert_eq!(resolve_provenance("false", RUN_URL), "false");
        assert_eq!(resolve_provenance("FALSE", RUN_URL), "false");
        assert_eq!(
            resolve_provenance("mode=max", RUN_URL),
            format!("mode=max,builder-id={RUN_URL}")
        );
        assert_eq!(resolve_provenance("builder-id=foo", RUN_URL), "builder-id=foo");
        assert_eq!(
            resolve_provenance("mode=min, builder-id=foo", RUN_URL),
            "mode=min, builder-id=foo"
        );
        assert_eq!(
            inputs(&[("provenance", "mode=max")]).unwrap().provenance,
            format!("mode=max,builder-id={RUN_URL}")
        );
    }
}
