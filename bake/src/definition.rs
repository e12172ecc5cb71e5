use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{
    input::{parse_list, ListMode},
    Result,
};

/// Partial implementation of the JSON printed by `docker buildx bake --print`. See
/// https://docs.docker.com/build/bake/reference/.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
pub struct BakeDefinition {
    #[serde(default)]
    pub group: BTreeMap<String, Group>,

    #[serde(default)]
    pub target: BTreeMap<String, Target>,
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
pub struct Group {
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
pub struct Target {
    pub context: Option<String>,
    pub dockerfile: Option<String>,

    /// Build arguments. A `null` value means the argument is taken from the environment.
    #[serde(default)]
    pub args: BTreeMap<String, Option<String>>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub platforms: Vec<String>,

    /// Name of the stage to build.
    pub target: Option<String>,

    #[serde(default)]
    pub output: Vec<Output>,
}

/// An exporter, printed either in CSV form (`type=docker,name=app`) or as an object of attributes
/// (`{"type": "docker"}`) depending on the buildx version.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Output {
    Csv(String),
    Attributes(BTreeMap<String, serde_json::Value>),
}

impl Output {
    fn is_docker_exporter(&self) -> bool {
        match self {
            Output::Csv(output) => parse_list(output, ListMode::Csv).iter().any(|field| {
                field
                    .split_once('=')
                    .is_some_and(|(key, value)| key.trim() == "type" && value.trim() == "docker")
            }),
            Output::Attributes(attributes) => {
                attributes.get("type").and_then(serde_json::Value::as_str) == Some("docker")
            }
        }
    }
}

impl BakeDefinition {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns true if the build ends up in the local image store, either because `load` is set
    /// or because a target exports with `type=docker`.
    pub fn has_docker_exporter(&self, load: bool) -> bool {
        load || self
            .target
            .values()
            .flat_map(|target| &target.output)
            .any(Output::is_docker_exporter)
    }
}
