use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use log::debug;
use serde::Deserialize;

use crate::{temp_path, Result};

const METADATA_FILE_NAME: &str = "metadata-file";

/// Hands out the path buildx writes its `--metadata-file` to and reads it back once the build is
/// done. The directory holding the file is created on first use and reused afterwards.
pub struct MetadataResolver {
    parent: PathBuf,
    tmp_dir: OnceLock<PathBuf>,
}

impl MetadataResolver {
    /// Creates the run directory lazily inside `parent`.
    pub fn new(parent: impl Into<PathBuf>) -> Self {
        Self {
            parent: parent.into(),
            tmp_dir: OnceLock::new(),
        }
    }

    /// Uses `tmp_dir` as the run directory as is.
    #[cfg(test)]
    pub fn with_tmp_dir(tmp_dir: impl Into<PathBuf>) -> Self {
        let tmp_dir = tmp_dir.into();
        Self {
            parent: tmp_dir.clone(),
            tmp_dir: OnceLock::from(tmp_dir),
        }
    }

    /// Returns the run directory, if it has been created.
    pub fn tmp_dir(&self) -> Option<&Path> {
        self.tmp_dir.get().map(PathBuf::as_path)
    }

    fn tmp_dir_or_create(&self) -> io::Result<&Path> {
        if let Some(dir) = self.tmp_dir.get() {
            return Ok(dir);
        }
        let dir = temp_path::create_tmp_dir(&self.parent)?;
        debug!("created temporary directory {dir:?}");
        Ok(self.tmp_dir.get_or_init(|| dir))
    }

    pub fn reserve_path(&self) -> io::Result<PathBuf> {
        Ok(self.tmp_dir_or_create()?.join(METADATA_FILE_NAME))
    }

    /// Returns the trimmed metadata document, or `None` if buildx did not write one. Buildx writes
    /// `null` when there is no metadata to report.
    pub fn read(&self) -> io::Result<Option<String>> {
        let Some(dir) = self.tmp_dir() else {
            return Ok(None);
        };
        read_metadata_file(&dir.join(METADATA_FILE_NAME))
    }
}

fn read_metadata_file(path: &Path) -> io::Result<Option<String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error),
    };
    let content = content.trim();
    if content.is_empty() || content == "null" {
        return Ok(None);
    }
    Ok(Some(content.to_owned()))
}

/// Partial implementation of the JSON emitted by the `--metadata-file` option of `docker buildx
/// bake`. See https://docs.docker.com/reference/cli/docker/buildx/bake/#metadata-file.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct BakeMetadata {
    #[serde(rename = "buildx.build.warnings", default)]
    pub warnings: Vec<BuildWarning>,

    #[serde(flatten)]
    pub targets: BTreeMap<String, TargetMetadata>,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct TargetMetadata {
    #[serde(rename = "buildx.build.ref")]
    pub build_ref: Option<String>,

    #[serde(rename = "containerimage.digest")]
    pub image_digest: Option<String>,

    #[serde(rename = "image.name")]
    pub image_name: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct BuildWarning {
    #[serde(default)]
    pub vertex: Option<String>,

    #[serde(default)]
    pub level: Option<i64>,

    /// Base64 encoded short description.
    #[serde(default)]
    pub short: Option<String>,
}

impl BakeMetadata {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build references of the targets that reported one, ordered by target name.
    pub fn build_refs(&self) -> Vec<&str> {
        self.targets
            .values()
            .filter_map(|target| target.build_ref.as_deref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_path_creates_one_directory() {
        let parent = tempfile::tempdir().unwrap();
        let resolver = MetadataResolver::new(parent.path());
        assert_eq!(resolver.tmp_dir(), None);

        let first = resolver.reserve_path().unwrap();
        let second = resolver.reserve_path().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.file_name().unwrap(), "metadata-file");
        assert!(first.parent().unwrap().is_dir());
        assert_eq!(resolver.tmp_dir(), first.parent());
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 1);
    }

    #[test]
    fn with_tmp_dir_uses_the_given_directory() {
        let resolver = MetadataResolver::with_tmp_dir("/tmp/x");
        assert_eq!(
            resolver.reserve_path().unwrap(),
            PathBuf::from("/tmp/x/metadata-file")
        );
    }

    #[test]
    fn read_handles_missing_and_null_files() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = MetadataResolver::with_tmp_dir(dir.path());
        assert_eq!(resolver.read().unwrap(), None);

        let path = resolver.reserve_path().unwrap();
        std::fs::write(&path, " null\n").unwrap();
        assert_eq!(resolver.read().unwrap(), None);

        std::fs::write(&path, "\n{\"app\": {}}\n").unwrap();
        assert_eq!(resolver.read().unwrap().as_deref(), Some("{\"app\": {}}"));
    }

    #[test]
    fn read_before_reserve_is_none() {
        let parent = tempfile::tempdir().unwrap();
        let resolver = MetadataResolver::new(parent.path());
        assert_eq!(resolver.read().unwrap(), None);
    }

    #[test]
    fn read_propagates_other_errors() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = MetadataResolver::with_tmp_dir(dir.path());
        // A directory where the file should be can not be read as a string.
        std::fs::create_dir(resolver.reserve_path().unwrap()).unwrap();
        assert!(resolver.read().is_err());
    }

    #[test]
    fn bake_metadata_parsing_works() {
        let metadata = BakeMetadata::parse(
            r#"{
                "buildx.build.warnings": [
                    {"vertex": "sha256:abc", "level": 1, "short": "Rm9v"}
                ],
                "webapp": {
                    "buildx.build.ref": "builder/builder0/k1",
                    "containerimage.digest": "sha256:0123",
                    "image.name": "user/app:latest"
                },
                "db": {
                    "buildx.build.ref": "builder/builder0/k2"
                },
                "lint": {}
            }"#,
        )
        .unwrap();

        assert_eq!(metadata.warnings.len(), 1);
        assert_eq!(metadata.warnings[0].level, Some(1));
        assert_eq!(
            metadata.build_refs(),
            vec!["builder/builder0/k2", "builder/builder0/k1"]
        );
        assert_eq!(
            metadata.targets["webapp"].image_digest.as_deref(),
            Some("sha256:0123")
        );
        assert_eq!(metadata.targets["lint"], TargetMetadata::default());
    }
}
