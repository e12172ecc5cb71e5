use version_range::{InvalidRange, Range};

/// Parsed output of `docker buildx inspect`, e.g.:
///
/// ```text
/// Name:          builder2
/// Driver:        docker-container
///
/// Nodes:
/// Name:          builder20
/// Endpoint:      unix:///var/run/docker.sock
/// Status:        running
/// Buildkit:      v0.11.0
/// ```
///
/// Newer releases print `BuildKit version:` instead of `Buildkit:`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuilderInfo {
    pub name: String,
    pub driver: String,
    pub nodes: Vec<BuilderNode>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuilderNode {
    pub name: String,
    pub endpoint: String,
    pub status: String,
    pub buildkit: Option<String>,
}

impl BuilderInfo {
    pub fn parse(stdout: &str) -> Self {
        let mut info = BuilderInfo::default();
        let mut in_nodes = false;

        for line in stdout.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            if !in_nodes {
                match key.as_str() {
                    "name" => info.name = value.to_owned(),
                    "driver" => info.driver = value.to_owned(),
                    "nodes" => in_nodes = true,
                    _ => {}
                }
                continue;
            }

            if key == "name" {
                info.nodes.push(BuilderNode {
                    name: value.to_owned(),
                    ..BuilderNode::default()
                });
                continue;
            }
            let Some(node) = info.nodes.last_mut() else {
                continue;
            };
            match key.as_str() {
                "endpoint" => node.endpoint = value.to_owned(),
                "status" => node.status = value.to_owned(),
                "buildkit" | "buildkit version" if !value.is_empty() => {
                    node.buildkit = Some(value.to_owned())
                }
                _ => {}
            }
        }

        info
    }

    /// Returns true if every node runs a BuildKit version in `range`. A builder without nodes, or
    /// with a node that did not report its version, does not satisfy any range.
    pub fn buildkit_satisfies(&self, range: &str) -> Result<bool, InvalidRange> {
        let range = Range::parse(range)?;
        if self.nodes.is_empty() {
            return Ok(false);
        }
        Ok(self.nodes.iter().all(|node| {
            node.buildkit.as_deref().is_some_and(|version| {
                version_range::ToolVersion::parse(version)
                    .is_ok_and(|version| version.satisfies(&range))
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = "\
Name:          builder2
Driver:        docker-container
Last Activity: 2023-01-16 09:45:23 +0000 UTC

Nodes:
Name:      builder20
Endpoint:  unix:///var/run/docker.sock
Status:    running
Flags:     --debug --allow-insecure-entitlement security.insecure
Buildkit:  v0.11.0
Platforms: linux/amd64, linux/amd64/v2, linux/arm64
";

    const CURRENT: &str = "\
Name:          multi
Driver:        docker-container
Last Activity: 2024-09-02 10:01:12 +0000 UTC

Nodes:
Name:                  multi0
Endpoint:              unix:///var/run/docker.sock
Status:                running
BuildKit daemon flags: --allow-insecure-entitlement=network.host
BuildKit version:      v0.16.0
Platforms:             linux/amd64
Labels:
 org.mobyproject.buildkit.worker.executor: oci

Name:                  multi1
Endpoint:              ssh://user@arm64-host
Status:                inactive
Platforms:             linux/arm64
";

    #[test]
    fn parse_legacy_output_works() {
        assert_eq!(
            BuilderInfo::parse(LEGACY),
            BuilderInfo {
                name: "builder2".to_owned(),
                driver: "docker-container".to_owned(),
                nodes: vec![BuilderNode {
                    name: "builder20".to_owned(),
                    endpoint: "unix:///var/run/docker.sock".to_owned(),
                    status: "running".to_owned(),
                    buildkit: Some("v0.11.0".to_owned()),
                }],
            }
        );
    }

    #[test]
    fn parse_current_output_works() {
        let info = BuilderInfo::parse(CURRENT);
        assert_eq!(info.name, "multi");
        assert_eq!(info.nodes.len(), 2);
        assert_eq!(info.nodes[0].buildkit.as_deref(), Some("v0.16.0"));
        assert_eq!(info.nodes[1].endpoint, "ssh://user@arm64-host");
        assert_eq!(info.nodes[1].buildkit, None);
    }

    #[test]
    fn buildkit_satisfies_works() {
        let legacy = BuilderInfo::parse(LEGACY);
        assert!(legacy.buildkit_satisfies(">=0.11.0").unwrap());
        assert!(!legacy.buildkit_satisfies(">=0.12.0").unwrap());
        assert!(legacy.buildkit_satisfies(">=0.11.0 <").is_err());

        // One node did not report its version.
        assert!(!BuilderInfo::parse(CURRENT)
            .buildkit_satisfies(">=0.11.0")
            .unwrap());

        assert!(!BuilderInfo::default().buildkit_satisfies("*").unwrap());

        let dev = BuilderInfo {
            nodes: vec![BuilderNode {
                buildkit: Some("a1b2c3d".to_owned()),
                ..BuilderNode::default()
            }],
            ..BuilderInfo::default()
        };
        assert!(dev.buildkit_satisfies(">=0.11.0").unwrap());
    }
}
