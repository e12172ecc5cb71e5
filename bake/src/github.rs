mod command;

use std::path::{Path, PathBuf};

pub use command::*;
use log::debug;
use serde::Deserialize;

use crate::Result;

const DEFAULT_SERVER_URL: &str = "https://github.com";

/// The parts of the workflow run environment that end up on the bake command line. See
/// https://docs.github.com/en/actions/learn-github-actions/variables#default-environment-variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitHubContext {
    pub server_url: String,
    pub repository: String,
    pub run_id: String,
    pub run_attempt: String,
    pub git_ref: String,
    pub sha: String,
    pub event_path: Option<PathBuf>,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_owned())
}

impl GitHubContext {
    pub fn from_env() -> Self {
        Self {
            server_url: env_or("GITHUB_SERVER_URL", DEFAULT_SERVER_URL),
            repository: env_or("GITHUB_REPOSITORY", ""),
            run_id: env_or("GITHUB_RUN_ID", ""),
            run_attempt: env_or("GITHUB_RUN_ATTEMPT", "1"),
            git_ref: env_or("GITHUB_REF", ""),
            sha: env_or("GITHUB_SHA", ""),
            event_path: std::env::var_os("GITHUB_EVENT_PATH")
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Identifies the workflow run attempt, used as the provenance `builder-id`.
    pub fn workflow_run_url(&self) -> String {
        format!(
            "{server}/{repository}/actions/runs/{run_id}/attempts/{run_attempt}",
            server = self.server_url,
            repository = self.repository,
            run_id = self.run_id,
            run_attempt = self.run_attempt,
        )
    }

    /// The remote git context of the commit being built, e.g.
    /// `https://github.com/docker/buildx.git#refs/heads/master`.
    pub fn git_context(&self) -> String {
        let git_ref = if self.git_ref.is_empty() {
            &self.sha
        } else {
            &self.git_ref
        };
        format!(
            "{server}/{repository}.git#{git_ref}",
            server = self.server_url,
            repository = self.repository,
        )
    }

    /// Reads `repository.private` from the event payload. Returns `None` when the payload is not
    /// available or does not say.
    pub fn is_repository_private(&self) -> Option<bool> {
        let path = self.event_path.as_deref()?;
        match read_event_payload(path) {
            Ok(payload) => payload.repository.and_then(|repository| repository.private),
            Err(error) => {
                debug!("failed to read event payload at {path:?}: {error}");
                None
            }
        }
    }
}

/// Partial implementation of the webhook payload that triggered the workflow.
#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default)]
    repository: Option<EventRepository>,
}

#[derive(Debug, Deserialize)]
struct EventRepository {
    #[serde(default)]
    private: Option<bool>,
}

fn read_event_payload(path: &Path) -> Result<EventPayload> {
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> GitHubContext {
        GitHubContext {
            server_url: "https://github.com".to_owned(),
            repository: "docker/build-push-action".to_owned(),
            run_id: "123456789".to_owned(),
            run_attempt: "1".to_owned(),
            git_ref: "refs/heads/master".to_owned(),
            sha: "860c1904a1ce19322e91ac35af1ab07466440c37".to_owned(),
            event_path: None,
        }
    }

    #[test]
    fn workflow_run_url_works() {
        assert_eq!(
            context().workflow_run_url(),
            "https://github.com/docker/build-push-action/actions/runs/123456789/attempts/1"
        );
    }

    #[test]
    fn git_context_works() {
        assert_eq!(
            context().git_context(),
            "https://github.com/docker/build-push-action.git#refs/heads/master"
        );
        assert_eq!(
            GitHubContext {
                git_ref: String::new(),
                ..context()
            }
            .git_context(),
            "https://github.com/docker/build-push-action.git#860c1904a1ce19322e91ac35af1ab07466440c37"
        );
    }

    #[test]
    fn repository_visibility_is_read_from_the_event_payload() {
        let dir = tempfile::tempdir().unwrap();
        let with_payload = |payload: &str| {
            let path = dir.path().join("event.json");
            std::fs::write(&path, payload).unwrap();
            GitHubContext {
                event_path: Some(path),
                ..context()
            }
            .is_repository_private()
        };

        assert_eq!(with_payload(r#"{"repository": {"private": false}}"#), Some(false));
        assert_eq!(with_payload(r#"{"repository": {"private": true}}"#), Some(true));
        assert_eq!(with_payload(r#"{"repository": {}}"#), None);
        assert_eq!(with_payload(r#"{}"#), None);
        assert_eq!(with_payload("not json"), None);
        assert_eq!(context().is_repository_private(), None);
    }
}
