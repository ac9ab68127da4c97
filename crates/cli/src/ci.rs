//! Git ref and event detection for CI environments

use crate::UsageError;

/// CI service whose environment supplies the git ref
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiEnv {
    GitHubActions,
    Travis,
}

/// Which Travis CI event types should upload
#[derive(Debug, Clone, Copy)]
pub struct TravisEvents {
    pub push: bool,
    pub pull_request: bool,
    pub api: bool,
    pub cron: bool,
}

impl Default for TravisEvents {
    fn default() -> Self {
        Self {
            push: true,
            pull_request: false,
            api: true,
            cron: true,
        }
    }
}

/// Message to print when the current Travis event is disabled, or `None`
/// when the upload should go ahead
pub fn travis_skip_message<F>(events: &TravisEvents, env: F) -> Result<Option<&'static str>, UsageError>
where
    F: Fn(&str) -> Option<String>,
{
    let event = env("TRAVIS_EVENT_TYPE").ok_or_else(|| {
        UsageError(
            "Using --travis but the TRAVIS_EVENT_TYPE environment variable is not detected."
                .to_string(),
        )
    })?;

    let message = match event.as_str() {
        "push" if !events.push => Some("Skipping upload on Travis push event."),
        "pull_request" if !events.pull_request => {
            Some("Skipping upload on Travis pull request event.")
        }
        "api" if !events.api => Some("Skipping upload on Travis API event."),
        "cron" if !events.cron => Some("Skipping upload on Travis cron event."),
        _ => None,
    };
    Ok(message)
}

/// Git refs for the build: an explicit `--git-ref` list, or the ref the CI
/// environment reports when `--git-ref` is absent
pub fn resolve_git_refs<F>(
    ci: Option<CiEnv>,
    git_ref: Option<&str>,
    env: F,
) -> Result<Vec<String>, UsageError>
where
    F: Fn(&str) -> Option<String>,
{
    match (ci, git_ref) {
        (Some(CiEnv::Travis), None) => Ok(vec![travis_git_ref(&env)?]),
        (Some(CiEnv::GitHubActions), None) => Ok(vec![github_git_ref(&env)?]),
        (_, Some(git_ref)) => Ok(git_ref.split_whitespace().map(str::to_string).collect()),
        (None, None) => Err(UsageError("--git-ref is required.".to_string())),
    }
}

fn non_empty<F>(env: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env(name).filter(|value| !value.is_empty())
}

fn travis_git_ref<F>(env: &F) -> Result<String, UsageError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(env, "TRAVIS_BRANCH").ok_or_else(|| {
        UsageError(
            "Using --travis but the TRAVIS_BRANCH environment variable is not detected."
                .to_string(),
        )
    })
}

fn github_git_ref<F>(env: &F) -> Result<String, UsageError>
where
    F: Fn(&str) -> Option<String>,
{
    if env("GITHUB_EVENT_NAME").as_deref() == Some("pull_request") {
        return non_empty(env, "GITHUB_HEAD_REF").ok_or_else(|| {
            UsageError(
                "Using --gh but the GITHUB_HEAD_REF environment variable is not detected."
                    .to_string(),
            )
        });
    }

    let github_ref = non_empty(env, "GITHUB_REF").ok_or_else(|| {
        UsageError(
            "Using --gh but the GITHUB_REF environment variable is not detected.".to_string(),
        )
    })?;
    parse_github_ref(&github_ref).ok_or_else(|| {
        UsageError(format!(
            "Could not parse the GITHUB_REF environment variable: {}",
            github_ref
        ))
    })
}

/// `refs/heads/main` → `main`, also for `tags` and `pull` refs
pub fn parse_github_ref(github_ref: &str) -> Option<String> {
    let rest = github_ref.strip_prefix("refs/")?;
    let (kind, name) = rest.split_once('/')?;
    match kind {
        "heads" | "tags" | "pull" if !name.is_empty() => Some(name.to_string()),
        _ => None,
    }
}
