use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration structure loaded from the TOML config file.
///
/// Example:
/// ```toml
/// output_dir = "/var/lib/gitmirror"
/// clone_url  = "https://git.example.com/{repo}"
/// clone_via_ssh = false
/// owner = "John Doe"
///
/// [[repositories]]
/// name      = "tmp"
/// clone_url = "https://example.com/tmp.git"
///
/// [github]
/// [[github.repositories]]
/// id = "torvalds/linux"
/// [[github.users]]
/// name = "octocat"
/// skip = ["boring-repo"]
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Root of the mirror tree.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Frontend clone URL template; `{repo}` is replaced with the repository
    /// id and the result is advertised next to the upstream URL.
    #[serde(default)]
    pub clone_url: Option<String>,
    /// Prefer SSH over HTTPS upstream URLs for provider-hosted repositories.
    #[serde(default = "default_true")]
    pub clone_via_ssh: bool,
    /// Default owner for repositories that do not set one.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repositories: Vec<RepoEntry>,
    #[serde(default)]
    pub github: ForgeSection,
    #[serde(default)]
    pub bitbucket: ForgeSection,
    #[serde(default)]
    pub gitlab: ForgeSection,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/var/lib/gitmirror")
}

fn default_true() -> bool {
    true
}

/// An explicitly configured repository with a known clone URL.
#[derive(Debug, Deserialize, Clone)]
pub struct RepoEntry {
    pub name: String,
    pub clone_url: String,
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
}

/// One hosting-provider section (`[github]`, `[bitbucket]`, `[gitlab]`).
#[derive(Debug, Default, Deserialize)]
pub struct ForgeSection {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub repositories: Vec<HostedRepoEntry>,
    #[serde(default)]
    pub users: Vec<AccountEntry>,
    /// GitHub organizations, GitLab groups, Bitbucket team workspaces.
    #[serde(default)]
    pub organizations: Vec<AccountEntry>,
}

impl ForgeSection {
    /// Whether the section asks for anything at all. Empty sections are
    /// skipped without contacting the provider.
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty() && self.users.is_empty() && self.organizations.is_empty()
    }
}

/// A single provider-hosted repository, looked up by `owner/name` id.
#[derive(Debug, Deserialize, Clone)]
pub struct HostedRepoEntry {
    pub id: String,
    #[serde(default)]
    pub dir: Option<String>,
}

/// A provider account (user or organization) whose repositories are all
/// mirrored, minus the `skip` list.
#[derive(Debug, Deserialize, Clone)]
pub struct AccountEntry {
    pub name: String,
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub skip: Vec<String>,
}

/// A configuration value that may instead come from the environment.
/// Tokens usually do.
pub fn config_or_env(value: &Option<String>, env_name: &str) -> Option<String> {
    if value.is_some() {
        return value.clone();
    }
    env::var(env_name).ok()
}

/// Load and parse the configuration file.
///
/// # Errors
/// - Returns an error if the file cannot be read.
/// - Returns an error if parsing the TOML fails (including missing required
///   keys such as a repository `name` or `clone_url`).
pub fn load_config(path: &Path) -> Result<Config> {
    let txt = fs::read_to_string(path)
        .with_context(|| format!("config not found: {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&txt).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn parses_a_full_config() {
        let cfg: Config = toml::from_str(
            r#"
            output_dir = "/tmp/mirrors"
            clone_url = "https://git.example.com/{repo}"
            clone_via_ssh = false
            owner = "John Doe"

            [[repositories]]
            name = "tmp"
            clone_url = "https://example.com/tmp.git"
            dir = "misc"

            [github]
            token = "gh-token"
            [[github.repositories]]
            id = "torvalds/linux"
            [[github.users]]
            name = "octocat"
            skip = ["boring"]
            [[github.organizations]]
            name = "rust-lang"

            [bitbucket]
            username = "bb-user"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.output_dir, PathBuf::from("/tmp/mirrors"));
        assert!(!cfg.clone_via_ssh);
        assert_eq!(cfg.owner.as_deref(), Some("John Doe"));
        assert_eq!(cfg.repositories.len(), 1);
        assert_eq!(cfg.repositories[0].dir.as_deref(), Some("misc"));
        assert_eq!(cfg.github.token.as_deref(), Some("gh-token"));
        assert_eq!(cfg.github.repositories[0].id, "torvalds/linux");
        assert_eq!(cfg.github.users[0].skip, vec!["boring"]);
        assert_eq!(cfg.github.organizations[0].name, "rust-lang");
        assert!(!cfg.github.is_empty());
        assert!(cfg.bitbucket.is_empty());
        assert!(cfg.gitlab.is_empty());
    }

    #[test]
    fn defaults_apply_to_an_empty_config() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.output_dir, PathBuf::from("/var/lib/gitmirror"));
        assert!(cfg.clone_via_ssh);
        assert!(cfg.repositories.is_empty());
        assert!(cfg.github.is_empty());
    }

    #[test]
    fn repository_without_clone_url_is_rejected() {
        let err = toml::from_str::<Config>(
            r#"
            [[repositories]]
            name = "tmp"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("clone_url"));
    }

    #[test]
    #[serial]
    fn token_falls_back_to_the_environment() {
        unsafe { env::set_var("GITMIRROR_TEST_TOKEN", "from-env") };
        assert_eq!(
            config_or_env(&None, "GITMIRROR_TEST_TOKEN").as_deref(),
            Some("from-env")
        );
        assert_eq!(
            config_or_env(&Some("from-config".to_string()), "GITMIRROR_TEST_TOKEN").as_deref(),
            Some("from-config")
        );
        unsafe { env::remove_var("GITMIRROR_TEST_TOKEN") };
        assert_eq!(config_or_env(&None, "GITMIRROR_TEST_TOKEN"), None);
    }
}
