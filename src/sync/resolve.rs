use anyhow::Result;

use crate::config::{Config, ForgeSection, config_or_env};
use crate::providers::{Bitbucket, Forge, GitHub, GitLab};
use crate::repo::Repo;

/// Build the full list of repository descriptors for one run: explicit
/// config entries first, then each configured provider section.
///
/// Provider lookups happen eagerly, before any repository is touched on
/// disk; a failed lookup fails the whole run rather than silently mirroring
/// a subset.
pub fn resolve_repositories(cfg: &Config) -> Result<Vec<Repo>> {
    let mut repos: Vec<Repo> = cfg
        .repositories
        .iter()
        .map(|entry| Repo::from_config(entry, cfg))
        .collect();

    if !cfg.github.is_empty() {
        let token = config_or_env(&cfg.github.token, "GITMIRROR_GITHUB_TOKEN");
        let forge = GitHub::new(token, cfg.clone_via_ssh)?;
        collect_forge(&forge, &cfg.github, &mut repos)?;
    }
    if !cfg.bitbucket.is_empty() {
        let username = config_or_env(&cfg.bitbucket.username, "GITMIRROR_BITBUCKET_USERNAME");
        let token = config_or_env(&cfg.bitbucket.token, "GITMIRROR_BITBUCKET_TOKEN");
        let forge = Bitbucket::new(username, token, cfg.clone_via_ssh)?;
        collect_forge(&forge, &cfg.bitbucket, &mut repos)?;
    }
    if !cfg.gitlab.is_empty() {
        let username = config_or_env(&cfg.gitlab.username, "GITMIRROR_GITLAB_USERNAME");
        let token = config_or_env(&cfg.gitlab.token, "GITMIRROR_GITLAB_TOKEN");
        let forge = GitLab::new(username, token, cfg.clone_via_ssh)?;
        collect_forge(&forge, &cfg.gitlab, &mut repos)?;
    }

    Ok(repos)
}

fn collect_forge(
    forge: &dyn Forge,
    section: &ForgeSection,
    repos: &mut Vec<Repo>,
) -> Result<()> {
    for entry in &section.repositories {
        let mut repo = forge.get_repo(&entry.id)?;
        repo.dir = entry.dir.clone();
        repos.push(repo);
    }
    for account in &section.users {
        for mut repo in forge.get_user_repos(&account.name)? {
            if account.skip.contains(&repo.name) {
                continue;
            }
            repo.dir = account.dir.clone();
            repos.push(repo);
        }
    }
    for account in &section.organizations {
        for mut repo in forge.get_org_repos(&account.name)? {
            if account.skip.contains(&repo.name) {
                continue;
            }
            repo.dir = account.dir.clone();
            repos.push(repo);
        }
    }
    Ok(())
}
