//! The repository synchronization engine.
//!
//! High-level flow, per run:
//! 1. Load the configuration and resolve the full descriptor list
//!    (see [`resolve`]) — explicit entries plus provider lookups.
//! 2. For each repository, sequentially: judge the on-disk state
//!    (see [`judge`]), execute the verdict (mirror / update / refuse), and on
//!    success write the frontend metadata (see [`metadata`]).
//! 3. Aggregate per-repository results; one failing repository never stops
//!    the others, it only flips the final exit status.
//!
//! Repositories are processed strictly one at a time. Authenticated
//! operations mutate the *global* git config (see [`credentials`]), which is
//! host-wide state; overlapping runs of this tool would race on it.

mod credentials;
mod judge;
mod metadata;
mod resolve;

use anyhow::{Context, Result, bail};
use log::{Level, error, info, log_enabled, warn};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::git;
use crate::repo::Repo;
use credentials::CredentialScope;
use judge::Verdict;

/// The local mirror tree and everything needed to operate on it.
pub struct Output {
    root: PathBuf,
    clone_url_template: Option<String>,
    git_config: PathBuf,
}

impl Output {
    /// Create the output root (if missing) and capture the global git config
    /// path credential scopes will operate on.
    pub fn new(
        root: PathBuf,
        clone_url_template: Option<String>,
        git_config: PathBuf,
    ) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create {}", root.display()))?;
        Ok(Output {
            root,
            clone_url_template,
            git_config,
        })
    }

    pub fn repo_dir(&self, repo: &Repo) -> PathBuf {
        self.root.join(repo.id())
    }

    fn cgitrc_path(&self, repo: &Repo) -> PathBuf {
        self.repo_dir(repo).join("cgitrc")
    }

    /// Sync one repository as a unit: judge, execute, write metadata.
    ///
    /// Returns whether the repository is now up to date. Expected failures
    /// (subprocess exit codes, refused directories) come back as `Ok(false)`;
    /// `Err` is reserved for unexpected breakage and is caught by the caller
    /// so other repositories still proceed.
    pub fn pull(&self, repo: &Repo, force: bool) -> Result<bool> {
        let verdict = judge::classify(repo, &self.repo_dir(repo), force)?;
        let ok = match verdict {
            Verdict::Mirror => self.mirror(repo)?,
            Verdict::Update => self.update(repo)?,
            Verdict::FixRemote => self.fix_remote(repo)? && self.update(repo)?,
            Verdict::Unresolvable => false,
        };
        if !ok {
            return Ok(false);
        }
        metadata::write_cgitrc(&self.cgitrc_path(repo), repo, self.clone_url_template.as_deref())?;
        if let Err(e) = metadata::write_age_marker(&self.repo_dir(repo)) {
            warn!("couldn't write the age marker for '{}': {e:#}", repo.id());
        }
        Ok(true)
    }

    /// Clone a fresh mirror, replacing whatever sits at the target path.
    fn mirror(&self, repo: &Repo) -> Result<bool> {
        info!("mirroring repository '{}' from: {}", repo.id(), repo.clone_url);
        let dir = self.repo_dir(repo);
        if dir.exists() {
            if let Err(e) = fs::remove_dir_all(&dir) {
                error!("failed to remove {}: {e}", dir.display());
                return Ok(false);
            }
        }
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let _auth = CredentialScope::enter(&self.git_config, repo)?;
        let mut args: Vec<&OsStr> = vec![OsStr::new("clone"), OsStr::new("--mirror")];
        if !log_enabled!(Level::Debug) {
            args.push(OsStr::new("--quiet"));
        }
        args.push(repo.clone_url.as_ref());
        args.push(dir.as_os_str());
        git::check(None, &args)
    }

    /// Fetch into an existing mirror, pruning refs deleted upstream, then
    /// pin the default branch pointer to `origin/master` if that ref exists.
    fn update(&self, repo: &Repo) -> Result<bool> {
        info!("updating repository '{}'", repo.id());
        let dir = self.repo_dir(repo);
        {
            // The scope covers exactly the one operation that talks to the
            // network.
            let _auth = CredentialScope::enter(&self.git_config, repo)?;
            if !git::check(Some(&dir), &["remote", "update", "--prune"])? {
                return Ok(false);
            }
        }
        if git::check(Some(&dir), &["rev-parse", "--verify", "--quiet", "origin/master"])? {
            if !git::check(Some(&dir), &["reset", "--soft", "origin/master"])? {
                return Ok(false);
            }
        }
        // No origin/master (renamed default branch, bare mirror): fine.
        Ok(true)
    }

    /// Force path: point `origin` back at the configured URL.
    fn fix_remote(&self, repo: &Repo) -> Result<bool> {
        let dir = self.repo_dir(repo);
        git::check(
            Some(&dir),
            &["remote", "set-url", "origin", &repo.clone_url],
        )
    }
}

/// Synchronize the configured repositories.
///
/// `only` restricts the run to the listed repository ids (empty = all);
/// `force` lets the executor rewrite a mismatched `origin` URL instead of
/// refusing the repository.
///
/// # Errors
/// Returns an error if the configuration cannot be loaded, a provider lookup
/// fails, or any repository could not be synced (the per-repository details
/// have been logged by then).
pub fn cmd_sync(config_path: &Path, only: &[String], force: bool) -> Result<()> {
    let cfg = crate::config::load_config(config_path)?;
    let repos = resolve::resolve_repositories(&cfg)?;
    if repos.is_empty() {
        info!("no repositories configured in {}", config_path.display());
        return Ok(());
    }

    let git_config = credentials::global_config_path()?;
    let output = Output::new(cfg.output_dir.clone(), cfg.clone_url.clone(), git_config)?;

    let mut failed: Vec<String> = Vec::new();
    let mut synced = 0usize;
    for repo in &repos {
        if !only.is_empty() && !only.contains(&repo.id()) {
            continue;
        }
        synced += 1;
        let ok = match output.pull(repo, force) {
            Ok(ok) => ok,
            Err(e) => {
                error!("failed to sync repository '{}': {e:#}", repo.id());
                false
            }
        };
        if !ok {
            failed.push(repo.id());
        }
    }

    if failed.is_empty() {
        info!("all repositories were synced successfully");
        Ok(())
    } else {
        warn!(
            "failed to sync {} of {} repositories: {}",
            failed.len(),
            synced,
            failed.join(", ")
        );
        bail!("some repositories couldn't be synced");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::{TempDir, tempdir};

    fn git_in(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .current_dir(dir)
            .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
            .args(args)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed in {}", dir.display());
    }

    fn rev_parse(dir: &Path, rev: &str) -> String {
        let out = Command::new("git")
            .current_dir(dir)
            .args(["rev-parse", rev])
            .output()
            .unwrap();
        assert!(out.status.success());
        String::from_utf8(out.stdout).unwrap().trim().to_string()
    }

    /// An upstream repository with one commit, plus a descriptor pointing
    /// at it via its filesystem path.
    fn upstream_with_commit(td: &TempDir) -> (PathBuf, Repo) {
        let upstream = td.path().join("upstream");
        fs::create_dir_all(&upstream).unwrap();
        git_in(&upstream, &["init", "-b", "master", "."]);
        fs::write(upstream.join("file.txt"), "one\n").unwrap();
        git_in(&upstream, &["add", "file.txt"]);
        git_in(&upstream, &["commit", "-m", "initial"]);

        let repo = Repo {
            name: "proj".to_string(),
            dir: None,
            clone_url: upstream.display().to_string(),
            url_auth: None,
            owner: Some("John Doe".to_string()),
            desc: None,
            homepage: None,
        };
        (upstream, repo)
    }

    fn output_at(td: &TempDir) -> Output {
        Output::new(
            td.path().join("mirrors"),
            Some("https://git.example.com/{repo}".to_string()),
            td.path().join("gitconfig"),
        )
        .unwrap()
    }

    #[test]
    fn fresh_mirror_writes_metadata() {
        let td = tempdir().unwrap();
        let (upstream, repo) = upstream_with_commit(&td);
        let output = output_at(&td);

        assert!(output.pull(&repo, false).unwrap());

        let dir = output.repo_dir(&repo);
        // A mirror clone is bare.
        assert!(dir.join("HEAD").is_file());
        assert_eq!(rev_parse(&dir, "master"), rev_parse(&upstream, "master"));

        let cgitrc = fs::read_to_string(dir.join("cgitrc")).unwrap();
        assert!(cgitrc.contains(&format!("clone-url={} https://git.example.com/proj\n", repo.clone_url)));
        assert!(cgitrc.contains("owner=John Doe\n"));
        assert!(dir.join("info/web/last-modified").is_file());
    }

    #[test]
    fn unrelated_directory_is_replaced_by_a_mirror() {
        let td = tempdir().unwrap();
        let (_upstream, repo) = upstream_with_commit(&td);
        let output = output_at(&td);

        let dir = output.repo_dir(&repo);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("junk.txt"), "junk").unwrap();

        assert!(output.pull(&repo, false).unwrap());
        assert!(!dir.join("junk.txt").exists());
        assert!(dir.join("HEAD").is_file());
    }

    #[test]
    fn update_soft_resets_to_origin_master() {
        let td = tempdir().unwrap();
        let (upstream, repo) = upstream_with_commit(&td);
        let output = output_at(&td);

        // A plain (non-mirror) clone of the upstream also classifies as
        // Update and has an origin/master tracking ref.
        let dir = output.repo_dir(&repo);
        fs::create_dir_all(dir.parent().unwrap()).unwrap();
        git_in(
            td.path(),
            &["clone", &repo.clone_url, dir.to_str().unwrap()],
        );

        // New upstream commit; the local clone is now behind.
        fs::write(upstream.join("file.txt"), "two\n").unwrap();
        git_in(&upstream, &["add", "file.txt"]);
        git_in(&upstream, &["commit", "-m", "second"]);

        assert!(output.pull(&repo, false).unwrap());
        assert_eq!(rev_parse(&dir, "master"), rev_parse(&upstream, "master"));

        // Idempotence: a second run with no upstream changes moves nothing.
        let before = rev_parse(&dir, "master");
        assert!(output.pull(&repo, false).unwrap());
        assert_eq!(rev_parse(&dir, "master"), before);
    }

    #[test]
    fn mirrored_repository_updates_in_place() {
        let td = tempdir().unwrap();
        let (upstream, repo) = upstream_with_commit(&td);
        let output = output_at(&td);

        assert!(output.pull(&repo, false).unwrap());
        fs::write(upstream.join("file.txt"), "two\n").unwrap();
        git_in(&upstream, &["add", "file.txt"]);
        git_in(&upstream, &["commit", "-m", "second"]);

        // Second pull takes the update path and picks up the new commit.
        assert!(output.pull(&repo, false).unwrap());
        let dir = output.repo_dir(&repo);
        assert_eq!(rev_parse(&dir, "master"), rev_parse(&upstream, "master"));
    }

    #[test]
    fn foreign_origin_fails_and_leaves_the_directory_alone() {
        let td = tempdir().unwrap();
        let (_upstream, mut repo) = upstream_with_commit(&td);
        let output = output_at(&td);

        assert!(output.pull(&repo, false).unwrap());
        let dir = output.repo_dir(&repo);
        let head_before = rev_parse(&dir, "master");

        // The config now claims a different upstream.
        repo.clone_url = format!("{}-moved", repo.clone_url);
        assert!(!output.pull(&repo, false).unwrap());
        assert_eq!(rev_parse(&dir, "master"), head_before);
        assert!(dir.join("HEAD").is_file());
    }

    #[test]
    fn force_rewrites_the_origin_url() {
        let td = tempdir().unwrap();
        let (upstream, repo) = upstream_with_commit(&td);
        let output = output_at(&td);

        assert!(output.pull(&repo, false).unwrap());
        let dir = output.repo_dir(&repo);

        // Simulate an operator repointing the remote; force restores it.
        git_in(&dir, &["remote", "set-url", "origin", "https://example.com/elsewhere.git"]);
        assert!(!output.pull(&repo, false).unwrap());
        assert!(output.pull(&repo, true).unwrap());

        let out = Command::new("git")
            .current_dir(&dir)
            .args(["config", "--get", "remote.origin.url"])
            .output()
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&out.stdout).trim(),
            upstream.display().to_string()
        );
    }

    #[test]
    fn repositories_nest_under_their_dir() {
        let td = tempdir().unwrap();
        let (_upstream, mut repo) = upstream_with_commit(&td);
        repo.dir = Some("misc".to_string());
        let output = output_at(&td);

        assert!(output.pull(&repo, false).unwrap());
        assert!(td.path().join("mirrors/misc/proj/HEAD").is_file());
    }
}
